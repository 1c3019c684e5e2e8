//! Per-shot feature extraction.
//!
//! [`extract_features`] consumes a [`Shot`] and returns a [`FeatureBundle`]
//! of immutable value structs. Edge detection, gradients and shape candidates
//! are computed once and shared by the individual extractors.

pub mod color;
pub mod complexity;
pub mod geometry;
pub mod motion;
pub mod portal;
pub mod shapes;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::EngineConfig,
    ingest::{Shot, ShotId},
    vision::filters::{canny, sobel},
    Result,
};

pub use color::{ChannelStats, ColorLayout, ColorPalette, LightingInfo, LightingType, PaletteColor, RgbColor};
pub use complexity::{EnergyProfile, VisualComplexity};
pub use geometry::{Frame, LineSegment, Point};
pub use motion::{MotionCue, MotionDirection};
pub use portal::{Portal, PortalKind};
pub use shapes::{Shape, ShapeKind, ShapePrimitive};

/// Everything downstream stages know about one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub shot_id: ShotId,
    pub source: Option<PathBuf>,
    /// Analysed raster size in pixels.
    pub width: u32,
    pub height: u32,
    pub motion: MotionCue,
    pub shapes: Vec<ShapePrimitive>,
    pub portals: Vec<Portal>,
    pub palette: ColorPalette,
    pub lighting: LightingInfo,
    pub color_layout: ColorLayout,
    pub channel_stats: ChannelStats,
    pub complexity: VisualComplexity,
    pub energy: EnergyProfile,
    pub edge_histogram: Vec<f32>,
}

impl FeatureBundle {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn shapes_of(&self, kind: ShapeKind) -> impl Iterator<Item = &ShapePrimitive> {
        self.shapes.iter().filter(move |s| s.kind() == kind)
    }
}

/// Runs every extractor over `shot`. The shot, and with it the raster, is
/// dropped before this returns.
pub fn extract_features(shot: Shot, config: &EngineConfig) -> Result<FeatureBundle> {
    let frame = Frame::new(shot.width(), shot.height());
    let (edges, smoothed) = canny(shot.gray(), &config.edges);
    let raw = sobel(shot.gray());

    let candidates = shapes::detect_candidates(&edges, &smoothed, frame, &config.shapes);
    debug!(
        shot = %shot.id(),
        edges = edges.count(),
        circles = candidates.circles.len(),
        segments = candidates.segments.len(),
        quads = candidates.quads.len(),
        arches = candidates.arches.len(),
        "shape candidates"
    );

    let motion = motion::extract(&candidates.segments, &smoothed, &raw, frame, &config.motion);
    let shapes = shapes::primitives(&candidates, frame, &config.shapes);
    let portals = portal::detect(&candidates, shot.gray(), &raw, frame, &config.portals);
    debug!(
        shot = %shot.id(),
        direction = ?motion.direction,
        shapes = shapes.len(),
        portals = portals.len(),
        "geometry extracted"
    );

    let colors = color::analyze(&shot, &config.color);
    let complexity = complexity::measure(&shot, &edges, &raw, &colors.channel_stats, &config.complexity)?;
    let energy = complexity::energy(&shot, &config.color, &config.complexity);
    let edge_histogram =
        complexity::edge_orientation_histogram(&edges, &smoothed, config.complexity.edge_histogram_bins);
    debug!(
        shot = %shot.id(),
        complexity = complexity.overall_score,
        energy = energy.total_energy,
        "complexity measured"
    );

    Ok(FeatureBundle {
        shot_id: shot.id().clone(),
        source: shot.path().map(|p| p.to_path_buf()),
        width: frame.width as u32,
        height: frame.height as u32,
        motion,
        shapes,
        portals,
        palette: colors.palette,
        lighting: colors.lighting,
        color_layout: colors.layout,
        channel_stats: colors.channel_stats,
        complexity,
        energy,
        edge_histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn bundle(rgb: RgbImage) -> FeatureBundle {
        let config = EngineConfig::default();
        let shot = Shot::from_rgb(ShotId::new("bundle"), rgb, &config.ingest).unwrap();
        extract_features(shot, &config).unwrap()
    }

    fn in_unit(value: f32) -> bool {
        (0.0..=1.0).contains(&value)
    }

    #[test]
    fn solid_frames_degrade_to_empty_features() {
        let features = bundle(RgbImage::from_pixel(120, 80, Rgb([200, 180, 40])));
        assert!(features.shapes.is_empty());
        assert!(features.portals.is_empty());
        assert!(features.motion.is_static());
        assert!(features.complexity.overall_score < 0.2);
        assert_eq!(features.edge_histogram.iter().sum::<f32>(), 0.0);
        assert!((features.aspect_ratio() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn geometry_stays_normalised() {
        let features = bundle(RgbImage::from_fn(180, 120, |x, y| {
            let inside_disk = (x as f32 - 60.0).hypot(y as f32 - 60.0) < 30.0;
            let inside_box = (110..170).contains(&x) && (20..100).contains(&y);
            if inside_disk || inside_box {
                Rgb([20, 20, 30])
            } else if y % 40 < 2 {
                Rgb([250, 250, 250])
            } else {
                Rgb([160, 140, 120])
            }
        }));
        assert!(!features.shapes.is_empty());
        for shape in &features.shapes {
            assert!(in_unit(shape.center().x) && in_unit(shape.center().y));
            assert!(in_unit(shape.area) && in_unit(shape.confidence));
        }
        for portal in &features.portals {
            assert!(in_unit(portal.center.x) && in_unit(portal.center.y));
            assert!(in_unit(portal.width) && in_unit(portal.height));
            assert!(in_unit(portal.quality_score));
        }
        let focal = features.motion.focal_point;
        assert!(in_unit(focal.x) && in_unit(focal.y));
        for line in &features.motion.lines {
            assert!(in_unit(line.start.x) && in_unit(line.end.y));
        }
        let shares: f32 = features.palette.colors.iter().map(|c| c.share).sum();
        assert!((shares - 1.0).abs() < 1e-3);
    }
}
