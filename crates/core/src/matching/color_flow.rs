//! Color-flow matching: how well two shots blend, which gradient transition
//! carries them, and an optional grading LUT.

use serde::{Deserialize, Serialize};

use crate::{
    config::ColorFlowConfig,
    features::{
        geometry::clamp_unit, ChannelStats, ColorLayout, ColorPalette, FeatureBundle,
        LightingInfo, RgbColor,
    },
    vision::TransitionMask,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientGeometry {
    Linear,
    Radial,
    Diagonal,
}

impl GradientGeometry {
    const ALL: [GradientGeometry; 3] = [Self::Linear, Self::Radial, Self::Diagonal];

    /// Sweep position of a normalised point, `0` where the wipe starts.
    pub fn position(&self, x: f32, y: f32) -> f32 {
        match self {
            Self::Linear => x,
            Self::Diagonal => (x + y) * 0.5,
            // Distance from the centre, 1.0 at the corners.
            Self::Radial => ((x - 0.5).hypot(y - 0.5) / 0.5_f32.hypot(0.5)).min(1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendCurve {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl BlendCurve {
    pub fn apply(&self, t: f32) -> f32 {
        let t = clamp_unit(t);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Self::EaseInOut => t * t * (3.0 - 2.0 * t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorEffect {
    GradientWipe,
    ColorMatch,
    ColorTemperatureShift,
    BrightnessRamp,
    SaturationBlend,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub position: f32,
    pub color: RgbColor,
}

/// Spatially varying blend between two shots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientTransition {
    pub stops: Vec<ColorStop>,
    pub geometry: GradientGeometry,
    pub curve: BlendCurve,
    /// Sweep runs from high to low positions.
    pub reversed: bool,
}

impl GradientTransition {
    /// Wipe mask at the midpoint of the transition.
    pub fn mask(&self, width: u32, height: u32) -> TransitionMask {
        TransitionMask::from_fn(width, height, |x, y| {
            let t = self.geometry.position(x, y);
            let t = if self.reversed { 1.0 - t } else { t };
            self.curve.apply(t)
        })
    }
}

/// Per-channel 1D lookup table grading the source shot toward the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorLut {
    pub size: usize,
    pub red: Vec<f32>,
    pub green: Vec<f32>,
    pub blue: Vec<f32>,
}

impl ColorLut {
    /// Mean and standard deviation transfer from `source` to `target`.
    pub fn transfer(source: &ChannelStats, target: &ChannelStats, size: usize) -> Self {
        let size = size.max(2);
        let channel = |c: usize| -> Vec<f32> {
            let gain = if source.std_dev[c] > 1e-3 {
                target.std_dev[c] / source.std_dev[c]
            } else {
                1.0
            };
            (0..size)
                .map(|i| {
                    let v = i as f32 / (size - 1) as f32;
                    clamp_unit((v - source.mean[c]) * gain + target.mean[c])
                })
                .collect()
        };
        Self {
            size,
            red: channel(0),
            green: channel(1),
            blue: channel(2),
        }
    }

    /// `.cube` text form with a 1D table.
    pub fn to_cube(&self, title: &str) -> String {
        let mut out = format!(
            "TITLE \"{}\"\nLUT_1D_SIZE {}\nDOMAIN_MIN 0.0 0.0 0.0\nDOMAIN_MAX 1.0 1.0 1.0\n",
            title.replace('"', "'"),
            self.size
        );
        for ((r, g), b) in self.red.iter().zip(&self.green).zip(&self.blue) {
            out.push_str(&format!("{r:.6} {g:.6} {b:.6}\n"));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorFlowMatch {
    pub palette_a: ColorPalette,
    pub palette_b: ColorPalette,
    pub compatibility: f32,
    pub palette_distance: f32,
    pub brightness_delta: f32,
    pub saturation_delta: f32,
    pub lighting_delta: f32,
    pub temperature_shift: f32,
    pub gradient: GradientTransition,
    pub effects: Vec<ColorEffect>,
    pub lut: Option<ColorLut>,
}

impl ColorFlowMatch {
    pub fn mask(&self, config: &ColorFlowConfig) -> TransitionMask {
        self.gradient.mask(config.mask_width, config.mask_height)
    }
}

/// Share-weighted nearest-color distance, averaged over both directions.
pub fn palette_distance(a: &ColorPalette, b: &ColorPalette) -> f32 {
    let directed = |from: &ColorPalette, to: &ColorPalette| -> Option<f32> {
        let total: f32 = from.colors.iter().map(|c| c.share).sum();
        if to.colors.is_empty() || total <= f32::EPSILON {
            return None;
        }
        let sum: f32 = from
            .colors
            .iter()
            .map(|c| {
                let nearest = to
                    .colors
                    .iter()
                    .map(|o| c.color.distance(&o.color))
                    .fold(f32::INFINITY, f32::min);
                c.share * nearest
            })
            .sum();
        Some(sum / total)
    };
    match (directed(a, b), directed(b, a)) {
        (Some(x), Some(y)) => clamp_unit((x + y) * 0.5),
        (None, None) => 0.0,
        _ => 1.0,
    }
}

fn lighting_delta(a: &LightingInfo, b: &LightingInfo) -> f32 {
    let norm_a = a.direction[0].hypot(a.direction[1]);
    let norm_b = b.direction[0].hypot(b.direction[1]);
    let direction = if norm_a > 0.5 && norm_b > 0.5 {
        let dot = a.direction[0] * b.direction[0] + a.direction[1] * b.direction[1];
        (1.0 - dot / (norm_a * norm_b)) * 0.5
    } else {
        0.0
    };
    clamp_unit(0.5 * direction + 0.5 * (a.intensity - b.intensity).abs())
}

/// Geometry whose sweep best follows where the two layouts differ. Ties
/// go to linear. Returns the geometry and whether the sweep is reversed.
fn choose_geometry(a: &ColorLayout, b: &ColorLayout) -> (GradientGeometry, bool) {
    let diffs: Vec<f32> = a
        .cells
        .iter()
        .zip(&b.cells)
        .map(|(ca, cb)| ca.distance(cb))
        .collect();

    let mut best = (GradientGeometry::Linear, false, 0.0_f32);
    for geometry in GradientGeometry::ALL {
        let positions: Vec<f32> = (0..diffs.len())
            .map(|i| {
                let (x, y) = a.cell_center(i);
                geometry.position(x, y)
            })
            .collect();
        let r = pearson(&positions, &diffs);
        if r.abs() > best.2 + 1e-6 {
            // Sweep from the area that differs least to the one that differs most.
            best = (geometry, r < 0.0, r.abs());
        }
    }
    (best.0, best.1)
}

fn pearson(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f32>() / n as f32;
    let mean_b = b[..n].iter().sum::<f32>() / n as f32;
    let (mut cov, mut va, mut vb) = (0.0_f32, 0.0_f32, 0.0_f32);
    for i in 0..n {
        cov += (a[i] - mean_a) * (b[i] - mean_b);
        va += (a[i] - mean_a).powi(2);
        vb += (b[i] - mean_b).powi(2);
    }
    let denom = (va * vb).sqrt();
    if denom <= 1e-9 {
        0.0
    } else {
        cov / denom
    }
}

pub fn analyze_color_flow(a: &FeatureBundle, b: &FeatureBundle, config: &ColorFlowConfig) -> ColorFlowMatch {
    let palette_distance = palette_distance(&a.palette, &b.palette);
    let brightness_delta = (b.palette.brightness - a.palette.brightness).abs();
    let saturation_delta = (b.palette.saturation - a.palette.saturation).abs();
    let lighting_delta = lighting_delta(&a.lighting, &b.lighting);
    let temperature_shift = (b.palette.temperature - a.palette.temperature).abs();

    let compatibility = clamp_unit(
        1.0 - (0.5 * palette_distance
            + 0.2 * brightness_delta
            + 0.1 * saturation_delta
            + 0.2 * lighting_delta),
    );

    let abruptness = lighting_delta.max(brightness_delta);
    let curve = if abruptness < config.gentle_lighting {
        BlendCurve::Linear
    } else if abruptness < config.abrupt_lighting {
        BlendCurve::EaseInOut
    } else if b.palette.brightness > a.palette.brightness {
        BlendCurve::EaseIn
    } else {
        BlendCurve::EaseOut
    };

    let (geometry, reversed) = choose_geometry(&a.color_layout, &b.color_layout);
    let start = a
        .palette
        .dominant()
        .map(|c| c.color)
        .unwrap_or_else(|| a.palette.mean_color());
    let end = b
        .palette
        .dominant()
        .map(|c| c.color)
        .unwrap_or_else(|| b.palette.mean_color());
    let stops = vec![
        ColorStop {
            position: 0.0,
            color: start,
        },
        ColorStop {
            position: 0.5,
            color: a.palette.mean_color().mix(&b.palette.mean_color(), 0.5),
        },
        ColorStop {
            position: 1.0,
            color: end,
        },
    ];

    let mut effects = vec![ColorEffect::GradientWipe, ColorEffect::ColorMatch];
    if temperature_shift > config.temperature_shift {
        effects.push(ColorEffect::ColorTemperatureShift);
    }
    if brightness_delta > config.brightness_shift {
        effects.push(ColorEffect::BrightnessRamp);
    }
    if saturation_delta > config.saturation_shift {
        effects.push(ColorEffect::SaturationBlend);
    }

    let lut = (compatibility < config.lut_threshold)
        .then(|| ColorLut::transfer(&a.channel_stats, &b.channel_stats, config.lut_size));

    ColorFlowMatch {
        palette_a: a.palette.clone(),
        palette_b: b.palette.clone(),
        compatibility,
        palette_distance,
        brightness_delta: clamp_unit(brightness_delta),
        saturation_delta: clamp_unit(saturation_delta),
        lighting_delta,
        temperature_shift: clamp_unit(temperature_shift),
        gradient: GradientTransition {
            stops,
            geometry,
            curve,
            reversed,
        },
        effects,
        lut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::EngineConfig,
        features::extract_features,
        ingest::{Shot, ShotId},
    };
    use image::{Rgb, RgbImage};

    fn bundle(id: &str, rgb: RgbImage) -> FeatureBundle {
        let config = EngineConfig::default();
        let shot = Shot::from_rgb(ShotId::new(id), rgb, &config.ingest).unwrap();
        extract_features(shot, &config).unwrap()
    }

    fn sunset() -> RgbImage {
        RgbImage::from_fn(96, 64, |x, y| {
            Rgb([200 + (x % 40) as u8, 90 + (y * 2) as u8, 40])
        })
    }

    #[test]
    fn a_shot_flows_into_itself() {
        let shot = bundle("a", sunset());
        let flow = analyze_color_flow(&shot, &shot, &ColorFlowConfig::default());
        assert!(flow.compatibility >= 0.95);
        assert!(flow.lut.is_none());
        assert_eq!(flow.gradient.curve, BlendCurve::Linear);
        assert_eq!(flow.gradient.geometry, GradientGeometry::Linear);
        assert_eq!(&flow.effects, &[ColorEffect::GradientWipe, ColorEffect::ColorMatch]);
    }

    #[test]
    fn clashing_shots_get_a_lut_and_extra_effects() {
        let warm = bundle("warm", sunset());
        let cold = bundle("cold", RgbImage::from_pixel(96, 64, Rgb([10, 30, 90])));
        let flow = analyze_color_flow(&warm, &cold, &ColorFlowConfig::default());
        assert!(flow.compatibility < 0.7);
        let lut = flow.lut.as_ref().expect("lut emitted");
        assert_eq!(lut.red.len(), 256);
        assert!(flow.effects.contains(&ColorEffect::ColorTemperatureShift));
        assert!(flow.effects.contains(&ColorEffect::BrightnessRamp));
        assert_eq!(flow.gradient.curve, BlendCurve::EaseOut);
    }

    #[test]
    fn geometry_follows_where_layouts_differ() {
        let left_changes = bundle(
            "l",
            RgbImage::from_fn(64, 64, |x, _| if x < 16 { Rgb([250, 250, 250]) } else { Rgb([20, 20, 20]) }),
        );
        let plain = bundle("p", RgbImage::from_pixel(64, 64, Rgb([20, 20, 20])));
        let flow = analyze_color_flow(&left_changes, &plain, &ColorFlowConfig::default());
        assert_eq!(flow.gradient.geometry, GradientGeometry::Linear);
        assert!(flow.gradient.reversed);
    }

    #[test]
    fn lut_transfers_mean_and_spread() {
        let source = ChannelStats {
            mean: [0.2, 0.2, 0.2],
            std_dev: [0.1, 0.1, 0.0],
        };
        let target = ChannelStats {
            mean: [0.6, 0.5, 0.4],
            std_dev: [0.2, 0.1, 0.1],
        };
        let lut = ColorLut::transfer(&source, &target, 11);
        assert!((lut.red[2] - 0.6).abs() < 1e-5);
        assert!((lut.green[3] - 0.6).abs() < 1e-5);
        assert!((lut.blue[2] - 0.4).abs() < 1e-5);
        let cube = lut.to_cube("a -> b");
        assert!(cube.starts_with("TITLE \"a -> b\"\nLUT_1D_SIZE 11\n"));
        assert_eq!(cube.lines().count(), 4 + 11);
        assert!(cube.ends_with('\n'));
        assert!(lut.to_cube("say \"hi\"").starts_with("TITLE \"say 'hi'\"\n"));
    }

    #[test]
    fn curves_are_monotonic_and_anchored() {
        for curve in [BlendCurve::Linear, BlendCurve::EaseIn, BlendCurve::EaseOut, BlendCurve::EaseInOut] {
            assert_eq!(curve.apply(0.0), 0.0);
            assert!((curve.apply(1.0) - 1.0).abs() < 1e-6);
            assert!(curve.apply(0.3) <= curve.apply(0.6));
        }
    }
}
