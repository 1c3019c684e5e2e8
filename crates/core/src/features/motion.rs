//! Motion cue inferred from a single still.
//!
//! Straight edges are read as leading lines: each segment is oriented away
//! from the salient focal point and the length-weighted mean of those
//! orientations becomes the implied direction of travel.

use serde::{Deserialize, Serialize};

use super::geometry::{clamp_unit, Frame, LineSegment, Point};
use crate::{
    config::MotionConfig,
    vision::{filters::harris_keypoints, Gradients, Keypoint, Segment},
};

/// Implied direction of travel, image y axis pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionDirection {
    Right,
    Down,
    Left,
    Up,
    Diagonal,
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionCue {
    pub direction: MotionDirection,
    /// Unit vector behind `direction`, `[0, 0]` for static shots.
    pub vector: [f32; 2],
    pub speed: f32,
    pub focal_point: Point,
    /// Supporting segments, longest first.
    pub lines: Vec<LineSegment>,
    pub confidence: f32,
}

impl MotionCue {
    pub fn is_static(&self) -> bool {
        self.direction == MotionDirection::Static
    }
}

/// `smoothed` are the gradients the edge map was built from, `raw` the
/// gradients of the unblurred grayscale view.
pub fn extract(
    segments: &[Segment],
    smoothed: &Gradients,
    raw: &Gradients,
    frame: Frame,
    config: &MotionConfig,
) -> MotionCue {
    let keypoints = harris_keypoints(
        smoothed,
        config.harris_k,
        config.keypoint_relative_threshold,
        config.max_keypoints,
    );
    let focal = focal_point(&keypoints, frame);
    let focal_px = (focal.x * frame.width, focal.y * frame.height);

    let mut ordered: Vec<Segment> = segments.to_vec();
    ordered.sort_by(|a, b| b.length().total_cmp(&a.length()));

    let vector = mean_direction(&ordered, focal_px);
    let direction = match vector {
        Some([x, y]) => classify(y.atan2(x).to_degrees(), config.cardinal_tolerance_degrees),
        None => MotionDirection::Static,
    };

    let confidence = if ordered.is_empty() {
        0.0
    } else if ordered.len() >= config.min_lines_for_high_confidence {
        config.high_confidence
    } else {
        config.moderate_confidence
    };

    MotionCue {
        direction,
        vector: vector.unwrap_or([0.0, 0.0]),
        speed: clamp_unit(raw.mean_magnitude() * config.speed_scale),
        focal_point: focal,
        lines: ordered.iter().map(|s| frame.segment(s)).collect(),
        confidence: clamp_unit(confidence),
    }
}

fn focal_point(keypoints: &[Keypoint], frame: Frame) -> Point {
    let total: f32 = keypoints.iter().map(|k| k.response).sum();
    if total <= f32::EPSILON {
        return Point::center();
    }
    let x = keypoints.iter().map(|k| k.x * k.response).sum::<f32>() / total;
    let y = keypoints.iter().map(|k| k.y * k.response).sum::<f32>() / total;
    frame.point(x, y)
}

fn mean_direction(segments: &[Segment], focal: (f32, f32)) -> Option<[f32; 2]> {
    let (mut sx, mut sy, mut total) = (0.0_f32, 0.0_f32, 0.0_f32);
    let (mut c2, mut s2) = (0.0_f32, 0.0_f32);
    for segment in segments {
        let length = segment.length();
        if length <= f32::EPSILON {
            continue;
        }
        let d1 = (segment.x1 - focal.0).hypot(segment.y1 - focal.1);
        let d2 = (segment.x2 - focal.0).hypot(segment.y2 - focal.1);
        let (dx, dy) = if d2 >= d1 {
            (segment.x2 - segment.x1, segment.y2 - segment.y1)
        } else {
            (segment.x1 - segment.x2, segment.y1 - segment.y2)
        };
        sx += dx;
        sy += dy;
        total += length;
        let angle = dy.atan2(dx);
        c2 += length * (2.0 * angle).cos();
        s2 += length * (2.0 * angle).sin();
    }
    if total <= f32::EPSILON {
        return None;
    }

    let norm = sx.hypot(sy);
    if norm > 0.05 * total {
        return Some([sx / norm, sy / norm]);
    }
    // Opposing lines cancel out; fall back to their shared axis.
    if c2.hypot(s2) <= f32::EPSILON {
        return None;
    }
    let axis = 0.5 * s2.atan2(c2);
    Some([axis.cos(), axis.sin()])
}

fn classify(degrees: f32, tolerance: f32) -> MotionDirection {
    let near = |target: f32| {
        let diff = (degrees - target).rem_euclid(360.0);
        diff.min(360.0 - diff) <= tolerance
    };
    if near(0.0) {
        MotionDirection::Right
    } else if near(90.0) {
        MotionDirection::Down
    } else if near(180.0) {
        MotionDirection::Left
    } else if near(270.0) {
        MotionDirection::Up
    } else {
        MotionDirection::Diagonal
    }
}
