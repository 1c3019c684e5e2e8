use std::f32::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use super::{
    geometry::{clamp_unit, Frame, Point},
    shapes::{ellipse_radius, Candidates},
};
use crate::{
    config::PortalConfig,
    ingest::Plane,
    vision::{contours::EllipseFit, Gradients},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalKind {
    Circle,
    Rectangle,
    Arch,
}

/// A frame within the frame usable for a perspective transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub kind: PortalKind,
    pub center: Point,
    /// Normalised bounding width and height.
    pub width: f32,
    pub height: f32,
    /// Share of the frame inside the outline.
    pub area: f32,
    pub confidence: f32,
    /// `1 - interior / surround` brightness, zero when the inside is not darker.
    pub darkness_ratio: f32,
    pub edge_strength: f32,
    pub quality_score: f32,
}

impl Portal {
    /// Normalised outline radius of a point in normalised coordinates,
    /// 1.0 on the outline. Used for mask rendering.
    pub fn outline_radius(&self, x: f32, y: f32) -> f32 {
        let hw = (self.width * 0.5).max(f32::EPSILON);
        let hh = (self.height * 0.5).max(f32::EPSILON);
        let (u, v) = ((x - self.center.x) / hw, (y - self.center.y) / hh);
        match self.kind {
            PortalKind::Rectangle => u.abs().max(v.abs()),
            PortalKind::Circle | PortalKind::Arch => u.hypot(v),
        }
    }
}

pub fn quality_score(area: f32, darkness: f32, edge_strength: f32, confidence: f32, preferred_area: f32) -> f32 {
    let size_score = if preferred_area > 0.0 {
        clamp_unit(1.0 - (area - preferred_area).abs() / preferred_area)
    } else {
        0.0
    };
    clamp_unit(0.3 * size_score + 0.3 * darkness + 0.2 * edge_strength + 0.2 * confidence)
}

/// Pixel-space outline used while measuring a candidate.
#[derive(Debug, Clone, Copy)]
enum Outline {
    Circle { cx: f32, cy: f32, r: f32 },
    Box { cx: f32, cy: f32, hw: f32, hh: f32 },
    Ellipse(EllipseFit),
}

impl Outline {
    fn radius(&self, x: f32, y: f32) -> f32 {
        match *self {
            Outline::Circle { cx, cy, r } => (x - cx).hypot(y - cy) / r.max(f32::EPSILON),
            Outline::Box { cx, cy, hw, hh } => {
                ((x - cx).abs() / hw.max(f32::EPSILON)).max((y - cy).abs() / hh.max(f32::EPSILON))
            }
            Outline::Ellipse(ref ellipse) => ellipse_radius(ellipse, x, y),
        }
    }

    fn boundary(&self, t: f32) -> (f32, f32) {
        match *self {
            Outline::Circle { cx, cy, r } => (cx + r * t.cos(), cy + r * t.sin()),
            Outline::Box { cx, cy, hw, hh } => {
                // Walk the perimeter at constant speed.
                let perimeter = 4.0 * (hw + hh);
                let mut d = t / TAU * perimeter;
                let sides = [
                    (2.0 * hw, (cx - hw, cy - hh), (1.0, 0.0)),
                    (2.0 * hh, (cx + hw, cy - hh), (0.0, 1.0)),
                    (2.0 * hw, (cx + hw, cy + hh), (-1.0, 0.0)),
                    (2.0 * hh, (cx - hw, cy + hh), (0.0, -1.0)),
                ];
                for (length, (sx, sy), (dx, dy)) in sides {
                    if d <= length {
                        return (sx + dx * d, sy + dy * d);
                    }
                    d -= length;
                }
                (cx - hw, cy - hh)
            }
            Outline::Ellipse(e) => {
                let (cos, sin) = (e.angle.cos(), e.angle.sin());
                let (u, v) = (e.semi_major * t.cos(), e.semi_minor * t.sin());
                (e.cx + u * cos - v * sin, e.cy + u * sin + v * cos)
            }
        }
    }

    /// Half extents of the axis-aligned bounding box.
    fn half_extents(&self) -> (f32, f32) {
        match *self {
            Outline::Circle { r, .. } => (r, r),
            Outline::Box { hw, hh, .. } => (hw, hh),
            Outline::Ellipse(e) => {
                let (cos, sin) = (e.angle.cos(), e.angle.sin());
                (
                    (e.semi_major * cos).hypot(e.semi_minor * sin),
                    (e.semi_major * sin).hypot(e.semi_minor * cos),
                )
            }
        }
    }

    fn center(&self) -> (f32, f32) {
        match *self {
            Outline::Circle { cx, cy, .. } | Outline::Box { cx, cy, .. } => (cx, cy),
            Outline::Ellipse(e) => (e.cx, e.cy),
        }
    }
}

/// Interior is `radius <= 0.9`, the surround ring `1.1..=1.4`.
fn darkness_ratio(gray: &Plane, outline: &Outline) -> f32 {
    let (cx, cy) = outline.center();
    let (hx, hy) = outline.half_extents();
    let x0 = (cx - 1.4 * hx).floor().max(0.0) as usize;
    let y0 = (cy - 1.4 * hy).floor().max(0.0) as usize;
    let x1 = ((cx + 1.4 * hx).ceil().max(0.0) as usize).min(gray.width().saturating_sub(1));
    let y1 = ((cy + 1.4 * hy).ceil().max(0.0) as usize).min(gray.height().saturating_sub(1));

    let (mut inner, mut inner_n, mut ring, mut ring_n) = (0.0_f32, 0usize, 0.0_f32, 0usize);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let r = outline.radius(x as f32, y as f32);
            if r <= 0.9 {
                inner += gray.get(x, y);
                inner_n += 1;
            } else if (1.1..=1.4).contains(&r) {
                ring += gray.get(x, y);
                ring_n += 1;
            }
        }
    }
    if inner_n == 0 {
        return 0.0;
    }
    let inner = inner / inner_n as f32;
    // A portal that fills the frame is compared against the whole frame.
    let surround = if ring_n > 0 { ring / ring_n as f32 } else { gray.mean() };
    if surround <= 1e-3 {
        return 0.0;
    }
    clamp_unit(1.0 - inner / surround)
}

fn edge_strength(gradients: &Gradients, outline: &Outline, scale: f32) -> f32 {
    const SAMPLES: usize = 64;
    let total: f32 = (0..SAMPLES)
        .map(|i| {
            let (x, y) = outline.boundary(i as f32 / SAMPLES as f32 * TAU);
            gradients.local_peak(x.round() as isize, y.round() as isize)
        })
        .sum();
    clamp_unit(total / SAMPLES as f32 * scale)
}

/// Gated, quality-ranked portals. `gradients` belong to the unblurred view.
pub fn detect(
    candidates: &Candidates,
    gray: &Plane,
    gradients: &Gradients,
    frame: Frame,
    config: &PortalConfig,
) -> Vec<Portal> {
    let circles = candidates.circles.iter().map(|c| {
        (
            PortalKind::Circle,
            Outline::Circle {
                cx: c.cx,
                cy: c.cy,
                r: c.radius,
            },
            PI * c.radius * c.radius,
            c.support,
        )
    });
    let rectangles = candidates.quads.iter().map(|q| {
        (
            PortalKind::Rectangle,
            Outline::Box {
                cx: q.cx,
                cy: q.cy,
                hw: q.width * 0.5,
                hh: q.height * 0.5,
            },
            q.area,
            q.support,
        )
    });
    let arches = candidates.arches.iter().map(|a| {
        (
            PortalKind::Arch,
            Outline::Ellipse(a.ellipse),
            PI * a.ellipse.semi_major * a.ellipse.semi_minor,
            a.support,
        )
    });

    let mut portals: Vec<Portal> = circles
        .chain(rectangles)
        .chain(arches)
        .filter_map(|(kind, outline, area_px, confidence)| {
            let darkness = darkness_ratio(gray, &outline);
            let edge = edge_strength(gradients, &outline, config.edge_strength_scale);
            if darkness <= config.darkness_threshold && edge <= config.edge_threshold {
                return None;
            }
            let (cx, cy) = outline.center();
            let (hx, hy) = outline.half_extents();
            let area = clamp_unit(area_px / frame.area());
            let confidence = clamp_unit(confidence);
            Some(Portal {
                kind,
                center: frame.point(cx, cy),
                width: clamp_unit(2.0 * hx / frame.width),
                height: clamp_unit(2.0 * hy / frame.height),
                area,
                confidence,
                darkness_ratio: darkness,
                edge_strength: edge,
                quality_score: quality_score(area, darkness, edge, confidence, config.preferred_area),
            })
        })
        .collect();

    portals.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
    portals.truncate(config.max_portals);
    portals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{EdgeConfig, ShapeConfig},
        features::shapes::detect_candidates,
        vision::filters::{canny, sobel},
    };

    fn portals_in(plane: &Plane) -> Vec<Portal> {
        let frame = Frame::new(plane.width(), plane.height());
        let (edges, smoothed) = canny(plane, &EdgeConfig::default());
        let candidates = detect_candidates(&edges, &smoothed, frame, &ShapeConfig::default());
        detect(&candidates, plane, &sobel(plane), frame, &PortalConfig::default())
    }

    #[test]
    fn dark_quarter_frame_circle_is_a_good_portal() {
        // r^2 * PI = 0.25 * 200 * 200
        let radius = (0.25_f32 * 200.0 * 200.0 / PI).sqrt();
        let plane = Plane::from_fn(200, 200, |x, y| {
            if (x as f32 - 100.0).hypot(y as f32 - 100.0) <= radius {
                0.08
            } else {
                0.85
            }
        });
        let portals = portals_in(&plane);
        let best = portals.first().expect("portal detected");
        assert_eq!(best.kind, PortalKind::Circle);
        assert!(best.darkness_ratio > 0.8);
        assert!(best.quality_score > 0.5, "quality {}", best.quality_score);
        assert!((best.area - 0.25).abs() < 0.05);
    }

    #[test]
    fn flat_frames_have_no_portals() {
        assert!(portals_in(&Plane::from_fn(80, 60, |_, _| 0.6)).is_empty());
    }

    #[test]
    fn quality_prefers_quarter_frame_portals() {
        let ideal = quality_score(0.25, 0.5, 0.5, 0.5, 0.25);
        let tiny = quality_score(0.02, 0.5, 0.5, 0.5, 0.25);
        assert!(ideal > tiny);
        assert!((ideal - (0.3 + 0.15 + 0.1 + 0.1)).abs() < 1e-5);
    }

    #[test]
    fn outline_radius_matches_kind() {
        let portal = Portal {
            kind: PortalKind::Rectangle,
            center: Point::center(),
            width: 0.4,
            height: 0.2,
            area: 0.08,
            confidence: 1.0,
            darkness_ratio: 0.5,
            edge_strength: 0.5,
            quality_score: 0.5,
        };
        assert!((portal.outline_radius(0.7, 0.6) - 1.0).abs() < 1e-5);
        let circle = Portal {
            kind: PortalKind::Circle,
            ..portal
        };
        assert!(circle.outline_radius(0.7, 0.6) > 1.0);
    }
}
