//! Geometric primitives: circles, straight lines, rectangles and arches.
//!
//! Detection runs once per shot into [`Candidates`] (pixel space). The
//! generic shape list and the portal detector both read from it.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use super::geometry::{clamp_unit, Frame, LineSegment, Point};
use crate::{
    config::ShapeConfig,
    vision::{
        contours::{
            approx_polygon, connected_components, convex_hull, fit_ellipse, polygon_area,
            polygon_perimeter, EllipseFit,
        },
        hough::{detect_circles, detect_segments, CircleParams, LineParams},
        Circle, EdgeMap, Gradients, Segment,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Circle,
    Line,
    Rectangle,
}

/// Normalised geometry. Circle radii are fractions of the shorter side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Circle { center: Point, radius: f32 },
    Line { start: Point, end: Point },
    Rectangle { center: Point, width: f32, height: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapePrimitive {
    pub shape: Shape,
    pub confidence: f32,
    /// Share of the frame covered by the shape, zero for lines.
    pub area: f32,
}

impl ShapePrimitive {
    pub fn kind(&self) -> ShapeKind {
        match self.shape {
            Shape::Circle { .. } => ShapeKind::Circle,
            Shape::Line { .. } => ShapeKind::Line,
            Shape::Rectangle { .. } => ShapeKind::Rectangle,
        }
    }

    pub fn center(&self) -> Point {
        match self.shape {
            Shape::Circle { center, .. } | Shape::Rectangle { center, .. } => center,
            Shape::Line { start, end } => LineSegment { start, end }.midpoint(),
        }
    }

    /// Ranking key used when trimming each kind to its best few.
    fn size(&self) -> f32 {
        match self.shape {
            Shape::Circle { radius, .. } => radius,
            Shape::Line { start, end } => start.distance(&end),
            Shape::Rectangle { .. } => self.area,
        }
    }
}

/// Four-sided outline in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
    pub area: f32,
    pub support: f32,
}

/// Wide, near-horizontal ellipse outline in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arch {
    pub ellipse: EllipseFit,
    pub support: f32,
}

/// Everything the detectors found in one shot, before any ranking.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub circles: Vec<Circle>,
    pub segments: Vec<Segment>,
    pub quads: Vec<Quad>,
    pub arches: Vec<Arch>,
}

pub fn detect_candidates(
    edges: &EdgeMap,
    gradients: &Gradients,
    frame: Frame,
    config: &ShapeConfig,
) -> Candidates {
    let min_dim = frame.min_dimension();

    let min_radius = ((min_dim * config.min_radius_fraction).round() as usize).max(3);
    let max_radius = (min_dim * config.max_radius_fraction).round() as usize;
    let circles = detect_circles(
        edges,
        gradients,
        &CircleParams {
            min_radius,
            max_radius,
            min_votes: (config.circle_vote_fraction * 2.0 * PI * min_radius as f32).round() as u32,
            min_support: config.circle_min_support,
            min_distance: config.circle_min_distance_fraction * min_dim,
            max_candidates: config.max_circle_candidates,
        },
    );

    let segments = detect_segments(
        edges,
        &LineParams {
            min_votes: ((config.line_vote_fraction * min_dim).round() as usize).max(10),
            min_length: config.line_min_length_fraction * min_dim,
            max_gap: config.line_max_gap,
            max_peaks: config.max_line_peaks,
        },
    );

    let (quads, arches) = outlines(edges, frame, config);

    Candidates {
        circles,
        segments,
        quads,
        arches,
    }
}

fn outlines(edges: &EdgeMap, frame: Frame, config: &ShapeConfig) -> (Vec<Quad>, Vec<Arch>) {
    let closed = edges.dilate(1);
    let mut quads = Vec::new();
    let mut arches = Vec::new();

    for component in connected_components(&closed, config.min_contour_pixels.max(5)) {
        let points = component.points();
        let hull = convex_hull(&points);
        let polygon = approx_polygon(&hull, config.polygon_epsilon_fraction * polygon_perimeter(&hull));

        if polygon.len() == 4 {
            let area = polygon_area(&polygon);
            let (min_x, max_x, min_y, max_y) = polygon.iter().fold(
                (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
                |(a, b, c, d), p| (a.min(p.0), b.max(p.0), c.min(p.1), d.max(p.1)),
            );
            let (width, height) = (max_x - min_x, max_y - min_y);
            let share = area / frame.area();
            let aspect = if height > 0.0 { width / height } else { f32::MAX };
            let support = polygon_support(&closed, &polygon);
            if (config.rect_min_area..=config.rect_max_area).contains(&share)
                && (config.rect_min_aspect..=config.rect_max_aspect).contains(&aspect)
                && support >= config.outline_min_support
            {
                quads.push(Quad {
                    cx: (min_x + max_x) * 0.5,
                    cy: (min_y + max_y) * 0.5,
                    width,
                    height,
                    area,
                    support,
                });
                continue;
            }
        }

        // Fit failures are skipped.
        let Some(ellipse) = fit_ellipse(&points) else {
            continue;
        };
        let tilt = ellipse.angle.abs().min(PI - ellipse.angle.abs());
        let share = PI * ellipse.semi_major * ellipse.semi_minor / frame.area();
        if ellipse.semi_major < config.arch_min_aspect * ellipse.semi_minor
            || tilt > config.arch_max_tilt_degrees.to_radians()
            || share < config.arch_min_area
            || share > config.rect_max_area
        {
            continue;
        }
        let support = ellipse_support(&ellipse, &points);
        if support >= config.outline_min_support {
            arches.push(Arch { ellipse, support });
        }
    }

    (quads, arches)
}

/// Fraction of the polygon outline that runs over edge pixels.
fn polygon_support(edges: &EdgeMap, polygon: &[(f32, f32)]) -> f32 {
    let (mut hits, mut samples) = (0usize, 0usize);
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[(i + 1) % polygon.len()]);
        let steps = (b.0 - a.0).hypot(b.1 - a.1).ceil().max(1.0) as usize;
        for step in 0..steps {
            let t = step as f32 / steps as f32;
            let x = (a.0 + (b.0 - a.0) * t).round() as isize;
            let y = (a.1 + (b.1 - a.1) * t).round() as isize;
            samples += 1;
            if edges.get_signed(x, y) {
                hits += 1;
            }
        }
    }
    if samples == 0 {
        0.0
    } else {
        hits as f32 / samples as f32
    }
}

/// Normalised elliptical radius of `(x, y)`: 1.0 on the outline.
pub fn ellipse_radius(ellipse: &EllipseFit, x: f32, y: f32) -> f32 {
    let (dx, dy) = (x - ellipse.cx, y - ellipse.cy);
    let (cos, sin) = (ellipse.angle.cos(), ellipse.angle.sin());
    let u = (dx * cos + dy * sin) / ellipse.semi_major.max(f32::EPSILON);
    let v = (-dx * sin + dy * cos) / ellipse.semi_minor.max(f32::EPSILON);
    u.hypot(v)
}

fn ellipse_support(ellipse: &EllipseFit, points: &[(f32, f32)]) -> f32 {
    if points.is_empty() {
        return 0.0;
    }
    let near = points
        .iter()
        .filter(|&&(x, y)| (ellipse_radius(ellipse, x, y) - 1.0).abs() <= 0.2)
        .count();
    near as f32 / points.len() as f32
}

/// Generic shape list: up to `max_per_kind` of each kind, largest first.
pub fn primitives(candidates: &Candidates, frame: Frame, config: &ShapeConfig) -> Vec<ShapePrimitive> {
    let min_dim = frame.min_dimension();

    let circles = candidates.circles.iter().map(|c| ShapePrimitive {
        shape: Shape::Circle {
            center: frame.point(c.cx, c.cy),
            radius: clamp_unit(c.radius / min_dim),
        },
        confidence: clamp_unit(c.support),
        area: clamp_unit(PI * c.radius * c.radius / frame.area()),
    });
    let lines = candidates.segments.iter().map(|s| {
        let line = frame.segment(s);
        ShapePrimitive {
            shape: Shape::Line {
                start: line.start,
                end: line.end,
            },
            confidence: clamp_unit(s.length() / min_dim),
            area: 0.0,
        }
    });
    let rectangles = candidates.quads.iter().map(|q| ShapePrimitive {
        shape: Shape::Rectangle {
            center: frame.point(q.cx, q.cy),
            width: clamp_unit(q.width / frame.width),
            height: clamp_unit(q.height / frame.height),
        },
        confidence: clamp_unit(q.support),
        area: clamp_unit(q.area / frame.area()),
    });

    let mut shapes = Vec::new();
    for mut group in [
        circles.collect::<Vec<_>>(),
        lines.collect(),
        rectangles.collect(),
    ] {
        group.sort_by(|a, b| b.size().total_cmp(&a.size()));
        group.truncate(config.max_per_kind);
        shapes.extend(group);
    }
    shapes
}
