//! Hough transforms over an [`EdgeMap`].
//!
//! Lines use a (theta, rho) accumulator whose peaks are traced back along the
//! edge raster into finite segments, splitting wherever the gap between edge
//! hits exceeds `max_gap`. Circles use the gradient method: each edge pixel
//! votes for centres along its gradient, and surviving centres get their
//! radius from a histogram of edge distances.

use std::f32::consts::PI;

use super::filters::{EdgeMap, Gradients};

/// Line segment in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Segment {
    pub fn length(&self) -> f32 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }

    pub fn midpoint(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LineParams {
    pub min_votes: usize,
    pub min_length: f32,
    pub max_gap: usize,
    pub max_peaks: usize,
}

const THETA_BINS: usize = 180;

pub fn detect_segments(edges: &EdgeMap, params: &LineParams) -> Vec<Segment> {
    let (width, height) = (edges.width(), edges.height());
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let diag = ((width * width + height * height) as f32).sqrt().ceil() as usize;
    let rho_bins = 2 * diag + 1;
    let trig: Vec<(f32, f32)> = (0..THETA_BINS)
        .map(|t| {
            let theta = t as f32 * PI / THETA_BINS as f32;
            (theta.cos(), theta.sin())
        })
        .collect();

    let mut accumulator = vec![0u32; THETA_BINS * rho_bins];
    for (x, y) in edges.iter_edges() {
        for (t, (cos, sin)) in trig.iter().enumerate() {
            let rho = (x as f32 * cos + y as f32 * sin).round() as isize + diag as isize;
            accumulator[t * rho_bins + rho as usize] += 1;
        }
    }

    let votes = |t: isize, r: isize| -> u32 {
        if t < 0 || r < 0 || t as usize >= THETA_BINS || r as usize >= rho_bins {
            0
        } else {
            accumulator[t as usize * rho_bins + r as usize]
        }
    };

    let mut peaks: Vec<(u32, usize, usize)> = Vec::new();
    for t in 0..THETA_BINS {
        for r in 0..rho_bins {
            let value = accumulator[t * rho_bins + r];
            if (value as usize) < params.min_votes {
                continue;
            }
            let is_peak = (-2..=2_isize).all(|dt| {
                (-2..=2_isize).all(|dr| {
                    let other = votes(t as isize + dt, r as isize + dr);
                    (dt == 0 && dr == 0) || other < value || (other == value && (dt, dr) > (0, 0))
                })
            });
            if is_peak {
                peaks.push((value, t, r));
            }
        }
    }
    peaks.sort_by(|a, b| b.0.cmp(&a.0));
    peaks.truncate(params.max_peaks);

    let mut consumed = EdgeMap::empty(width, height);
    let mut segments = Vec::new();
    for (_, t, r) in peaks {
        let (cos, sin) = trig[t];
        let rho = r as f32 - diag as f32;
        trace_line(edges, &mut consumed, (cos, sin, rho), diag, params, &mut segments);
    }
    segments
}

fn trace_line(
    edges: &EdgeMap,
    consumed: &mut EdgeMap,
    (cos, sin, rho): (f32, f32, f32),
    diag: usize,
    params: &LineParams,
    out: &mut Vec<Segment>,
) {
    let (ox, oy) = (rho * cos, rho * sin);
    let (dx, dy) = (-sin, cos);
    let mut run: Vec<(usize, usize)> = Vec::new();
    let mut gap = 0usize;

    let flush = |run: &mut Vec<(usize, usize)>, consumed: &mut EdgeMap, out: &mut Vec<Segment>| {
        if let (Some(&first), Some(&last)) = (run.first(), run.last()) {
            let segment = Segment {
                x1: first.0 as f32,
                y1: first.1 as f32,
                x2: last.0 as f32,
                y2: last.1 as f32,
            };
            if segment.length() >= params.min_length {
                for &(x, y) in run.iter() {
                    consumed.set(x, y, true);
                }
                out.push(segment);
            }
        }
        run.clear();
    };

    let reach = diag as isize;
    for step in -reach..=reach {
        let fx = ox + step as f32 * dx;
        let fy = oy + step as f32 * dy;
        let hit = [0.0_f32, 1.0, -1.0].iter().find_map(|offset| {
            let x = (fx + offset * cos).round() as isize;
            let y = (fy + offset * sin).round() as isize;
            (edges.get_signed(x, y) && !consumed.get_signed(x, y)).then_some((x as usize, y as usize))
        });
        match hit {
            Some(point) => {
                run.push(point);
                gap = 0;
            }
            None if !run.is_empty() => {
                gap += 1;
                if gap > params.max_gap {
                    flush(&mut run, consumed, out);
                    gap = 0;
                }
            }
            None => {}
        }
    }
    flush(&mut run, consumed, out);
}

/// Circle in pixel coordinates. `support` is the fraction of the
/// circumference backed by edge pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
    pub support: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct CircleParams {
    pub min_radius: usize,
    pub max_radius: usize,
    pub min_votes: u32,
    pub min_support: f32,
    pub min_distance: f32,
    pub max_candidates: usize,
}

/// Thin digital circles carry roughly this many pixels per unit of arc.
const ARC_PIXEL_DENSITY: f32 = 0.9;

pub fn detect_circles(edges: &EdgeMap, gradients: &Gradients, params: &CircleParams) -> Vec<Circle> {
    let (width, height) = (edges.width(), edges.height());
    if width == 0 || height == 0 || params.min_radius > params.max_radius {
        return Vec::new();
    }

    let edge_points: Vec<(usize, usize)> = edges.iter_edges().collect();
    let mut accumulator = vec![0u32; width * height];
    for &(x, y) in &edge_points {
        let gx = gradients.gx.get(x, y);
        let gy = gradients.gy.get(x, y);
        let norm = gx.hypot(gy);
        if norm <= 1e-6 {
            continue;
        }
        let (ux, uy) = (gx / norm, gy / norm);
        for r in params.min_radius..=params.max_radius {
            for sign in [-1.0_f32, 1.0] {
                let cx = (x as f32 + sign * r as f32 * ux).round() as isize;
                let cy = (y as f32 + sign * r as f32 * uy).round() as isize;
                if cx >= 0 && cy >= 0 && (cx as usize) < width && (cy as usize) < height {
                    accumulator[cy as usize * width + cx as usize] += 1;
                }
            }
        }
    }

    let score = |x: isize, y: isize| -> u32 {
        let mut sum = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height {
                    sum += accumulator[ny as usize * width + nx as usize];
                }
            }
        }
        sum
    };
    let scores: Vec<u32> = (0..width * height)
        .map(|i| score((i % width) as isize, (i / width) as isize))
        .collect();

    let mut centres: Vec<(u32, usize, usize)> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let value = scores[y * width + x];
            if value < params.min_votes {
                continue;
            }
            let is_peak = (-2..=2_isize).all(|dy| {
                (-2..=2_isize).all(|dx| {
                    let (nx, ny) = (x as isize + dx, y as isize + dy);
                    if (dx == 0 && dy == 0)
                        || nx < 0
                        || ny < 0
                        || nx as usize >= width
                        || ny as usize >= height
                    {
                        return true;
                    }
                    let other = scores[ny as usize * width + nx as usize];
                    other < value || (other == value && (dy, dx) > (0, 0))
                })
            });
            if is_peak {
                centres.push((value, x, y));
            }
        }
    }
    centres.sort_by(|a, b| b.0.cmp(&a.0));

    let mut accepted: Vec<(usize, usize)> = Vec::new();
    for &(_, x, y) in &centres {
        if accepted.len() >= params.max_candidates {
            break;
        }
        let far_enough = accepted.iter().all(|&(ax, ay)| {
            (ax as f32 - x as f32).hypot(ay as f32 - y as f32) >= params.min_distance
        });
        if far_enough {
            accepted.push((x, y));
        }
    }

    let mut circles = Vec::new();
    for (cx, cy) in accepted {
        if let Some(circle) = fit_radius(&edge_points, cx as f32, cy as f32, params) {
            circles.push(circle);
        }
    }
    circles
}

fn fit_radius(edge_points: &[(usize, usize)], cx: f32, cy: f32, params: &CircleParams) -> Option<Circle> {
    let mut histogram = vec![0u32; params.max_radius + 3];
    for &(x, y) in edge_points {
        let distance = (x as f32 - cx).hypot(y as f32 - cy).round() as usize;
        if distance < histogram.len() {
            histogram[distance] += 1;
        }
    }

    let mut best: Option<(f32, usize)> = None;
    for r in params.min_radius.max(1)..=params.max_radius {
        let band = histogram[r - 1] + histogram[r] + histogram[r + 1];
        let expected = 2.0 * PI * r as f32 * ARC_PIXEL_DENSITY;
        let ratio = band as f32 / expected;
        if best.map(|(s, _)| ratio > s).unwrap_or(true) {
            best = Some((ratio, r));
        }
    }

    best.filter(|(ratio, _)| *ratio >= params.min_support)
        .map(|(ratio, radius)| Circle {
            cx,
            cy,
            radius: radius as f32,
            support: ratio.min(1.0),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EdgeConfig, ingest::Plane, vision::filters::canny};

    fn disk(size: usize, cx: f32, cy: f32, r: f32) -> Plane {
        Plane::from_fn(size, size, |x, y| {
            if (x as f32 - cx).hypot(y as f32 - cy) <= r {
                0.1
            } else {
                0.9
            }
        })
    }

    #[test]
    fn finds_horizontal_segment() {
        let mut edges = EdgeMap::empty(100, 60);
        for x in 10..90 {
            edges.set(x, 30, true);
        }
        let segments = detect_segments(
            &edges,
            &LineParams {
                min_votes: 20,
                min_length: 20.0,
                max_gap: 3,
                max_peaks: 10,
            },
        );
        assert_eq!(segments.len(), 1);
        let segment = segments[0];
        assert!((segment.y1 - 30.0).abs() <= 1.0 && (segment.y2 - 30.0).abs() <= 1.0);
        assert!(segment.length() >= 75.0);
    }

    #[test]
    fn large_gaps_split_segments() {
        let mut edges = EdgeMap::empty(120, 40);
        for x in (5..45).chain(75..115) {
            edges.set(x, 20, true);
        }
        let segments = detect_segments(
            &edges,
            &LineParams {
                min_votes: 20,
                min_length: 20.0,
                max_gap: 5,
                max_peaks: 10,
            },
        );
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn finds_a_dark_disk() {
        let plane = disk(120, 60.0, 55.0, 30.0);
        let (edges, gradients) = canny(&plane, &EdgeConfig::default());
        let circles = detect_circles(
            &edges,
            &gradients,
            &CircleParams {
                min_radius: 6,
                max_radius: 48,
                min_votes: 20,
                min_support: 0.5,
                min_distance: 12.0,
                max_candidates: 10,
            },
        );
        assert!(!circles.is_empty());
        let best = circles[0];
        assert!((best.cx - 60.0).abs() <= 2.0);
        assert!((best.cy - 55.0).abs() <= 2.0);
        assert!((best.radius - 30.0).abs() <= 2.0);
    }
}
