//! Contour-level geometry: connected edge components, their convex outline,
//! polygon approximation and a moment-based ellipse fit.

use super::filters::EdgeMap;

/// 8-connected group of edge pixels.
#[derive(Debug, Clone)]
pub struct Component {
    pub pixels: Vec<(usize, usize)>,
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl Component {
    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    pub fn points(&self) -> Vec<(f32, f32)> {
        self.pixels
            .iter()
            .map(|&(x, y)| (x as f32, y as f32))
            .collect()
    }
}

/// Groups edge pixels into 8-connected components of at least `min_pixels`.
pub fn connected_components(edges: &EdgeMap, min_pixels: usize) -> Vec<Component> {
    let (width, height) = (edges.width(), edges.height());
    let mut visited = vec![false; width * height];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for (sx, sy) in edges.iter_edges() {
        if visited[sy * width + sx] {
            continue;
        }
        visited[sy * width + sx] = true;
        stack.push((sx, sy));
        let mut component = Component {
            pixels: Vec::new(),
            min_x: sx,
            min_y: sy,
            max_x: sx,
            max_y: sy,
        };

        while let Some((x, y)) = stack.pop() {
            component.pixels.push((x, y));
            component.min_x = component.min_x.min(x);
            component.min_y = component.min_y.min(y);
            component.max_x = component.max_x.max(x);
            component.max_y = component.max_y.max(y);
            for dy in -1..=1_isize {
                for dx in -1..=1_isize {
                    let (nx, ny) = (x as isize + dx, y as isize + dy);
                    if !edges.get_signed(nx, ny) {
                        continue;
                    }
                    let index = ny as usize * width + nx as usize;
                    if !visited[index] {
                        visited[index] = true;
                        stack.push((nx as usize, ny as usize));
                    }
                }
            }
        }

        if component.pixels.len() >= min_pixels {
            components.push(component);
        }
    }

    components
}

fn cross(o: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Convex hull by the monotone chain method, counter-clockwise, without the
/// closing point.
pub fn convex_hull(points: &[(f32, f32)]) -> Vec<(f32, f32)> {
    let mut sorted: Vec<(f32, f32)> = points.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    let mut hull: Vec<(f32, f32)> = Vec::with_capacity(sorted.len() * 2);
    for &point in &sorted {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], point) <= 0.0 {
            hull.pop();
        }
        hull.push(point);
    }
    let lower_len = hull.len() + 1;
    for &point in sorted.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], point) <= 0.0
        {
            hull.pop();
        }
        hull.push(point);
    }
    hull.pop();
    hull
}

pub fn polygon_area(polygon: &[(f32, f32)]) -> f32 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[(i + 1) % polygon.len()]);
        twice += a.0 * b.1 - b.0 * a.1;
    }
    (twice * 0.5).abs()
}

/// Perimeter of a closed polygon.
pub fn polygon_perimeter(polygon: &[(f32, f32)]) -> f32 {
    if polygon.len() < 2 {
        return 0.0;
    }
    (0..polygon.len())
        .map(|i| {
            let (a, b) = (polygon[i], polygon[(i + 1) % polygon.len()]);
            (b.0 - a.0).hypot(b.1 - a.1)
        })
        .sum()
}

fn point_line_distance(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let length = (b.0 - a.0).hypot(b.1 - a.1);
    if length <= f32::EPSILON {
        return (p.0 - a.0).hypot(p.1 - a.1);
    }
    cross(a, b, p).abs() / length
}

fn simplify_open(points: &[(f32, f32)], epsilon: f32, keep: &mut [bool]) {
    let mut stack = vec![(0usize, points.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (mut farthest, mut distance) = (start, 0.0_f32);
        for i in start + 1..end {
            let d = point_line_distance(points[i], points[start], points[end]);
            if d > distance {
                farthest = i;
                distance = d;
            }
        }
        if distance > epsilon {
            keep[farthest] = true;
            stack.push((start, farthest));
            stack.push((farthest, end));
        }
    }
}

/// Douglas-Peucker approximation of a closed contour.
pub fn approx_polygon(contour: &[(f32, f32)], epsilon: f32) -> Vec<(f32, f32)> {
    if contour.len() < 3 {
        return contour.to_vec();
    }
    let anchor = contour[0];
    let split = (1..contour.len())
        .max_by(|&a, &b| {
            let da = (contour[a].0 - anchor.0).hypot(contour[a].1 - anchor.1);
            let db = (contour[b].0 - anchor.0).hypot(contour[b].1 - anchor.1);
            da.total_cmp(&db)
        })
        .unwrap_or(contour.len() / 2);

    let mut closed: Vec<(f32, f32)> = contour.to_vec();
    closed.push(anchor);
    let mut keep = vec![false; closed.len()];
    keep[0] = true;
    keep[split] = true;
    simplify_open(&closed[..=split], epsilon, &mut keep[..=split]);
    simplify_open(&closed[split..], epsilon, &mut keep[split..]);

    closed
        .iter()
        .zip(keep.iter())
        .take(contour.len())
        .filter(|(_, kept)| **kept)
        .map(|(point, _)| *point)
        .collect()
}

/// Ellipse described by its centre, semi-axes (major first) and the major
/// axis angle in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipseFit {
    pub cx: f32,
    pub cy: f32,
    pub semi_major: f32,
    pub semi_minor: f32,
    pub angle: f32,
}

/// Fits an ellipse to contour points from their second moments. Returns
/// `None` for fewer than five points or a degenerate (line-like) spread.
pub fn fit_ellipse(points: &[(f32, f32)]) -> Option<EllipseFit> {
    if points.len() < 5 {
        return None;
    }
    let n = points.len() as f32;
    let cx = points.iter().map(|p| p.0).sum::<f32>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f32>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0_f32, 0.0_f32, 0.0_f32);
    for &(x, y) in points {
        sxx += (x - cx) * (x - cx);
        syy += (y - cy) * (y - cy);
        sxy += (x - cx) * (y - cy);
    }
    let (sxx, syy, sxy) = (sxx / n, syy / n, sxy / n);

    let trace = sxx + syy;
    let diff = ((sxx - syy) * (sxx - syy) * 0.25 + sxy * sxy).sqrt();
    let major = trace * 0.5 + diff;
    let minor = trace * 0.5 - diff;
    if !(major.is_finite() && minor.is_finite()) || minor < 0.25 {
        return None;
    }

    // Points spread along an ellipse outline have variance a^2 / 2 per axis.
    Some(EllipseFit {
        cx,
        cy,
        semi_major: (2.0 * major).sqrt(),
        semi_minor: (2.0 * minor).sqrt(),
        angle: 0.5 * (2.0 * sxy).atan2(sxx - syy),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rectangle_outline(x0: usize, y0: usize, x1: usize, y1: usize) -> EdgeMap {
        let mut edges = EdgeMap::empty(80, 80);
        for x in x0..=x1 {
            edges.set(x, y0, true);
            edges.set(x, y1, true);
        }
        for y in y0..=y1 {
            edges.set(x0, y, true);
            edges.set(x1, y, true);
        }
        edges
    }

    #[test]
    fn labels_separate_components() {
        let mut edges = rectangle_outline(5, 5, 20, 20);
        for x in 40..60 {
            edges.set(x, 50, true);
        }
        edges.set(70, 70, true);
        let components = connected_components(&edges, 3);
        assert_eq!(components.len(), 2);
    }

    #[test]
    fn rectangle_outline_simplifies_to_four_corners() {
        let edges = rectangle_outline(10, 20, 60, 50);
        let component = &connected_components(&edges, 1)[0];
        let hull = convex_hull(&component.points());
        let polygon = approx_polygon(&hull, 0.02 * polygon_perimeter(&hull));
        assert_eq!(polygon.len(), 4);
        assert!((polygon_area(&polygon) - 50.0 * 30.0).abs() < 1.0);
    }

    #[test]
    fn circles_do_not_collapse_to_quads() {
        let points: Vec<(f32, f32)> = (0..120)
            .map(|i| {
                let t = i as f32 / 120.0 * std::f32::consts::TAU;
                (50.0 + 30.0 * t.cos(), 50.0 + 30.0 * t.sin())
            })
            .collect();
        let polygon = approx_polygon(&convex_hull(&points), 0.02 * polygon_perimeter(&points));
        assert!(polygon.len() > 4);
    }

    #[test]
    fn fits_wide_ellipse() {
        let points: Vec<(f32, f32)> = (0..200)
            .map(|i| {
                let t = i as f32 / 200.0 * std::f32::consts::TAU;
                (40.0 + 30.0 * t.cos(), 25.0 + 10.0 * t.sin())
            })
            .collect();
        let fit = fit_ellipse(&points).unwrap();
        assert!((fit.semi_major - 30.0).abs() < 1.0);
        assert!((fit.semi_minor - 10.0).abs() < 1.0);
        assert!(fit.angle.abs() < 0.05);
    }

    #[test]
    fn collinear_points_do_not_fit() {
        let points: Vec<(f32, f32)> = (0..10).map(|i| (i as f32, 2.0 * i as f32)).collect();
        assert!(fit_ellipse(&points).is_none());
        assert!(fit_ellipse(&points[..4]).is_none());
    }
}
