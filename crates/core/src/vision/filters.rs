use crate::{config::EdgeConfig, ingest::Plane};

/// Sobel responses are divided by this so that a unit step across two
/// pixels yields a magnitude of one.
const SOBEL_NORM: f32 = 4.0;

/// Horizontal and vertical derivatives of a plane plus their magnitude.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub gx: Plane,
    pub gy: Plane,
    pub magnitude: Plane,
}

impl Gradients {
    pub fn mean_magnitude(&self) -> f32 {
        self.magnitude.mean()
    }

    /// Gradient orientation in radians, `(-PI, PI]`.
    pub fn orientation(&self, x: usize, y: usize) -> f32 {
        self.gy.get(x, y).atan2(self.gx.get(x, y))
    }

    /// Strongest magnitude in the 3x3 neighbourhood of `(x, y)`.
    pub fn local_peak(&self, x: isize, y: isize) -> f32 {
        let mut peak = 0.0_f32;
        for dy in -1..=1 {
            for dx in -1..=1 {
                peak = peak.max(self.magnitude.get_clamped(x + dx, y + dy));
            }
        }
        peak
    }
}

/// Binary edge raster.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMap {
    width: usize,
    height: usize,
    edges: Vec<bool>,
}

impl EdgeMap {
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            edges: vec![false; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.edges[y * self.width + x]
    }

    /// Out-of-range coordinates read as "no edge".
    #[inline]
    pub fn get_signed(&self, x: isize, y: isize) -> bool {
        x >= 0
            && y >= 0
            && (x as usize) < self.width
            && (y as usize) < self.height
            && self.get(x as usize, y as usize)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        self.edges[y * self.width + x] = value;
    }

    pub fn count(&self) -> usize {
        self.edges.iter().filter(|edge| **edge).count()
    }

    pub fn density(&self) -> f32 {
        if self.edges.is_empty() {
            0.0
        } else {
            self.count() as f32 / self.edges.len() as f32
        }
    }

    pub fn iter_edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, edge)| **edge)
            .map(move |(index, _)| (index % self.width, index / self.width))
    }

    /// Grows every edge pixel by a square of half-width `radius`.
    pub fn dilate(&self, radius: usize) -> EdgeMap {
        let mut out = EdgeMap::empty(self.width, self.height);
        let r = radius as isize;
        for (x, y) in self.iter_edges() {
            for dy in -r..=r {
                for dx in -r..=r {
                    let (nx, ny) = (x as isize + dx, y as isize + dy);
                    if nx >= 0 && ny >= 0 && (nx as usize) < self.width && (ny as usize) < self.height
                    {
                        out.set(nx as usize, ny as usize, true);
                    }
                }
            }
        }
        out
    }
}

pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil().max(1.0) as isize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-(i * i) as f32 / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for value in &mut kernel {
        *value /= sum;
    }
    kernel
}

/// Separable Gaussian blur with edge replication. A non-positive sigma
/// returns the input unchanged.
pub fn gaussian_blur(plane: &Plane, sigma: f32) -> Plane {
    if sigma <= 0.0 || plane.is_empty() {
        return plane.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;

    let horizontal = Plane::from_fn(plane.width(), plane.height(), |x, y| {
        kernel
            .iter()
            .enumerate()
            .map(|(i, k)| k * plane.get_clamped(x as isize + i as isize - radius, y as isize))
            .sum()
    });
    Plane::from_fn(plane.width(), plane.height(), |x, y| {
        kernel
            .iter()
            .enumerate()
            .map(|(i, k)| k * horizontal.get_clamped(x as isize, y as isize + i as isize - radius))
            .sum()
    })
}

pub fn sobel(plane: &Plane) -> Gradients {
    let (width, height) = (plane.width(), plane.height());
    let mut gx = Plane::new(width, height);
    let mut gy = Plane::new(width, height);
    let mut magnitude = Plane::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let p = |dx: isize, dy: isize| plane.get_clamped(x as isize + dx, y as isize + dy);
            let dx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1) - p(-1, -1) - 2.0 * p(-1, 0) - p(-1, 1))
                / SOBEL_NORM;
            let dy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1) - p(-1, -1) - 2.0 * p(0, -1) - p(1, -1))
                / SOBEL_NORM;
            gx.set(x, y, dx);
            gy.set(x, y, dy);
            magnitude.set(x, y, (dx * dx + dy * dy).sqrt());
        }
    }

    Gradients { gx, gy, magnitude }
}

/// Canny edge detection: blur, Sobel, non-maximum suppression and
/// hysteresis. Returns the edge map with the gradients of the blurred plane.
pub fn canny(gray: &Plane, config: &EdgeConfig) -> (EdgeMap, Gradients) {
    let blurred = gaussian_blur(gray, config.blur_sigma);
    let gradients = sobel(&blurred);
    let (width, height) = (gray.width(), gray.height());

    let mut thin = Plane::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let magnitude = gradients.magnitude.get(x, y);
            if magnitude < config.low_threshold {
                continue;
            }
            let angle = gradients.orientation(x, y).to_degrees().rem_euclid(180.0);
            let (ox, oy): (isize, isize) = if !(22.5..157.5).contains(&angle) {
                (1, 0)
            } else if angle < 67.5 {
                (1, 1)
            } else if angle < 112.5 {
                (0, 1)
            } else {
                (-1, 1)
            };
            let (xi, yi) = (x as isize, y as isize);
            let ahead = gradients.magnitude.get_clamped(xi + ox, yi + oy);
            let behind = gradients.magnitude.get_clamped(xi - ox, yi - oy);
            if magnitude >= ahead && magnitude >= behind {
                thin.set(x, y, magnitude);
            }
        }
    }

    let mut edges = EdgeMap::empty(width, height);
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            if thin.get(x, y) >= config.high_threshold && !edges.get(x, y) {
                edges.set(x, y, true);
                stack.push((x, y));
                while let Some((cx, cy)) = stack.pop() {
                    for dy in -1..=1_isize {
                        for dx in -1..=1_isize {
                            let (nx, ny) = (cx as isize + dx, cy as isize + dy);
                            if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
                                continue;
                            }
                            let (nx, ny) = (nx as usize, ny as usize);
                            if !edges.get(nx, ny) && thin.get(nx, ny) >= config.low_threshold {
                                edges.set(nx, ny, true);
                                stack.push((nx, ny));
                            }
                        }
                    }
                }
            }
        }
    }

    (edges, gradients)
}

/// Mean absolute 4-neighbour Laplacian, a cheap sharpness measure.
pub fn laplacian_mean_abs(plane: &Plane) -> f32 {
    if plane.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0;
    for y in 0..plane.height() {
        for x in 0..plane.width() {
            let (xi, yi) = (x as isize, y as isize);
            let lap = plane.get_clamped(xi - 1, yi)
                + plane.get_clamped(xi + 1, yi)
                + plane.get_clamped(xi, yi - 1)
                + plane.get_clamped(xi, yi + 1)
                - 4.0 * plane.get(x, y);
            sum += lap.abs();
        }
    }
    sum / plane.len() as f32
}

/// Corner keypoint with its Harris response, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub response: f32,
}

/// Harris corners: local maxima of `det(M) - k * trace(M)^2` above a fraction
/// of the strongest response, strongest first.
pub fn harris_keypoints(
    gradients: &Gradients,
    k: f32,
    relative_threshold: f32,
    max_keypoints: usize,
) -> Vec<Keypoint> {
    let (width, height) = (gradients.gx.width(), gradients.gx.height());
    let ixx = Plane::from_fn(width, height, |x, y| gradients.gx.get(x, y).powi(2));
    let iyy = Plane::from_fn(width, height, |x, y| gradients.gy.get(x, y).powi(2));
    let ixy = Plane::from_fn(width, height, |x, y| gradients.gx.get(x, y) * gradients.gy.get(x, y));
    let (sxx, syy, sxy) = (
        gaussian_blur(&ixx, 1.5),
        gaussian_blur(&iyy, 1.5),
        gaussian_blur(&ixy, 1.5),
    );

    let response = Plane::from_fn(width, height, |x, y| {
        let (a, b, c) = (sxx.get(x, y), syy.get(x, y), sxy.get(x, y));
        a * b - c * c - k * (a + b) * (a + b)
    });
    let peak = response.data().iter().copied().fold(0.0_f32, f32::max);
    if peak <= f32::EPSILON {
        return Vec::new();
    }
    let threshold = peak * relative_threshold;

    let mut keypoints = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let value = response.get(x, y);
            if value < threshold {
                continue;
            }
            let is_max = (-1..=1_isize).all(|dy| {
                (-1..=1_isize).all(|dx| {
                    (dx == 0 && dy == 0)
                        || response.get_clamped(x as isize + dx, y as isize + dy) <= value
                })
            });
            if is_max {
                keypoints.push(Keypoint {
                    x: x as f32,
                    y: y as f32,
                    response: value,
                });
            }
        }
    }

    keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
    keypoints.truncate(max_keypoints);
    keypoints
}
