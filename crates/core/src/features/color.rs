//! Color and lighting analysis.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::geometry::clamp_unit;
use crate::{
    config::ColorConfig,
    ingest::Shot,
    vision::{
        filters::{gaussian_blur, sobel},
        kmeans::kmeans,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_unit(rgb: [f32; 3]) -> Self {
        let [r, g, b] = rgb.map(|c| (clamp_unit(c) * 255.0).round() as u8);
        Self { r, g, b }
    }

    pub fn to_unit(self) -> [f32; 3] {
        [self.r, self.g, self.b].map(|c| c as f32 / 255.0)
    }

    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Euclidean distance in unit RGB, scaled into `[0, 1]`.
    pub fn distance(&self, other: &RgbColor) -> f32 {
        let (a, b) = (self.to_unit(), other.to_unit());
        let d = (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2);
        clamp_unit(d.sqrt() / 3.0_f32.sqrt())
    }

    pub fn mix(&self, other: &RgbColor, t: f32) -> RgbColor {
        let (a, b) = (self.to_unit(), other.to_unit());
        RgbColor::from_unit([0, 1, 2].map(|i| a[i] + (b[i] - a[i]) * t))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaletteColor {
    pub color: RgbColor,
    pub share: f32,
}

/// Dominant colors, largest share first. Shares sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorPalette {
    pub colors: Vec<PaletteColor>,
    pub brightness: f32,
    pub saturation: f32,
    /// 0 is cool, 1 is warm, 0.5 when neither dominates.
    pub temperature: f32,
}

impl ColorPalette {
    pub fn dominant(&self) -> Option<&PaletteColor> {
        self.colors.first()
    }

    /// Share-weighted mean of the palette.
    pub fn mean_color(&self) -> RgbColor {
        let mut sum = [0.0_f32; 3];
        for entry in &self.colors {
            let rgb = entry.color.to_unit();
            for c in 0..3 {
                sum[c] += rgb[c] * entry.share;
            }
        }
        RgbColor::from_unit(sum)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingType {
    Directional,
    Ambient,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingInfo {
    /// Unit vector towards the brighter side, `[0, 0]` without a gradient.
    pub direction: [f32; 2],
    pub intensity: f32,
    #[serde(rename = "type")]
    pub kind: LightingType,
    pub shadow_density: f32,
}

/// Per-channel RGB mean and standard deviation in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: [f32; 3],
    pub std_dev: [f32; 3],
}

/// Mean color of each cell of a coarse grid, row major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorLayout {
    pub columns: u32,
    pub rows: u32,
    pub cells: Vec<RgbColor>,
}

impl ColorLayout {
    pub const GRID: u32 = 4;

    /// Normalised centre of cell `index`.
    pub fn cell_center(&self, index: usize) -> (f32, f32) {
        let columns = self.columns.max(1) as usize;
        let (col, row) = (index % columns, index / columns);
        (
            (col as f32 + 0.5) / self.columns.max(1) as f32,
            (row as f32 + 0.5) / self.rows.max(1) as f32,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorAnalysis {
    pub palette: ColorPalette,
    pub lighting: LightingInfo,
    pub channel_stats: ChannelStats,
    pub layout: ColorLayout,
}

pub fn analyze(shot: &Shot, config: &ColorConfig) -> ColorAnalysis {
    ColorAnalysis {
        palette: palette(shot, config),
        lighting: lighting(shot, config),
        channel_stats: channel_stats(shot.rgb()),
        layout: layout(shot.rgb(), ColorLayout::GRID),
    }
}

fn in_ranges(hue: f32, ranges: &[[f32; 2]]) -> bool {
    ranges.iter().any(|[start, end]| hue >= *start && hue < *end)
}

fn palette(shot: &Shot, config: &ColorConfig) -> ColorPalette {
    let rgb = shot.rgb();
    let total = (rgb.width() * rgb.height()) as usize;
    let stride = total.div_ceil(config.sample_limit.max(1)).max(1);
    let samples: Vec<[f32; 3]> = rgb
        .pixels()
        .step_by(stride)
        .map(|p| p.0.map(|c| c as f32 / 255.0))
        .collect();

    let clusters = kmeans(&samples, config.palette_size, config.max_iterations, config.seed);
    let assigned: usize = clusters.iter().map(|c| c.count).sum();
    let colors = clusters
        .iter()
        .map(|cluster| PaletteColor {
            color: RgbColor::from_unit(cluster.centroid),
            share: if assigned == 0 {
                0.0
            } else {
                cluster.count as f32 / assigned as f32
            },
        })
        .collect();

    let hsv = shot.hsv();
    let (mut warm, mut cool) = (0usize, 0usize);
    for ((hue, saturation), value) in hsv
        .hue
        .data()
        .iter()
        .zip(hsv.saturation.data())
        .zip(hsv.value.data())
    {
        if *saturation < config.min_saturation || *value < config.min_value {
            continue;
        }
        if in_ranges(*hue, &config.warm_hues) {
            warm += 1;
        } else if in_ranges(*hue, &config.cool_hues) {
            cool += 1;
        }
    }
    let temperature = if warm + cool == 0 {
        0.5
    } else {
        warm as f32 / (warm + cool) as f32
    };

    ColorPalette {
        colors,
        brightness: clamp_unit(hsv.value.mean()),
        saturation: clamp_unit(hsv.saturation.mean()),
        temperature,
    }
}

fn lighting(shot: &Shot, config: &ColorConfig) -> LightingInfo {
    let sigma = config.lighting_blur_fraction * shot.min_dimension() as f32;
    let gradients = sobel(&gaussian_blur(shot.gray(), sigma));
    let (gx, gy) = (gradients.gx.mean(), gradients.gy.mean());
    let norm = gx.hypot(gy);
    let direction = if norm > 1e-6 {
        [gx / norm, gy / norm]
    } else {
        [0.0, 0.0]
    };

    let intensity = clamp_unit(gradients.mean_magnitude() * config.lighting_intensity_scale);
    let kind = if intensity > config.directional_threshold {
        LightingType::Directional
    } else if intensity < config.ambient_threshold {
        LightingType::Ambient
    } else {
        LightingType::Mixed
    };

    let value = &shot.hsv().value;
    let shadows = value
        .data()
        .iter()
        .filter(|v| **v < config.shadow_threshold)
        .count();

    LightingInfo {
        direction,
        intensity,
        kind,
        shadow_density: if value.is_empty() {
            0.0
        } else {
            shadows as f32 / value.len() as f32
        },
    }
}

fn channel_stats(rgb: &RgbImage) -> ChannelStats {
    let n = (rgb.width() * rgb.height()).max(1) as f64;
    let (mut sum, mut sum_sq) = ([0.0_f64; 3], [0.0_f64; 3]);
    for pixel in rgb.pixels() {
        for c in 0..3 {
            let v = pixel.0[c] as f64 / 255.0;
            sum[c] += v;
            sum_sq[c] += v * v;
        }
    }
    let mean = [0, 1, 2].map(|c| sum[c] / n);
    let std_dev = [0, 1, 2].map(|c| (sum_sq[c] / n - mean[c] * mean[c]).max(0.0).sqrt());
    ChannelStats {
        mean: mean.map(|v| v as f32),
        std_dev: std_dev.map(|v| v as f32),
    }
}

fn layout(rgb: &RgbImage, grid: u32) -> ColorLayout {
    let (width, height) = rgb.dimensions();
    let mut cells = Vec::with_capacity((grid * grid) as usize);
    for row in 0..grid {
        for col in 0..grid {
            let (x0, x1) = (col * width / grid, ((col + 1) * width / grid).max(col * width / grid + 1));
            let (y0, y1) = (row * height / grid, ((row + 1) * height / grid).max(row * height / grid + 1));
            let mut sum = [0.0_f32; 3];
            let mut count = 0usize;
            for y in y0..y1.min(height) {
                for x in x0..x1.min(width) {
                    let p = rgb.get_pixel(x, y).0;
                    for c in 0..3 {
                        sum[c] += p[c] as f32 / 255.0;
                    }
                    count += 1;
                }
            }
            cells.push(RgbColor::from_unit(sum.map(|v| v / count.max(1) as f32)));
        }
    }
    ColorLayout {
        columns: grid,
        rows: grid,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::IngestConfig, ingest::ShotId};
    use image::Rgb;

    fn shot(rgb: RgbImage) -> Shot {
        Shot::from_rgb(ShotId::new("test"), rgb, &IngestConfig::default()).unwrap()
    }

    fn split(left: [u8; 3], right: [u8; 3]) -> Shot {
        shot(RgbImage::from_fn(64, 48, |x, _| {
            if x < 48 {
                Rgb(left)
            } else {
                Rgb(right)
            }
        }))
    }

    #[test]
    fn palette_shares_sum_to_one() {
        let analysis = analyze(&split([220, 40, 30], [20, 60, 200]), &ColorConfig::default());
        let total: f32 = analysis.palette.colors.iter().map(|c| c.share).sum();
        assert!((total - 1.0).abs() < 1e-3);
        assert_eq!(analysis.palette.colors.len(), 2);
        let dominant = analysis.palette.dominant().unwrap();
        assert_eq!(dominant.color, RgbColor::new(220, 40, 30));
        assert!((dominant.share - 0.75).abs() < 0.02);
    }

    #[test]
    fn temperature_tracks_warm_and_cool_hues() {
        let config = ColorConfig::default();
        let warm = analyze(&split([230, 120, 20], [230, 120, 20]), &config);
        let cool = analyze(&split([20, 90, 220], [20, 90, 220]), &config);
        let gray = analyze(&split([128, 128, 128], [128, 128, 128]), &config);
        assert_eq!(warm.palette.temperature, 1.0);
        assert_eq!(cool.palette.temperature, 0.0);
        assert_eq!(gray.palette.temperature, 0.5);
    }

    #[test]
    fn lighting_points_towards_the_bright_side() {
        let ramp = shot(RgbImage::from_fn(80, 60, |x, _| {
            let v = (x * 255 / 79) as u8;
            Rgb([v, v, v])
        }));
        let lighting = analyze(&ramp, &ColorConfig::default()).lighting;
        assert!(lighting.direction[0] > 0.99);
        assert!(lighting.shadow_density > 0.0 && lighting.shadow_density < 0.3);
    }

    #[test]
    fn uniform_frames_have_ambient_light_and_no_variance() {
        let analysis = analyze(&split([90, 90, 90], [90, 90, 90]), &ColorConfig::default());
        assert_eq!(analysis.lighting.kind, LightingType::Ambient);
        assert_eq!(analysis.lighting.direction, [0.0, 0.0]);
        assert!(analysis.channel_stats.std_dev.iter().all(|s| *s < 1e-4));
        assert_eq!(analysis.layout.cells.len(), 16);
    }

    #[test]
    fn layout_cells_follow_the_image() {
        let analysis = analyze(&split([255, 0, 0], [0, 0, 255]), &ColorConfig::default());
        assert_eq!(analysis.layout.cells[0], RgbColor::new(255, 0, 0));
        assert_eq!(analysis.layout.cells[3], RgbColor::new(0, 0, 255));
        assert_eq!(analysis.layout.cell_center(5), (0.375, 0.375));
    }
}
