use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use super::{color::ChannelStats, geometry::clamp_unit};
use crate::{
    config::{ColorConfig, ComplexityConfig, ComplexityWeights, EnergyWeights},
    ingest::Shot,
    vision::{
        contours::connected_components, filters::laplacian_mean_abs, EdgeMap, Gradients,
        SpectrumAnalyzer,
    },
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualComplexity {
    pub edge_density: f32,
    pub color_variance: f32,
    /// High-frequency share of the 2D spectrum.
    pub texture_complexity: f32,
    pub element_count: u32,
    pub movement_potential: f32,
    pub overall_score: f32,
}

impl VisualComplexity {
    pub fn new(
        edge_density: f32,
        color_variance: f32,
        texture_complexity: f32,
        element_count: u32,
        movement_potential: f32,
        element_cap: u32,
        weights: &ComplexityWeights,
    ) -> Self {
        let element_count = element_count.min(element_cap);
        let elements = if element_cap == 0 {
            0.0
        } else {
            element_count as f32 / element_cap as f32
        };
        let overall_score = clamp_unit(
            weights.edge_density * edge_density
                + weights.color_variance * color_variance
                + weights.texture * texture_complexity
                + weights.elements * elements
                + weights.movement * movement_potential,
        );
        Self {
            edge_density: clamp_unit(edge_density),
            color_variance: clamp_unit(color_variance),
            texture_complexity: clamp_unit(texture_complexity),
            element_count,
            movement_potential: clamp_unit(movement_potential),
            overall_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyProfile {
    pub visual: f32,
    pub brightness: f32,
    pub color: f32,
    pub motion: f32,
    pub emotional: f32,
    pub total_energy: f32,
}

impl EnergyProfile {
    pub fn new(visual: f32, brightness: f32, color: f32, motion: f32, emotional: f32, weights: &EnergyWeights) -> Self {
        let [visual, brightness, color, motion, emotional] =
            [visual, brightness, color, motion, emotional].map(clamp_unit);
        Self {
            visual,
            brightness,
            color,
            motion,
            emotional,
            total_energy: clamp_unit(
                weights.visual * visual
                    + weights.brightness * brightness
                    + weights.color * color
                    + weights.motion * motion
                    + weights.emotional * emotional,
            ),
        }
    }
}

/// `gradients` belong to the unblurred grayscale view.
pub fn measure(
    shot: &Shot,
    edges: &EdgeMap,
    gradients: &Gradients,
    channels: &ChannelStats,
    config: &ComplexityConfig,
) -> Result<VisualComplexity> {
    let color_variance = channels.std_dev.iter().sum::<f32>() / 3.0 / 0.5;

    let small = shot.gray().downsample(config.texture_max_dimension);
    let texture = SpectrumAnalyzer::new().high_frequency_ratio(&small, config.low_frequency_radius_fraction)?;

    let elements = connected_components(edges, config.min_component_pixels).len();

    Ok(VisualComplexity::new(
        edges.density(),
        color_variance,
        texture,
        elements.min(u32::MAX as usize) as u32,
        gradients.mean_magnitude() * config.movement_scale,
        config.element_cap as u32,
        &config.weights,
    ))
}

/// Arousal weight per 60 degree hue bucket, starting at red.
const HUE_AROUSAL: [f32; 6] = [1.0, 0.8, 0.4, 0.3, 0.35, 0.7];

pub fn energy(shot: &Shot, color: &ColorConfig, config: &ComplexityConfig) -> EnergyProfile {
    let hsv = shot.hsv();
    let saturation = hsv.saturation.mean();

    let mut buckets = [0.0_f32; 6];
    for ((hue, s), v) in hsv
        .hue
        .data()
        .iter()
        .zip(hsv.saturation.data())
        .zip(hsv.value.data())
    {
        if *s < color.min_saturation || *v < color.min_value {
            continue;
        }
        // Buckets are centred on red, yellow, green, cyan, blue, magenta.
        let bucket = (((hue + 30.0).rem_euclid(360.0)) / 60.0) as usize % 6;
        buckets[bucket] += s;
    }
    let weight: f32 = buckets.iter().sum();
    let emotional = if weight <= f32::EPSILON {
        0.0
    } else {
        let arousal = buckets
            .iter()
            .zip(HUE_AROUSAL)
            .map(|(w, a)| w * a)
            .sum::<f32>()
            / weight;
        arousal * (2.0 * saturation).min(1.0)
    };

    EnergyProfile::new(
        hsv.value.std_dev() * 2.0,
        hsv.value.mean(),
        saturation,
        laplacian_mean_abs(shot.gray()) * config.sharpness_scale,
        emotional,
        &config.energy_weights,
    )
}

/// Magnitude-weighted histogram of edge orientations over `[0, PI)`,
/// normalised to sum to one. All zeros without edges.
pub fn edge_orientation_histogram(edges: &EdgeMap, gradients: &Gradients, bins: usize) -> Vec<f32> {
    let bins = bins.max(1);
    let mut histogram = vec![0.0_f32; bins];
    for (x, y) in edges.iter_edges() {
        let angle = gradients.orientation(x, y).rem_euclid(PI);
        let bin = ((angle / PI * bins as f32) as usize).min(bins - 1);
        histogram[bin] += gradients.magnitude.get(x, y);
    }
    let total: f32 = histogram.iter().sum();
    if total > f32::EPSILON {
        for value in &mut histogram {
            *value /= total;
        }
    }
    histogram
}

/// Pearson correlation of two histograms, clamped into `[0, 1]`.
pub fn histogram_correlation(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let mean_a = a.iter().sum::<f32>() / n as f32;
    let mean_b = b.iter().sum::<f32>() / n as f32;
    let (mut cov, mut var_a, mut var_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    let denom = (var_a * var_b).sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    clamp_unit(cov / denom)
}
