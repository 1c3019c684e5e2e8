use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Top-level configuration for the analysis engine.
///
/// Every threshold, weight and empirical scale the extractors, matchers and
/// planner use lives here with its default. The engine reads no global
/// state, so two engines with equal configs produce equal output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ingest: IngestConfig,
    pub edges: EdgeConfig,
    pub motion: MotionConfig,
    pub shapes: ShapeConfig,
    pub portals: PortalConfig,
    pub color: ColorConfig,
    pub complexity: ComplexityConfig,
    pub match_cut: MatchCutConfig,
    pub portal_match: PortalMatchConfig,
    pub color_flow: ColorFlowConfig,
    pub selector: SelectorConfig,
    pub pacing: PacingConfig,
    pub workers: WorkerConfig,
}

impl EngineConfig {
    /// Parses a (possibly partial) JSON document. Missing sections and fields
    /// fall back to their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Rejects values that would make the scoring formulas meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.max_dimension < 16 {
            return Err(EngineError::config("ingest.max_dimension must be at least 16"));
        }
        if !(self.edges.low_threshold > 0.0 && self.edges.low_threshold <= self.edges.high_threshold)
        {
            return Err(EngineError::config(
                "edges.low_threshold must be positive and not exceed edges.high_threshold",
            ));
        }
        if !(self.shapes.min_radius_fraction > 0.0
            && self.shapes.min_radius_fraction < self.shapes.max_radius_fraction)
        {
            return Err(EngineError::config(
                "shapes radius bounds must satisfy 0 < min < max",
            ));
        }
        if self.color.palette_size == 0 {
            return Err(EngineError::config("color.palette_size must be at least 1"));
        }
        if self.match_cut.window == 0 {
            return Err(EngineError::config("match_cut.window must be at least 1"));
        }
        if !(self.pacing.base_hold.is_finite() && self.pacing.base_hold > 0.0) {
            return Err(EngineError::config("pacing.base_hold must be a positive number"));
        }
        for (name, value) in [
            ("match_cut.motion_threshold", self.match_cut.motion_threshold),
            ("match_cut.shape_threshold", self.match_cut.shape_threshold),
            ("match_cut.scan_threshold", self.match_cut.scan_threshold),
            ("portal_match.min_score", self.portal_match.min_score),
            ("color_flow.lut_threshold", self.color_flow.lut_threshold),
            ("selector.min_confidence", self.selector.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::config(format!("{name} must lie in [0, 1]")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Longest side, in pixels, a shot is analysed at.
    pub max_dimension: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { max_dimension: 512 }
    }
}

/// Canny-style edge detection. Thresholds are in units of the normalised
/// Sobel response of a [0, 1] grayscale view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub blur_sigma: f32,
    /// Hysteresis bounds on the normalised Sobel magnitude of the blurred
    /// plane. A step of gray contrast `d` peaks near `0.57 * d` at the
    /// default sigma, so the high bound admits steps of about 0.18.
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.4,
            low_threshold: 0.04,
            high_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Linear rescale of the mean gradient magnitude into the speed proxy.
    pub speed_scale: f32,
    pub min_lines_for_high_confidence: usize,
    pub high_confidence: f32,
    pub moderate_confidence: f32,
    /// Half-width, in degrees, of each cardinal direction bucket.
    pub cardinal_tolerance_degrees: f32,
    pub harris_k: f32,
    /// Keypoints must exceed this fraction of the strongest corner response.
    pub keypoint_relative_threshold: f32,
    pub max_keypoints: usize,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed_scale: 10.0,
            min_lines_for_high_confidence: 5,
            high_confidence: 0.8,
            moderate_confidence: 0.5,
            cardinal_tolerance_degrees: 22.5,
            harris_k: 0.04,
            keypoint_relative_threshold: 0.01,
            max_keypoints: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// Circle radius bounds as fractions of the shorter image side.
    pub min_radius_fraction: f32,
    pub max_radius_fraction: f32,
    /// Minimum accumulator votes as a fraction of the smallest circumference.
    pub circle_vote_fraction: f32,
    /// Fraction of the circumference that must be backed by edge pixels.
    pub circle_min_support: f32,
    pub circle_min_distance_fraction: f32,
    pub max_circle_candidates: usize,
    /// Minimum Hough votes for a line as a fraction of the shorter side.
    pub line_vote_fraction: f32,
    pub line_min_length_fraction: f32,
    pub line_max_gap: usize,
    pub max_line_peaks: usize,
    pub rect_min_area: f32,
    pub rect_max_area: f32,
    pub rect_min_aspect: f32,
    pub rect_max_aspect: f32,
    /// Polygon approximation tolerance as a fraction of the contour perimeter.
    pub polygon_epsilon_fraction: f32,
    /// Share of a rectangle or arch outline that must lie on edge pixels.
    pub outline_min_support: f32,
    pub min_contour_pixels: usize,
    pub arch_min_aspect: f32,
    pub arch_max_tilt_degrees: f32,
    pub arch_min_area: f32,
    pub max_per_kind: usize,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            min_radius_fraction: 0.05,
            max_radius_fraction: 0.4,
            circle_vote_fraction: 0.35,
            circle_min_support: 0.5,
            circle_min_distance_fraction: 0.1,
            max_circle_candidates: 20,
            line_vote_fraction: 0.15,
            line_min_length_fraction: 0.1,
            line_max_gap: 5,
            max_line_peaks: 40,
            rect_min_area: 0.05,
            rect_max_area: 0.5,
            rect_min_aspect: 0.3,
            rect_max_aspect: 3.0,
            polygon_epsilon_fraction: 0.02,
            outline_min_support: 0.6,
            min_contour_pixels: 20,
            arch_min_aspect: 1.3,
            arch_max_tilt_degrees: 20.0,
            arch_min_area: 0.02,
            max_per_kind: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub darkness_threshold: f32,
    pub edge_threshold: f32,
    pub edge_strength_scale: f32,
    /// Frame share a portal scores best at.
    pub preferred_area: f32,
    pub max_portals: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            darkness_threshold: 0.3,
            edge_threshold: 0.5,
            edge_strength_scale: 2.0,
            preferred_area: 0.25,
            max_portals: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub palette_size: usize,
    /// Seed for the dominant-color clustering.
    pub seed: u64,
    pub max_iterations: usize,
    pub sample_limit: usize,
    /// Hue ranges in degrees, `[start, end)`.
    pub warm_hues: Vec<[f32; 2]>,
    pub cool_hues: Vec<[f32; 2]>,
    pub min_saturation: f32,
    pub min_value: f32,
    /// Pixels with value below this count as shadow.
    pub shadow_threshold: f32,
    /// Blur sigma for the lighting estimate, as a fraction of the shorter side.
    pub lighting_blur_fraction: f32,
    pub lighting_intensity_scale: f32,
    pub directional_threshold: f32,
    pub ambient_threshold: f32,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            palette_size: 5,
            seed: 0x5EED_C010,
            max_iterations: 20,
            sample_limit: 4096,
            warm_hues: vec![[0.0, 70.0], [300.0, 360.0]],
            cool_hues: vec![[160.0, 270.0]],
            min_saturation: 0.15,
            min_value: 0.1,
            shadow_threshold: 0.15,
            lighting_blur_fraction: 0.05,
            lighting_intensity_scale: 5.0,
            directional_threshold: 0.5,
            ambient_threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityConfig {
    pub movement_scale: f32,
    pub sharpness_scale: f32,
    pub texture_max_dimension: usize,
    /// Radius of the low-frequency disk as a fraction of the shorter side.
    pub low_frequency_radius_fraction: f32,
    pub element_cap: usize,
    pub min_component_pixels: usize,
    pub edge_histogram_bins: usize,
    pub weights: ComplexityWeights,
    pub energy_weights: EnergyWeights,
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            movement_scale: 3.0,
            sharpness_scale: 10.0,
            texture_max_dimension: 128,
            low_frequency_radius_fraction: 0.25,
            element_cap: 20,
            min_component_pixels: 8,
            edge_histogram_bins: 16,
            weights: ComplexityWeights::default(),
            energy_weights: EnergyWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityWeights {
    pub edge_density: f32,
    pub color_variance: f32,
    pub texture: f32,
    pub elements: f32,
    pub movement: f32,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            edge_density: 0.25,
            color_variance: 0.2,
            texture: 0.25,
            elements: 0.15,
            movement: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyWeights {
    pub visual: f32,
    pub brightness: f32,
    pub color: f32,
    pub motion: f32,
    pub emotional: f32,
}

impl Default for EnergyWeights {
    fn default() -> Self {
        Self {
            visual: 0.25,
            brightness: 0.2,
            color: 0.2,
            motion: 0.2,
            emotional: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchCutConfig {
    pub motion_threshold: f32,
    pub shape_threshold: f32,
    /// How many shots ahead the sequence scan looks.
    pub window: usize,
    /// Longest line segments per shot that take part in motion matching.
    pub max_lines_per_shot: usize,
    pub tie_epsilon: f32,
    /// Minimum confidence for the match-cut scan run by `analyze_sequence`.
    pub scan_threshold: f32,
}

impl Default for MatchCutConfig {
    fn default() -> Self {
        Self {
            motion_threshold: 0.7,
            shape_threshold: 0.8,
            window: 4,
            max_lines_per_shot: 12,
            tie_epsilon: 1e-3,
            scan_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalMatchConfig {
    pub min_score: f32,
    pub cross_fade_alignment: f32,
    pub mask_width: u32,
    pub mask_height: u32,
    /// Feather sigma as a fraction of the shorter mask side.
    pub feather_fraction: f32,
}

impl Default for PortalMatchConfig {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            cross_fade_alignment: 0.8,
            mask_width: 320,
            mask_height: 180,
            feather_fraction: 0.03,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorFlowConfig {
    /// Below this compatibility a grading LUT is emitted.
    pub lut_threshold: f32,
    pub lut_size: usize,
    pub temperature_shift: f32,
    pub brightness_shift: f32,
    pub saturation_shift: f32,
    pub gentle_lighting: f32,
    pub abrupt_lighting: f32,
    pub mask_width: u32,
    pub mask_height: u32,
}

impl Default for ColorFlowConfig {
    fn default() -> Self {
        Self {
            lut_threshold: 0.7,
            lut_size: 256,
            temperature_shift: 0.3,
            brightness_shift: 0.3,
            saturation_shift: 0.3,
            gentle_lighting: 0.15,
            abrupt_lighting: 0.35,
            mask_width: 320,
            mask_height: 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Candidates below this confidence are dropped.
    pub min_confidence: f32,
    pub match_cut_duration: f32,
    pub portal_duration: f32,
    pub gradient_duration: f32,
    pub cross_fade_duration: f32,
    /// How strongly the pair's mean energy shortens a transition.
    pub energy_duration_gain: f32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.35,
            match_cut_duration: 0.0,
            portal_duration: 1.2,
            gradient_duration: 0.8,
            cross_fade_duration: 0.6,
            energy_duration_gain: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub base_hold: f32,
    pub complexity_gain: f32,
    pub energy_damping: f32,
    /// Rhythm smoothing only applies from this many shots on.
    pub smoothing_min_shots: usize,
    /// Maximum relative nudge applied while matching music energy.
    pub music_nudge: f32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_hold: 2.0,
            complexity_gain: 1.5,
            energy_damping: 0.3,
            smoothing_min_shots: 4,
            music_nudge: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker threads for batch extraction and matching. 0 uses every core.
    pub threads: usize,
}
