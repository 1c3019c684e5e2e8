//! Turns the matchers' scores for one pair into ranked, typed transition
//! suggestions.

use serde::{Deserialize, Serialize};

use crate::{
    config::{EngineConfig, SelectorConfig},
    features::{geometry::clamp_unit, FeatureBundle, Point, PortalKind},
    ingest::ShotId,
    matching::{
        analyze_pair, BlendCurve, ColorEffect, ColorLut, ColorStop, GradientGeometry, MatchCutType,
        PairMatches, PortalTransitionStyle,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    MatchCut,
    ZoomThrough,
    Spiral,
    CrossFade,
    GradientWipe,
    Dissolve,
}

impl TransitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchCut => "match_cut",
            Self::ZoomThrough => "zoom_through",
            Self::Spiral => "spiral",
            Self::CrossFade => "cross_fade",
            Self::GradientWipe => "gradient_wipe",
            Self::Dissolve => "dissolve",
        }
    }
}

impl From<PortalTransitionStyle> for TransitionType {
    fn from(style: PortalTransitionStyle) -> Self {
        match style {
            PortalTransitionStyle::ZoomThrough => Self::ZoomThrough,
            PortalTransitionStyle::CrossFade => Self::CrossFade,
            PortalTransitionStyle::Spiral => Self::Spiral,
        }
    }
}

/// What the editor needs to render the transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum EffectParameters {
    MatchCut {
        match_type: MatchCutType,
        /// Midpoint of the strongest matched line or shape, when there is one.
        anchor: Option<Point>,
    },
    Portal {
        portal_kind: PortalKind,
        center: Point,
        width: f32,
        height: f32,
        /// Feather sigma as a fraction of the shorter mask side.
        feather: f32,
    },
    Gradient {
        geometry: GradientGeometry,
        curve: BlendCurve,
        reversed: bool,
        stops: Vec<ColorStop>,
        effects: Vec<ColorEffect>,
    },
    Dissolve {
        curve: BlendCurve,
    },
}

/// Sub-scores behind a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub match_cut: f32,
    pub action_continuity: f32,
    pub portal: f32,
    pub color_flow: f32,
    pub mean_energy: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSuggestion {
    pub source: ShotId,
    pub target: ShotId,
    pub transition_type: TransitionType,
    /// Seconds.
    pub duration: f32,
    pub confidence: f32,
    pub parameters: EffectParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Ranked suggestions for one ordered pair of shots.
///
/// An empty `suggestions` list is a valid outcome; `reasons` then says why
/// each candidate fell short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAnalysis {
    pub source: ShotId,
    pub target: ShotId,
    pub suggestions: Vec<TransitionSuggestion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    /// Best score any matcher gave the pair.
    pub compatibility: f32,
    /// Grading LUT from source towards target when their colors clash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_lut: Option<ColorLut>,
}

impl PairAnalysis {
    pub fn best(&self) -> Option<&TransitionSuggestion> {
        self.suggestions.first()
    }
}

/// Scales a base duration by the pair's mean energy: calm pairs get longer
/// transitions, energetic ones shorter.
pub fn transition_duration(base: f32, mean_energy: f32, config: &SelectorConfig) -> f32 {
    (base * (1.0 + config.energy_duration_gain * (0.5 - clamp_unit(mean_energy)))).max(0.0)
}

/// Runs every matcher over `a -> b` and ranks the resulting suggestions.
pub fn select_transitions(a: &FeatureBundle, b: &FeatureBundle, config: &EngineConfig) -> PairAnalysis {
    let matches = analyze_pair(a, b, config);
    rank(a, b, &matches, config)
}

/// Ranks suggestions from already computed matcher output.
pub fn rank(a: &FeatureBundle, b: &FeatureBundle, matches: &PairMatches, config: &EngineConfig) -> PairAnalysis {
    let selector = &config.selector;
    let mean_energy = (a.energy.total_energy + b.energy.total_energy) * 0.5;
    let flow = &matches.color_flow;
    let cut = &matches.match_cut;

    let breakdown = ScoreBreakdown {
        match_cut: cut.confidence,
        action_continuity: cut.action_continuity,
        portal: matches.portal.map_or(0.0, |p| p.score),
        color_flow: flow.compatibility,
        mean_energy,
    };

    let suggestion = |transition_type: TransitionType,
                      base: f32,
                      confidence: f32,
                      parameters: EffectParameters,
                      notes: Vec<String>| {
        TransitionSuggestion {
            source: a.shot_id.clone(),
            target: b.shot_id.clone(),
            transition_type,
            duration: transition_duration(base, mean_energy, selector),
            confidence: clamp_unit(confidence),
            parameters,
            breakdown: Some(breakdown),
            notes,
        }
    };

    let mut candidates = Vec::with_capacity(4);

    if cut.confidence > 0.0 {
        let anchor = cut
            .shape_matches
            .first()
            .map(|m| m.shape_b.center())
            .or_else(|| cut.motion_matches.first().map(|m| m.line_b.midpoint()));
        let mut notes = vec![format!(
            "{} motion and {} shape matches",
            cut.motion_matches.len(),
            cut.shape_matches.len()
        )];
        if cut.histogram_correlation > 0.8 {
            notes.push("edge structure lines up".to_owned());
        }
        candidates.push(suggestion(
            TransitionType::MatchCut,
            selector.match_cut_duration,
            cut.confidence,
            EffectParameters::MatchCut {
                match_type: cut.match_type,
                anchor,
            },
            notes,
        ));
    }

    if let Some(portal) = matches.portal {
        let through = portal.portal_a;
        candidates.push(suggestion(
            portal.style.into(),
            selector.portal_duration,
            portal.score,
            EffectParameters::Portal {
                portal_kind: through.kind,
                center: through.center,
                width: through.width,
                height: through.height,
                feather: config.portal_match.feather_fraction,
            },
            vec![format!(
                "alignment {:.2}, size compatibility {:.2}",
                portal.alignment, portal.size_compatibility
            )],
        ));
    }

    let mut gradient_notes = Vec::new();
    if flow.lut.is_some() {
        gradient_notes.push("pre-grade the source with the color LUT".to_owned());
    }
    candidates.push(suggestion(
        TransitionType::GradientWipe,
        selector.gradient_duration,
        flow.compatibility * 0.9,
        EffectParameters::Gradient {
            geometry: flow.gradient.geometry,
            curve: flow.gradient.curve,
            reversed: flow.gradient.reversed,
            stops: flow.gradient.stops.clone(),
            effects: flow.effects.clone(),
        },
        gradient_notes,
    ));

    candidates.push(suggestion(
        TransitionType::Dissolve,
        selector.cross_fade_duration,
        0.3 + 0.3 * flow.compatibility,
        EffectParameters::Dissolve {
            curve: flow.gradient.curve,
        },
        Vec::new(),
    ));

    let (mut suggestions, rejected): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|s| s.confidence >= selector.min_confidence);
    suggestions.sort_by(|x, y| y.confidence.total_cmp(&x.confidence));

    let mut reasons = Vec::new();
    if suggestions.is_empty() {
        if cut.confidence <= 0.0 {
            reasons.push("no motion or shape continuity between the shots".to_owned());
        }
        if matches.portal.is_none() {
            reasons.push(format!(
                "no portal pair scored above {:.2}",
                config.portal_match.min_score
            ));
        }
        reasons.extend(rejected.iter().map(|s| {
            format!(
                "{} confidence {:.2} is below {:.2}",
                s.transition_type.as_str(),
                s.confidence,
                selector.min_confidence
            )
        }));
    }

    PairAnalysis {
        source: a.shot_id.clone(),
        target: b.shot_id.clone(),
        suggestions,
        reasons,
        compatibility: clamp_unit(breakdown.match_cut.max(breakdown.portal).max(breakdown.color_flow)),
        color_lut: flow.lut.clone(),
    }
}
