//! Pairwise matchers. Each one is a pure function of two feature bundles
//! and the configuration; an empty result means nothing qualified.

pub mod color_flow;
pub mod match_cut;
pub mod portal;

use serde::{Deserialize, Serialize};

use crate::{config::EngineConfig, features::FeatureBundle};

pub use color_flow::{
    analyze_color_flow, BlendCurve, ColorEffect, ColorFlowMatch, ColorLut, ColorStop, GradientGeometry,
    GradientTransition,
};
pub use match_cut::{
    analyze_match_cut, find_match_cuts, CutRecommendation, MatchCutAnalysis, MatchCutCandidate, MatchCutScan,
    MatchCutType, MotionMatch, ShapeMatch,
};
pub use portal::{match_portals, PortalMatch, PortalTransitionStyle};

/// One matched feature pair, tagged by the dimension it was found on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PairwiseMatch {
    Motion(MotionMatch),
    Shape(ShapeMatch),
    Portal(PortalMatch),
    ColorFlow(Box<ColorFlowMatch>),
}

impl PairwiseMatch {
    pub fn score(&self) -> f32 {
        match self {
            Self::Motion(m) => m.similarity,
            Self::Shape(m) => m.similarity,
            Self::Portal(m) => m.score,
            Self::ColorFlow(m) => m.compatibility,
        }
    }
}

/// Every matcher's verdict on one ordered pair of shots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairMatches {
    pub match_cut: MatchCutAnalysis,
    /// Best portal pairing, if any scored above the minimum.
    pub portal: Option<PortalMatch>,
    pub color_flow: ColorFlowMatch,
}

impl PairMatches {
    /// Flattens the verdicts into tagged matches, best first.
    pub fn all(&self) -> Vec<PairwiseMatch> {
        let mut all: Vec<PairwiseMatch> = self
            .match_cut
            .motion_matches
            .iter()
            .copied()
            .map(PairwiseMatch::Motion)
            .chain(self.match_cut.shape_matches.iter().copied().map(PairwiseMatch::Shape))
            .chain(self.portal.map(PairwiseMatch::Portal))
            .collect();
        all.push(PairwiseMatch::ColorFlow(Box::new(self.color_flow.clone())));
        all.sort_by(|a, b| b.score().total_cmp(&a.score()));
        all
    }
}

pub fn analyze_pair(a: &FeatureBundle, b: &FeatureBundle, config: &EngineConfig) -> PairMatches {
    PairMatches {
        match_cut: analyze_match_cut(a, b, &config.match_cut),
        portal: match_portals(&a.portals, &b.portals, &config.portal_match)
            .into_iter()
            .next(),
        color_flow: analyze_color_flow(a, b, &config.color_flow),
    }
}
