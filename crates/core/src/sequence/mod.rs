//! Sequence assembly: transition selection per pair and pacing for the
//! whole sequence.

pub mod pacing;
pub mod selector;

pub use pacing::{
    match_music, plan_pacing, CutStyle, MusicSync, PacingOptions, PacingPlan, ShotMetrics, ShotPacing,
};
pub use selector::{
    rank, select_transitions, EffectParameters, PairAnalysis, ScoreBreakdown, TransitionSuggestion,
    TransitionType,
};
