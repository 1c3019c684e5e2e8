//! Core library for Shotweave.
//!
//! Shotweave analyses an ordered list of still images meant to be cut
//! together and proposes how to get from one to the next: match cuts,
//! portal zooms, gradient wipes and dissolves, plus hold durations and a
//! rhythm curve for the sequence. Every geometric output is normalised to
//! the frame, so results do not depend on resolution.
//!
//! The flow is paths → [`FeatureBundle`] per shot → pairwise matches →
//! [`PairAnalysis`] and [`PacingPlan`] → exported artifacts. Extractors and
//! matchers are pure functions of their inputs and an [`EngineConfig`];
//! [`TransitionEngine`] runs them over a bounded worker pool.

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod features;
pub mod ingest;
pub mod matching;
pub mod sequence;
pub mod timeline;
pub mod vision;

pub use config::EngineConfig;
pub use engine::{BatchAnalysis, SequenceReport, ShotFailure, TransitionEngine};
pub use error::{EngineError, ExportError, Result};
pub use export::{export, export_to_path, ExportFormat, Exportable};
pub use features::{extract_features, FeatureBundle};
pub use ingest::{Shot, ShotId};
pub use matching::{analyze_pair, PairMatches, PairwiseMatch};
pub use sequence::{
    match_music, plan_pacing, select_transitions, CutStyle, MusicSync, PacingOptions, PacingPlan, PairAnalysis,
    ShotMetrics, TransitionSuggestion, TransitionType,
};
pub use timeline::{Timeline, TimelineEvent};
pub use vision::TransitionMask;
