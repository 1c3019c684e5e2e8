//! Batch façade over the extractors, matchers and planner.
//!
//! [`TransitionEngine`] owns a validated [`EngineConfig`] and a bounded
//! worker pool. Shots and shot pairs are independent units of work; a shot
//! that fails to load is reported next to the successful results and never
//! aborts the batch.

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::{
    config::EngineConfig,
    features::{extract_features, FeatureBundle},
    ingest::{Shot, ShotId},
    matching::{match_cut::scan_pairs, analyze_match_cut, MatchCutCandidate, MatchCutScan},
    sequence::{
        match_music, plan_pacing, select_transitions, MusicSync, PacingOptions, PacingPlan, PairAnalysis,
        ShotMetrics,
    },
    timeline::Timeline,
    EngineError, Result,
};

/// A shot that could not be analysed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotFailure {
    /// Position of the shot in the submitted list.
    pub index: usize,
    pub path: PathBuf,
    pub error: String,
}

/// Successful bundles in submission order plus per-shot failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchAnalysis {
    pub shots: Vec<FeatureBundle>,
    pub failures: Vec<ShotFailure>,
}

impl BatchAnalysis {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Everything the engine derives from one ordered list of shots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceReport {
    pub shots: Vec<FeatureBundle>,
    /// One entry per adjacent pair of successfully analysed shots.
    pub pairs: Vec<PairAnalysis>,
    pub match_cuts: MatchCutScan,
    pub pacing: PacingPlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicSync>,
    pub timeline: Timeline,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ShotFailure>,
}

pub struct TransitionEngine {
    config: EngineConfig,
    pool: rayon::ThreadPool,
}

impl TransitionEngine {
    /// Validates `config` and builds the worker pool. `workers.threads == 0`
    /// sizes the pool to the available cores.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.threads)
            .thread_name(|index| format!("shotweave-{index}"))
            .build()
            .map_err(|err| EngineError::WorkerPool(err.to_string()))?;
        Ok(Self { config, pool })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Loads and analyses one image. The decoded raster is dropped before
    /// this returns.
    pub fn analyze_shot(&self, path: impl AsRef<Path>) -> Result<FeatureBundle> {
        let path = path.as_ref();
        let span = info_span!("analyze_shot", shot = %path.display());
        let _guard = span.enter();
        let shot = Shot::load(path, &self.config.ingest)?;
        extract_features(shot, &self.config)
    }

    /// Analyses an in-memory raster.
    pub fn analyze_image(&self, id: ShotId, rgb: RgbImage) -> Result<FeatureBundle> {
        let span = info_span!("analyze_shot", shot = %id);
        let _guard = span.enter();
        let shot = Shot::from_rgb(id, rgb, &self.config.ingest)?;
        extract_features(shot, &self.config)
    }

    /// Analyses every path in parallel.
    pub fn analyze_paths<P>(&self, paths: &[P]) -> BatchAnalysis
    where
        P: AsRef<Path> + Sync,
    {
        let span = info_span!("analyze_batch", shots = paths.len());
        let _guard = span.enter();
        let started = Instant::now();

        let results: Vec<(usize, Result<FeatureBundle>)> = self.pool.install(|| {
            paths
                .par_iter()
                .enumerate()
                .map(|(index, path)| (index, self.analyze_shot(path)))
                .collect()
        });

        let mut batch = BatchAnalysis::default();
        for (index, result) in results {
            match result {
                Ok(bundle) => batch.shots.push(bundle),
                Err(err) => {
                    let path = paths[index].as_ref().to_path_buf();
                    warn!(index, path = %path.display(), error = %err, "shot skipped");
                    batch.failures.push(ShotFailure {
                        index,
                        path,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            analysed = batch.shots.len(),
            failed = batch.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch analysed"
        );
        batch
    }

    /// Ranked suggestions for every adjacent pair, in sequence order.
    pub fn suggest_transitions(&self, shots: &[FeatureBundle]) -> Vec<PairAnalysis> {
        if shots.len() < 2 {
            return Vec::new();
        }
        let config = &self.config;
        self.pool.install(|| {
            shots
                .par_windows(2)
                .map(|pair| select_transitions(&pair[0], &pair[1], config))
                .collect()
        })
    }

    /// Tests each shot against the next `match_cut.window` shots and keeps
    /// pairs whose confidence reaches `threshold`.
    pub fn find_match_cuts(&self, shots: &[FeatureBundle], threshold: f32) -> MatchCutScan {
        let config = &self.config.match_cut;
        let pairs = scan_pairs(shots.len(), config.window);
        let candidates: Vec<MatchCutCandidate> = self.pool.install(|| {
            pairs
                .par_iter()
                .filter_map(|&(from, to)| {
                    let analysis = analyze_match_cut(&shots[from], &shots[to], config);
                    (analysis.confidence >= threshold).then_some(MatchCutCandidate { from, to, analysis })
                })
                .collect()
        });
        debug!(pairs = pairs.len(), matches = candidates.len(), threshold, "match-cut scan");
        MatchCutScan::from_candidates(candidates)
    }

    pub fn plan_pacing(&self, shots: &[FeatureBundle], options: &PacingOptions) -> Result<PacingPlan> {
        let metrics: Vec<ShotMetrics> = shots.iter().map(ShotMetrics::from).collect();
        plan_pacing(&metrics, options, &self.config.pacing)
    }

    /// Runs the whole flow over an ordered list of paths. Shots that fail to
    /// load are left out of every later stage and listed in `failures`.
    pub fn analyze_sequence<P>(&self, paths: &[P], options: &PacingOptions) -> Result<SequenceReport>
    where
        P: AsRef<Path> + Sync,
    {
        let batch = self.analyze_paths(paths);
        let pairs = self.suggest_transitions(&batch.shots);
        let match_cuts = self.find_match_cuts(&batch.shots, self.config.match_cut.scan_threshold);
        let pacing = self.plan_pacing(&batch.shots, options)?;

        let music = match options.music_energy_curve.as_deref() {
            Some(curve) if !curve.is_empty() => Some(match_music(
                &pacing,
                curve,
                options.beat_timestamps.as_deref().unwrap_or_default(),
                &self.config.pacing,
            )?),
            _ => None,
        };
        let timeline = Timeline::from_plan(music.as_ref().map_or(&pacing, |m| &m.plan), &pairs);

        info!(
            shots = batch.shots.len(),
            pairs = pairs.len(),
            match_cuts = match_cuts.matches.len(),
            total_duration = timeline.total_duration,
            "sequence analysed"
        );

        Ok(SequenceReport {
            shots: batch.shots,
            pairs,
            match_cuts,
            pacing,
            music,
            timeline,
            failures: batch.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn disk(offset: i32) -> RgbImage {
        RgbImage::from_fn(160, 120, |x, y| {
            if (x as f32 - 80.0 - offset as f32).hypot(y as f32 - 60.0) < 30.0 {
                Rgb([20, 20, 25])
            } else {
                Rgb([210, 200, 180])
            }
        })
    }

    #[test]
    fn rejects_invalid_configuration() {
        let mut config = EngineConfig::default();
        config.match_cut.window = 0;
        assert!(matches!(TransitionEngine::new(config), Err(EngineError::Config(_))));
    }

    #[test]
    fn explicit_thread_count_bounds_the_pool() {
        let mut config = EngineConfig::default();
        config.workers.threads = 2;
        let engine = TransitionEngine::new(config).unwrap();
        assert_eq!(engine.threads(), 2);
    }

    #[test]
    fn adjacent_pairs_are_suggested_in_order() {
        let engine = TransitionEngine::with_defaults().unwrap();
        let shots: Vec<FeatureBundle> = (0..3)
            .map(|i| engine.analyze_image(ShotId::new(format!("s{i}")), disk(i * 8)).unwrap())
            .collect();
        let pairs = engine.suggest_transitions(&shots);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].source.as_str(), "s0");
        assert_eq!(pairs[1].target.as_str(), "s2");
        assert!(engine.suggest_transitions(&shots[..1]).is_empty());
    }

    #[test]
    fn missing_files_are_reported_not_fatal() {
        let engine = TransitionEngine::with_defaults().unwrap();
        let batch = engine.analyze_paths(&["/definitely/not/here.png"]);
        assert!(batch.shots.is_empty());
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].index, 0);
        assert!(batch.failures[0].error.contains("here.png"));
        assert!(!batch.is_complete());
    }
}
