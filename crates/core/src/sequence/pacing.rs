//! Visual rhythm: hold durations, cut styles and the rhythm curve of a
//! sequence, with optional tempo, target length and music-energy sync.

use serde::{Deserialize, Serialize};

use crate::{
    config::PacingConfig,
    features::{geometry::clamp_unit, FeatureBundle},
    ingest::ShotId,
    EngineError, Result,
};

/// Per-shot inputs to the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotMetrics {
    pub shot_id: ShotId,
    pub complexity: f32,
    pub energy: f32,
}

impl From<&FeatureBundle> for ShotMetrics {
    fn from(bundle: &FeatureBundle) -> Self {
        Self {
            shot_id: bundle.shot_id.clone(),
            complexity: bundle.complexity.overall_score,
            energy: bundle.energy.total_energy,
        }
    }
}

/// Caller-supplied constraints on the plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingOptions {
    /// Seconds the whole sequence should last.
    pub target_total_duration: Option<f32>,
    pub tempo_bpm: Option<f32>,
    /// Music energy over the sequence, any length, values in `[0, 1]`.
    pub music_energy_curve: Option<Vec<f32>>,
    /// Beat times in seconds, ascending.
    pub beat_timestamps: Option<Vec<f32>>,
}

impl PacingOptions {
    fn validate(&self) -> Result<()> {
        if let Some(target) = self.target_total_duration {
            if !(target.is_finite() && target > 0.0) {
                return Err(EngineError::invalid_input(format!(
                    "target_total_duration must be positive, got {target}"
                )));
            }
        }
        if let Some(bpm) = self.tempo_bpm {
            if !(bpm.is_finite() && bpm > 0.0) {
                return Err(EngineError::invalid_input(format!(
                    "tempo_bpm must be positive, got {bpm}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutStyle {
    Quick,
    Standard,
    Long,
    Hold,
}

impl CutStyle {
    pub fn for_duration(seconds: f32) -> Self {
        if seconds < 1.0 {
            Self::Quick
        } else if seconds < 2.5 {
            Self::Standard
        } else if seconds < 4.0 {
            Self::Long
        } else {
            Self::Hold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Standard => "standard",
            Self::Long => "long",
            Self::Hold => "hold",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotPacing {
    pub shot_id: ShotId,
    /// Seconds.
    pub hold_duration: f32,
    pub complexity_score: f32,
    pub energy_score: f32,
    pub cut_style: CutStyle,
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacingPlan {
    pub shots: Vec<ShotPacing>,
    /// Normalised inverse hold durations; high where cuts come fast.
    pub rhythm_curve: Vec<f32>,
    pub energy_curve: Vec<f32>,
    pub balance_score: f32,
    pub total_duration: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_bpm: Option<f32>,
}

/// A plan nudged towards a music energy curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicSync {
    pub plan: PacingPlan,
    /// The music curve resampled to one value per shot.
    pub music_energy: Vec<f32>,
    pub per_shot_match: Vec<f32>,
    pub average_match: f32,
}

/// `base_hold * (1 + complexity * gain) * (1 - energy * damping)`.
pub fn base_hold(complexity: f32, energy: f32, config: &PacingConfig) -> f32 {
    config.base_hold
        * (1.0 + clamp_unit(complexity) * config.complexity_gain)
        * (1.0 - clamp_unit(energy) * config.energy_damping)
}

pub fn plan_pacing(shots: &[ShotMetrics], options: &PacingOptions, config: &PacingConfig) -> Result<PacingPlan> {
    options.validate()?;
    if shots.is_empty() {
        return Ok(PacingPlan {
            tempo_bpm: options.tempo_bpm,
            ..PacingPlan::default()
        });
    }

    let base: Vec<f32> = shots
        .iter()
        .map(|s| base_hold(s.complexity, s.energy, config))
        .collect();
    let mut reasons: Vec<String> = shots
        .iter()
        .map(|s| {
            format!(
                "complexity {:.2} and energy {:.2} give a {:.2}s base hold",
                s.complexity, s.energy, base_hold(s.complexity, s.energy, config)
            )
        })
        .collect();

    let beat = options.tempo_bpm.map(|bpm| 60.0 / bpm);
    let snapped: Vec<f32> = match beat {
        Some(beat) => {
            let beats = beats_per_shot(&base, beat);
            annotate_beats(&mut reasons, &beats);
            beats.iter().map(|n| *n as f32 * beat).collect()
        }
        None => base,
    };
    // The target is applied last so the total always matches it.
    let durations = match options.target_total_duration {
        Some(target) => rescale(&snapped, target, &mut reasons),
        None => snapped,
    };

    let metrics: Vec<(f32, f32)> = shots.iter().map(|s| (s.complexity, s.energy)).collect();
    let ids: Vec<ShotId> = shots.iter().map(|s| s.shot_id.clone()).collect();
    Ok(assemble(&ids, &metrics, &durations, reasons, options.tempo_bpm, config))
}

/// Nearest whole number of beats, at least one.
fn beats_per_shot(durations: &[f32], beat: f32) -> Vec<usize> {
    durations
        .iter()
        .map(|d| ((d / beat).round() as usize).max(1))
        .collect()
}

fn rescale(durations: &[f32], target: f32, reasons: &mut [String]) -> Vec<f32> {
    let total: f32 = durations.iter().sum();
    let scale = target / total;
    for reason in reasons.iter_mut() {
        reason.push_str(&format!("; rescaled x{scale:.2} to fit {target:.1}s"));
    }
    durations.iter().map(|d| d * scale).collect()
}

fn annotate_beats(reasons: &mut [String], beats: &[usize]) {
    for (reason, n) in reasons.iter_mut().zip(beats) {
        let unit = if *n == 1 { "beat" } else { "beats" };
        reason.push_str(&format!("; snapped to {n} {unit}"));
    }
}

/// Builds the plan and its derived curves from final durations.
fn assemble(
    ids: &[ShotId],
    metrics: &[(f32, f32)],
    durations: &[f32],
    reasons: Vec<String>,
    tempo_bpm: Option<f32>,
    config: &PacingConfig,
) -> PacingPlan {
    let shots: Vec<ShotPacing> = ids
        .iter()
        .zip(metrics)
        .zip(durations)
        .zip(reasons)
        .map(|(((id, (complexity, energy)), duration), reasoning)| ShotPacing {
            shot_id: id.clone(),
            hold_duration: *duration,
            complexity_score: clamp_unit(*complexity),
            energy_score: clamp_unit(*energy),
            cut_style: CutStyle::for_duration(*duration),
            reasoning,
        })
        .collect();
    let energies: Vec<f32> = shots.iter().map(|s| s.energy_score).collect();

    PacingPlan {
        rhythm_curve: rhythm_curve(durations, config.smoothing_min_shots),
        balance_score: balance_score(durations, &energies),
        total_duration: durations.iter().sum(),
        energy_curve: energies,
        shots,
        tempo_bpm,
    }
}

/// Inverse durations, min-max normalised, then smoothed with a window of
/// three once there are at least `smoothing_min_shots` values.
pub fn rhythm_curve(durations: &[f32], smoothing_min_shots: usize) -> Vec<f32> {
    let inverse: Vec<f32> = durations.iter().map(|d| 1.0 / d.max(1e-3)).collect();
    let (min, max) = inverse
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let normalized: Vec<f32> = if max - min <= 1e-6 {
        vec![0.5; inverse.len()]
    } else {
        inverse.iter().map(|v| (v - min) / (max - min)).collect()
    };
    if normalized.len() < smoothing_min_shots.max(3) {
        return normalized;
    }
    (0..normalized.len())
        .map(|i| {
            let window = &normalized[i.saturating_sub(1)..(i + 2).min(normalized.len())];
            window.iter().sum::<f32>() / window.len() as f32
        })
        .collect()
}

fn coefficient_of_variation(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    if mean.abs() <= f32::EPSILON {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
    variance.sqrt() / mean
}

/// `0.3 cv(durations) + 0.3 cv(energy) + 0.4 alternation`, where
/// alternation is the share of neighbouring shots on opposite sides of the
/// mean duration.
pub fn balance_score(durations: &[f32], energies: &[f32]) -> f32 {
    if durations.len() < 2 {
        return 0.0;
    }
    let mean = durations.iter().sum::<f32>() / durations.len() as f32;
    let alternating = durations
        .windows(2)
        .filter(|w| (w[0] - mean) * (w[1] - mean) < 0.0)
        .count();
    let alternation = alternating as f32 / (durations.len() - 1) as f32;
    clamp_unit(
        0.3 * coefficient_of_variation(durations).min(1.0)
            + 0.3 * coefficient_of_variation(energies).min(1.0)
            + 0.4 * alternation,
    )
}

/// Linear resampling of `curve` to `len` points.
fn resample(curve: &[f32], len: usize) -> Vec<f32> {
    match (curve.len(), len) {
        (_, 0) => Vec::new(),
        (1, _) => vec![curve[0]; len],
        (_, 1) => vec![curve.iter().sum::<f32>() / curve.len() as f32],
        (n, _) => (0..len)
            .map(|i| {
                let t = i as f32 * (n - 1) as f32 / (len - 1) as f32;
                let lo = (t.floor() as usize).min(n - 1);
                let hi = (lo + 1).min(n - 1);
                curve[lo] + (curve[hi] - curve[lo]) * (t - lo as f32)
            })
            .collect(),
    }
}

/// Moves each cut onto the nearest later beat. Cuts with no beat after the
/// previous cut keep their own spacing.
fn snap_to_beats(durations: &[f32], beats: &[f32]) -> Vec<f32> {
    let mut snapped = Vec::with_capacity(durations.len());
    let (mut raw_time, mut previous) = (0.0_f32, 0.0_f32);
    for duration in durations {
        raw_time += duration;
        let nearest = beats
            .iter()
            .copied()
            .filter(|b| *b > previous + 1e-3)
            .min_by(|a, b| (a - raw_time).abs().total_cmp(&(b - raw_time).abs()));
        let cut = match nearest {
            Some(beat) => beat,
            None => previous + duration,
        };
        snapped.push(cut - previous);
        previous = cut;
    }
    snapped
}

/// Nudges each hold by up to `config.music_nudge` towards the local music
/// energy and, when beats are given, lands every cut on one.
pub fn match_music(
    plan: &PacingPlan,
    energy_curve: &[f32],
    beats: &[f32],
    config: &PacingConfig,
) -> Result<MusicSync> {
    if energy_curve.is_empty() {
        return Err(EngineError::invalid_input("music energy curve is empty"));
    }
    if energy_curve.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::invalid_input("music energy curve has non-finite values"));
    }
    let music: Vec<f32> = resample(energy_curve, plan.shots.len())
        .into_iter()
        .map(clamp_unit)
        .collect();

    let mut reasons = Vec::with_capacity(plan.shots.len());
    let mut durations: Vec<f32> = plan
        .shots
        .iter()
        .zip(&music)
        .map(|(shot, m)| {
            let multiplier = 1.0 + config.music_nudge * (shot.energy_score - m);
            reasons.push(format!("{}; music energy {m:.2} scales x{multiplier:.2}", shot.reasoning));
            shot.hold_duration * multiplier
        })
        .collect();

    let mut beats: Vec<f32> = beats.iter().copied().filter(|b| b.is_finite() && *b > 0.0).collect();
    beats.sort_by(f32::total_cmp);
    if !beats.is_empty() {
        durations = snap_to_beats(&durations, &beats);
    }

    let per_shot_match: Vec<f32> = plan
        .shots
        .iter()
        .zip(&music)
        .map(|(shot, m)| clamp_unit(1.0 - (shot.energy_score - m).abs()))
        .collect();
    let average_match = if per_shot_match.is_empty() {
        0.0
    } else {
        per_shot_match.iter().sum::<f32>() / per_shot_match.len() as f32
    };

    let ids: Vec<ShotId> = plan.shots.iter().map(|s| s.shot_id.clone()).collect();
    let metrics: Vec<(f32, f32)> = plan
        .shots
        .iter()
        .map(|s| (s.complexity_score, s.energy_score))
        .collect();
    Ok(MusicSync {
        plan: assemble(&ids, &metrics, &durations, reasons, plan.tempo_bpm, config),
        music_energy: music,
        per_shot_match,
        average_match,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shots(values: &[(f32, f32)]) -> Vec<ShotMetrics> {
        values
            .iter()
            .enumerate()
            .map(|(i, (c, e))| ShotMetrics {
                shot_id: ShotId::new(format!("shot-{i}")),
                complexity: *c,
                energy: *e,
            })
            .collect()
    }

    fn plan(values: &[(f32, f32)], options: PacingOptions) -> PacingPlan {
        plan_pacing(&shots(values), &options, &PacingConfig::default()).unwrap()
    }

    const MIXED: [(f32, f32); 5] = [(0.1, 0.9), (0.8, 0.2), (0.5, 0.5), (0.0, 0.0), (1.0, 1.0)];

    #[test]
    fn base_hold_follows_complexity_and_energy() {
        let config = PacingConfig::default();
        assert!((base_hold(0.0, 0.0, &config) - 2.0).abs() < 1e-6);
        assert!((base_hold(1.0, 0.0, &config) - 5.0).abs() < 1e-6);
        assert!((base_hold(1.0, 1.0, &config) - 3.5).abs() < 1e-6);
        let p = plan(&[(0.0, 0.0)], PacingOptions::default());
        assert_eq!(p.shots[0].cut_style, CutStyle::Standard);
        assert!(p.shots[0].reasoning.contains("2.00s"));
    }

    #[test]
    fn target_duration_is_met() {
        let p = plan(
            &MIXED,
            PacingOptions {
                target_total_duration: Some(12.0),
                ..Default::default()
            },
        );
        let sum: f32 = p.shots.iter().map(|s| s.hold_duration).sum();
        assert!((sum - 12.0).abs() < 0.1);
        assert!((p.total_duration - 12.0).abs() < 0.1);
    }

    #[test]
    fn tempo_snaps_to_whole_beats() {
        let p = plan(
            &MIXED,
            PacingOptions {
                tempo_bpm: Some(120.0),
                ..Default::default()
            },
        );
        for shot in &p.shots {
            let beats = shot.hold_duration / 0.5;
            assert!((beats - beats.round()).abs() * 0.5 < 0.01);
            assert!(shot.hold_duration >= 0.5 - 1e-6);
        }
        assert_eq!(p.tempo_bpm, Some(120.0));
    }

    #[test]
    fn target_wins_over_tempo() {
        for target in [1.0, 7.3, 10.0] {
            let p = plan(
                &MIXED,
                PacingOptions {
                    target_total_duration: Some(target),
                    tempo_bpm: Some(120.0),
                    ..Default::default()
                },
            );
            let sum: f32 = p.shots.iter().map(|s| s.hold_duration).sum();
            assert!((sum - target).abs() < 0.1, "sum {sum} vs {target}");
            assert!(p.shots.iter().all(|s| s.reasoning.contains("snapped to")));
            assert!(p.shots.iter().all(|s| s.reasoning.contains("rescaled")));
        }
    }

    #[test]
    fn beat_counts_keep_their_proportions_after_rescaling() {
        let snapped = plan(
            &MIXED,
            PacingOptions {
                tempo_bpm: Some(120.0),
                ..Default::default()
            },
        );
        let both = plan(
            &MIXED,
            PacingOptions {
                target_total_duration: Some(snapped.total_duration * 2.0),
                tempo_bpm: Some(120.0),
                ..Default::default()
            },
        );
        for (a, b) in snapped.shots.iter().zip(&both.shots) {
            assert!((b.hold_duration - 2.0 * a.hold_duration).abs() < 1e-4);
        }
    }

    #[test]
    fn huge_targets_scale_without_overflow() {
        let p = plan(
            &MIXED,
            PacingOptions {
                target_total_duration: Some(1e30),
                tempo_bpm: Some(90.0),
                ..Default::default()
            },
        );
        assert!(p.shots.iter().all(|s| s.hold_duration.is_finite()));
        assert!((p.total_duration / 1e30 - 1.0).abs() < 1e-3);
    }

    #[test]
    fn balance_rewards_alternation() {
        let alternating = plan(&[(0.1, 0.1), (0.9, 0.9), (0.1, 0.1), (0.9, 0.9)], PacingOptions::default());
        assert!(alternating.balance_score > 0.5);
        let flat = plan(&[(0.5, 0.5); 4], PacingOptions::default());
        assert!(flat.balance_score < 0.3);
        assert_eq!(flat.rhythm_curve, vec![0.5; 4]);
    }

    #[test]
    fn rhythm_curve_is_normalised_and_smoothed() {
        let raw = rhythm_curve(&[1.0, 2.0, 4.0], 4);
        assert_eq!(raw.len(), 3);
        assert!((raw[0] - 1.0).abs() < 1e-6);
        assert!(raw[2].abs() < 1e-6);

        let smooth = rhythm_curve(&[1.0, 4.0, 1.0, 4.0], 4);
        assert!((smooth[0] - 0.5).abs() < 1e-6);
        assert!((smooth[1] - 2.0 / 3.0).abs() < 1e-6);
        assert!(smooth.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn cut_styles_bucket_by_duration() {
        assert_eq!(CutStyle::for_duration(0.9), CutStyle::Quick);
        assert_eq!(CutStyle::for_duration(2.4), CutStyle::Standard);
        assert_eq!(CutStyle::for_duration(3.9), CutStyle::Long);
        assert_eq!(CutStyle::for_duration(4.0), CutStyle::Hold);
    }

    #[test]
    fn empty_sequences_and_bad_options() {
        let empty = plan(&[], PacingOptions::default());
        assert!(empty.shots.is_empty());
        assert_eq!(empty.balance_score, 0.0);
        let err = plan_pacing(
            &shots(&MIXED),
            &PacingOptions {
                tempo_bpm: Some(0.0),
                ..Default::default()
            },
            &PacingConfig::default(),
        )
        .unwrap_err();
        assert!(format!("{err}").contains("tempo_bpm"));
    }

    #[test]
    fn music_sync_nudges_and_scores() {
        let p = plan(&[(0.5, 0.2), (0.5, 0.8)], PacingOptions::default());
        let synced = match_music(&p, &[0.2, 0.5, 0.8], &[], &PacingConfig::default()).unwrap();
        assert_eq!(synced.music_energy, vec![0.2, 0.8]);
        assert!(synced.per_shot_match.iter().all(|m| (m - 1.0).abs() < 1e-6));
        assert!((synced.average_match - 1.0).abs() < 1e-6);
        for (before, after) in p.shots.iter().zip(&synced.plan.shots) {
            assert!((before.hold_duration - after.hold_duration).abs() < 1e-5);
        }

        let mismatched = match_music(&p, &[1.0], &[], &PacingConfig::default()).unwrap();
        let ratio = mismatched.plan.shots[0].hold_duration / p.shots[0].hold_duration;
        assert!((ratio - 0.84).abs() < 1e-5);
        assert!((mismatched.per_shot_match[0] - 0.2).abs() < 1e-6);

        assert!(match_music(&p, &[], &[], &PacingConfig::default()).is_err());
    }

    #[test]
    fn music_sync_lands_cuts_on_beats() {
        let p = plan(&[(0.0, 0.0), (0.0, 0.0), (0.0, 0.0)], PacingOptions::default());
        let beats: Vec<f32> = (1..=20).map(|i| i as f32 * 0.75).collect();
        let synced = match_music(&p, &[0.0], &beats, &PacingConfig::default()).unwrap();
        let mut time = 0.0;
        for shot in &synced.plan.shots {
            time += shot.hold_duration;
            let k = time / 0.75;
            assert!((k - k.round()).abs() < 1e-4);
            assert!(shot.hold_duration > 0.0);
        }
    }
}
