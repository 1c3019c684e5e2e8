use serde::{Deserialize, Serialize};

use crate::{
    ingest::ShotId,
    sequence::{PacingPlan, PairAnalysis, TransitionType},
};

/// One shot placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub shot_id: ShotId,
    pub start_seconds: f32,
    pub end_seconds: f32,
    /// Transition from the previous shot, `None` for the first shot or a
    /// plain cut.
    pub transition_in: Option<TransitionType>,
    pub transition_duration: f32,
}

impl TimelineEvent {
    pub fn duration(&self) -> f32 {
        self.end_seconds - self.start_seconds
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    pub total_duration: f32,
}

impl Timeline {
    /// Lays the plan's holds end to end. `pairs[i]` is the analysis of
    /// shots `i` and `i + 1`; its best suggestion becomes the incoming
    /// transition of shot `i + 1`. Pairs are matched by position, so repeated
    /// shot ids stay in their own slot.
    pub fn from_plan(plan: &PacingPlan, pairs: &[PairAnalysis]) -> Self {
        let mut events = Vec::with_capacity(plan.shots.len());
        let mut time = 0.0_f32;
        for (index, shot) in plan.shots.iter().enumerate() {
            let incoming = index
                .checked_sub(1)
                .and_then(|prev| pairs.get(prev))
                .filter(|pair| pair.source == plan.shots[index - 1].shot_id && pair.target == shot.shot_id)
                .and_then(PairAnalysis::best);
            let start = time;
            time += shot.hold_duration;
            events.push(TimelineEvent {
                shot_id: shot.shot_id.clone(),
                start_seconds: start,
                end_seconds: time,
                transition_in: incoming.map(|s| s.transition_type),
                // A transition never outlasts the shot it leads into.
                transition_duration: incoming.map_or(0.0, |s| s.duration.min(shot.hold_duration)),
            });
        }
        Self {
            events,
            total_duration: time,
        }
    }

    /// The event playing at `seconds`, if any.
    pub fn event_at(&self, seconds: f32) -> Option<&TimelineEvent> {
        let index = self.events.partition_point(|e| e.end_seconds <= seconds);
        self.events
            .get(index)
            .filter(|e| e.start_seconds <= seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PacingConfig,
        sequence::{plan_pacing, EffectParameters, PacingOptions, ShotMetrics, TransitionSuggestion},
        matching::BlendCurve,
    };

    fn plan() -> PacingPlan {
        plan_of(&["a", "b", "c"])
    }

    fn plan_of(ids: &[&str]) -> PacingPlan {
        let shots: Vec<ShotMetrics> = ids
            .iter()
            .map(|id| ShotMetrics {
                shot_id: ShotId::new(*id),
                complexity: 0.0,
                energy: 0.0,
            })
            .collect();
        plan_pacing(&shots, &PacingOptions::default(), &PacingConfig::default()).unwrap()
    }

    fn dissolve(source: &str, target: &str, duration: f32) -> PairAnalysis {
        pair(source, target, TransitionType::Dissolve, duration)
    }

    fn unmatched(source: &str, target: &str) -> PairAnalysis {
        PairAnalysis {
            suggestions: Vec::new(),
            reasons: vec!["nothing qualified".to_string()],
            ..dissolve(source, target, 0.0)
        }
    }

    fn pair(source: &str, target: &str, transition_type: TransitionType, duration: f32) -> PairAnalysis {
        PairAnalysis {
            source: ShotId::new(source),
            target: ShotId::new(target),
            suggestions: vec![TransitionSuggestion {
                source: ShotId::new(source),
                target: ShotId::new(target),
                transition_type,
                duration,
                confidence: 0.6,
                parameters: EffectParameters::Dissolve {
                    curve: BlendCurve::Linear,
                },
                breakdown: None,
                notes: Vec::new(),
            }],
            reasons: Vec::new(),
            compatibility: 0.6,
            color_lut: None,
        }
    }

    #[test]
    fn shots_are_laid_end_to_end() {
        let timeline = Timeline::from_plan(&plan(), &[unmatched("a", "b"), dissolve("b", "c", 9.0)]);
        assert_eq!(timeline.events.len(), 3);
        assert!((timeline.total_duration - 6.0).abs() < 1e-6);
        assert_eq!(timeline.events[1].start_seconds, timeline.events[0].end_seconds);
        assert_eq!(timeline.events[1].transition_in, None);
        assert_eq!(timeline.events[2].transition_in, Some(TransitionType::Dissolve));
        assert!((timeline.events[2].transition_duration - 2.0).abs() < 1e-6);
        assert!((timeline.events[0].duration() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn repeated_shots_take_the_transition_at_their_position() {
        let pairs = [
            pair("x", "y", TransitionType::Dissolve, 0.5),
            pair("y", "x", TransitionType::GradientWipe, 0.5),
            pair("x", "y", TransitionType::MatchCut, 0.0),
        ];
        let timeline = Timeline::from_plan(&plan_of(&["x", "y", "x", "y"]), &pairs);
        let incoming: Vec<Option<TransitionType>> = timeline.events.iter().map(|e| e.transition_in).collect();
        assert_eq!(
            incoming,
            vec![
                None,
                Some(TransitionType::Dissolve),
                Some(TransitionType::GradientWipe),
                Some(TransitionType::MatchCut),
            ]
        );
    }

    #[test]
    fn pairs_for_other_shots_are_ignored() {
        let timeline = Timeline::from_plan(&plan(), &[dissolve("q", "r", 1.0)]);
        assert!(timeline.events.iter().all(|e| e.transition_in.is_none()));
    }

    #[test]
    fn finds_the_event_playing() {
        let timeline = Timeline::from_plan(&plan(), &[]);
        assert_eq!(timeline.event_at(0.0).map(|e| e.shot_id.as_str()), Some("a"));
        assert_eq!(timeline.event_at(2.0).map(|e| e.shot_id.as_str()), Some("b"));
        assert_eq!(timeline.event_at(5.9).map(|e| e.shot_id.as_str()), Some("c"));
        assert!(timeline.event_at(6.0).is_none());
        assert!(timeline.event_at(-1.0).is_none());
    }
}
