//! Match-cut scoring from motion lines, shared shapes and edge structure.

use serde::{Deserialize, Serialize};

use crate::{
    config::MatchCutConfig,
    features::{
        complexity::histogram_correlation,
        geometry::clamp_unit,
        FeatureBundle, LineSegment, Shape, ShapePrimitive,
    },
    ingest::ShotId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCutType {
    Motion,
    Shape,
    Action,
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionMatch {
    pub line_a: LineSegment,
    pub line_b: LineSegment,
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeMatch {
    pub shape_a: ShapePrimitive,
    pub shape_b: ShapePrimitive,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCutAnalysis {
    pub source: ShotId,
    pub target: ShotId,
    pub match_type: MatchCutType,
    pub confidence: f32,
    pub motion_matches: Vec<MotionMatch>,
    pub shape_matches: Vec<ShapeMatch>,
    pub action_continuity: f32,
    pub histogram_correlation: f32,
}

/// `0.5 |cos(angle)| + 0.3 (1 - |length delta|) + 0.2 (1 - midpoint distance)`.
/// Symmetric in its arguments.
pub fn motion_similarity(a: &LineSegment, b: &LineSegment) -> f32 {
    let angle = (a.angle() - b.angle()).cos().abs();
    let magnitude = 1.0 - (a.length() - b.length()).abs().min(1.0);
    let center = 1.0 - a.midpoint().distance(&b.midpoint()).min(1.0);
    clamp_unit(0.5 * angle + 0.3 * magnitude + 0.2 * center)
}

fn ratio(a: f32, b: f32) -> f32 {
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    if high <= f32::EPSILON {
        1.0
    } else {
        low / high
    }
}

/// Similarity of two shapes of the same kind, `None` across kinds.
pub fn shape_similarity(a: &ShapePrimitive, b: &ShapePrimitive) -> Option<f32> {
    let score = match (a.shape, b.shape) {
        (
            Shape::Circle { center: ca, radius: ra },
            Shape::Circle { center: cb, radius: rb },
        ) => 0.6 * (1.0 - ca.distance(&cb).min(1.0)) + 0.4 * ratio(ra, rb),
        (Shape::Line { start: sa, end: ea }, Shape::Line { start: sb, end: eb }) => {
            let (la, lb) = (LineSegment { start: sa, end: ea }, LineSegment { start: sb, end: eb });
            0.5 * (la.angle() - lb.angle()).cos().abs()
                + 0.5 * (1.0 - la.midpoint().distance(&lb.midpoint()).min(1.0))
        }
        (
            Shape::Rectangle { center: ca, width: wa, height: ha },
            Shape::Rectangle { center: cb, width: wb, height: hb },
        ) => {
            let aspect_a = wa / ha.max(f32::EPSILON);
            let aspect_b = wb / hb.max(f32::EPSILON);
            0.6 * (1.0 - ca.distance(&cb).min(1.0)) + 0.4 * ratio(aspect_a, aspect_b)
        }
        _ => return None,
    };
    Some(clamp_unit(score))
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0_f32, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f32)
}

pub fn analyze_match_cut(a: &FeatureBundle, b: &FeatureBundle, config: &MatchCutConfig) -> MatchCutAnalysis {
    let lines_a = &a.motion.lines[..a.motion.lines.len().min(config.max_lines_per_shot)];
    let lines_b = &b.motion.lines[..b.motion.lines.len().min(config.max_lines_per_shot)];
    let motion_matches: Vec<MotionMatch> = lines_a
        .iter()
        .flat_map(|la| {
            lines_b.iter().filter_map(move |lb| {
                let similarity = motion_similarity(la, lb);
                (similarity > config.motion_threshold).then_some(MotionMatch {
                    line_a: *la,
                    line_b: *lb,
                    similarity,
                })
            })
        })
        .collect();

    let shape_matches: Vec<ShapeMatch> = a
        .shapes
        .iter()
        .flat_map(|sa| {
            b.shapes.iter().filter_map(move |sb| {
                shape_similarity(sa, sb)
                    .filter(|s| *s > config.shape_threshold)
                    .map(|similarity| ShapeMatch {
                        shape_a: *sa,
                        shape_b: *sb,
                        similarity,
                    })
            })
        })
        .collect();

    let motion_mean = mean(motion_matches.iter().map(|m| m.similarity));
    let shape_mean = mean(shape_matches.iter().map(|m| m.similarity));
    let shape_confidence = mean(
        shape_matches
            .iter()
            .map(|m| (m.shape_a.confidence + m.shape_b.confidence) * 0.5),
    );
    let correlation = histogram_correlation(&a.edge_histogram, &b.edge_histogram);
    let action = clamp_unit(
        0.5 * motion_mean.unwrap_or(0.0) + 0.3 * shape_confidence.unwrap_or(0.0) + 0.2 * correlation,
    );

    let signals = [
        (MatchCutType::Motion, motion_matches.len() as f32 * 0.3, motion_mean.unwrap_or(0.0)),
        (MatchCutType::Shape, shape_matches.len() as f32 * 0.3, shape_mean.unwrap_or(0.0)),
        (MatchCutType::Action, action * 0.4, action),
    ];
    let strongest = signals.iter().map(|s| s.1).fold(0.0_f32, f32::max);
    let leaders: Vec<_> = signals
        .iter()
        .filter(|s| strongest - s.1 <= config.tie_epsilon)
        .collect();

    let (match_type, confidence) = match leaders.as_slice() {
        [single] => (single.0, single.2),
        tied => (
            MatchCutType::Composite,
            mean(tied.iter().map(|s| s.2)).unwrap_or(0.0),
        ),
    };

    MatchCutAnalysis {
        source: a.shot_id.clone(),
        target: b.shot_id.clone(),
        match_type,
        confidence: clamp_unit(confidence),
        motion_matches,
        shape_matches,
        action_continuity: action,
        histogram_correlation: correlation,
    }
}

/// A qualifying match between shot `from` and a later shot `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCutCandidate {
    pub from: usize,
    pub to: usize,
    pub analysis: MatchCutAnalysis,
}

/// Best forward match for one shot inside the scan window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutRecommendation {
    pub from: usize,
    pub to: usize,
    pub match_type: MatchCutType,
    pub confidence: f32,
    /// Shots jumped over; non-zero for a skip cut.
    pub skips: usize,
}

impl CutRecommendation {
    pub fn is_skip(&self) -> bool {
        self.skips > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchCutScan {
    pub matches: Vec<MatchCutCandidate>,
    pub recommendations: Vec<CutRecommendation>,
}

impl MatchCutScan {
    /// Builds the recommendations from already filtered candidates.
    pub fn from_candidates(mut matches: Vec<MatchCutCandidate>) -> Self {
        matches.sort_by(|a, b| a.from.cmp(&b.from).then(a.to.cmp(&b.to)));

        let mut recommendations: Vec<CutRecommendation> = Vec::new();
        for candidate in &matches {
            match recommendations.last_mut() {
                Some(last) if last.from == candidate.from => {
                    if candidate.analysis.confidence > last.confidence {
                        *last = recommendation(candidate);
                    }
                }
                _ => recommendations.push(recommendation(candidate)),
            }
        }

        Self {
            matches,
            recommendations,
        }
    }
}

fn recommendation(candidate: &MatchCutCandidate) -> CutRecommendation {
    CutRecommendation {
        from: candidate.from,
        to: candidate.to,
        match_type: candidate.analysis.match_type,
        confidence: candidate.analysis.confidence,
        skips: candidate.to - candidate.from - 1,
    }
}

/// Index pairs `(i, j)` with `i < j <= i + window`.
pub fn scan_pairs(len: usize, window: usize) -> Vec<(usize, usize)> {
    (0..len)
        .flat_map(|i| (i + 1..len.min(i + window + 1)).map(move |j| (i, j)))
        .collect()
}

/// Tests each shot against the next `config.window` shots and keeps every
/// pair whose confidence reaches `threshold`.
pub fn find_match_cuts(bundles: &[FeatureBundle], threshold: f32, config: &MatchCutConfig) -> MatchCutScan {
    let candidates = scan_pairs(bundles.len(), config.window)
        .into_iter()
        .filter_map(|(i, j)| {
            let analysis = analyze_match_cut(&bundles[i], &bundles[j], config);
            (analysis.confidence >= threshold).then_some(MatchCutCandidate {
                from: i,
                to: j,
                analysis,
            })
        })
        .collect();
    MatchCutScan::from_candidates(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Point;

    fn line(x1: f32, y1: f32, x2: f32, y2: f32) -> LineSegment {
        LineSegment {
            start: Point::new(x1, y1),
            end: Point::new(x2, y2),
        }
    }

    fn circle(x: f32, y: f32, r: f32) -> ShapePrimitive {
        ShapePrimitive {
            shape: Shape::Circle {
                center: Point::new(x, y),
                radius: r,
            },
            confidence: 0.9,
            area: 0.1,
        }
    }

    #[test]
    fn motion_similarity_is_symmetric() {
        let a = line(0.1, 0.2, 0.7, 0.3);
        let b = line(0.3, 0.9, 0.4, 0.1);
        assert_eq!(motion_similarity(&a, &b), motion_similarity(&b, &a));
        assert!((motion_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn perpendicular_lines_score_low() {
        let a = line(0.1, 0.5, 0.9, 0.5);
        let b = line(0.5, 0.1, 0.5, 0.9);
        let score = motion_similarity(&a, &b);
        assert!(score < 0.7, "score {score}");
    }

    #[test]
    fn shapes_only_match_their_own_kind() {
        let line_shape = ShapePrimitive {
            shape: Shape::Line {
                start: Point::new(0.0, 0.0),
                end: Point::new(1.0, 1.0),
            },
            confidence: 1.0,
            area: 0.0,
        };
        assert!(shape_similarity(&circle(0.5, 0.5, 0.2), &line_shape).is_none());
        let shifted = shape_similarity(&circle(0.4, 0.5, 0.2), &circle(0.5, 0.5, 0.2)).unwrap();
        assert!((shifted - (0.6 * 0.9 + 0.4)).abs() < 1e-5);
    }

    #[test]
    fn scan_pairs_respect_the_window() {
        assert_eq!(
            scan_pairs(4, 2),
            vec![(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]
        );
        assert!(scan_pairs(1, 4).is_empty());
    }

    fn candidate(from: usize, to: usize, confidence: f32) -> MatchCutCandidate {
        MatchCutCandidate {
            from,
            to,
            analysis: MatchCutAnalysis {
                source: ShotId::new(format!("s{from}")),
                target: ShotId::new(format!("s{to}")),
                match_type: MatchCutType::Shape,
                confidence,
                motion_matches: Vec::new(),
                shape_matches: Vec::new(),
                action_continuity: 0.0,
                histogram_correlation: 0.0,
            },
        }
    }

    #[test]
    fn recommends_skip_cuts_when_they_score_better() {
        let scan = MatchCutScan::from_candidates(vec![
            candidate(0, 2, 0.95),
            candidate(0, 1, 0.8),
            candidate(1, 2, 0.85),
        ]);
        assert_eq!(scan.recommendations.len(), 2);
        let first = &scan.recommendations[0];
        assert_eq!((first.from, first.to), (0, 2));
        assert!(first.is_skip());
        assert!(!scan.recommendations[1].is_skip());
    }
}
