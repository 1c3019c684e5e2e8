use serde::{Deserialize, Serialize};

use crate::{
    config::PortalMatchConfig,
    features::{geometry::clamp_unit, Portal, PortalKind},
    vision::TransitionMask,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalTransitionStyle {
    ZoomThrough,
    CrossFade,
    Spiral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortalMatch {
    pub portal_a: Portal,
    pub portal_b: Portal,
    pub alignment: f32,
    pub size_compatibility: f32,
    pub style: PortalTransitionStyle,
    pub score: f32,
}

impl PortalMatch {
    pub fn new(portal_a: Portal, portal_b: Portal, config: &PortalMatchConfig) -> Self {
        let alignment = 1.0 - portal_a.center.distance(&portal_b.center).min(1.0);
        let (small, large) = if portal_a.area < portal_b.area {
            (portal_a.area, portal_b.area)
        } else {
            (portal_b.area, portal_a.area)
        };
        let size_compatibility = if large <= f32::EPSILON { 0.0 } else { small / large };

        let style = if portal_a.kind == PortalKind::Circle && portal_b.kind == PortalKind::Circle {
            PortalTransitionStyle::ZoomThrough
        } else if alignment > config.cross_fade_alignment {
            PortalTransitionStyle::CrossFade
        } else {
            PortalTransitionStyle::Spiral
        };

        let score = 0.3 * portal_a.quality_score
            + 0.3 * portal_b.quality_score
            + 0.2 * alignment
            + 0.2 * size_compatibility;

        Self {
            portal_a,
            portal_b,
            alignment: clamp_unit(alignment),
            size_compatibility: clamp_unit(size_compatibility),
            style,
            score: clamp_unit(score),
        }
    }

    /// Feathered compositing mask: the outgoing shot's portal opens onto the
    /// incoming shot.
    pub fn mask(&self, config: &PortalMatchConfig) -> TransitionMask {
        let portal = self.portal_a;
        let sigma = config.feather_fraction * config.mask_width.min(config.mask_height) as f32;
        TransitionMask::from_fn(config.mask_width, config.mask_height, |x, y| {
            if portal.outline_radius(x, y) <= 1.0 {
                1.0
            } else {
                0.0
            }
        })
        .feathered(sigma)
    }
}

/// Every portal of `a` crossed with every portal of `b`, keeping scores
/// above `config.min_score`, best first.
pub fn match_portals(a: &[Portal], b: &[Portal], config: &PortalMatchConfig) -> Vec<PortalMatch> {
    let mut matches: Vec<PortalMatch> = a
        .iter()
        .flat_map(|pa| b.iter().map(move |pb| PortalMatch::new(*pa, *pb, config)))
        .filter(|m| m.score > config.min_score)
        .collect();
    matches.sort_by(|x, y| y.score.total_cmp(&x.score));
    matches
}
