//! Relevance scoring for timeline candidates
//!
//! Weighted sum of five signals:
//! - Age: `max(0, 100 - 2 * age_hours) * 0.30` (zero after 50 hours)
//! - Connection: flat +50 when the author is an accepted connection (unweighted)
//! - Engagement: `min(50, 2 * engagement_count) * 0.40`
//! - Relevance: `(10 * shared_circles + 15 * shared_groups) * 0.30` (no cap before weighting)
//! - Interaction history: `min(20, 2 * recent_interactions_with_author) * 0.20`
//!
//! The unweighted connection bonus and the uncapped relevance term are kept as-is
//! for compatibility with existing rankings.

use crate::models::{Post, Viewer};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::trace;
use uuid::Uuid;

/// Scoring constants. Immutable once the engine is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub age_weight: f64,
    pub age_max_points: f64,
    pub age_decay_per_hour: f64,
    pub connection_bonus: f64,
    pub engagement_weight: f64,
    pub engagement_points_each: f64,
    pub engagement_cap: f64,
    pub relevance_weight: f64,
    pub shared_circle_points: f64,
    pub shared_group_points: f64,
    pub interaction_weight: f64,
    pub interaction_points_each: f64,
    pub interaction_cap: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            age_weight: 0.30,
            age_max_points: 100.0,
            age_decay_per_hour: 2.0,
            connection_bonus: 50.0,
            engagement_weight: 0.40,
            engagement_points_each: 2.0,
            engagement_cap: 50.0,
            relevance_weight: 0.30,
            shared_circle_points: 10.0,
            shared_group_points: 15.0,
            interaction_weight: 0.20,
            interaction_points_each: 2.0,
            interaction_cap: 20.0,
        }
    }
}

/// Per-request inputs that are not part of the post itself
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub viewer: &'a Viewer,
    /// Viewer's engagements per author within the interaction window
    pub interactions_by_author: &'a HashMap<Uuid, u32>,
    pub now: DateTime<Utc>,
}

/// Weighted contribution of each signal
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreBreakdown {
    pub age: f64,
    pub connection: f64,
    pub engagement: f64,
    pub relevance: f64,
    pub interaction: f64,
    /// Sum rounded to 2 decimals
    pub total: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, post: &Post, ctx: &ScoringContext<'_>) -> f64 {
        self.score_breakdown(post, ctx).total
    }

    pub fn score_breakdown(&self, post: &Post, ctx: &ScoringContext<'_>) -> ScoreBreakdown {
        let w = &self.weights;

        // Whole hours, future timestamps count as brand new
        let age_hours = (ctx.now - post.created_at).num_hours().max(0) as f64;
        let age = (w.age_max_points - w.age_decay_per_hour * age_hours).max(0.0) * w.age_weight;

        let connection = if ctx.viewer.connection_ids.contains(&post.author_id) {
            w.connection_bonus
        } else {
            0.0
        };

        let engagement = (w.engagement_points_each * post.engagement_count as f64)
            .min(w.engagement_cap)
            * w.engagement_weight;

        let shared_circles = post
            .circle_ids
            .iter()
            .filter(|c| ctx.viewer.circle_ids.contains(c))
            .count() as f64;
        let shared_groups = post
            .group_ids
            .iter()
            .filter(|g| ctx.viewer.group_ids.contains(g))
            .count() as f64;
        let relevance = (w.shared_circle_points * shared_circles
            + w.shared_group_points * shared_groups)
            * w.relevance_weight;

        let recent = ctx
            .interactions_by_author
            .get(&post.author_id)
            .copied()
            .unwrap_or(0) as f64;
        let interaction =
            (w.interaction_points_each * recent).min(w.interaction_cap) * w.interaction_weight;

        let total = round2(age + connection + engagement + relevance + interaction);

        trace!(
            post_id = %post.id,
            age = age,
            connection = connection,
            engagement = engagement,
            relevance = relevance,
            interaction = interaction,
            score = total,
            "Timeline score computed"
        );

        ScoreBreakdown {
            age,
            connection,
            engagement,
            relevance,
            interaction,
            total,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
