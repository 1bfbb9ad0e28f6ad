//! Timeline page assembly
//!
//! Pulls four candidate feeds (circles, groups, public, connections), merges them
//! into one `(created_at desc, id desc)` window, then ranks that window by score.
//!
//! Pagination walks the merged stream, not the ranked order: a page is the next
//! `limit` posts after the cursor, so following the cursor chain never repeats
//! or skips a post. Ranking only reorders posts within a page.
//!
//! Every source is fetched with at least `limit` rows, so any row a source did not
//! return is older than the `limit`-th newest candidate and belongs to a later page.
//! Each query asks for one row beyond its batch; that extra row only tells whether
//! the source has anything left.

use crate::metrics::ASSEMBLY_DURATION;
use crate::models::{FeedPage, Post, ScoredCandidate, Viewer};
use crate::repository::{CandidateSource, InteractionRepository, PostRepository};
use crate::services::cursor::{newest_first, FeedCursor};
use crate::services::scoring::{ScoringContext, ScoringEngine};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct FeedAssembler {
    posts: Arc<dyn PostRepository>,
    interactions: Arc<dyn InteractionRepository>,
    scoring: ScoringEngine,
    interaction_window: Duration,
}

impl FeedAssembler {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        interactions: Arc<dyn InteractionRepository>,
        scoring: ScoringEngine,
        interaction_window_days: i64,
    ) -> Self {
        Self {
            posts,
            interactions,
            scoring,
            interaction_window: Duration::days(interaction_window_days),
        }
    }

    /// Candidate sources for `viewer` with their batch sizes
    pub fn plan(viewer: &Viewer, limit: usize) -> Vec<(CandidateSource, usize)> {
        vec![
            (CandidateSource::Circles(sorted(&viewer.circle_ids)), limit * 2),
            (CandidateSource::Groups(sorted(&viewer.group_ids)), limit * 2),
            (CandidateSource::Public, limit),
            (CandidateSource::Connections(sorted(&viewer.connection_ids)), limit),
        ]
    }

    /// Build one page of `viewer`'s timeline after `cursor`.
    ///
    /// Post repository failures are returned; interaction-history failures only
    /// drop that scoring signal.
    pub async fn assemble(
        &self,
        viewer: &Viewer,
        limit: usize,
        cursor: Option<FeedCursor>,
        now: DateTime<Utc>,
    ) -> Result<FeedPage> {
        let _timer = ASSEMBLY_DURATION.start_timer();
        let limit = limit.max(1);

        let mut candidates: HashMap<Uuid, Post> = HashMap::new();
        let mut saturated = false;

        for (source, batch) in Self::plan(viewer, limit) {
            if source.is_empty() {
                debug!(viewer_id = %viewer.id, source = source.name(), "Skipping empty source");
                continue;
            }

            let posts = self
                .posts
                .fetch_candidates(&source, cursor, batch + 1)
                .await?;
            if posts.len() > batch {
                saturated = true;
            }

            let fetched = posts.len();
            for post in posts {
                if !admissible(&post, viewer, cursor) {
                    warn!(
                        viewer_id = %viewer.id,
                        post_id = %post.id,
                        source = source.name(),
                        "Repository returned a post outside the page or visibility scope"
                    );
                    continue;
                }
                candidates.entry(post.id).or_insert(post);
            }

            debug!(
                viewer_id = %viewer.id,
                source = source.name(),
                fetched = fetched,
                "Collected timeline candidates"
            );
        }

        let mut window: Vec<Post> = candidates.into_values().collect();
        window.sort_by(newest_first);

        let total_candidates = window.len();
        let has_more = saturated || total_candidates > limit;
        window.truncate(limit);

        let next_cursor = if has_more {
            window.last().map(|post| FeedCursor::from_post(post).encode())
        } else {
            None
        };

        let interactions = self.interaction_counts(viewer, &window, now).await;
        let ctx = ScoringContext {
            viewer,
            interactions_by_author: &interactions,
            now,
        };

        let mut ranked: Vec<ScoredCandidate> = window
            .into_iter()
            .map(|post| {
                let score = self.scoring.score(&post, &ctx);
                ScoredCandidate { post, score }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| newest_first(&a.post, &b.post))
        });

        info!(
            viewer_id = %viewer.id,
            candidates = total_candidates,
            returned = ranked.len(),
            has_more = has_more,
            "Timeline page assembled"
        );

        Ok(FeedPage::new(ranked, next_cursor, has_more, limit, now))
    }

    async fn interaction_counts(
        &self,
        viewer: &Viewer,
        window: &[Post],
        now: DateTime<Utc>,
    ) -> HashMap<Uuid, u32> {
        let authors: Vec<Uuid> = window
            .iter()
            .map(|post| post.author_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if authors.is_empty() {
            return HashMap::new();
        }

        let since = now - self.interaction_window;
        match self
            .interactions
            .recent_interaction_counts(viewer.id, &authors, since)
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                warn!(
                    viewer_id = %viewer.id,
                    error = %e,
                    "Interaction history unavailable, scoring without it"
                );
                HashMap::new()
            }
        }
    }
}

fn admissible(post: &Post, viewer: &Viewer, cursor: Option<FeedCursor>) -> bool {
    cursor.map_or(true, |c| c.admits(post)) && post.is_visible_to(viewer)
}

fn sorted(ids: &HashSet<Uuid>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = ids.iter().copied().collect();
    ids.sort();
    ids
}
