//! Timeline facade used by the HTTP layer
//!
//! Cache-aside over [`FeedAssembler`]: a cached page is served as-is, otherwise the
//! page is assembled, cached and returned. Cache problems never surface to callers.

use crate::cache::{CachePolicy, TimelineCache};
use crate::config::TimelineConfig;
use crate::error::{AppError, Result};
use crate::jobs::InvalidationDispatcher;
use crate::metrics;
use crate::models::FeedPage;
use crate::repository::{
    load_viewer, InteractionRepository, PostRepository, RelationshipRepository,
};
use crate::services::assembler::FeedAssembler;
use crate::services::cursor::FeedCursor;
use crate::services::scoring::ScoringEngine;
use chrono::Utc;
use std::sync::Arc;
use timeline_cache::CacheStore;
use tracing::{debug, info};
use uuid::Uuid;

pub struct TimelineService {
    posts: Arc<dyn PostRepository>,
    relationships: Arc<dyn RelationshipRepository>,
    assembler: FeedAssembler,
    cache: Arc<TimelineCache>,
    dispatcher: InvalidationDispatcher,
    config: TimelineConfig,
}

impl TimelineService {
    /// Wire the service and start its invalidation worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        posts: Arc<dyn PostRepository>,
        relationships: Arc<dyn RelationshipRepository>,
        interactions: Arc<dyn InteractionRepository>,
        store: Arc<dyn CacheStore>,
        config: TimelineConfig,
    ) -> Self {
        let cache = Arc::new(TimelineCache::new(
            store,
            relationships.clone(),
            CachePolicy::from(&config),
        ));
        let (dispatcher, _worker) =
            InvalidationDispatcher::spawn(cache.clone(), config.invalidation_queue);
        let assembler = FeedAssembler::new(
            posts.clone(),
            interactions,
            ScoringEngine::default(),
            config.interaction_window_days,
        );

        Self {
            posts,
            relationships,
            assembler,
            cache,
            dispatcher,
            config,
        }
    }

    pub fn cache(&self) -> &TimelineCache {
        &self.cache
    }

    /// One page of `viewer_id`'s timeline.
    ///
    /// `limit` is clamped to `[1, max_limit]`; an undecodable cursor reads from the head.
    pub async fn get_timeline(
        &self,
        viewer_id: Uuid,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<FeedPage> {
        let limit = self.config.clamp_limit(limit);
        let cursor = FeedCursor::parse(cursor);

        if let Some(page) = self.cache.get(viewer_id, cursor.as_ref()).await {
            if page.limit == limit {
                metrics::record_request("cache");
                return Ok(page);
            }
            debug!(
                viewer_id = %viewer_id,
                cached_limit = page.limit,
                limit = limit,
                "Cached page built for another page size"
            );
        }

        let now = Utc::now();
        let viewer = load_viewer(self.relationships.as_ref(), viewer_id).await?;
        let page = self.assembler.assemble(&viewer, limit, cursor, now).await?;

        self.cache.put(&viewer, cursor.as_ref(), &page, now).await;
        metrics::record_request("assembled");

        Ok(page)
    }

    /// Drop every cached page of `viewer_id` and rebuild the head page
    pub async fn refresh_timeline(&self, viewer_id: Uuid) -> Result<FeedPage> {
        let removed = self.cache.invalidate(viewer_id).await;
        info!(viewer_id = %viewer_id, removed = removed, "Timeline refresh requested");

        self.get_timeline(viewer_id, None, None).await
    }

    /// Queue cache invalidation for a newly published post.
    ///
    /// Returns whether the notification was queued; a dropped notification is not an
    /// error since the affected pages expire on their own.
    pub async fn post_published(&self, post_id: Uuid) -> Result<bool> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        Ok(self.dispatcher.dispatch(post))
    }
}
