//! Timeline page cache
//!
//! Wraps a [`CacheStore`] with timeline semantics: activity-based TTLs, a per-viewer
//! page index and fan-out invalidation when a post is published. Cache failures never
//! fail a request; they are logged and the caller falls back to direct assembly.

use crate::config::TimelineConfig;
use crate::metrics::INVALIDATED_VIEWERS;
use crate::models::{FeedPage, Post, Viewer, Visibility};
use crate::repository::RelationshipRepository;
use crate::services::cursor::FeedCursor;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use timeline_cache::{get_json, put_json, CacheKey, CacheResult, CacheStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// TTL selection for cached pages
#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicy {
    pub active_ttl_secs: u64,
    pub idle_ttl_secs: u64,
    pub activity_window: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            active_ttl_secs: timeline_cache::ttl::ACTIVE_VIEWER,
            idle_ttl_secs: timeline_cache::ttl::IDLE_VIEWER,
            activity_window: Duration::hours(24),
        }
    }
}

impl From<&TimelineConfig> for CachePolicy {
    fn from(config: &TimelineConfig) -> Self {
        Self {
            active_ttl_secs: config.active_ttl_secs,
            idle_ttl_secs: config.idle_ttl_secs,
            activity_window: Duration::hours(config.activity_window_hours),
        }
    }
}

impl CachePolicy {
    /// Short TTL for viewers active within the window, long TTL otherwise
    pub fn ttl_for(&self, viewer: &Viewer, now: DateTime<Utc>) -> u64 {
        match viewer.last_activity_at {
            Some(at) if now - at <= self.activity_window => self.active_ttl_secs,
            _ => self.idle_ttl_secs,
        }
    }

    /// TTL of the page index, which must outlive every page it lists
    pub fn index_ttl(&self) -> u64 {
        self.active_ttl_secs.max(self.idle_ttl_secs)
    }
}

/// Outcome of a publish fan-out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvalidationReport {
    pub viewers: usize,
    pub keys_deleted: usize,
    /// Relationship lookups or viewer invalidations that failed
    pub failures: usize,
}

pub struct TimelineCache {
    store: Arc<dyn CacheStore>,
    relationships: Arc<dyn RelationshipRepository>,
    policy: CachePolicy,
}

impl TimelineCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        relationships: Arc<dyn RelationshipRepository>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            store,
            relationships,
            policy,
        }
    }

    /// Round-trip to the backing store
    pub async fn ping(&self) -> CacheResult<()> {
        self.store.ping().await
    }

    fn page_key(viewer_id: Uuid, cursor: Option<&FeedCursor>) -> String {
        let token = cursor.map(FeedCursor::encode);
        CacheKey::timeline_page(viewer_id, token.as_deref())
    }

    /// Cached page for `viewer_id` at `cursor`, if present and current
    pub async fn get(&self, viewer_id: Uuid, cursor: Option<&FeedCursor>) -> Option<FeedPage> {
        let key = Self::page_key(viewer_id, cursor);

        match get_json::<FeedPage>(self.store.as_ref(), &key).await {
            Ok(Some(page)) if page.is_stale() => {
                debug!(key = %key, version = page.schema_version, "Dropping stale timeline page");
                if let Err(e) = self.store.delete(&[key.clone()]).await {
                    warn!(key = %key, error = %e, "Failed to delete stale timeline page");
                }
                None
            }
            Ok(Some(page)) => {
                debug!(key = %key, posts = page.posts.len(), "Timeline cache hit");
                Some(page)
            }
            Ok(None) => {
                debug!(key = %key, "Timeline cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Timeline cache read failed");
                None
            }
        }
    }

    /// Store a page and record it in the viewer's index. Returns whether it was cached.
    pub async fn put(
        &self,
        viewer: &Viewer,
        cursor: Option<&FeedCursor>,
        page: &FeedPage,
        now: DateTime<Utc>,
    ) -> bool {
        let key = Self::page_key(viewer.id, cursor);
        let ttl = self.policy.ttl_for(viewer, now);

        if let Err(e) = put_json(self.store.as_ref(), &key, page, ttl).await {
            warn!(key = %key, error = %e, "Timeline cache write failed");
            return false;
        }

        let index = CacheKey::timeline_index(viewer.id);
        if let Err(e) = self
            .store
            .index_add(&index, &key, self.policy.index_ttl())
            .await
        {
            // An unindexed page would survive invalidation, so drop it
            warn!(key = %key, error = %e, "Timeline index write failed");
            if let Err(e) = self.store.delete(&[key.clone()]).await {
                warn!(
                    key = %key,
                    error = %e,
                    "Failed to drop unindexed timeline page, it lives until its TTL"
                );
            }
            return false;
        }

        debug!(viewer_id = %viewer.id, ttl_secs = ttl, "Timeline page cached");
        true
    }

    /// Remove every cached page of `viewer_id`. Returns the number of keys removed.
    pub async fn invalidate(&self, viewer_id: Uuid) -> usize {
        match self.try_invalidate(viewer_id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(viewer_id = %viewer_id, error = %e, "Timeline invalidation failed");
                0
            }
        }
    }

    async fn try_invalidate(&self, viewer_id: Uuid) -> CacheResult<usize> {
        let index = CacheKey::timeline_index(viewer_id);

        match self.store.index_members(&index).await {
            Ok(mut keys) => {
                keys.push(index);
                let deleted = self.store.delete(&keys).await?;
                debug!(viewer_id = %viewer_id, deleted = deleted, "Timeline pages invalidated");
                Ok(deleted)
            }
            Err(e) => {
                warn!(
                    viewer_id = %viewer_id,
                    error = %e,
                    "Timeline index unreadable, falling back to pattern delete"
                );
                self.store
                    .delete_by_pattern(&CacheKey::timeline_pattern(viewer_id))
                    .await
            }
        }
    }

    /// Viewers whose cached timeline may now be missing `post`.
    ///
    /// Circle and group members always qualify; the author's accepted connections
    /// only for public posts. Failed lookups are counted and skipped.
    pub async fn eligible_viewers(&self, post: &Post) -> (HashSet<Uuid>, usize) {
        let mut viewers = HashSet::new();
        let mut failures = 0;

        if !post.circle_ids.is_empty() {
            match self.relationships.circle_member_ids(&post.circle_ids).await {
                Ok(members) => viewers.extend(members),
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "Failed to load circle members");
                    failures += 1;
                }
            }
        }

        if !post.group_ids.is_empty() {
            match self.relationships.group_member_ids(&post.group_ids).await {
                Ok(members) => viewers.extend(members),
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "Failed to load group members");
                    failures += 1;
                }
            }
        }

        if post.visibility == Visibility::Public {
            match self
                .relationships
                .accepted_connection_ids(post.author_id)
                .await
            {
                Ok(connections) => viewers.extend(connections),
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "Failed to load author connections");
                    failures += 1;
                }
            }
        }

        (viewers, failures)
    }

    /// Invalidate the timelines of every viewer eligible to see `post`
    pub async fn invalidate_for_new_post(&self, post: &Post) -> InvalidationReport {
        let (viewers, mut failures) = self.eligible_viewers(post).await;
        let mut keys_deleted = 0;

        for viewer_id in &viewers {
            match self.try_invalidate(*viewer_id).await {
                Ok(deleted) => keys_deleted += deleted,
                Err(e) => {
                    warn!(viewer_id = %viewer_id, post_id = %post.id, error = %e, "Timeline invalidation failed");
                    failures += 1;
                }
            }
        }

        INVALIDATED_VIEWERS.inc_by(viewers.len() as u64);
        info!(
            post_id = %post.id,
            viewers = viewers.len(),
            keys_deleted = keys_deleted,
            failures = failures,
            "Invalidated timelines for new post"
        );

        InvalidationReport {
            viewers: viewers.len(),
            keys_deleted,
            failures,
        }
    }
}
