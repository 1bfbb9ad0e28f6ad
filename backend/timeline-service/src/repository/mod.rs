//! Storage interfaces the timeline is built from
//!
//! Posts, relationships and engagement history are owned by other parts of the
//! platform; this service only reads them through these traits.

mod postgres;

pub use postgres::PostgresTimelineRepository;

use crate::models::{Post, Viewer};
use crate::services::cursor::FeedCursor;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// One of the four candidate feeds merged into a timeline page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSource {
    /// `circles` posts tagged with any of these circles
    Circles(Vec<Uuid>),
    /// `groups` posts tagged with any of these groups
    Groups(Vec<Uuid>),
    /// Every `public` post
    Public,
    /// Posts of any visibility written by these authors
    Connections(Vec<Uuid>),
}

impl CandidateSource {
    pub fn name(&self) -> &'static str {
        match self {
            CandidateSource::Circles(_) => "circles",
            CandidateSource::Groups(_) => "groups",
            CandidateSource::Public => "public",
            CandidateSource::Connections(_) => "connections",
        }
    }

    /// True when the source cannot match anything and need not be queried
    pub fn is_empty(&self) -> bool {
        match self {
            CandidateSource::Circles(ids)
            | CandidateSource::Groups(ids)
            | CandidateSource::Connections(ids) => ids.is_empty(),
            CandidateSource::Public => false,
        }
    }

    /// Whether `post` belongs to this source
    pub fn matches(&self, post: &Post) -> bool {
        use crate::models::Visibility;

        match self {
            CandidateSource::Circles(ids) => {
                post.visibility == Visibility::Circles
                    && post.circle_ids.iter().any(|c| ids.contains(c))
            }
            CandidateSource::Groups(ids) => {
                post.visibility == Visibility::Groups
                    && post.group_ids.iter().any(|g| ids.contains(g))
            }
            CandidateSource::Public => post.visibility == Visibility::Public,
            CandidateSource::Connections(ids) => ids.contains(&post.author_id),
        }
    }
}

#[async_trait::async_trait]
pub trait PostRepository: Send + Sync {
    /// Posts of `source` strictly after `before`, ordered `(created_at desc, id desc)`,
    /// at most `limit` rows
    async fn fetch_candidates(
        &self,
        source: &CandidateSource,
        before: Option<FeedCursor>,
        limit: usize,
    ) -> Result<Vec<Post>>;

    async fn find_by_id(&self, post_id: Uuid) -> Result<Option<Post>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RelationshipRepository: Send + Sync {
    async fn accepted_connection_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>>;

    async fn circle_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>>;

    async fn group_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>>;

    async fn last_activity_at(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>>;

    /// Union of the members of the given circles
    async fn circle_member_ids(&self, circle_ids: &[Uuid]) -> Result<HashSet<Uuid>>;

    /// Union of the members of the given groups
    async fn group_member_ids(&self, group_ids: &[Uuid]) -> Result<HashSet<Uuid>>;
}

#[async_trait::async_trait]
pub trait InteractionRepository: Send + Sync {
    /// Number of engagements `viewer_id` made on each author's posts since `since`.
    /// Authors without engagements may be omitted.
    async fn recent_interaction_counts(
        &self,
        viewer_id: Uuid,
        author_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, u32>>;
}

/// Load a viewer with all relationship state needed for ranking
pub async fn load_viewer(
    relationships: &dyn RelationshipRepository,
    user_id: Uuid,
) -> Result<Viewer> {
    let (connection_ids, circle_ids, group_ids, last_activity_at) = futures::try_join!(
        relationships.accepted_connection_ids(user_id),
        relationships.circle_ids(user_id),
        relationships.group_ids(user_id),
        relationships.last_activity_at(user_id),
    )?;

    Ok(Viewer {
        id: user_id,
        circle_ids,
        group_ids,
        connection_ids,
        last_activity_at,
    })
}
