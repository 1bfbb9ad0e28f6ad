use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Who may see a post beyond the author's connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Circles,
    Groups,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Circles => "circles",
            Visibility::Groups => "groups",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "circles" => Ok(Visibility::Circles),
            "groups" => Ok(Visibility::Groups),
            other => Err(format!("unknown visibility: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub circle_ids: Vec<Uuid>,
    #[serde(default)]
    pub group_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Likes plus comments
    #[serde(default)]
    pub engagement_count: u32,
}

impl Post {
    /// Whether `viewer` may see this post at all.
    ///
    /// Connections of the author see everything; otherwise the post must be public
    /// or share a circle/group tag matching its visibility.
    pub fn is_visible_to(&self, viewer: &Viewer) -> bool {
        if viewer.connection_ids.contains(&self.author_id) {
            return true;
        }
        match self.visibility {
            Visibility::Public => true,
            Visibility::Circles => self.circle_ids.iter().any(|c| viewer.circle_ids.contains(c)),
            Visibility::Groups => self.group_ids.iter().any(|g| viewer.group_ids.contains(g)),
        }
    }
}

/// Timeline reader with relationship state loaded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Viewer {
    pub id: Uuid,
    pub circle_ids: HashSet<Uuid>,
    pub group_ids: HashSet<Uuid>,
    /// Accepted connections only
    pub connection_ids: HashSet<Uuid>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl Viewer {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub post: Post,
    pub score: f64,
}

/// One page of a viewer's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub posts: Vec<ScoredCandidate>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    /// Page size the page was assembled for
    #[serde(default)]
    pub limit: usize,
    pub generated_at: DateTime<Utc>,
    /// Schema version for cache invalidation on structure changes
    #[serde(default)]
    pub schema_version: u32,
}

impl FeedPage {
    pub const CURRENT_SCHEMA_VERSION: u32 = 1;

    pub fn new(
        posts: Vec<ScoredCandidate>,
        next_cursor: Option<String>,
        has_more: bool,
        limit: usize,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            posts,
            next_cursor,
            has_more,
            limit,
            generated_at,
            schema_version: Self::CURRENT_SCHEMA_VERSION,
        }
    }

    pub fn empty(limit: usize, generated_at: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), None, false, limit, generated_at)
    }

    /// Check if cache is stale based on schema version
    pub fn is_stale(&self) -> bool {
        self.schema_version < Self::CURRENT_SCHEMA_VERSION
    }

    pub fn post_ids(&self) -> Vec<Uuid> {
        self.posts.iter().map(|c| c.post.id).collect()
    }
}
