//! PostgreSQL implementation of the timeline repositories
//!
//! Expected tables:
//! - `posts (id, user_id, content, visibility, circle_ids uuid[], group_ids uuid[], created_at, deleted_at)`
//! - `post_engagements (post_id, user_id, created_at)` (likes and comments)
//! - `connections (user_id, connected_user_id, status)`
//! - `circle_memberships (circle_id, user_id)`, `group_memberships (group_id, user_id)`
//! - `users (id, last_activity_at)`

use super::{CandidateSource, InteractionRepository, PostRepository, RelationshipRepository};
use crate::models::{Post, Visibility};
use crate::services::cursor::FeedCursor;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

const POST_COLUMNS: &str = r#"
    SELECT p.id, p.user_id, p.content, p.visibility,
           COALESCE(p.circle_ids, '{}') AS circle_ids,
           COALESCE(p.group_ids, '{}') AS group_ids,
           p.created_at,
           (SELECT COUNT(*) FROM post_engagements e WHERE e.post_id = p.id) AS engagement_count
    FROM posts p
"#;

/// Rows strictly after the cursor in `(created_at desc, id desc)` order. `$1`/`$2` may be NULL.
const AFTER_CURSOR: &str = "($1::timestamptz IS NULL OR (p.created_at, p.id) < ($1, $2))";

#[derive(Debug, FromRow)]
struct PostRow {
    id: Uuid,
    user_id: Uuid,
    content: String,
    visibility: String,
    circle_ids: Vec<Uuid>,
    group_ids: Vec<Uuid>,
    created_at: DateTime<Utc>,
    engagement_count: i64,
}

impl TryFrom<PostRow> for Post {
    type Error = anyhow::Error;

    fn try_from(row: PostRow) -> Result<Self> {
        let visibility = row
            .visibility
            .parse::<Visibility>()
            .map_err(|e| anyhow::anyhow!("post {}: {}", row.id, e))?;

        Ok(Post {
            id: row.id,
            author_id: row.user_id,
            content: row.content,
            visibility,
            circle_ids: row.circle_ids,
            group_ids: row.group_ids,
            created_at: row.created_at,
            engagement_count: u32::try_from(row.engagement_count.max(0)).unwrap_or(u32::MAX),
        })
    }
}

/// PostgreSQL repository backing posts, relationships and engagement history
#[derive(Clone)]
pub struct PostgresTimelineRepository {
    pool: PgPool,
}

impl PostgresTimelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("PostgreSQL health check failed")?;
        Ok(())
    }

    fn candidate_sql(source: &CandidateSource) -> String {
        let filter = match source {
            CandidateSource::Circles(_) => "p.visibility = 'circles' AND p.circle_ids && $4",
            CandidateSource::Groups(_) => "p.visibility = 'groups' AND p.group_ids && $4",
            CandidateSource::Public => "p.visibility = 'public'",
            CandidateSource::Connections(_) => "p.user_id = ANY($4)",
        };

        format!(
            "{} WHERE p.deleted_at IS NULL AND {} AND {} ORDER BY p.created_at DESC, p.id DESC LIMIT $3",
            POST_COLUMNS, filter, AFTER_CURSOR
        )
    }

    async fn member_ids(&self, sql: &str, ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows = sqlx::query_as::<_, (Uuid,)>(sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load members")?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait::async_trait]
impl PostRepository for PostgresTimelineRepository {
    async fn fetch_candidates(
        &self,
        source: &CandidateSource,
        before: Option<FeedCursor>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        if source.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let sql = Self::candidate_sql(source);
        let query = sqlx::query_as::<_, PostRow>(&sql)
            .bind(before.map(|c| c.created_at))
            .bind(before.map(|c| c.post_id))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let query = match source {
            CandidateSource::Circles(ids)
            | CandidateSource::Groups(ids)
            | CandidateSource::Connections(ids) => query.bind(ids.as_slice()),
            CandidateSource::Public => query,
        };

        let rows = query
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to load {} posts", source.name()))?;

        debug!(source = source.name(), rows = rows.len(), "Fetched timeline candidates");

        rows.into_iter().map(Post::try_from).collect()
    }

    async fn find_by_id(&self, post_id: Uuid) -> Result<Option<Post>> {
        let sql = format!("{} WHERE p.id = $1 AND p.deleted_at IS NULL", POST_COLUMNS);
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load post")?;

        row.map(Post::try_from).transpose()
    }
}

#[async_trait::async_trait]
impl RelationshipRepository for PostgresTimelineRepository {
    async fn accepted_connection_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let rows = sqlx::query_as::<_, (Uuid,)>(
            r#"
            SELECT CASE WHEN user_id = $1 THEN connected_user_id ELSE user_id END
            FROM connections
            WHERE (user_id = $1 OR connected_user_id = $1)
              AND status = 'accepted'
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load accepted connections")?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn circle_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let rows = sqlx::query_as::<_, (Uuid,)>(
            "SELECT circle_id FROM circle_memberships WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load circle memberships")?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn group_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let rows = sqlx::query_as::<_, (Uuid,)>(
            "SELECT group_id FROM group_memberships WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load group memberships")?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn last_activity_at(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query_as::<_, (Option<DateTime<Utc>>,)>(
            "SELECT last_activity_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load last activity")?;

        Ok(row.and_then(|(at,)| at))
    }

    async fn circle_member_ids(&self, circle_ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        self.member_ids(
            "SELECT DISTINCT user_id FROM circle_memberships WHERE circle_id = ANY($1)",
            circle_ids,
        )
        .await
    }

    async fn group_member_ids(&self, group_ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        self.member_ids(
            "SELECT DISTINCT user_id FROM group_memberships WHERE group_id = ANY($1)",
            group_ids,
        )
        .await
    }
}

#[async_trait::async_trait]
impl InteractionRepository for PostgresTimelineRepository {
    async fn recent_interaction_counts(
        &self,
        viewer_id: Uuid,
        author_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, u32>> {
        if author_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT p.user_id, COUNT(*)
            FROM post_engagements e
            JOIN posts p ON p.id = e.post_id
            WHERE e.user_id = $1
              AND p.user_id = ANY($2)
              AND e.created_at >= $3
            GROUP BY p.user_id
            "#,
        )
        .bind(viewer_id)
        .bind(author_ids)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load interaction history")?;

        Ok(rows
            .into_iter()
            .map(|(author, count)| (author, u32::try_from(count.max(0)).unwrap_or(u32::MAX)))
            .collect())
    }
}
