//! Opaque pagination cursor
//!
//! Token format: URL-safe base64 (no padding) of `{"v":1,"ts":<unix nanos>,"id":"<uuid>"}`.
//! Callers only ever see the token; anything that fails to decode is treated as
//! "start from the head of the timeline".

use crate::models::Post;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

const CURSOR_VERSION: u8 = 1;
const NANOS_PER_SEC: i64 = 1_000_000_000;

#[derive(Debug, Serialize, Deserialize)]
struct CursorToken {
    v: u8,
    ts: i64,
    id: Uuid,
}

/// Position in `(created_at desc, id desc)` order. Pages continue strictly after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at: DateTime<Utc>,
    pub post_id: Uuid,
}

impl FeedCursor {
    pub fn new(created_at: DateTime<Utc>, post_id: Uuid) -> Self {
        Self {
            created_at,
            post_id,
        }
    }

    pub fn from_post(post: &Post) -> Self {
        Self::new(post.created_at, post.id)
    }

    pub fn encode(&self) -> String {
        let token = CursorToken {
            v: CURSOR_VERSION,
            ts: self
                .created_at
                .timestamp_nanos_opt()
                .unwrap_or_else(|| self.created_at.timestamp() * NANOS_PER_SEC),
            id: self.post_id,
        };
        // Serializing three plain fields cannot fail
        let json = serde_json::to_vec(&token).unwrap_or_default();
        general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token; malformed or unknown-version tokens yield `None`
    pub fn decode(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        let bytes = general_purpose::URL_SAFE_NO_PAD.decode(token).ok()?;
        let parsed: CursorToken = serde_json::from_slice(&bytes).ok()?;
        if parsed.v != CURSOR_VERSION {
            return None;
        }

        let secs = parsed.ts.div_euclid(NANOS_PER_SEC);
        let nanos = parsed.ts.rem_euclid(NANOS_PER_SEC) as u32;
        let created_at = DateTime::from_timestamp(secs, nanos)?;
        Some(Self::new(created_at, parsed.id))
    }

    /// Decode an optional query parameter
    pub fn parse(token: Option<&str>) -> Option<Self> {
        token.and_then(Self::decode)
    }

    /// True when `post` sorts strictly after this cursor, i.e. belongs to a later page
    pub fn admits(&self, post: &Post) -> bool {
        post.created_at < self.created_at
            || (post.created_at == self.created_at && post.id < self.post_id)
    }
}

/// Pagination order: newest first, ties broken by larger id first
pub fn newest_first(a: &Post, b: &Post) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}
