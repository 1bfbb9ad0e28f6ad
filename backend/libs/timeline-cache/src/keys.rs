//! Timeline cache key schema
//!
//! Key format: v{VERSION}:{entity}:{viewer_id}[:{page}]
//!
//! Page keys embed the opaque cursor token, or `head` for the first page.
//! The per-viewer index lives under its own entity so that a pattern scan over
//! `timeline` never matches it.

use uuid::Uuid;

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Page marker used when no cursor is supplied
pub const HEAD_PAGE: &str = "head";

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Cached timeline page for a viewer
    /// Format: v1:timeline:{viewer_id}:{cursor|head}
    pub fn timeline_page(viewer_id: Uuid, cursor: Option<&str>) -> String {
        let page = match cursor {
            Some(token) if !token.is_empty() => token,
            _ => HEAD_PAGE,
        };
        format!("v{}:timeline:{}:{}", CACHE_VERSION, viewer_id, page)
    }

    /// Set of page keys written for a viewer
    /// Format: v1:timeline_index:{viewer_id}
    pub fn timeline_index(viewer_id: Uuid) -> String {
        format!("v{}:timeline_index:{}", CACHE_VERSION, viewer_id)
    }

    /// Pattern matching every cached page of a viewer
    pub fn timeline_pattern(viewer_id: Uuid) -> String {
        format!("v{}:timeline:{}:*", CACHE_VERSION, viewer_id)
    }

    /// Classify a key (or key pattern) for metric labels
    pub fn kind(key: &str) -> KeyKind {
        if key.ends_with('*') {
            return KeyKind::Pattern;
        }
        // Format: v{N}:{entity}:{viewer}[:{page}]
        let mut parts = key.splitn(4, ':');
        let _version = parts.next();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("timeline"), Some(_), Some(HEAD_PAGE)) => KeyKind::Head,
            (Some("timeline"), Some(_), Some(_)) => KeyKind::Cursor,
            (Some("timeline_index"), Some(_), None) => KeyKind::Index,
            _ => KeyKind::Other,
        }
    }
}

/// What a cache key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// First page of a viewer's timeline
    Head,
    /// Page reached through a cursor token
    Cursor,
    /// Per-viewer set of page keys
    Index,
    /// Wildcard pattern used by scan deletes
    Pattern,
    Other,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Head => "head",
            KeyKind::Cursor => "cursor",
            KeyKind::Index => "index",
            KeyKind::Pattern => "pattern",
            KeyKind::Other => "other",
        }
    }
}
