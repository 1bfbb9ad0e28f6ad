//! In-process cache store
//!
//! Backed by a bounded `moka` cache with per-entry expiry, so expired pages and
//! index sets are evicted by the cache's housekeeping instead of lingering until
//! they are read again. Used in tests and as the degraded backend when Redis
//! cannot be reached at startup.

use crate::{CacheError, CacheMetrics, CacheResult, CacheStore};
use moka::future::Cache;
use moka::Expiry;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default bound on cached keys (pages plus index sets)
const DEFAULT_MAX_ENTRIES: u64 = 100_000;

#[derive(Debug, Clone)]
enum Value {
    Page(Arc<str>),
    Index(Arc<HashSet<String>>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    ttl: Duration,
    expires_at: Instant,
}

impl Entry {
    fn new(value: Value, ttl_secs: u64) -> Self {
        let ttl = Duration::from_secs(ttl_secs);
        Self {
            value,
            ttl,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Expires each entry after the TTL it was written with
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _now: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _now: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Memory-backed [`CacheStore`]
///
/// Only trailing-wildcard patterns (`prefix*`) are understood by
/// [`CacheStore::delete_by_pattern`], which is the only shape the key schema produces.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    cache: Cache<String, Entry>,
    metrics: CacheMetrics,
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding at most `max_entries` keys
    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryTtl)
            .build();

        Self {
            cache,
            metrics: CacheMetrics::new(),
        }
    }

    /// Number of keys held after pending evictions have run
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining TTL of a live key
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.cache
            .get(key)
            .await
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at - now)
    }

    async fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        self.cache.get(key).await.filter(|entry| entry.is_live(now))
    }

    async fn remove_live(&self, key: &str, now: Instant) -> bool {
        self.cache
            .remove(key)
            .await
            .map_or(false, |entry| entry.is_live(now))
    }

    fn wrong_type(&self, key: &str, expected: &str) -> CacheError {
        self.metrics.record_error(key, "wrong_type");
        CacheError::InvalidData(format!("{} does not hold {}", key, expected))
    }
}

fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait::async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self.live(key).await {
            Some(Entry {
                value: Value::Page(text),
                ..
            }) => {
                self.metrics.record_hit(key);
                Ok(Some(text.to_string()))
            }
            Some(_) => Err(self.wrong_type(key, "a page")),
            None => {
                self.metrics.record_miss(key);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let entry = Entry::new(Value::Page(Arc::from(value)), ttl_secs);
        self.cache.insert(key.to_string(), entry).await;
        self.metrics.record_write(key);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<usize> {
        let now = Instant::now();
        let mut deleted = 0;
        for key in keys {
            if self.remove_live(key, now).await {
                deleted += 1;
            }
        }
        if let Some(first) = keys.first() {
            self.metrics.record_invalidation(first, deleted);
        }
        Ok(deleted)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let now = Instant::now();
        let matching: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| matches_pattern(pattern, key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        let mut deleted = 0;
        for key in &matching {
            if self.remove_live(key, now).await {
                deleted += 1;
            }
        }

        debug!(pattern = %pattern, deleted = deleted, "In-memory pattern delete");
        self.metrics.record_invalidation(pattern, deleted);
        Ok(deleted)
    }

    async fn index_add(&self, index_key: &str, member: &str, ttl_secs: u64) -> CacheResult<()> {
        if let Some(Entry {
            value: Value::Page(_),
            ..
        }) = self.live(index_key).await
        {
            return Err(self.wrong_type(index_key, "an index"));
        }

        let member = member.to_string();
        self.cache
            .entry(index_key.to_string())
            .and_upsert_with(|existing| {
                let now = Instant::now();
                let mut members = match existing.map(|e| e.into_value()) {
                    Some(Entry {
                        value: Value::Index(members),
                        expires_at,
                        ..
                    }) if expires_at > now => members.as_ref().clone(),
                    _ => HashSet::new(),
                };
                members.insert(member);
                std::future::ready(Entry::new(Value::Index(Arc::new(members)), ttl_secs))
            })
            .await;
        Ok(())
    }

    async fn index_members(&self, index_key: &str) -> CacheResult<Vec<String>> {
        match self.live(index_key).await {
            Some(Entry {
                value: Value::Index(members),
                ..
            }) => {
                let mut members: Vec<String> = members.iter().cloned().collect();
                members.sort();
                Ok(members)
            }
            Some(_) => Err(self.wrong_type(index_key, "an index")),
            None => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
