//! Timeline caching layer
//!
//! Provides the cache store used for assembled timeline pages:
//! - Versioned key schema (`v1:timeline:{viewer}:{page}`)
//! - Per-viewer secondary index so invalidation never scans the key space
//! - SCAN-based pattern delete as a fallback (no blocking KEYS)
//! - Redis and in-process backends behind one object-safe trait
//! - Metrics integration

mod error;
mod keys;
mod memory;
mod metrics;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, KeyKind, CACHE_VERSION, HEAD_PAGE};
pub use memory::InMemoryCacheStore;
pub use metrics::CacheMetrics;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

/// Default TTL values (seconds)
pub mod ttl {
    /// Viewer active within the activity window
    pub const ACTIVE_VIEWER: u64 = 900; // 15 minutes
    /// Viewer idle longer than the activity window
    pub const IDLE_VIEWER: u64 = 3600; // 1 hour
}

/// Core cache store operations
///
/// Values are opaque strings; typed access goes through [`get_json`] and [`put_json`].
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from cache
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value in cache with TTL
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> CacheResult<usize>;

    /// Delete every key matching a glob pattern
    async fn delete_by_pattern(&self, pattern: &str) -> CacheResult<usize>;

    /// Add a member to an index set and refresh the set's TTL
    async fn index_add(&self, index_key: &str, member: &str, ttl_secs: u64) -> CacheResult<()>;

    /// Read all members of an index set
    async fn index_members(&self, index_key: &str) -> CacheResult<Vec<String>>;

    /// Check that the backend answers
    async fn ping(&self) -> CacheResult<()>;
}

/// Read and deserialize a JSON value. Corrupted entries are deleted and reported as a miss.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> CacheResult<Option<T>> {
    let Some(data) = store.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_str::<T>(&data) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key = %key, error = %e, "Cache deserialization failed");
            CacheMetrics::new().record_error(key, "deserialize");
            if let Err(e) = store.delete(&[key.to_string()]).await {
                warn!(key = %key, error = %e, "Failed to drop corrupted cache entry");
            }
            Ok(None)
        }
    }
}

/// Serialize a value as JSON and store it with TTL
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> CacheResult<()> {
    let data = serde_json::to_string(value)?;
    store.put(key, &data, ttl_secs).await
}

/// Redis-backed cache store
#[derive(Clone)]
pub struct RedisCacheStore {
    redis: SharedRedis,
    metrics: CacheMetrics,
}

impl RedisCacheStore {
    pub fn new(redis: SharedRedis) -> Self {
        Self {
            redis,
            metrics: CacheMetrics::new(),
        }
    }

    /// Open a connection manager for the given URL
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(Arc::new(Mutex::new(manager))))
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.redis.lock().await;

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => {
                debug!(key = %key, "Cache hit");
                self.metrics.record_hit(key);
                Ok(Some(data))
            }
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss(key);
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Redis get error");
                self.metrics.record_error(key, "redis");
                Err(CacheError::Redis(e))
            }
        }
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| {
                self.metrics.record_error(key, "redis");
                CacheError::Redis(e)
            })?;

        debug!(key = %key, ttl = ttl_secs, "Cache set");
        self.metrics.record_write(key);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.redis.lock().await;
        let deleted: usize = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut *conn)
            .await
            .map_err(CacheError::Redis)?;

        debug!(requested = keys.len(), deleted = deleted, "Cache delete");
        self.metrics.record_invalidation(&keys[0], deleted);
        Ok(deleted)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let mut conn = self.redis.lock().await;
        let mut cursor: u64 = 0;
        let mut total_deleted = 0;

        loop {
            // SCAN is non-blocking unlike KEYS
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await
                .map_err(CacheError::Redis)?;

            if !keys.is_empty() {
                let mut pipe = Pipeline::new();
                for key in &keys {
                    pipe.del(key).ignore();
                }
                pipe.query_async::<_, ()>(&mut *conn)
                    .await
                    .map_err(CacheError::Redis)?;

                total_deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, deleted = total_deleted, "Cache scan delete");
        self.metrics.record_invalidation(pattern, total_deleted);
        Ok(total_deleted)
    }

    async fn index_add(&self, index_key: &str, member: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        let mut pipe = Pipeline::new();
        pipe.cmd("SADD").arg(index_key).arg(member).ignore();
        pipe.cmd("EXPIRE").arg(index_key).arg(ttl_secs).ignore();
        pipe.query_async::<_, ()>(&mut *conn)
            .await
            .map_err(|e| {
                self.metrics.record_error(index_key, "redis");
                CacheError::Redis(e)
            })?;
        Ok(())
    }

    async fn index_members(&self, index_key: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.redis.lock().await;
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(index_key)
            .query_async(&mut *conn)
            .await
            .map_err(CacheError::Redis)?;
        Ok(members)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        let reply: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| {
                warn!(error = %e, "Redis PING failed");
                CacheError::Redis(e)
            })?;

        if reply != "PONG" {
            return Err(CacheError::Unavailable(format!(
                "unexpected PING reply {:?}",
                reply
            )));
        }
        Ok(())
    }
}
