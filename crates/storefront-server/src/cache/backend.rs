//! Cache store abstraction and the local / Redis backends.

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RedisConfig;

/// Errors from a cache store. The read-through accessor never surfaces them.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("cache unavailable: {message}")]
    Unavailable { message: String },

    /// The operation did not finish within its budget.
    #[error("cache operation timed out after {}ms", elapsed.as_millis())]
    Timeout { elapsed: Duration },

    /// The backend rejected the command.
    #[error("cache backend error: {message}")]
    Backend { message: String },
}

impl CacheError {
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Key-value store with TTL expiry.
///
/// Expiry belongs to the store: callers only ever read, or write with a TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the bytes stored under `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
}

/// Shared cache store.
pub type DynCacheStore = Arc<dyn CacheStore>;

/// A cached entry with TTL support.
///
/// The data is wrapped in `Arc` so hits hand out the bytes without copying.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Cache backend: in-process only, or Redis with an in-process tier in front.
///
/// | Mode  | GET                                  | SET                  |
/// |-------|--------------------------------------|----------------------|
/// | Local | DashMap                              | DashMap              |
/// | Redis | DashMap, then Redis (`GET` + `PTTL`) | DashMap + `SET … EX` |
#[derive(Clone)]
pub enum CacheBackend {
    /// Single instance: local DashMap only
    Local(Arc<DashMap<String, CachedEntry>>),

    /// Shared: Redis plus a short-lived local tier
    Redis {
        redis: Pool,
        local: Arc<DashMap<String, CachedEntry>>,
        local_ttl: Duration,
    },
}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBackend")
            .field("stats", &self.stats())
            .finish()
    }
}

impl CacheBackend {
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    pub fn new_redis(redis_pool: Pool, local_ttl: Duration) -> Self {
        CacheBackend::Redis {
            redis: redis_pool,
            local: Arc::new(DashMap::new()),
            local_ttl,
        }
    }

    fn local(&self) -> &Arc<DashMap<String, CachedEntry>> {
        match self {
            CacheBackend::Local(map) => map,
            CacheBackend::Redis { local, .. } => local,
        }
    }

    /// Drops expired local entries. Expired entries are also skipped on read,
    /// so this only reclaims memory.
    pub fn purge_expired(&self) -> usize {
        let local = self.local();
        let before = local.len();
        local.retain(|_, entry| !entry.is_expired());
        before - local.len()
    }

    pub fn stats(&self) -> CacheStats {
        match self {
            CacheBackend::Local(map) => CacheStats {
                l1_entries: map.len(),
                mode: "local".to_string(),
            },
            CacheBackend::Redis { local, .. } => CacheStats {
                l1_entries: local.len(),
                mode: "redis".to_string(),
            },
        }
    }

    /// Check if Redis is reachable.
    pub async fn is_redis_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => false,
            CacheBackend::Redis { redis, .. } => redis.get().await.is_ok(),
        }
    }
}

fn local_get(map: &DashMap<String, CachedEntry>, key: &str) -> Option<Arc<Vec<u8>>> {
    let entry = map.get(key)?;
    if entry.is_expired() {
        drop(entry);
        map.remove_if(key, |_, e| e.is_expired());
        return None;
    }
    Some(Arc::clone(&entry.data))
}

/// How long a value read from Redis may stay in the local tier: never past
/// the key's own expiry. `remaining_ms` is the `PTTL` reply, `-1` meaning the
/// key has no expiry.
fn l1_ttl(remaining_ms: i64, local_ttl: Duration) -> Option<Duration> {
    match remaining_ms {
        -1 => Some(local_ttl),
        ms if ms > 0 => Some(local_ttl.min(Duration::from_millis(ms.unsigned_abs()))),
        _ => None,
    }
}

#[async_trait]
impl CacheStore for CacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        match self {
            CacheBackend::Local(map) => Ok(local_get(map, key)),
            CacheBackend::Redis {
                redis,
                local,
                local_ttl,
            } => {
                if let Some(data) = local_get(local, key) {
                    tracing::trace!(key = %key, "cache hit (L1)");
                    return Ok(Some(data));
                }

                let mut conn = redis
                    .get()
                    .await
                    .map_err(|e| CacheError::unavailable(e.to_string()))?;
                let (value, remaining_ms): (Option<Vec<u8>>, i64) = redis::pipe()
                    .atomic()
                    .get(key)
                    .pttl(key)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| CacheError::backend(e.to_string()))?;

                let Some(data) = value else {
                    return Ok(None);
                };
                let entry = CachedEntry::new(data, *local_ttl);
                let data = Arc::clone(&entry.data);
                if let Some(ttl) = l1_ttl(remaining_ms, *local_ttl) {
                    local.insert(key.to_string(), CachedEntry { ttl, ..entry });
                }
                Ok(Some(data))
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
                Ok(())
            }
            CacheBackend::Redis {
                redis,
                local,
                local_ttl,
            } => {
                // SET EX rejects 0.
                let ttl_secs = ttl.as_secs().max(1);
                let mut conn = redis
                    .get()
                    .await
                    .map_err(|e| CacheError::unavailable(e.to_string()))?;
                conn.set_ex::<_, _, ()>(key, value.as_slice(), ttl_secs)
                    .await
                    .map_err(|e| CacheError::backend(e.to_string()))?;

                local.insert(key.to_string(), CachedEntry::new(value, ttl.min(*local_ttl)));
                Ok(())
            }
        }
    }
}

/// Cache statistics (local tier only).
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub l1_entries: usize,
    pub mode: String,
}

/// Create a cache backend based on configuration.
///
/// Redis disabled, or unreachable at startup, yields a local-only backend so
/// the server still starts.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let timeout = Duration::from_millis(config.timeout_ms);
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return CacheBackend::new_local();
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            CacheBackend::new_redis(pool, config.local_ttl())
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local cache."
            );
            CacheBackend::new_local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_get_set() {
        let cache = CacheBackend::new_local();
        assert!(cache.get("k").await.unwrap().is_none());

        cache
            .set("k", b"v1".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("k", b"v2".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(Arc::new(b"v2".to_vec())));

        let stats = cache.stats();
        assert_eq!(stats.mode, "local");
        assert_eq!(stats.l1_entries, 1);
    }

    #[tokio::test]
    async fn test_local_expiry() {
        let cache = CacheBackend::new_local();
        cache
            .set("short", b"v".to_vec(), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(cache.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("short").await.unwrap().is_none());
        assert_eq!(cache.stats().l1_entries, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = CacheBackend::new_local();
        cache
            .set("a", b"v".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        cache
            .set("b", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().l1_entries, 1);
    }

    #[test]
    fn test_l1_ttl_never_outlives_redis() {
        let local_ttl = Duration::from_secs(5);
        assert_eq!(l1_ttl(60_000, local_ttl), Some(local_ttl));
        assert_eq!(l1_ttl(1_200, local_ttl), Some(Duration::from_millis(1_200)));
        assert_eq!(l1_ttl(-1, local_ttl), Some(local_ttl));
        // Expired or deleted between GET and PTTL.
        assert_eq!(l1_ttl(-2, local_ttl), None);
        assert_eq!(l1_ttl(0, local_ttl), None);
    }

    #[tokio::test]
    async fn test_disabled_redis_falls_back_to_local() {
        let cache = create_cache_backend(&RedisConfig::default()).await;
        assert_eq!(cache.stats().mode, "local");
        assert!(!cache.is_redis_available().await);
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_local() {
        let config = RedisConfig {
            enabled: true,
            url: "redis://127.0.0.1:1".to_string(),
            timeout_ms: 200,
            ..RedisConfig::default()
        };
        let cache = create_cache_backend(&config).await;
        assert_eq!(cache.stats().mode, "local");
    }
}
