//! Fingerprint-keyed result cache.
//!
//! Every spreadsheet function stores its serialized result under a request
//! fingerprint for a fixed TTL. This service wraps the configured
//! [`CacheRepository`] and adds:
//! 1. Degraded reads - a failing backend is logged and treated as a miss
//! 2. JSON (de)serialization of cached values
//! 3. Hit/miss accounting per function tag

use crate::domain::CacheRepository;
use anyhow::{Context, Result};
use metrics::counter;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

/// Lifetime of a cached function result when no other TTL is given.
pub const DEFAULT_TTL_SECS: u64 = 600;

/// Per-tag cache counters
#[derive(Debug, Default)]
struct TagCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache counters for one function tag
#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct TagStats {
    pub hits: u64,
    pub misses: u64,
    /// Total number of lookups for this tag
    pub requests: u64,
}

/// Cache statistics
#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct CacheStats {
    /// Number of requests served from cache
    pub cache_hits: u64,
    /// Number of lookups that went to the upstream
    pub cache_misses: u64,
    pub default_ttl_secs: u64,
    pub tags: BTreeMap<String, TagStats>,
}

pub struct CacheService {
    store: Arc<dyn CacheRepository>,
    default_ttl_secs: u64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    tag_stats: Mutex<HashMap<String, TagCacheStats>>,
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheRepository>, default_ttl_secs: u64) -> Self {
        Self {
            store,
            default_ttl_secs,
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            tag_stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    fn record(&self, tag: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        counter!("cache_lookups_total", "tag" => tag.to_string(), "result" => result).increment(1);

        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut stats) = self.tag_stats.lock() {
            let tag_stats = stats.entry(tag.to_string()).or_default();
            if hit {
                tag_stats.hits.fetch_add(1, Ordering::Relaxed);
            } else {
                tag_stats.misses.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            warn!("Failed to acquire lock for tag stats (mutex poisoned)");
        }
    }

    /// Raw lookup. Never fails: backend errors are logged and read as absent.
    pub async fn cache_get(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                error!("Cache read failed for {}: {:#}", key, e);
                None
            }
        }
    }

    /// Raw write, overwriting any previous value. Uses the default TTL when
    /// `ttl_secs` is `None`.
    pub async fn cache_put(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let ttl = ttl_secs.unwrap_or(self.default_ttl_secs);
        self.store
            .set(key, value, ttl)
            .await
            .with_context(|| format!("Failed to write cache entry {}", key))
    }

    /// Look up and deserialize a cached value, counting the lookup under `tag`.
    /// An entry that no longer parses counts as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, tag: &str, key: &str) -> Option<T> {
        let parsed = match self.cache_get(key).await {
            Some(cached) => match serde_json::from_str::<T>(&cached) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Ignoring unparsable cache entry for {}: {}", tag, e);
                    None
                }
            },
            None => None,
        };

        self.record(tag, parsed.is_some());
        if parsed.is_some() {
            debug!("Cache hit: {} ({})", tag, key);
        } else {
            info!("Cache miss: {} ({})", tag, key);
        }
        parsed
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        self.cache_put(key, &json, ttl_secs).await
    }

    /// Return the cached value for `key`, or run `fetcher` and cache its result.
    ///
    /// Fetcher errors propagate and nothing is written.
    pub async fn get_or_fetch<T, F, Fut>(&self, tag: &str, key: &str, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get_json::<T>(tag, key).await {
            return Ok(cached);
        }

        let value = fetcher().await?;
        self.put_json(key, &value, None).await?;
        Ok(value)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut tags = BTreeMap::new();
        match self.tag_stats.lock() {
            Ok(map) => {
                for (tag, stats) in map.iter() {
                    let hits = stats.hits.load(Ordering::Relaxed);
                    let misses = stats.misses.load(Ordering::Relaxed);
                    tags.insert(
                        tag.clone(),
                        TagStats {
                            hits,
                            misses,
                            requests: hits + misses,
                        },
                    );
                }
            }
            Err(_) => {
                warn!("Failed to acquire lock for tag stats (mutex poisoned), returning totals only");
            }
        }

        CacheStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            default_ttl_secs: self.default_ttl_secs,
            tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockCacheRepository;
    use crate::infrastructure::InMemoryCache;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_get_or_fetch_caches_result() {
        let service = CacheService::new(Arc::new(InMemoryCache::new()), DEFAULT_TTL_SECS);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Vec<Vec<f64>> = service
                .get_or_fetch("GECKOPRICE", "key", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![vec![1.5]])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![vec![1.5]]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = service.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.tags["GECKOPRICE"].requests, 2);
    }

    #[tokio::test]
    async fn test_fetch_error_is_not_cached() {
        let service = CacheService::new(Arc::new(InMemoryCache::new()), DEFAULT_TTL_SECS);

        let result: Result<String> = service
            .get_or_fetch("TAG", "key", || async { anyhow::bail!("upstream down") })
            .await;
        assert!(result.is_err());
        assert!(service.cache_get("key").await.is_none());
    }

    #[tokio::test]
    async fn test_backend_read_failure_is_a_miss() {
        let mut store = MockCacheRepository::new();
        store
            .expect_get()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));
        store.expect_set().returning(|_, _, _| Ok(()));
        let service = CacheService::new(Arc::new(store), DEFAULT_TTL_SECS);

        let value: String = service
            .get_or_fetch("TAG", "key", || async { Ok("fresh".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "fresh");
    }

    #[tokio::test]
    async fn test_backend_write_failure_propagates() {
        let mut store = MockCacheRepository::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_set()
            .returning(|_, _, _| Err(anyhow::anyhow!("read only replica")));
        let service = CacheService::new(Arc::new(store), DEFAULT_TTL_SECS);

        assert!(service.cache_put("key", "value", None).await.is_err());
    }

    #[tokio::test]
    async fn test_default_ttl_is_applied() {
        let mut store = MockCacheRepository::new();
        store
            .expect_set()
            .withf(|key, _, ttl| key == "key" && *ttl == 600)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let service = CacheService::new(Arc::new(store), 600);

        service.cache_put("key", "[[1]]", None).await.unwrap();
    }
}
