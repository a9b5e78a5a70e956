//! In-process TTL cache, used when no Redis URL is configured.

use crate::domain::CacheRepository;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct WrittenTtl;

impl Expiry<String, Entry> for WrittenTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Process-wide string cache with a lifetime per entry.
///
/// Expired entries are never returned and are evicted by moka's housekeeping
/// whether or not they are read again. There is no size bound.
pub struct InMemoryCache {
    entries: Cache<String, Entry>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self {
            entries: Cache::builder().expire_after(WrittenTtl).build(),
        }
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entries, after pending evictions have run.
    pub async fn len(&self) -> usize {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count() as usize
    }
}

#[async_trait]
impl CacheRepository for InMemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> anyhow::Result<()> {
        let entry = Entry {
            value: value.to_string(),
            ttl: Duration::from_secs(ttl_seconds),
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }
}
