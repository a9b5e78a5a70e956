//! Redis-backed cache store, shared between gateway processes.

use crate::domain::CacheRepository;
use anyhow::Context;
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

pub struct RedisRepository {
    pool: Pool,
}

impl RedisRepository {
    /// Build the connection pool. Connections are opened lazily, so an
    /// unreachable server only shows up on the first command.
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .context("Failed to create Redis connection pool")?;
        info!("Redis connection pool initialized");
        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheRepository for RedisRepository {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get Redis connection from pool")?;
        let value: Option<String> = conn
            .get(key)
            .await
            .with_context(|| format!("Redis GET failed for {}", key))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> anyhow::Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get Redis connection from pool")?;
        let _: () = conn
            .set_ex(key, value, ttl_seconds)
            .await
            .with_context(|| format!("Redis SETEX failed for {}", key))?;
        Ok(())
    }
}
