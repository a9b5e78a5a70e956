//! Domain layer - core types and the traits the outer layers implement.
//!
//! This module defines the domain model for the CryptoTools gateway,
//! following clean architecture principles. It contains:
//! - Spreadsheet-shaped argument and result types
//! - The pair matrix produced by the ticker resolver
//! - The error taxonomy surfaced to callers
//! - Traits for the cache store, the HTTP transport, the sleeper and the
//!   coin directory, so every external collaborator can be swapped in tests

pub mod error;
pub mod grid;
pub mod models;

pub use error::{check_input, GatewayError};
pub use grid::{Grid, GridInput};
pub use models::*;

use async_trait::async_trait;
use std::time::Duration;

/// Repository trait for caching operations.
///
/// Defines the interface for the shared key/value store that keeps
/// serialized function results for a fixed TTL.
///
/// # Implementations
///
/// See `infrastructure::memory_cache::InMemoryCache` for the in-process store
/// and `infrastructure::redis::RedisRepository` for the Redis-backed one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// Retrieve a cached value by key.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(String))` if the key exists and is not expired,
    /// `Ok(None)` if the key doesn't exist or has expired,
    /// or an error if the backing store fails.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Store a value in the cache with a TTL, overwriting any previous entry.
    ///
    /// # Errors
    ///
    /// - Returns error if the backing store is unavailable
    /// - Returns error if the value cannot be stored
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> anyhow::Result<()>;
}

/// Raw upstream answer: status code and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport that performs a single HTTP GET.
///
/// Non-2xx statuses are *not* errors at this level; the fetcher decides what
/// to do with them. Errors are reserved for requests that never produced a
/// response (DNS, TLS, timeouts).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> anyhow::Result<UpstreamResponse>;
}

/// Suspension point for retry backoff and request jitter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Source of the symbol → coin id directory used to resolve tickers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoinDirectory: Send + Sync {
    /// Fetch the full directory. Called at most once per resolution.
    async fn coin_listings(&self) -> anyhow::Result<Vec<CoinListing>>;
}
