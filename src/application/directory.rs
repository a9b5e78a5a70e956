//! Coin directory backed by the shared cache.

use crate::application::cache_service::CacheService;
use crate::application::fingerprint::compute_fingerprint;
use crate::domain::{CoinDirectory, CoinListing};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

const TAG: &str = "COIN_DIRECTORY";

/// Serves the symbol directory from the cache for `ttl_secs`, so resolver
/// memo misses in different calls share one upstream fetch.
pub struct CachedCoinDirectory {
    inner: Arc<dyn CoinDirectory>,
    cache: Arc<CacheService>,
    ttl_secs: u64,
}

impl CachedCoinDirectory {
    pub fn new(inner: Arc<dyn CoinDirectory>, cache: Arc<CacheService>, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache,
            ttl_secs,
        }
    }
}

#[async_trait]
impl CoinDirectory for CachedCoinDirectory {
    async fn coin_listings(&self) -> Result<Vec<CoinListing>> {
        let key = compute_fingerprint(&[TAG]);
        if let Some(listings) = self.cache.get_json::<Vec<CoinListing>>(TAG, &key).await {
            return Ok(listings);
        }

        let listings = self.inner.coin_listings().await?;
        self.cache
            .put_json(&key, &listings, Some(self.ttl_secs))
            .await?;
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockCoinDirectory;
    use crate::infrastructure::InMemoryCache;

    #[tokio::test]
    async fn test_second_listing_comes_from_cache() {
        let mut inner = MockCoinDirectory::new();
        inner.expect_coin_listings().times(1).returning(|| {
            Ok(vec![CoinListing {
                id: "bitcoin".to_string(),
                symbol: "BTC".to_string(),
                name: Some("Bitcoin".to_string()),
            }])
        });
        let cache = Arc::new(CacheService::new(Arc::new(InMemoryCache::new()), 600));
        let directory = CachedCoinDirectory::new(Arc::new(inner), cache, 3600);

        let first = directory.coin_listings().await.unwrap();
        let second = directory.coin_listings().await.unwrap();
        assert_eq!(first, second);
    }
}
