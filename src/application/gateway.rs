//! Assembles the services behind the function registry.

use crate::application::cache_service::CacheService;
use crate::application::cmc_service::CmcService;
use crate::application::cryptotools_service::CryptoToolsService;
use crate::application::directory::CachedCoinDirectory;
use crate::application::functions::FunctionRegistry;
use crate::application::gecko_service::GeckoService;
use crate::application::pair_resolver::PairResolver;
use crate::config::{ApiKeys, Config};
use crate::domain::{CacheRepository, HttpTransport, Sleeper};
use crate::infrastructure::{
    CoinGeckoClient, CoinMarketCapClient, CryptoToolsClient, Fetcher, YieldWatchClient,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The wired application: the registry the HTTP layer calls and the cache it
/// reports on.
pub struct Gateway {
    pub registry: Arc<FunctionRegistry>,
    pub cache: Arc<CacheService>,
    pub resolver: Arc<PairResolver>,
}

impl Gateway {
    pub fn build(
        config: &Config,
        keys: &ApiKeys,
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
        store: Arc<dyn CacheRepository>,
    ) -> Self {
        let cache = Arc::new(CacheService::new(store, config.cache.default_ttl_secs));
        let fetcher = Arc::new(Fetcher::new(
            transport,
            sleeper,
            Duration::from_millis(config.fetch.request_jitter_ms),
        ));

        let gecko_client = Arc::new(CoinGeckoClient::new(fetcher.clone(), keys.coingecko.clone()));
        info!("CoinGecko base URL: {}", gecko_client.base_url());
        let directory = Arc::new(CachedCoinDirectory::new(
            gecko_client.clone(),
            cache.clone(),
            config.cache.directory_ttl_secs,
        ));
        let resolver = Arc::new(PairResolver::new(directory));

        let cmc_client = Arc::new(CoinMarketCapClient::new(
            fetcher.clone(),
            keys.coinmarketcap.clone(),
        ));
        let tools_client = Arc::new(CryptoToolsClient::new(
            fetcher.clone(),
            keys.cryptotools_key_id.clone(),
            keys.cryptotools.clone(),
        ));
        let yieldwatch = Arc::new(YieldWatchClient::new(fetcher));

        let gecko = Arc::new(GeckoService::new(gecko_client, resolver.clone(), cache.clone()));
        let cmc = Arc::new(CmcService::new(cmc_client, cache.clone()));
        let tools = Arc::new(CryptoToolsService::new(tools_client, yieldwatch, cache.clone()));

        Self {
            registry: Arc::new(FunctionRegistry::new(gecko, cmc, tools)),
            cache,
            resolver,
        }
    }
}
