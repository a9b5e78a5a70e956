pub mod cmc_client;
pub mod coingecko_client;
pub mod cryptotools_client;
pub mod fetcher;
pub mod http_transport;
pub mod memory_cache;
pub mod redis;
pub mod yieldwatch_client;

pub use cmc_client::CoinMarketCapClient;
pub use coingecko_client::CoinGeckoClient;
pub use cryptotools_client::CryptoToolsClient;
pub use fetcher::{build_url, path_segment, Fetcher, QueryParams, RetryPolicy, UpstreamRequest};
pub use http_transport::{ReqwestTransport, TokioSleeper};
pub use memory_cache::InMemoryCache;
pub use redis::RedisRepository;
pub use yieldwatch_client::YieldWatchClient;
