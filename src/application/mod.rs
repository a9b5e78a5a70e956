//! Application layer - the spreadsheet functions and the machinery they share.
//!
//! - `fingerprint` / `cache_service`: request keys and the TTL result cache
//! - `pair_resolver` / `directory`: ticker ranges → coin id / currency pairs
//! - `data_path` / `table`: JSON → cells
//! - `gecko_service`, `cmc_service`, `cryptotools_service`: one per upstream
//! - `functions`: name → service dispatch

pub mod cache_service;
pub mod cmc_service;
pub mod cryptotools_service;
pub mod data_path;
pub mod directory;
pub mod fingerprint;
pub mod functions;
pub mod gateway;
pub mod gecko_service;
pub mod pair_resolver;
pub mod table;

pub use cache_service::{CacheService, CacheStats, TagStats};
pub use cmc_service::CmcService;
pub use cryptotools_service::CryptoToolsService;
pub use data_path::{extract, PathValue};
pub use directory::CachedCoinDirectory;
pub use fingerprint::compute_fingerprint;
pub use functions::{FunctionRegistry, FUNCTION_NAMES};
pub use gateway::Gateway;
pub use gecko_service::GeckoService;
pub use pair_resolver::PairResolver;
