//! Runtime configuration.
//!
//! Settings come from `config.yaml` (path overridable with `CONFIG_PATH`);
//! secrets and the port override come from the environment. A missing config
//! file is not an error: every field has a default.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::application::cache_service::DEFAULT_TTL_SECS;

/// Top-level application configuration loaded from `config.yaml`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    /// Server configuration (host, port, CORS origins)
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Server configuration settings.
///
/// Defines how the HTTP server should bind and what CORS origins to allow.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on (default: 3010)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated list of allowed CORS origins (default: "*")
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a cached function result
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Lifetime of the cached CoinGecko coin directory
    #[serde(default = "default_directory_ttl_secs")]
    pub directory_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            directory_ttl_secs: default_directory_ttl_secs(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct FetchConfig {
    /// Upper bound of the random delay before each upstream request. 0 disables it.
    #[serde(default = "default_request_jitter_ms")]
    pub request_jitter_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_jitter_ms: default_request_jitter_ms(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3010
}
fn default_allowed_origins() -> String {
    "*".to_string()
}
fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}
fn default_directory_ttl_secs() -> u64 {
    3600
}
fn default_request_jitter_ms() -> u64 {
    1000
}

impl Config {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("{} not found, using default configuration", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse {} - check YAML syntax and structure", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Upstream credentials. All optional; without them the public tiers are used.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `CG_PRO_API_KEY`
    pub coingecko: Option<String>,
    /// `CMC_PRO_API_KEY`
    pub coinmarketcap: Option<String>,
    /// `CRYPTOTOOLS_API_KEY`
    pub cryptotools: Option<String>,
    /// `CRYPTOTOOLS_KEY_ID`, the caller identity appended to every CryptoTools path
    pub cryptotools_key_id: String,
}

pub const DEFAULT_CRYPTOTOOLS_KEY_ID: &str = "cryptotools-gateway";

impl ApiKeys {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            coingecko: get("CG_PRO_API_KEY"),
            coinmarketcap: get("CMC_PRO_API_KEY"),
            cryptotools: get("CRYPTOTOOLS_API_KEY"),
            cryptotools_key_id: get("CRYPTOTOOLS_KEY_ID")
                .unwrap_or_else(|| DEFAULT_CRYPTOTOOLS_KEY_ID.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("config.yaml")).unwrap();
        assert_eq!(config.server.port, 3010);
        assert_eq!(config.server.allowed_origins, "*");
        assert_eq!(config.cache.default_ttl_secs, 600);
        assert_eq!(config.fetch.request_jitter_ms, 1000);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  port: 8080\ncache:\n  default_ttl_secs: 60\nfetch:\n  request_jitter_ms: 0"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.cache.default_ttl_secs, 60);
        assert_eq!(config.cache.directory_ttl_secs, 3600);
        assert_eq!(config.fetch.request_jitter_ms, 0);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server: [unclosed").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_api_keys_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CMC_PRO_API_KEY", "cmc-key"),
            ("CG_PRO_API_KEY", "  "),
            ("CRYPTOTOOLS_KEY_ID", "sheet-42"),
        ]);
        let keys = ApiKeys::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(keys.coinmarketcap.as_deref(), Some("cmc-key"));
        assert_eq!(keys.coingecko, None);
        assert_eq!(keys.cryptotools, None);
        assert_eq!(keys.cryptotools_key_id, "sheet-42");
    }

    #[test]
    fn test_default_key_id() {
        let keys = ApiKeys::from_lookup(|_| None);
        assert_eq!(keys.cryptotools_key_id, DEFAULT_CRYPTOTOOLS_KEY_ID);
    }
}
