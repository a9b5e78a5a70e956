//! HTTP client for the CryptoTools aggregator (charmantadvisory.com).
//!
//! Every endpoint is a path ending with the caller's key id; the API key (or
//! the key id when no key is configured) travels in the `apikey` header.
//! Bodies are plain text: a number, an error sentence, or JSON.

use crate::infrastructure::fetcher::{path_segment, Fetcher, QueryParams, UpstreamRequest};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub const UPSTREAM: &str = "cryptotools";

const PUBLIC_BASE_URL: &str = "https://api.charmantadvisory.com";
const PRIVATE_BASE_URL: &str = "https://privateapi.charmantadvisory.com";

pub struct CryptoToolsClient {
    fetcher: Arc<Fetcher>,
    base_url: String,
    key_id: String,
    api_key: Option<String>,
}

impl CryptoToolsClient {
    pub fn new(fetcher: Arc<Fetcher>, key_id: String, api_key: Option<String>) -> Self {
        let base_url = if api_key.is_some() {
            PRIVATE_BASE_URL
        } else {
            PUBLIC_BASE_URL
        };
        Self::with_base_url(fetcher, base_url, key_id, api_key)
    }

    /// Create a client against a custom base URL (for testing)
    pub fn with_base_url(
        fetcher: Arc<Fetcher>,
        base_url: &str,
        key_id: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id,
            api_key,
        }
    }

    /// GET `{base}/{path}/{key_id}` and return the body text.
    ///
    /// User values in `path` must already be escaped with [`path_segment`].
    pub async fn fetch_text(&self, path: &str) -> Result<String> {
        info!("Fetching CryptoTools endpoint: {}", path);
        let url = format!("{}/{}/{}", self.base_url, path, path_segment(&self.key_id)?);
        let api_key = self.api_key.as_deref().unwrap_or(&self.key_id);
        let request =
            UpstreamRequest::get(UPSTREAM, &url, &QueryParams::new())?.header("apikey", api_key);
        self.fetcher.fetch_text(&request).await
    }
}
