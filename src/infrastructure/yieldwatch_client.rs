//! HTTP client for the YieldWatch portfolio API.

use crate::infrastructure::fetcher::{path_segment, Fetcher, QueryParams, UpstreamRequest};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const UPSTREAM: &str = "yieldwatch";

const BASE_URL: &str = "https://www.yieldwatch.net/api/all";

pub struct YieldWatchClient {
    fetcher: Arc<Fetcher>,
    base_url: String,
}

impl YieldWatchClient {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self::with_base_url(fetcher, BASE_URL)
    }

    /// Create a client against a custom base URL (for testing)
    pub fn with_base_url(fetcher: Arc<Fetcher>, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// GET /all/{address}?platforms=pancake
    pub async fn positions(&self, address: &str) -> Result<Value> {
        info!("Fetching YieldWatch positions for {}", address);
        let url = format!("{}/{}", self.base_url, path_segment(address)?);
        let params = QueryParams::new().with("platforms", "pancake");
        let request = UpstreamRequest::get(UPSTREAM, &url, &params)?;
        self.fetcher.fetch_json(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockHttpTransport, MockSleeper, UpstreamResponse};
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_address_cannot_add_query_params() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let mut transport = MockHttpTransport::new();
        transport.expect_get().returning(move |url, _| {
            log.lock().unwrap().push(url.to_string());
            Ok(UpstreamResponse::new(200, "{}"))
        });
        let fetcher = Fetcher::new(
            Arc::new(transport),
            Arc::new(MockSleeper::new()),
            Duration::ZERO,
        );
        let client = YieldWatchClient::new(Arc::new(fetcher));

        client.positions("0xabc?platforms=venus").await.unwrap();
        assert_eq!(
            seen.lock().unwrap()[0],
            "https://www.yieldwatch.net/api/all/0xabc%3Fplatforms%3Dvenus?platforms=pancake"
        );
    }
}
