//! reqwest-backed transport and the tokio sleeper used in production.

use crate::domain::{HttpTransport, Sleeper, UpstreamResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection timeout in seconds
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Resends on connection-level failures only. Status codes are the fetcher's job.
const MAX_SEND_RETRIES: usize = 3;

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent("CryptoToolsGateway/1.0")
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<UpstreamResponse> {
        let retry_strategy = ExponentialBackoff::from_millis(100)
            .map(jitter)
            .take(MAX_SEND_RETRIES);

        let response = Retry::spawn(retry_strategy, || async {
            let mut request = self.client.get(url).header("Accept", "application/json");
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            request.send().await
        })
        .await
        .with_context(|| format!("Failed to fetch from {}", url))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body from {}", url))?;

        Ok(UpstreamResponse { status, body })
    }
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
