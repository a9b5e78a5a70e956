//! Upstream fetch with status-code retry.
//!
//! Every upstream call in the gateway goes through [`Fetcher`]. It builds the
//! final URL from a base and a list of query parameters, spreads load with a
//! short jittered delay, and retries on the status codes the caller's
//! [`RetryPolicy`] allows.
//!
//! # Retry Strategy
//!
//! - Attempt counter starts at 1
//! - Linear backoff: attempt × 1s before the next request (1s, 2s, 3s, ...)
//! - Hard cap of 10 requests per call regardless of status code
//! - Any non-2xx status outside the allow-list fails immediately
//!
//! All waiting goes through the injected [`Sleeper`] so tests run instantly.

use crate::domain::{GatewayError, HttpTransport, Sleeper, UpstreamResponse};
use anyhow::{Context, Result};
use metrics::counter;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::jitter;
use tracing::{debug, info, warn};

/// Which statuses may be retried, and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    statuses: Vec<u16>,
    max_attempts: u32,
}

impl RetryPolicy {
    /// Hard cap on requests per call.
    pub const MAX_ATTEMPTS: u32 = 10;

    pub fn on_statuses(statuses: &[u16]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            max_attempts: Self::MAX_ATTEMPTS,
        }
    }

    /// Whether the request that just returned `status` on attempt `attempt`
    /// should be sent again.
    pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
        attempt < self.max_attempts && self.statuses.contains(&status)
    }

    /// Backoff before the request following `attempt`.
    pub fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(u64::from(attempt))
    }
}

/// Ordered query parameters. List values are joined with `,`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.push((key.to_string(), value.into()));
        self
    }

    pub fn with_list<S: AsRef<str>>(self, key: &str, values: &[S]) -> Self {
        let joined = values
            .iter()
            .map(|v| v.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        self.with(key, joined)
    }

    pub fn with_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

/// A single upstream GET, ready to be sent.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Label used in logs and metrics ("coingecko", "coinmarketcap", ...).
    pub upstream: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub retry: Option<RetryPolicy>,
}

impl UpstreamRequest {
    pub fn get(upstream: &'static str, base: &str, params: &QueryParams) -> Result<Self> {
        Ok(Self {
            upstream,
            url: build_url(base, params)?,
            headers: Vec::new(),
            retry: None,
        })
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn retry_on(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }
}

/// Append URL-encoded query parameters to `base`.
pub fn build_url(base: &str, params: &QueryParams) -> Result<String> {
    let mut url = Url::parse(base).with_context(|| format!("Invalid upstream URL: {}", base))?;
    if !params.is_empty() {
        let mut query = url.query_pairs_mut();
        for (key, value) in params.pairs() {
            query.append_pair(key, value);
        }
    }
    Ok(url.to_string())
}

/// Percent-encode one URL path segment.
///
/// `.` and `..` are refused: the URL parser would resolve them away and the
/// request would land on a different endpoint.
pub fn path_segment(value: &str) -> Result<String> {
    if value == "." || value == ".." {
        return Err(GatewayError::validation(format!("Invalid path segment: {}", value)).into());
    }
    Ok(urlencoding::encode(value).into_owned())
}

pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
    /// Upper bound of the pre-request delay. Zero disables it.
    request_jitter: Duration,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
        request_jitter: Duration,
    ) -> Self {
        Self {
            transport,
            sleeper,
            request_jitter,
        }
    }

    /// Send the request and return the 2xx body as text.
    pub async fn fetch_text(&self, request: &UpstreamRequest) -> Result<String> {
        if !self.request_jitter.is_zero() {
            self.sleeper.sleep(jitter(self.request_jitter)).await;
        }

        let mut attempt: u32 = 1;
        loop {
            debug!("Fetching from {} (attempt {}): {}", request.upstream, attempt, request.url);
            let response: UpstreamResponse = self
                .transport
                .get(&request.url, &request.headers)
                .await
                .with_context(|| format!("Failed to fetch from {}", request.upstream))?;

            counter!(
                "upstream_requests_total",
                "upstream" => request.upstream,
                "status" => response.status.to_string()
            )
            .increment(1);

            if response.is_success() {
                info!(
                    "{} answered {} after {} attempt(s)",
                    request.upstream, response.status, attempt
                );
                return Ok(response.body);
            }

            let retry = request
                .retry
                .as_ref()
                .is_some_and(|policy| policy.should_retry(response.status, attempt));
            if !retry {
                return Err(GatewayError::upstream(response.status, attempt, response.body).into());
            }

            let wait = RetryPolicy::backoff(attempt);
            warn!(
                "{} returned {} (attempt {}/{}), waiting {} seconds before retry",
                request.upstream,
                response.status,
                attempt,
                RetryPolicy::MAX_ATTEMPTS,
                wait.as_secs()
            );
            counter!("upstream_retries_total", "upstream" => request.upstream).increment(1);
            self.sleeper.sleep(wait).await;
            attempt += 1;
        }
    }

    /// Send the request and parse the 2xx body as JSON.
    pub async fn fetch_json(&self, request: &UpstreamRequest) -> Result<Value> {
        self.fetch_as(request).await
    }

    /// Send the request and deserialize the 2xx body.
    pub async fn fetch_as<T: DeserializeOwned>(&self, request: &UpstreamRequest) -> Result<T> {
        let body = self.fetch_text(request).await?;
        let parsed = serde_json::from_str(&body).map_err(|e| {
            GatewayError::Parse(format!("{} returned unexpected JSON: {}", request.upstream, e))
        })?;
        Ok(parsed)
    }
}
