//! HTTP client for the CoinMarketCap pro API.

use crate::domain::{GatewayError, SearchType};
use crate::infrastructure::fetcher::{Fetcher, QueryParams, RetryPolicy, UpstreamRequest};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub const UPSTREAM: &str = "coinmarketcap";

const BASE_URL: &str = "https://pro-api.coinmarketcap.com/v1";

const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

pub struct CoinMarketCapClient {
    fetcher: Arc<Fetcher>,
    base_url: String,
    api_key: Option<String>,
}

impl CoinMarketCapClient {
    pub fn new(fetcher: Arc<Fetcher>, api_key: Option<String>) -> Self {
        if api_key.is_none() {
            warn!("CMC_PRO_API_KEY not set - CoinMarketCap requests will be rejected upstream");
        }
        Self::with_base_url(fetcher, BASE_URL, api_key)
    }

    /// Create a client against a custom base URL (for testing)
    pub fn with_base_url(fetcher: Arc<Fetcher>, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// GET a CoinMarketCap endpoint and return its `data` member.
    async fn get_data(&self, path: &str, params: QueryParams) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = UpstreamRequest::get(UPSTREAM, &url, &params)?
            .retry_on(RetryPolicy::on_statuses(&[429]));
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key.as_str());
        }

        let mut body = self.fetcher.fetch_json(&request).await?;
        match body.get_mut("data") {
            Some(data) => Ok(data.take()),
            None => Err(GatewayError::Parse(format!(
                "{} response has no data member",
                UPSTREAM
            ))
            .into()),
        }
    }

    /// GET /cryptocurrency/quotes/latest
    pub async fn quotes_latest(
        &self,
        search_type: SearchType,
        keys: &[String],
        convert: &[String],
    ) -> Result<Value> {
        info!("Fetching latest quotes for {} key(s)", keys.len());
        let params = quote_params(search_type, keys, convert);
        self.get_data("cryptocurrency/quotes/latest", params).await
    }

    /// GET /cryptocurrency/quotes/historical starting at `time_start`
    pub async fn quotes_historical(
        &self,
        search_type: SearchType,
        keys: &[String],
        time_start: &str,
        convert: &[String],
    ) -> Result<Value> {
        info!("Fetching historical quotes for {} key(s) at {}", keys.len(), time_start);
        let params = quote_params(search_type, keys, convert).with("time_start", time_start);
        self.get_data("cryptocurrency/quotes/historical", params).await
    }
}

fn quote_params(search_type: SearchType, keys: &[String], convert: &[String]) -> QueryParams {
    let params = QueryParams::new().with_list(search_type.as_str(), keys);
    if convert.is_empty() {
        params
    } else {
        params.with_list("convert", convert)
    }
}
