//! HTTP client for the CoinGecko v3 API.
//!
//! Uses the public host unless a pro API key is configured, in which case
//! requests go to the `pro-api` host and carry the key as a query parameter.
//! CoinGecko answers 429 (and sometimes 423) when throttling, both retried.

use crate::domain::{CoinDirectory, CoinListing, CoinSearchResponse, SimplePriceResponse};
use crate::infrastructure::fetcher::{
    path_segment, Fetcher, QueryParams, RetryPolicy, UpstreamRequest,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const UPSTREAM: &str = "coingecko";

const PUBLIC_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const PRO_BASE_URL: &str = "https://pro-api.coingecko.com/api/v3";

/// Statuses CoinGecko uses for throttling.
const RETRY_STATUSES: [u16; 2] = [423, 429];

pub struct CoinGeckoClient {
    fetcher: Arc<Fetcher>,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    pub fn new(fetcher: Arc<Fetcher>, api_key: Option<String>) -> Self {
        let base_url = if api_key.is_some() {
            PRO_BASE_URL
        } else {
            PUBLIC_BASE_URL
        };
        Self::with_base_url(fetcher, base_url, api_key)
    }

    /// Create a client against a custom base URL (for testing)
    pub fn with_base_url(fetcher: Arc<Fetcher>, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: QueryParams) -> Result<T> {
        let params = params.with_opt("x_cg_pro_api_key", self.api_key.clone());
        let url = format!("{}/{}", self.base_url, path);
        let request = UpstreamRequest::get(UPSTREAM, &url, &params)?
            .retry_on(RetryPolicy::on_statuses(&RETRY_STATUSES));
        self.fetcher.fetch_as(&request).await
    }

    /// GET /simple/price?ids=..&vs_currencies=..
    pub async fn simple_price(
        &self,
        ids: &[String],
        currencies: &[String],
    ) -> Result<SimplePriceResponse> {
        info!("Fetching simple prices for {} coin(s)", ids.len());
        let params = QueryParams::new()
            .with_list("ids", ids)
            .with_list("vs_currencies", currencies);
        self.get("simple/price", params).await
    }

    /// GET /coins/markets?ids=..&vs_currency=..
    pub async fn markets(&self, ids: &[String], currency: &str) -> Result<Vec<Value>> {
        info!("Fetching market data for {} coin(s) in {}", ids.len(), currency);
        let params = QueryParams::new()
            .with_list("ids", ids)
            .with("vs_currency", currency);
        self.get("coins/markets", params).await
    }

    /// GET /coins/{id}/history?date=dd-mm-yyyy
    pub async fn history(&self, id: &str, date: &str) -> Result<Value> {
        let params = QueryParams::new()
            .with("date", date)
            .with("localization", "false");
        let path = format!("coins/{}/history", path_segment(id)?);
        self.get(&path, params).await
    }

    /// GET /coins/{id}/market_chart?vs_currency=..&days=..
    pub async fn market_chart(
        &self,
        id: &str,
        currency: &str,
        days: &str,
        interval: Option<&str>,
    ) -> Result<Value> {
        let params = QueryParams::new()
            .with("vs_currency", currency)
            .with("days", days)
            .with_opt("interval", interval);
        let path = format!("coins/{}/market_chart", path_segment(id)?);
        self.get(&path, params).await
    }

    /// GET /coins/{id}
    pub async fn coin(&self, id: &str) -> Result<Value> {
        let path = format!("coins/{}", path_segment(id)?);
        self.get(&path, QueryParams::new()).await
    }

    /// GET /search, the symbol directory used to resolve tickers.
    pub async fn search(&self) -> Result<Vec<CoinListing>> {
        info!("Fetching CoinGecko coin directory");
        let params = QueryParams::new()
            .with("locale", "fr")
            .with("img_path_only", "1");
        let response: CoinSearchResponse = self.get("search", params).await?;
        Ok(response.coins)
    }
}

#[async_trait]
impl CoinDirectory for CoinGeckoClient {
    async fn coin_listings(&self) -> Result<Vec<CoinListing>> {
        self.search().await
    }
}
