//! Data shared between the resolver, the services and the upstream clients.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Currency used when the caller leaves the currency cell blank.
pub const DEFAULT_CURRENCY: &str = "usd";

/// One resolved cell of a price lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    /// Canonical coin id. `None` when the ticker could not be resolved.
    pub id: Option<String>,
    /// Lowercase currency code.
    pub currency: String,
}

/// A cell of the pair matrix: blank input stays blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairCell {
    Empty,
    Pair(Pair),
}

impl PairCell {
    /// The pair when the cell holds a resolved id.
    pub fn resolved(&self) -> Option<(&str, &str)> {
        match self {
            PairCell::Pair(Pair {
                id: Some(id),
                currency,
            }) => Some((id.as_str(), currency.as_str())),
            _ => None,
        }
    }
}

/// Output of the pair resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairMatrixInfo {
    /// Same shape as the ticker input.
    pub matrix: Vec<Vec<PairCell>>,
    /// Distinct resolved ids, in first-seen order.
    pub unique_ids: Vec<String>,
    /// Distinct currencies, in first-seen order.
    pub unique_currencies: Vec<String>,
}

/// Entry of the upstream symbol directory (CoinGecko `/search`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoinListing {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// CoinGecko `/search` response; only the coin list is used.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinSearchResponse {
    #[serde(default)]
    pub coins: Vec<CoinListing>,
}

/// `simple/price` response: id → currency → price.
pub type SimplePriceResponse = HashMap<String, HashMap<String, Option<f64>>>;

/// Metric selected by the history/change/chart functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketMetric {
    Price,
    Volume,
    MarketCap,
}

impl MarketMetric {
    /// Parse the user-facing name ("price", "volume", "marketcap").
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "price" => Some(MarketMetric::Price),
            "volume" => Some(MarketMetric::Volume),
            "marketcap" => Some(MarketMetric::MarketCap),
            _ => None,
        }
    }

    /// Key inside `coins/{id}/history` → `market_data`.
    pub fn history_key(self) -> &'static str {
        match self {
            MarketMetric::Price => "current_price",
            MarketMetric::Volume => "total_volume",
            MarketMetric::MarketCap => "market_cap",
        }
    }

    /// Series key inside `coins/{id}/market_chart`.
    pub fn chart_key(self) -> &'static str {
        match self {
            MarketMetric::Price => "prices",
            MarketMetric::Volume => "total_volumes",
            MarketMetric::MarketCap => "market_caps",
        }
    }
}

/// How CoinMarketCap should interpret the tickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchType {
    Id,
    #[default]
    Symbol,
    Slug,
}

impl SearchType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "id" => Some(SearchType::Id),
            "symbol" => Some(SearchType::Symbol),
            "slug" => Some(SearchType::Slug),
            _ => None,
        }
    }

    /// Query parameter name, which is also the user-facing name.
    pub fn as_str(self) -> &'static str {
        match self {
            SearchType::Id => "id",
            SearchType::Symbol => "symbol",
            SearchType::Slug => "slug",
        }
    }
}
