//! CoinMarketCap spreadsheet functions.
//!
//! Tickers and paths are each a cell, row or column. One quotes call covers
//! the sorted unique tickers; the cached value is a ticker → row map so the
//! output can be rebuilt in the caller's order. Output rows follow the ticker
//! list and are transposed when the tickers were laid out as a row.

use crate::application::cache_service::CacheService;
use crate::application::data_path::extract_cell;
use crate::application::fingerprint::compute_fingerprint;
use crate::domain::grid::{empty_cell, transpose, Grid};
use crate::domain::{check_input, GatewayError, GridInput, SearchType, DEFAULT_CURRENCY};
use crate::infrastructure::CoinMarketCapClient;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const CURRENCY_NOT_SINGLE: &str = "Currency should be one string";

/// Fields under `quote/<CUR>/` in the latest quotes.
pub const QUOTE_FIELDS: &[&str] = &[
    "price",
    "volume_24h",
    "market_cap",
    "fully_diluted_market_cap",
    "market_cap_dominance",
    "percent_change_1h",
    "percent_change_24h",
    "percent_change_7d",
    "percent_change_30d",
];

/// Top-level fields of a quote record.
pub const PLAIN_FIELDS: &[&str] = &[
    "cmc_rank",
    "id",
    "name",
    "symbol",
    "slug",
    "circulating_supply",
    "total_supply",
    "max_supply",
];

/// Fields under `quotes/0/quote/<CUR>/` in historical quotes.
pub const HISTORICAL_FIELDS: &[&str] = &["price", "volume_24h", "market_cap"];

pub struct CmcService {
    client: Arc<CoinMarketCapClient>,
    cache: Arc<CacheService>,
}

impl CmcService {
    pub fn new(client: Arc<CoinMarketCapClient>, cache: Arc<CacheService>) -> Self {
        Self { client, cache }
    }

    /// CMC_DATA
    pub async fn data(
        &self,
        tickers: &GridInput,
        paths: &GridInput,
        search_type: SearchType,
    ) -> Result<Grid> {
        self.quotes(tickers, paths, None, search_type).await
    }

    /// CMC_HIST_DATA. `date` is `YYYY-MM-DD` or RFC 3339 and must be in the past.
    pub async fn hist_data(
        &self,
        tickers: &GridInput,
        paths: &GridInput,
        date: &str,
        search_type: SearchType,
    ) -> Result<Grid> {
        let date = date.trim();
        let parsed = parse_date(date).ok_or_else(|| GatewayError::validation("Invalid date/time"))?;
        check_input(parsed < Utc::now(), "Date needs to be in the past")?;
        self.quotes(tickers, paths, Some(date), search_type).await
    }

    /// CMC_PRICE, CMC_VOLUME, ... : `quote/<CUR>/<field>` of the latest quotes.
    pub async fn currency_field(
        &self,
        tickers: &GridInput,
        currency: &GridInput,
        field: &str,
        search_type: SearchType,
    ) -> Result<Grid> {
        let currency = single_currency(currency)?;
        let path = GridInput::scalar(format!("quote/{}/{}", currency, field));
        self.data(tickers, &path, search_type).await
    }

    /// CMC_RANK, CMC_NAME, ... : a top-level field of the latest quotes.
    pub async fn field(&self, tickers: &GridInput, field: &str, search_type: SearchType) -> Result<Grid> {
        self.data(tickers, &GridInput::scalar(field), search_type).await
    }

    /// CMC_HIST_PRICE, ... : `quotes/0/quote/<CUR>/<field>` of the historical quotes.
    pub async fn hist_currency_field(
        &self,
        tickers: &GridInput,
        date: &str,
        currency: &GridInput,
        field: &str,
        search_type: SearchType,
    ) -> Result<Grid> {
        let currency = single_currency(currency)?;
        let path = GridInput::scalar(format!("quotes/0/quote/{}/{}", currency, field));
        self.hist_data(tickers, &path, date, search_type).await
    }

    async fn quotes(
        &self,
        tickers: &GridInput,
        paths: &GridInput,
        date: Option<&str>,
        search_type: SearchType,
    ) -> Result<Grid> {
        check_input(
            tickers.is_cell_row_or_col(),
            "Ticker(s) need to be a single cell/row/col",
        )?;
        check_input(
            paths.is_cell_row_or_col(),
            "Param(s) need to be a single cell/row/col",
        )?;

        let ticker_list: Vec<String> = tickers
            .flatten()
            .iter()
            .map(|t| normalize_key(t, search_type))
            .collect();
        let path_list = paths.flatten();
        let unique_keys = sorted_unique(&ticker_list);
        let convert = convert_currencies(&path_list);

        let tag = if date.is_some() { "CMC_HIST_DATA" } else { "CMC_DATA" };
        let keys_json = serde_json::to_string(&unique_keys)?;
        let paths_json = serde_json::to_string(&path_list)?;
        let mut parts = vec![keys_json.as_str(), "_", paths_json.as_str(), "_", search_type.as_str()];
        if let Some(date) = date {
            parts.extend(["_", date]);
        }
        parts.push(tag);
        let key = compute_fingerprint(&parts);

        let rows: BTreeMap<String, Vec<Value>> = self
            .cache
            .get_or_fetch(tag, &key, || async {
                if unique_keys.is_empty() {
                    return Ok(BTreeMap::new());
                }
                let data = match date {
                    Some(date) => {
                        self.client
                            .quotes_historical(search_type, &unique_keys, date, &convert)
                            .await?
                    }
                    None => {
                        self.client
                            .quotes_latest(search_type, &unique_keys, &convert)
                            .await?
                    }
                };

                let mut rows: BTreeMap<String, Vec<Value>> = BTreeMap::new();
                for ticker in &unique_keys {
                    let record = quote_record(&data, ticker, unique_keys.len());
                    let row: Vec<Value> = path_list
                        .iter()
                        .map(|path| extract_cell(record, path))
                        .collect();
                    rows.insert(ticker.clone(), row);
                }
                Ok(rows)
            })
            .await?;

        let blank_row = || vec![empty_cell(); path_list.len()];
        let mapped: Grid = ticker_list
            .iter()
            .map(|ticker| {
                if ticker.is_empty() {
                    blank_row()
                } else {
                    rows.get(ticker).cloned().unwrap_or_else(blank_row)
                }
            })
            .collect();

        Ok(if tickers.is_vertical() {
            mapped
        } else {
            transpose(&mapped)
        })
    }
}

/// Symbols are upper case and slugs lower case upstream.
fn normalize_key(ticker: &str, search_type: SearchType) -> String {
    let ticker = ticker.trim();
    match search_type {
        SearchType::Symbol => ticker.to_uppercase(),
        SearchType::Slug => ticker.to_lowercase(),
        SearchType::Id => ticker.to_string(),
    }
}

fn sorted_unique(values: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = values.iter().filter(|v| !v.is_empty()).cloned().collect();
    unique.sort();
    unique.dedup();
    unique
}

/// Non-USD currencies named by `quote/<CUR>/...` or `quotes/<n>/quote/<CUR>/...` paths.
fn convert_currencies(paths: &[String]) -> Vec<String> {
    let currencies: Vec<String> = paths
        .iter()
        .filter_map(|path| {
            let segments: Vec<&str> = path.split('/').collect();
            let at = segments.iter().position(|s| *s == "quote")?;
            segments.get(at + 1).map(|c| c.trim().to_uppercase())
        })
        .filter(|c| !c.is_empty() && c != "USD")
        .collect();
    sorted_unique(&currencies)
}

static NULL: Value = Value::Null;

/// The record for one key. Historical answers for a single key may come back
/// unkeyed.
fn quote_record<'a>(data: &'a Value, key: &str, key_count: usize) -> &'a Value {
    match data.get(key) {
        Some(record) => record,
        None if key_count == 1 && data.get("quotes").is_some() => data,
        None => &NULL,
    }
}

fn single_currency(currency: &GridInput) -> Result<String> {
    match currency {
        GridInput::Scalar(c) => {
            let c = c.trim();
            Ok(if c.is_empty() { DEFAULT_CURRENCY } else { c }.to_uppercase())
        }
        _ => Err(GatewayError::validation(CURRENCY_NOT_SINGLE).into()),
    }
}

fn parse_date(date: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
