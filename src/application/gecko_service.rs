//! CoinGecko spreadsheet functions.
//!
//! Flow for every cached function:
//! 1. Fingerprint the raw arguments with the function tag
//! 2. Serve from cache when present
//! 3. Otherwise resolve tickers, call CoinGecko once, map fields, cache

use crate::application::cache_service::CacheService;
use crate::application::data_path::extract_grid;
use crate::application::fingerprint::compute_fingerprint;
use crate::application::pair_resolver::PairResolver;
use crate::domain::grid::{column, empty_cell, number_cell, round4, single, Grid};
use crate::domain::{check_input, GatewayError, GridInput, MarketMetric, PairCell};
use crate::infrastructure::CoinGeckoClient;
use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const WRONG_METRIC: &str = "Wrong parameter, either price, volume or marketcap";
pub const MISSING_TICKER: &str = "Expected ticker input";

/// Field pulled from each `coins/markets` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketField {
    TotalVolume,
    MarketCap,
    FullyDilutedValuation,
    /// 24h price change as a ratio (percentage ÷ 100)
    PriceChange24h,
    MarketCapRank,
    Ath,
    Atl,
    High24h,
    Low24h,
    Image,
}

impl MarketField {
    fn key(self) -> &'static str {
        match self {
            MarketField::TotalVolume => "total_volume",
            MarketField::MarketCap => "market_cap",
            MarketField::FullyDilutedValuation => "fully_diluted_valuation",
            MarketField::PriceChange24h => "price_change_percentage_24h",
            MarketField::MarketCapRank => "market_cap_rank",
            MarketField::Ath => "ath",
            MarketField::Atl => "atl",
            MarketField::High24h => "high_24h",
            MarketField::Low24h => "low_24h",
            MarketField::Image => "image",
        }
    }

    fn cell(self, record: &Value) -> Value {
        let value = record.get(self.key()).cloned().unwrap_or(Value::Null);
        match (self, value) {
            (_, Value::Null) => empty_cell(),
            (MarketField::PriceChange24h, v) => {
                v.as_f64().map(|p| number_cell(p / 100.0)).unwrap_or_else(empty_cell)
            }
            (_, v) => v,
        }
    }
}

pub struct GeckoService {
    client: Arc<CoinGeckoClient>,
    resolver: Arc<PairResolver>,
    cache: Arc<CacheService>,
}

impl GeckoService {
    pub fn new(
        client: Arc<CoinGeckoClient>,
        resolver: Arc<PairResolver>,
        cache: Arc<CacheService>,
    ) -> Self {
        Self {
            client,
            resolver,
            cache,
        }
    }

    /// GECKOPRICE / GECKOPRICEBYNAME: one `simple/price` call for the whole range.
    pub async fn price(
        &self,
        tickers: &GridInput,
        currencies: &GridInput,
        by_ticker: bool,
    ) -> Result<Grid> {
        check_ticker_input(tickers)?;
        let tag = if by_ticker { "GECKOPRICE" } else { "GECKOPRICEBYNAME" };
        let key = compute_fingerprint(&[
            &tickers.fingerprint_part(),
            &currencies.fingerprint_part(),
            tag,
        ]);

        self.cache
            .get_or_fetch(tag, &key, || async {
                let info = self
                    .resolver
                    .resolve_pairs(tickers, currencies, by_ticker)
                    .await?;
                let prices = if info.unique_ids.is_empty() {
                    HashMap::new()
                } else {
                    self.client
                        .simple_price(&info.unique_ids, &info.unique_currencies)
                        .await?
                };

                Ok(map_matrix(&info.matrix, |id, currency| {
                    prices
                        .get(id)
                        .and_then(|by_currency| by_currency.get(currency))
                        .copied()
                        .flatten()
                        .map(number_cell)
                        .unwrap_or_else(empty_cell)
                }))
            })
            .await
    }

    /// Market family: one `coins/markets` call, one field per cell.
    pub async fn market_field(
        &self,
        tag: &str,
        tickers: &GridInput,
        currency: &str,
        by_ticker: bool,
        field: MarketField,
    ) -> Result<Grid> {
        check_ticker_input(tickers)?;
        let currency_input = GridInput::scalar(currency);
        let key = compute_fingerprint(&[&tickers.fingerprint_part(), currency, field.key(), tag]);

        self.cache
            .get_or_fetch(tag, &key, || async {
                let info = self
                    .resolver
                    .resolve_pairs(tickers, &currency_input, by_ticker)
                    .await?;
                let mut by_id: HashMap<String, Value> = HashMap::new();
                if let Some(vs_currency) = info.unique_currencies.first() {
                    if !info.unique_ids.is_empty() {
                        let records = self.client.markets(&info.unique_ids, vs_currency).await?;
                        for record in records {
                            if let Some(id) = record.get("id").and_then(Value::as_str) {
                                by_id.insert(id.to_string(), field.cell(&record));
                            }
                        }
                    }
                }

                Ok(map_matrix(&info.matrix, |id, _| {
                    by_id.get(id).cloned().unwrap_or_else(empty_cell)
                }))
            })
            .await
    }

    /// GECKOHIST: metric of one coin on a past date (dd-mm-yyyy), 4 decimals.
    pub async fn history(
        &self,
        ticker: &str,
        vs_currency: &str,
        metric: &str,
        date: &str,
        by_ticker: bool,
    ) -> Result<Grid> {
        check_input(!ticker.trim().is_empty(), MISSING_TICKER)?;
        let vs = vs_currency.trim().to_lowercase();
        let metric_name = metric.trim().to_lowercase();
        let metric = parse_metric(&metric_name)?;
        let date = date.trim();
        if NaiveDate::parse_from_str(date, "%d-%m-%Y").is_err() {
            return Err(GatewayError::validation("Invalid date, expected dd-mm-yyyy").into());
        }

        let key = compute_fingerprint(&[
            ticker,
            &vs,
            &metric_name,
            date,
            lookup_part(by_ticker),
            "GECKOHIST",
        ]);
        self.cache
            .get_or_fetch("GECKOHIST", &key, || async {
                let Some(id) = self.coin_id_for(ticker, by_ticker).await? else {
                    return Ok(single(empty_cell()));
                };
                let data = self.client.history(&id, date).await?;
                let value = data
                    .get("market_data")
                    .and_then(|m| m.get(metric.history_key()))
                    .and_then(|m| m.get(&vs))
                    .and_then(Value::as_f64)
                    .map(|v| number_cell(round4(v)))
                    .unwrap_or_else(empty_cell);
                Ok(single(value))
            })
            .await
    }

    /// GECKOCHANGE / GECKOCHANGEBYNAME: last/first − 1 over `days`, 4 decimals.
    pub async fn change(
        &self,
        ticker: &str,
        vs_currency: &str,
        metric: &str,
        days: &str,
        by_ticker: bool,
    ) -> Result<Grid> {
        check_input(!ticker.trim().is_empty(), MISSING_TICKER)?;
        let vs = vs_currency.trim().to_lowercase();
        let metric_name = metric.trim().to_lowercase();
        let metric = parse_metric(&metric_name)?;
        let days = days.trim();
        let tag = if by_ticker { "GECKOCHANGE" } else { "GECKOCHANGEBYNAME" };

        let key = compute_fingerprint(&[ticker, &vs, &metric_name, days, tag]);
        self.cache
            .get_or_fetch(tag, &key, || async {
                let Some(id) = self.coin_id_for(ticker, by_ticker).await? else {
                    return Ok(single(empty_cell()));
                };
                let chart = self.client.market_chart(&id, &vs, days, None).await?;
                let series = series_values(&chart, metric);
                let value = match (series.first(), series.last()) {
                    (Some(first), Some(last)) if *first != 0.0 => {
                        number_cell(round4(last / first - 1.0))
                    }
                    _ => empty_cell(),
                };
                Ok(single(value))
            })
            .await
    }

    /// GECKOCHART: the metric series as a column.
    pub async fn chart(
        &self,
        ticker: &str,
        vs_currency: &str,
        metric: &str,
        days: &str,
        interval: &str,
    ) -> Result<Grid> {
        check_input(!ticker.trim().is_empty(), MISSING_TICKER)?;
        let vs = vs_currency.trim().to_lowercase();
        let metric_name = metric.trim().to_lowercase();
        let metric = parse_metric(&metric_name)?;
        let days = days.trim();
        let interval = match interval.trim() {
            "" => "daily",
            other => other,
        };

        let key = compute_fingerprint(&[ticker, &vs, &metric_name, days, interval, "GECKOCHART"]);
        self.cache
            .get_or_fetch("GECKOCHART", &key, || async {
                let Some(id) = self.coin_id_for(ticker, true).await? else {
                    return Ok(Vec::new());
                };
                let chart = self
                    .client
                    .market_chart(&id, &vs, days, Some(interval))
                    .await?;
                Ok(column(
                    series_values(&chart, metric).into_iter().map(number_cell).collect(),
                ))
            })
            .await
    }

    /// GECKO_ID_DATA: arbitrary paths into `coins/{id}`, same shape as `paths`.
    pub async fn id_data(&self, ticker: &str, paths: &GridInput, by_ticker: bool) -> Result<Grid> {
        let key = compute_fingerprint(&[
            &paths.fingerprint_part(),
            "_",
            ticker,
            lookup_part(by_ticker),
            "GECKO_ID_DATA",
        ]);
        self.cache
            .get_or_fetch("GECKO_ID_DATA", &key, || async {
                let data = match self.coin_id_for(ticker, by_ticker).await? {
                    Some(id) => self.client.coin(&id).await?,
                    None => Value::Null,
                };
                Ok(extract_grid(&data, paths))
            })
            .await
    }

    /// COINGECKO_ID: resolved id, or an empty cell.
    pub async fn coin_id(&self, ticker: &str) -> Result<Grid> {
        let id = self.resolver.coin_id(ticker).await?;
        Ok(single(id.map(Value::String).unwrap_or_else(empty_cell)))
    }

    async fn coin_id_for(&self, ticker: &str, by_ticker: bool) -> Result<Option<String>> {
        if by_ticker {
            let id = self.resolver.coin_id(ticker).await?;
            if id.is_none() {
                debug!("Ticker {} did not resolve to a coin id", ticker);
            }
            Ok(id)
        } else {
            let id = ticker.trim().to_lowercase();
            Ok((!id.is_empty()).then_some(id))
        }
    }
}

/// Fingerprint part telling symbol lookups apart from raw coin ids.
fn lookup_part(by_ticker: bool) -> &'static str {
    if by_ticker {
        "ticker"
    } else {
        "id"
    }
}

/// A missing ticker argument is an error; blank cells inside a range are not.
fn check_ticker_input(tickers: &GridInput) -> Result<()> {
    let missing = matches!(tickers, GridInput::Scalar(t) if t.trim().is_empty());
    check_input(!missing, MISSING_TICKER)
}

fn parse_metric(name: &str) -> Result<MarketMetric> {
    MarketMetric::parse(name).ok_or_else(|| GatewayError::validation(WRONG_METRIC).into())
}

/// Second element of each `[timestamp, value]` tuple of the metric's series.
fn series_values(chart: &Value, metric: MarketMetric) -> Vec<f64> {
    chart
        .get(metric.chart_key())
        .and_then(Value::as_array)
        .map(|points| {
            points
                .iter()
                .filter_map(|point| point.get(1).and_then(Value::as_f64))
                .collect()
        })
        .unwrap_or_default()
}

/// Render a pair matrix; unresolved and blank cells are empty.
fn map_matrix<F>(matrix: &[Vec<PairCell>], mut cell: F) -> Grid
where
    F: FnMut(&str, &str) -> Value,
{
    matrix
        .iter()
        .map(|row| {
            row.iter()
                .map(|pair| match pair.resolved() {
                    Some((id, currency)) => cell(id, currency),
                    None => empty_cell(),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_market_field_cells() {
        let record = json!({
            "id": "bitcoin",
            "price_change_percentage_24h": -2.5,
            "market_cap_rank": 1,
            "fully_diluted_valuation": null
        });
        assert_eq!(MarketField::PriceChange24h.cell(&record), json!(-0.025));
        assert_eq!(MarketField::MarketCapRank.cell(&record), json!(1));
        assert_eq!(MarketField::FullyDilutedValuation.cell(&record), json!(""));
        assert_eq!(MarketField::Ath.cell(&record), json!(""));
    }

    #[test]
    fn test_series_values() {
        let chart = json!({"prices": [[1, 100.0], [2, 110.0]], "total_volumes": []});
        assert_eq!(series_values(&chart, MarketMetric::Price), vec![100.0, 110.0]);
        assert!(series_values(&chart, MarketMetric::Volume).is_empty());
        assert!(series_values(&chart, MarketMetric::MarketCap).is_empty());
    }

    #[test]
    fn test_lookup_mode_changes_fingerprint() {
        let key = |by_ticker| {
            let mode = lookup_part(by_ticker);
            compute_fingerprint(&["eth", "usd", "price", "01-05-2021", mode, "GECKOHIST"])
        };
        assert_ne!(key(true), key(false));
    }

    #[test]
    fn test_missing_ticker_input() {
        let err = check_ticker_input(&GridInput::scalar("  ")).unwrap_err();
        assert_eq!(err.to_string(), MISSING_TICKER);
        assert!(check_ticker_input(&GridInput::scalar("BTC")).is_ok());
        let range = GridInput::from_rows(vec![vec!["".to_string(), "BTC".to_string()]]).unwrap();
        assert!(check_ticker_input(&range).is_ok());
    }

    #[test]
    fn test_parse_metric_error() {
        let err = parse_metric("supply").unwrap_err();
        assert_eq!(err.to_string(), WRONG_METRIC);
    }
}
