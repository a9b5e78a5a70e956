//! Ticker/currency matrix resolution.
//!
//! Turns a spreadsheet range of tickers (or coin ids) plus a currency cell or
//! range into a matrix of `(coin id, currency)` pairs with the ticker range's
//! shape, and the deduplicated id and currency lists used for one batched
//! upstream call.

use crate::domain::{
    CoinDirectory, GatewayError, GridInput, Pair, PairCell, PairMatrixInfo, DEFAULT_CURRENCY,
};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const SHAPE_MISMATCH: &str =
    "Ticker array and currency array need to be the same size and dimension";

/// Resolves tickers to coin ids, remembering every hit.
///
/// Misses are not remembered, so a ticker listed later by the directory
/// resolves on the next call.
pub struct PairResolver {
    directory: Arc<dyn CoinDirectory>,
    memo: Mutex<HashMap<String, String>>,
}

impl PairResolver {
    pub fn new(directory: Arc<dyn CoinDirectory>) -> Self {
        Self {
            directory,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Forget every remembered ticker.
    pub async fn reset(&self) {
        self.memo.lock().await.clear();
    }

    /// Build the pair matrix.
    ///
    /// With `by_ticker` the cells are symbols looked up in the coin directory;
    /// without it they are used as coin ids directly.
    ///
    /// # Errors
    ///
    /// - Validation error when `currencies` is neither a single cell nor a
    ///   range of the same shape as `tickers` (raised before any network call)
    /// - Any directory fetch error
    pub async fn resolve_pairs(
        &self,
        tickers: &GridInput,
        currencies: &GridInput,
        by_ticker: bool,
    ) -> Result<PairMatrixInfo> {
        if !currencies.is_scalar() && currencies.shape() != tickers.shape() {
            return Err(GatewayError::validation(SHAPE_MISMATCH).into());
        }

        let ticker_rows: Vec<Vec<String>> = tickers
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|t| t.trim().to_lowercase()).collect())
            .collect();
        let currency_rows = currencies.rows();
        let currency_at = |i: usize, j: usize| -> String {
            let raw = match currencies {
                GridInput::Scalar(c) => c.as_str(),
                _ => currency_rows
                    .get(i)
                    .and_then(|row| row.get(j))
                    .map(String::as_str)
                    .unwrap_or(""),
            };
            let currency = raw.trim().to_lowercase();
            if currency.is_empty() {
                DEFAULT_CURRENCY.to_string()
            } else {
                currency
            }
        };

        let ids = if by_ticker {
            let wanted: Vec<&str> = ticker_rows
                .iter()
                .flatten()
                .filter(|t| !t.is_empty())
                .map(String::as_str)
                .collect();
            self.lookup_ids(&wanted).await?
        } else {
            HashMap::new()
        };

        let mut unique_ids: Vec<String> = Vec::new();
        let mut unique_currencies: Vec<String> = Vec::new();
        let mut matrix = Vec::with_capacity(ticker_rows.len());

        for (i, row) in ticker_rows.iter().enumerate() {
            let mut cells = Vec::with_capacity(row.len());
            for (j, ticker) in row.iter().enumerate() {
                if ticker.is_empty() {
                    cells.push(PairCell::Empty);
                    continue;
                }

                let id = if by_ticker {
                    ids.get(ticker).cloned()
                } else {
                    Some(ticker.clone())
                };
                let currency = currency_at(i, j);

                if let Some(id) = &id {
                    if !unique_ids.contains(id) {
                        unique_ids.push(id.clone());
                    }
                }
                if !unique_currencies.contains(&currency) {
                    unique_currencies.push(currency.clone());
                }
                cells.push(PairCell::Pair(Pair { id, currency }));
            }
            matrix.push(cells);
        }

        debug!(
            "Resolved {} unique id(s) across {} currency(ies)",
            unique_ids.len(),
            unique_currencies.len()
        );

        Ok(PairMatrixInfo {
            matrix,
            unique_ids,
            unique_currencies,
        })
    }

    /// Resolve a single ticker. `None` when the directory has no such symbol.
    pub async fn coin_id(&self, ticker: &str) -> Result<Option<String>> {
        let ticker = ticker.trim().to_lowercase();
        if ticker.is_empty() {
            return Ok(None);
        }
        let ids = self.lookup_ids(&[ticker.as_str()]).await?;
        Ok(ids.get(&ticker).cloned())
    }

    /// Map lowercase tickers to ids, fetching the directory at most once.
    async fn lookup_ids(&self, tickers: &[&str]) -> Result<HashMap<String, String>> {
        let mut found = HashMap::new();
        let mut missing: Vec<&str> = Vec::new();
        {
            let memo = self.memo.lock().await;
            for &ticker in tickers {
                match memo.get(ticker) {
                    Some(id) => {
                        found.insert(ticker.to_string(), id.clone());
                    }
                    None if !missing.contains(&ticker) => missing.push(ticker),
                    None => {}
                }
            }
        }

        if missing.is_empty() {
            return Ok(found);
        }

        info!("Resolving {} ticker(s) through the coin directory", missing.len());
        let listings = self.directory.coin_listings().await?;

        let mut memo = self.memo.lock().await;
        for ticker in missing {
            let symbol = ticker.to_uppercase();
            if let Some(listing) = listings.iter().find(|coin| coin.symbol == symbol) {
                memo.insert(ticker.to_string(), listing.id.clone());
                found.insert(ticker.to_string(), listing.id.clone());
            } else {
                debug!("No coin listed under symbol {}", symbol);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CoinListing, MockCoinDirectory};
    use serde_json::json;

    fn listing(id: &str, symbol: &str) -> CoinListing {
        CoinListing {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: None,
        }
    }

    fn directory(times: usize) -> MockCoinDirectory {
        let mut directory = MockCoinDirectory::new();
        directory.expect_coin_listings().times(times).returning(|| {
            Ok(vec![
                listing("bitcoin", "BTC"),
                listing("ethereum", "ETH"),
                listing("wrapped-bitcoin", "WBTC"),
            ])
        });
        directory
    }

    fn input(value: serde_json::Value) -> GridInput {
        GridInput::try_from(value).unwrap()
    }

    #[tokio::test]
    async fn test_scalar_pair() {
        let resolver = PairResolver::new(Arc::new(directory(1)));
        let info = resolver
            .resolve_pairs(&input(json!("BTC")), &input(json!("EUR")), true)
            .await
            .unwrap();

        assert_eq!(info.matrix.len(), 1);
        assert_eq!(info.matrix[0].len(), 1);
        assert_eq!(info.matrix[0][0].resolved(), Some(("bitcoin", "eur")));
        assert_eq!(info.unique_currencies, vec!["eur"]);
    }

    #[tokio::test]
    async fn test_grid_dedup_and_broadcast_currency() {
        let resolver = PairResolver::new(Arc::new(directory(1)));
        let info = resolver
            .resolve_pairs(
                &input(json!([["BTC", "BTC"], ["ETH", "BTC"]])),
                &input(json!("usd")),
                true,
            )
            .await
            .unwrap();

        assert_eq!(info.unique_ids, vec!["bitcoin", "ethereum"]);
        assert_eq!(info.unique_currencies, vec!["usd"]);
        assert_eq!(info.matrix.len(), 2);
        assert!(info
            .matrix
            .iter()
            .flatten()
            .all(|cell| matches!(cell, PairCell::Pair(p) if p.currency == "usd")));
    }

    #[tokio::test]
    async fn test_blank_cells_are_placeholders() {
        let resolver = PairResolver::new(Arc::new(directory(1)));
        let info = resolver
            .resolve_pairs(&input(json!([["BTC"], [""], ["ETH"]])), &input(json!("")), true)
            .await
            .unwrap();

        assert_eq!(info.matrix[1][0], PairCell::Empty);
        assert_eq!(info.matrix[0][0].resolved(), Some(("bitcoin", "usd")));
        assert_eq!(info.matrix[2][0].resolved(), Some(("ethereum", "usd")));
        assert_eq!(info.unique_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_ticker_has_no_id() {
        let resolver = PairResolver::new(Arc::new(directory(1)));
        let info = resolver
            .resolve_pairs(&input(json!([["BTC", "NOPE"]])), &input(json!("usd")), true)
            .await
            .unwrap();

        assert_eq!(
            info.matrix[0][1],
            PairCell::Pair(Pair {
                id: None,
                currency: "usd".to_string()
            })
        );
        assert_eq!(info.unique_ids, vec!["bitcoin"]);
    }

    #[tokio::test]
    async fn test_shape_mismatch_fails_before_network() {
        let resolver = PairResolver::new(Arc::new(directory(0)));
        let err = resolver
            .resolve_pairs(
                &input(json!([["BTC", "ETH"]])),
                &input(json!([["usd"], ["eur"]])),
                true,
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), SHAPE_MISMATCH);
    }

    #[tokio::test]
    async fn test_per_cell_currencies() {
        let resolver = PairResolver::new(Arc::new(directory(0)));
        let info = resolver
            .resolve_pairs(
                &input(json!([["bitcoin", "ethereum"]])),
                &input(json!([["EUR", ""]])),
                false,
            )
            .await
            .unwrap();

        assert_eq!(info.matrix[0][0].resolved(), Some(("bitcoin", "eur")));
        assert_eq!(info.matrix[0][1].resolved(), Some(("ethereum", "usd")));
        assert_eq!(info.unique_currencies, vec!["eur", "usd"]);
    }

    #[tokio::test]
    async fn test_memo_avoids_second_directory_fetch() {
        let resolver = PairResolver::new(Arc::new(directory(1)));
        resolver
            .resolve_pairs(&input(json!([["BTC", "ETH"]])), &input(json!("usd")), true)
            .await
            .unwrap();
        assert_eq!(resolver.coin_id("btc").await.unwrap(), Some("bitcoin".to_string()));
    }

    #[tokio::test]
    async fn test_reset_clears_memo() {
        let resolver = PairResolver::new(Arc::new(directory(2)));
        assert_eq!(resolver.coin_id("ETH").await.unwrap(), Some("ethereum".to_string()));
        resolver.reset().await;
        assert_eq!(resolver.coin_id("ETH").await.unwrap(), Some("ethereum".to_string()));
    }

    #[tokio::test]
    async fn test_symbol_match_is_exact() {
        let resolver = PairResolver::new(Arc::new(directory(1)));
        // "btc" must not match WBTC
        assert_eq!(resolver.coin_id(" btc ").await.unwrap(), Some("bitcoin".to_string()));
    }
}
