//! CryptoTools aggregator and YieldWatch spreadsheet functions.
//!
//! Three response families:
//! - Scalars: the body is a number or an error sentence. Only numbers are cached.
//! - Lists: a JSON array of records; one `PRICE`/`VALUE` per record, as a column.
//! - Tables: a JSON array flattened to rows, never cached.

use crate::application::cache_service::CacheService;
use crate::application::data_path::extract_grid;
use crate::application::fingerprint::compute_fingerprint;
use crate::application::table::json_to_table;
use crate::domain::grid::{column, empty_cell, number_cell, single, try_parse_number, Grid};
use crate::domain::{check_input, GatewayError, GridInput};
use crate::infrastructure::{path_segment, CryptoToolsClient, YieldWatchClient};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Separator the aggregator expects between list items in a path segment.
const LIST_SEPARATOR: &str = "%2C";

/// Default look-back for the transaction listings.
pub const DEFAULT_TX_DAYS: &str = "30";

/// New-pair filters of the DEX listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dex {
    Uniswap,
    Sushiswap,
    Pancakeswap,
}

impl Dex {
    fn endpoint(self) -> &'static str {
        match self {
            Dex::Uniswap => "UNISWAPFILTER",
            Dex::Sushiswap => "SUSHISWAPFILTER",
            Dex::Pancakeswap => "PANCAKESWAPFILTER",
        }
    }
}

/// Chains with holder and transaction listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    Erc20,
    Bep20,
}

impl Chain {
    fn holders_endpoint(self) -> &'static str {
        match self {
            Chain::Erc20 => "ERC20HOLDERS",
            Chain::Bep20 => "BEP20HOLDERS",
        }
    }

    fn tx_endpoint(self) -> &'static str {
        match self {
            Chain::Erc20 => "TXERC20",
            Chain::Bep20 => "TXBEP20",
        }
    }
}

pub struct CryptoToolsService {
    client: Arc<CryptoToolsClient>,
    yieldwatch: Arc<YieldWatchClient>,
    cache: Arc<CacheService>,
}

impl CryptoToolsService {
    pub fn new(
        client: Arc<CryptoToolsClient>,
        yieldwatch: Arc<YieldWatchClient>,
        cache: Arc<CacheService>,
    ) -> Self {
        Self {
            client,
            yieldwatch,
            cache,
        }
    }

    // ========================================================================
    // Scalars
    // ========================================================================

    /// CRYPTOBALANCE
    pub async fn balance(&self, ticker: &str, address: &str) -> Result<Grid> {
        self.ticker_address("CRYPTOBALANCE", "BALANCE", ticker, address).await
    }

    /// CRYPTOREWARDS
    pub async fn rewards(&self, ticker: &str, address: &str) -> Result<Grid> {
        self.ticker_address("CRYPTOREWARDS", "REWARDS", ticker, address).await
    }

    /// CRYPTOSTAKING
    pub async fn staking(&self, ticker: &str, address: &str) -> Result<Grid> {
        self.ticker_address("CRYPTOSTAKING", "STAKING", ticker, address).await
    }

    /// CRYPTOSUMETH: total USD value held on an ERC20 address.
    pub async fn sum_eth(&self, address: &str) -> Result<Grid> {
        let address = address.trim();
        check_input(!address.is_empty(), "Expected address value")?;
        let path = endpoint_path("TOTALETHBALANCE", &[address])?;
        self.cached_number("CRYPTOSUMETH", &[address], path).await
    }

    /// CRYPTOSUMBSC: total USD value held on a BEP20 address.
    pub async fn sum_bsc(&self, address: &str) -> Result<Grid> {
        let address = address.trim();
        check_input(!address.is_empty(), "Expected address input")?;
        let path = endpoint_path("TOTALBSCBALANCE", &[address])?;
        self.cached_number("CRYPTOSUMBSC", &[address], path).await
    }

    /// CRYPTOTVL
    pub async fn tvl(&self, exchange: &str) -> Result<Grid> {
        self.exchange_metric("CRYPTOTVL", "TVL", exchange).await
    }

    /// CRYPTODEXVOLUME
    pub async fn dex_volume(&self, exchange: &str) -> Result<Grid> {
        self.exchange_metric("CRYPTODEXVOLUME", "DEXVOLUME", exchange).await
    }

    /// CRYPTODEXFEE
    pub async fn dex_fee(&self, exchange: &str) -> Result<Grid> {
        self.exchange_metric("CRYPTODEXFEE", "DEXFEE", exchange).await
    }

    /// CRYPTODISTRIBUTIONRATE: reward token rate of a lending platform.
    pub async fn distribution_rate(&self, exchange: &str, ticker: &str, side: &str) -> Result<Grid> {
        let exchange = exchange.trim().to_uppercase();
        let ticker = ticker.trim().to_uppercase();
        let side = side.trim().to_uppercase();
        check_input(!ticker.is_empty(), "Expected ticker input")?;
        check_input(!exchange.is_empty(), "Expected exchange input")?;
        check_input(!side.is_empty(), "Expected side input")?;

        let path = endpoint_path("DISTRIBUTIONRATE", &[&exchange, &ticker, &side])?;
        self.cached_number("CRYPTODISTRIBUTIONRATE", &[&ticker, &exchange, &side], path)
            .await
    }

    /// CRYPTOLP: liquidity pool metric. `pair` may be written `ABC-XYZ` or `ABC/XYZ`.
    pub async fn liquidity_pool(&self, exchange: &str, pair: &str, kind: &str) -> Result<Grid> {
        let exchange = exchange.trim().to_uppercase();
        let pair = strip_pair_separators(&pair.trim().to_uppercase());
        let kind = kind.trim().to_uppercase();
        check_input(!exchange.is_empty(), "Expected exchange input")?;
        check_input(!pair.is_empty(), "Expected pair input")?;
        check_input(!kind.is_empty(), "Expected type input")?;

        let path = endpoint_path("LPOOLS", &[&exchange, &pair, &kind])?;
        self.cached_number("CRYPTOLP", &[&exchange, &pair, &kind], path)
            .await
    }

    async fn ticker_address(
        &self,
        tag: &str,
        endpoint: &str,
        ticker: &str,
        address: &str,
    ) -> Result<Grid> {
        let ticker = ticker.trim().to_uppercase();
        let address = address.trim();
        check_input(!ticker.is_empty(), "Expected ticker value")?;
        check_input(!address.is_empty(), "Expected address value")?;

        let path = endpoint_path(endpoint, &[&ticker, address])?;
        self.cached_number(tag, &[&ticker, address], path).await
    }

    async fn exchange_metric(&self, tag: &str, endpoint: &str, exchange: &str) -> Result<Grid> {
        let exchange = exchange.trim();
        check_input(!exchange.is_empty(), "Expected exchange value")?;
        let path = endpoint_path(endpoint, &[exchange])?;
        self.cached_number(tag, &[exchange], path).await
    }

    /// Fetch a scalar endpoint. Numeric answers are cached; anything else
    /// (usually an upstream error sentence) is returned as text, uncached.
    async fn cached_number(&self, tag: &str, key_parts: &[&str], path: String) -> Result<Grid> {
        let mut parts = key_parts.to_vec();
        parts.push(tag);
        let key = compute_fingerprint(&parts);

        if let Some(cached) = self.cache.get_json::<Value>(tag, &key).await {
            return Ok(single(cached));
        }

        let body = self.client.fetch_text(&path).await?;
        let value = try_parse_number(Value::String(body));
        if value.is_number() {
            self.cache.put_json(&key, &value, None).await?;
        } else {
            info!("{} answered with text, not caching: {}", tag, value);
        }
        Ok(single(value))
    }

    // ========================================================================
    // Lists
    // ========================================================================

    /// CRYPTOPOOLPRICE
    pub async fn pool_price(&self, tokens: &GridInput, exchanges: &GridInput) -> Result<Grid> {
        let tokens = join_list(tokens, false)?;
        let exchanges = join_list(exchanges, false)?;
        check_input(!exchanges.is_empty(), "Expected exchange array input")?;
        check_input(!tokens.is_empty(), "Expected ticker array input")?;

        let path = format!("POOLPRICE/{}/{}", exchanges, tokens);
        self.cached_list("CRYPTOPOOLPRICE", &[&tokens, &exchanges], path, "PRICE")
            .await
    }

    /// CRYPTOFARMING
    pub async fn farming(
        &self,
        exchanges: &GridInput,
        tickers: &GridInput,
        data_type: &GridInput,
    ) -> Result<Grid> {
        let exchanges = join_list(exchanges, true)?;
        let tickers = join_list(tickers, true)?;
        let data_type = join_list(data_type, true)?;
        check_input(!exchanges.is_empty(), "Expected exchange array input")?;
        check_input(!tickers.is_empty(), "Expected ticker array input")?;
        check_input(!data_type.is_empty(), "Expected data type array input")?;

        let path = format!("LPOOLS/{}/{}/{}", exchanges, tickers, data_type);
        self.cached_list("CRYPTOFARMING", &[&tickers, &exchanges, &data_type], path, "VALUE")
            .await
    }

    /// CRYPTODEXPRICE
    pub async fn dex_price(
        &self,
        tokens: &GridInput,
        quote_tokens: &GridInput,
        exchanges: &GridInput,
    ) -> Result<Grid> {
        let tokens = join_list(tokens, true)?;
        let quote_tokens = join_list(quote_tokens, true)?;
        let exchanges = join_list(exchanges, true)?;
        check_input(!exchanges.is_empty(), "Expected exchange array input")?;
        check_input(!tokens.is_empty(), "Expected token array input")?;
        check_input(!quote_tokens.is_empty(), "Expected token2 array input")?;

        let path = format!("DEXPRICE2/{}/{}/{}", tokens, quote_tokens, exchanges);
        self.cached_list("CRYPTODEXPRICE", &[&tokens, &quote_tokens, &exchanges], path, "PRICE")
            .await
    }

    /// CRYPTOLENDING
    pub async fn lending(
        &self,
        exchanges: &GridInput,
        tickers: &GridInput,
        sides: &GridInput,
    ) -> Result<Grid> {
        let exchanges = join_list(exchanges, true)?;
        let tickers = join_list(tickers, true)?;
        let sides = join_list(sides, true)?;
        check_input(!exchanges.is_empty(), "Expected exchange array input")?;
        check_input(!tickers.is_empty(), "Expected ticker array input")?;
        check_input(!sides.is_empty(), "Expected side array input")?;

        let path = format!("LENDING2/{}/{}/{}", exchanges, tickers, sides);
        self.cached_list("CRYPTOLENDING", &[&exchanges, &tickers, &sides], path, "VALUE")
            .await
    }

    async fn cached_list(
        &self,
        tag: &str,
        key_parts: &[&str],
        path: String,
        field: &'static str,
    ) -> Result<Grid> {
        let mut parts = key_parts.to_vec();
        parts.push(tag);
        let key = compute_fingerprint(&parts);

        self.cache
            .get_or_fetch(tag, &key, || async {
                let body = self.client.fetch_text(&path).await?;
                let records: Vec<Value> = serde_json::from_str(&body).map_err(|e| {
                    GatewayError::Parse(format!("{} list is not a JSON array: {}", tag, e))
                })?;
                Ok(column(
                    records.iter().map(|record| list_cell(record, field)).collect(),
                ))
            })
            .await
    }

    // ========================================================================
    // Tables (uncached)
    // ========================================================================

    /// UNISWAP / SUSHISWAP / PANCAKESWAP: new pairs matching the filters.
    pub async fn new_pairs(
        &self,
        dex: Dex,
        days: &str,
        volume: &str,
        liquidity: &str,
        tx_count: &str,
    ) -> Result<Grid> {
        check_input(!days.trim().is_empty(), "Expected days value")?;
        check_input(!volume.trim().is_empty(), "Expected volume value")?;
        check_input(!liquidity.trim().is_empty(), "Expected liquidity value")?;
        check_input(!tx_count.trim().is_empty(), "Expected txCount value")?;

        let path = endpoint_path(
            dex.endpoint(),
            &[days.trim(), volume.trim(), liquidity.trim(), tx_count.trim()],
        )?;
        self.table(&path, true).await
    }

    /// CRYPTOFUTURES
    pub async fn futures(&self, ticker: &str) -> Result<Grid> {
        let ticker = ticker.trim().to_uppercase();
        check_input(!ticker.is_empty(), "Expected ticker input")?;
        self.table(&path_segment(&format!("{}FUTURES", ticker))?, true)
            .await
    }

    /// CRYPTO_ERC20HOLDERS / CRYPTO_BEP20HOLDERS
    pub async fn holders(&self, chain: Chain, ticker: &str) -> Result<Grid> {
        let ticker = ticker.trim().to_uppercase();
        check_input(!ticker.is_empty(), "Expected ticker input")?;
        let path = endpoint_path(chain.holders_endpoint(), &[&ticker])?;
        self.table(&path, false).await
    }

    /// CRYPTOTX_ERC20 / CRYPTOTX_BEP20: transactions of the last `days` (default 30).
    pub async fn transactions(&self, chain: Chain, address: &str, days: Option<&str>) -> Result<Grid> {
        let address = address.trim();
        let days = days.map(str::trim).unwrap_or(DEFAULT_TX_DAYS);
        check_input(!address.is_empty(), "Expected address input")?;
        check_input(!days.is_empty(), "Expected nbdays input")?;
        let path = endpoint_path(chain.tx_endpoint(), &[address, days])?;
        self.table(&path, false).await
    }

    async fn table(&self, path: &str, include_headers: bool) -> Result<Grid> {
        let body = self.client.fetch_text(path).await?;
        let data: Value = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Parse(format!("{} is not JSON: {}", path, e)))?;
        let table = json_to_table(&data, include_headers);
        debug!("{} flattened to {} row(s)", path, table.len());
        Ok(table)
    }

    // ========================================================================
    // YieldWatch
    // ========================================================================

    /// LP_STAKING: paths into the YieldWatch portfolio of `address`, same shape
    /// as `paths`. No paths gives an empty grid without a request.
    pub async fn lp_staking(&self, address: &str, paths: Option<&GridInput>) -> Result<Grid> {
        let address = address.trim();
        check_input(!address.is_empty(), "Expected address value")?;
        let Some(paths) = paths.filter(|p| p.rows().iter().flatten().any(|c| !c.trim().is_empty()))
        else {
            return Ok(Vec::new());
        };

        let key = compute_fingerprint(&[&paths.fingerprint_part(), "_", address, "LP_STAKING"]);
        self.cache
            .get_or_fetch("LP_STAKING", &key, || async {
                let data = self.yieldwatch.positions(address).await?;
                Ok(extract_grid(&data, paths))
            })
            .await
    }
}

/// `ABC-XYZ` and `ABC/XYZ` both become `ABCXYZ`.
fn strip_pair_separators(value: &str) -> String {
    value.chars().filter(|c| *c != '-' && *c != '/').collect()
}

/// `endpoint/seg1/seg2...` with every user value escaped.
fn endpoint_path(endpoint: &str, segments: &[&str]) -> Result<String> {
    let mut path = endpoint.to_string();
    for segment in segments {
        path.push('/');
        path.push_str(&path_segment(segment)?);
    }
    Ok(path)
}

/// Join a cell, row or column into one path segment. Items are escaped one
/// by one so the separator stays literal.
fn join_list(input: &GridInput, strip_separators: bool) -> Result<String> {
    let items = input
        .flatten()
        .into_iter()
        .map(|v| if strip_separators { strip_pair_separators(&v) } else { v })
        .filter(|v| !v.is_empty())
        .map(|v| path_segment(&v))
        .collect::<Result<Vec<_>>>()?;
    Ok(items.join(LIST_SEPARATOR))
}

/// Numeric value of `field` in a list record, or an empty cell.
fn list_cell(record: &Value, field: &str) -> Value {
    match record.get(field) {
        Some(Value::Number(n)) => n.as_f64().map(number_cell).unwrap_or_else(empty_cell),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(number_cell)
            .unwrap_or_else(empty_cell),
        _ => empty_cell(),
    }
}
