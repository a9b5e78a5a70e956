//! Function registry: spreadsheet function name + positional arguments → grid.
//!
//! Arguments arrive as JSON values exactly as the host sends them: a scalar for
//! a single cell, a 2D array for a range. Missing trailing arguments read as
//! blank cells so optional parameters fall back to their defaults.

use crate::application::cmc_service::CmcService;
use crate::application::cryptotools_service::{Chain, CryptoToolsService, Dex};
use crate::application::gecko_service::{GeckoService, MarketField};
use crate::domain::grid::{cell_text, Grid};
use crate::domain::{GatewayError, GridInput, SearchType};
use anyhow::Result;
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Every function name the registry dispatches.
pub const FUNCTION_NAMES: &[&str] = &[
    // CoinGecko
    "GECKOPRICE",
    "GECKOPRICEBYNAME",
    "GECKOVOLUME",
    "GECKOVOLUMEBYNAME",
    "GECKOCAP",
    "GECKOCAPBYNAME",
    "GECKOCAPDILUTED",
    "GECKO24HPRICECHANGE",
    "GECKORANK",
    "GECKOATH",
    "GECKOATL",
    "GECKO24HIGH",
    "GECKO24LOW",
    "GECKOLOGO",
    "GECKOLOGOBYNAME",
    "GECKOHIST",
    "GECKOCHANGE",
    "GECKOCHANGEBYNAME",
    "GECKOCHART",
    "GECKO_ID_DATA",
    "COINGECKO_ID",
    // CoinMarketCap
    "CMC_DATA",
    "CMC_HIST_DATA",
    "CMC_PRICE",
    "CMC_VOLUME",
    "CMC_MARKET_CAP",
    "CMC_DIL_MARKET_CAP",
    "CMC_MARKET_CAP_DOM",
    "CMC_1HR_PERCENT_CHANGE",
    "CMC_24HR_PERCENT_CHANGE",
    "CMC_7D_PERCENT_CHANGE",
    "CMC_30D_PERCENT_CHANGE",
    "CMC_RANK",
    "CMC_ID",
    "CMC_NAME",
    "CMC_SYMBOL",
    "CMC_SLUG",
    "CMC_CIRCULATING_SUPPLY",
    "CMC_TOTAL_SUPPLY",
    "CMC_MAX_SUPPLY",
    "CMC_HIST_PRICE",
    "CMC_HIST_VOLUME",
    "CMC_HIST_MARKET_CAP",
    // CryptoTools
    "CRYPTOBALANCE",
    "CRYPTOREWARDS",
    "CRYPTOSTAKING",
    "CRYPTOSUMETH",
    "CRYPTOSUMBSC",
    "CRYPTOTVL",
    "CRYPTODEXVOLUME",
    "CRYPTODEXFEE",
    "CRYPTODISTRIBUTIONRATE",
    "CRYPTOLP",
    "CRYPTOPOOLPRICE",
    "CRYPTOFARMING",
    "CRYPTODEXPRICE",
    "CRYPTOLENDING",
    "UNISWAP",
    "SUSHISWAP",
    "PANCAKESWAP",
    "CRYPTOFUTURES",
    "CRYPTO_ERC20HOLDERS",
    "CRYPTO_BEP20HOLDERS",
    "CRYPTOTX_ERC20",
    "CRYPTOTX_BEP20",
    // YieldWatch
    "LP_STAKING",
];

/// Positional argument reader.
struct Args<'a> {
    function: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn value(&self, index: usize) -> &'a Value {
        static BLANK: Value = Value::Null;
        self.values.get(index).unwrap_or(&BLANK)
    }

    fn grid(&self, index: usize) -> Result<GridInput> {
        Ok(GridInput::try_from(self.value(index).clone())?)
    }

    /// `None` when the argument is missing or blank.
    fn opt_grid(&self, index: usize) -> Result<Option<GridInput>> {
        let grid = self.grid(index)?;
        Ok(match &grid {
            GridInput::Scalar(s) if s.trim().is_empty() => None,
            _ => Some(grid),
        })
    }

    /// A single cell, as text.
    fn text(&self, index: usize) -> Result<String> {
        match self.grid(index)? {
            GridInput::Scalar(s) => Ok(s),
            _ => Err(GatewayError::validation(format!(
                "Argument {} of {} must be a single cell",
                index + 1,
                self.function
            ))
            .into()),
        }
    }

    fn opt_text(&self, index: usize) -> Result<Option<String>> {
        let text = self.text(index)?;
        Ok((!text.trim().is_empty()).then_some(text))
    }

    fn bool_or(&self, index: usize, default: bool) -> Result<bool> {
        match self.value(index) {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => Ok(n.as_f64().is_some_and(|n| n != 0.0)),
            other => match cell_text(other).trim().to_lowercase().as_str() {
                "" => Ok(default),
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(GatewayError::validation(format!(
                    "Argument {} of {} must be TRUE or FALSE",
                    index + 1,
                    self.function
                ))
                .into()),
            },
        }
    }

    fn search_type(&self, index: usize) -> Result<SearchType> {
        match self.opt_text(index)? {
            None => Ok(SearchType::default()),
            Some(s) => SearchType::parse(&s).ok_or_else(|| {
                GatewayError::validation("Search type should be either id, symbol or slug").into()
            }),
        }
    }
}

pub struct FunctionRegistry {
    gecko: Arc<GeckoService>,
    cmc: Arc<CmcService>,
    tools: Arc<CryptoToolsService>,
}

impl FunctionRegistry {
    pub fn new(gecko: Arc<GeckoService>, cmc: Arc<CmcService>, tools: Arc<CryptoToolsService>) -> Self {
        Self { gecko, cmc, tools }
    }

    pub fn function_names(&self) -> &'static [&'static str] {
        FUNCTION_NAMES
    }

    /// Run `name` with positional `args`. Names are case-insensitive.
    pub async fn call(&self, name: &str, args: &[Value]) -> Result<Grid> {
        let upper = name.trim().to_uppercase();
        let Some(&function) = FUNCTION_NAMES.iter().find(|f| **f == upper) else {
            return Err(GatewayError::UnknownFunction(name.to_string()).into());
        };

        counter!("function_calls_total", "function" => function).increment(1);
        debug!("Calling {} with {} argument(s)", function, args.len());

        let a = Args {
            function,
            values: args,
        };
        match function {
            "GECKOPRICE" | "GECKOPRICEBYNAME" => {
                let by_ticker = function == "GECKOPRICE";
                self.gecko.price(&a.grid(0)?, &a.grid(1)?, by_ticker).await
            }
            "GECKOVOLUME" => self.market(&a, function, true, MarketField::TotalVolume).await,
            "GECKOVOLUMEBYNAME" => self.market(&a, function, false, MarketField::TotalVolume).await,
            "GECKOCAP" => self.market(&a, function, true, MarketField::MarketCap).await,
            "GECKOCAPBYNAME" => {
                let field = if a.bool_or(2, false)? {
                    MarketField::FullyDilutedValuation
                } else {
                    MarketField::MarketCap
                };
                self.market(&a, function, false, field).await
            }
            "GECKOCAPDILUTED" => {
                self.market(&a, function, true, MarketField::FullyDilutedValuation)
                    .await
            }
            "GECKO24HPRICECHANGE" => {
                self.market(&a, function, true, MarketField::PriceChange24h)
                    .await
            }
            "GECKORANK" => self.market(&a, function, true, MarketField::MarketCapRank).await,
            "GECKOATH" => self.market(&a, function, true, MarketField::Ath).await,
            "GECKOATL" => self.market(&a, function, true, MarketField::Atl).await,
            "GECKO24HIGH" => self.market(&a, function, true, MarketField::High24h).await,
            "GECKO24LOW" => self.market(&a, function, true, MarketField::Low24h).await,
            "GECKOLOGO" => self.market(&a, function, true, MarketField::Image).await,
            "GECKOLOGOBYNAME" => self.market(&a, function, false, MarketField::Image).await,
            "GECKOHIST" => {
                self.gecko
                    .history(&a.text(0)?, &a.text(1)?, &a.text(2)?, &a.text(3)?, a.bool_or(4, true)?)
                    .await
            }
            "GECKOCHANGE" | "GECKOCHANGEBYNAME" => {
                let by_ticker = function == "GECKOCHANGE";
                self.gecko
                    .change(&a.text(0)?, &a.text(1)?, &a.text(2)?, &a.text(3)?, by_ticker)
                    .await
            }
            "GECKOCHART" => {
                self.gecko
                    .chart(&a.text(0)?, &a.text(1)?, &a.text(2)?, &a.text(3)?, &a.text(4)?)
                    .await
            }
            "GECKO_ID_DATA" => {
                self.gecko
                    .id_data(&a.text(0)?, &a.grid(1)?, a.bool_or(2, true)?)
                    .await
            }
            "COINGECKO_ID" => self.gecko.coin_id(&a.text(0)?).await,

            "CMC_DATA" => self.cmc.data(&a.grid(0)?, &a.grid(1)?, a.search_type(2)?).await,
            "CMC_HIST_DATA" => {
                self.cmc
                    .hist_data(&a.grid(0)?, &a.grid(1)?, &a.text(2)?, a.search_type(3)?)
                    .await
            }
            "CMC_HIST_PRICE" | "CMC_HIST_VOLUME" | "CMC_HIST_MARKET_CAP" => {
                self.cmc
                    .hist_currency_field(
                        &a.grid(0)?,
                        &a.text(1)?,
                        &a.grid(2)?,
                        cmc_field(function),
                        a.search_type(3)?,
                    )
                    .await
            }
            "CMC_RANK" | "CMC_ID" | "CMC_NAME" | "CMC_SYMBOL" | "CMC_SLUG"
            | "CMC_CIRCULATING_SUPPLY" | "CMC_TOTAL_SUPPLY" | "CMC_MAX_SUPPLY" => {
                self.cmc
                    .field(&a.grid(0)?, cmc_field(function), a.search_type(1)?)
                    .await
            }
            f if f.starts_with("CMC_") => {
                self.cmc
                    .currency_field(&a.grid(0)?, &a.grid(1)?, cmc_field(f), a.search_type(2)?)
                    .await
            }

            "CRYPTOBALANCE" => self.tools.balance(&a.text(0)?, &a.text(1)?).await,
            "CRYPTOREWARDS" => self.tools.rewards(&a.text(0)?, &a.text(1)?).await,
            "CRYPTOSTAKING" => self.tools.staking(&a.text(0)?, &a.text(1)?).await,
            "CRYPTOSUMETH" => self.tools.sum_eth(&a.text(0)?).await,
            "CRYPTOSUMBSC" => self.tools.sum_bsc(&a.text(0)?).await,
            "CRYPTOTVL" => self.tools.tvl(&a.text(0)?).await,
            "CRYPTODEXVOLUME" => self.tools.dex_volume(&a.text(0)?).await,
            "CRYPTODEXFEE" => self.tools.dex_fee(&a.text(0)?).await,
            "CRYPTODISTRIBUTIONRATE" => {
                self.tools
                    .distribution_rate(&a.text(0)?, &a.text(1)?, &a.text(2)?)
                    .await
            }
            "CRYPTOLP" => {
                self.tools
                    .liquidity_pool(&a.text(0)?, &a.text(1)?, &a.text(2)?)
                    .await
            }
            "CRYPTOPOOLPRICE" => self.tools.pool_price(&a.grid(0)?, &a.grid(1)?).await,
            "CRYPTOFARMING" => {
                self.tools
                    .farming(&a.grid(0)?, &a.grid(1)?, &a.grid(2)?)
                    .await
            }
            "CRYPTODEXPRICE" => {
                self.tools
                    .dex_price(&a.grid(0)?, &a.grid(1)?, &a.grid(2)?)
                    .await
            }
            "CRYPTOLENDING" => {
                self.tools
                    .lending(&a.grid(0)?, &a.grid(1)?, &a.grid(2)?)
                    .await
            }
            "UNISWAP" | "SUSHISWAP" | "PANCAKESWAP" => {
                let dex = match function {
                    "UNISWAP" => Dex::Uniswap,
                    "SUSHISWAP" => Dex::Sushiswap,
                    _ => Dex::Pancakeswap,
                };
                self.tools
                    .new_pairs(dex, &a.text(0)?, &a.text(1)?, &a.text(2)?, &a.text(3)?)
                    .await
            }
            "CRYPTOFUTURES" => self.tools.futures(&a.text(0)?).await,
            "CRYPTO_ERC20HOLDERS" => self.tools.holders(Chain::Erc20, &a.text(0)?).await,
            "CRYPTO_BEP20HOLDERS" => self.tools.holders(Chain::Bep20, &a.text(0)?).await,
            "CRYPTOTX_ERC20" | "CRYPTOTX_BEP20" => {
                let chain = if function == "CRYPTOTX_ERC20" {
                    Chain::Erc20
                } else {
                    Chain::Bep20
                };
                let days = a.opt_text(1)?;
                self.tools
                    .transactions(chain, &a.text(0)?, days.as_deref())
                    .await
            }
            "LP_STAKING" => {
                let paths = a.opt_grid(1)?;
                self.tools.lp_staking(&a.text(0)?, paths.as_ref()).await
            }
            _ => Err(GatewayError::UnknownFunction(name.to_string()).into()),
        }
    }

    /// Markets family: (tickers, currency).
    async fn market(&self, a: &Args<'_>, tag: &str, by_ticker: bool, field: MarketField) -> Result<Grid> {
        self.gecko
            .market_field(tag, &a.grid(0)?, &a.text(1)?, by_ticker, field)
            .await
    }
}

/// Record field behind a named CoinMarketCap function.
fn cmc_field(function: &str) -> &'static str {
    match function {
        "CMC_PRICE" | "CMC_HIST_PRICE" => "price",
        "CMC_VOLUME" | "CMC_HIST_VOLUME" => "volume_24h",
        "CMC_MARKET_CAP" | "CMC_HIST_MARKET_CAP" => "market_cap",
        "CMC_DIL_MARKET_CAP" => "fully_diluted_market_cap",
        "CMC_MARKET_CAP_DOM" => "market_cap_dominance",
        "CMC_1HR_PERCENT_CHANGE" => "percent_change_1h",
        "CMC_24HR_PERCENT_CHANGE" => "percent_change_24h",
        "CMC_7D_PERCENT_CHANGE" => "percent_change_7d",
        "CMC_30D_PERCENT_CHANGE" => "percent_change_30d",
        "CMC_RANK" => "cmc_rank",
        "CMC_ID" => "id",
        "CMC_NAME" => "name",
        "CMC_SYMBOL" => "symbol",
        "CMC_SLUG" => "slug",
        "CMC_CIRCULATING_SUPPLY" => "circulating_supply",
        "CMC_TOTAL_SUPPLY" => "total_supply",
        _ => "max_supply",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cmc_service::{HISTORICAL_FIELDS, PLAIN_FIELDS, QUOTE_FIELDS};
    use serde_json::json;

    fn args(values: &[Value]) -> Args<'_> {
        Args {
            function: "TEST",
            values,
        }
    }

    #[test]
    fn test_every_cmc_name_maps_to_a_known_field() {
        for name in FUNCTION_NAMES.iter().filter(|n| n.starts_with("CMC_")) {
            if *name == "CMC_DATA" || *name == "CMC_HIST_DATA" {
                continue;
            }
            let field = cmc_field(name);
            let known = if name.starts_with("CMC_HIST_") {
                HISTORICAL_FIELDS.contains(&field)
            } else {
                QUOTE_FIELDS.contains(&field) || PLAIN_FIELDS.contains(&field)
            };
            assert!(known, "{} -> {}", name, field);
        }
    }

    #[test]
    fn test_function_names_are_unique() {
        let mut names = FUNCTION_NAMES.to_vec();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), FUNCTION_NAMES.len());
    }

    #[test]
    fn test_missing_arguments_read_blank() {
        let values = [json!("btc")];
        let a = args(&values);
        assert_eq!(a.text(0).unwrap(), "btc");
        assert_eq!(a.text(3).unwrap(), "");
        assert_eq!(a.opt_text(3).unwrap(), None);
        assert!(a.opt_grid(3).unwrap().is_none());
        assert!(a.bool_or(3, true).unwrap());
        assert_eq!(a.search_type(3).unwrap(), SearchType::Symbol);
    }

    #[test]
    fn test_text_rejects_ranges() {
        let values = [json!([["a", "b"]])];
        let err = args(&values).text(0).unwrap_err();
        assert_eq!(err.to_string(), "Argument 1 of TEST must be a single cell");
    }

    #[test]
    fn test_bool_forms() {
        let values = [json!(true), json!(0), json!("FALSE"), json!("maybe")];
        let a = args(&values);
        assert!(a.bool_or(0, false).unwrap());
        assert!(!a.bool_or(1, true).unwrap());
        assert!(!a.bool_or(2, true).unwrap());
        assert!(a.bool_or(3, true).is_err());
    }

    #[test]
    fn test_numbers_read_as_text() {
        let values = [json!(30), json!([[1, 2], [3, 4]])];
        let a = args(&values);
        assert_eq!(a.text(0).unwrap(), "30");
        assert_eq!(a.grid(1).unwrap().shape(), (2, 2));
    }

    #[test]
    fn test_bad_search_type() {
        let values = [json!("name")];
        let err = args(&values).search_type(0).unwrap_err();
        assert!(err.to_string().contains("id, symbol or slug"));
    }
}
