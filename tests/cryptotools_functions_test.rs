//! CryptoTools and YieldWatch functions end-to-end over a scripted transport.
//!
//! Run with: `cargo test --test cryptotools_functions_test`

mod common;

use common::harness;
use cryptotools_gateway::application::FUNCTION_NAMES;
use cryptotools_gateway::domain::GatewayError;
use serde_json::json;

const KEY_ID: &str = "cryptotools-gateway";

#[tokio::test]
async fn test_numeric_answer_is_cached() {
    let h = harness();
    h.transport.route(&format!("/BALANCE/ETH/0xabc/{}", KEY_ID), 200, "12.5");
    let args = [json!("eth"), json!("0xabc")];

    let first = h.gateway.registry.call("CRYPTOBALANCE", &args).await.unwrap();
    let second = h.gateway.registry.call("CRYPTOBALANCE", &args).await.unwrap();

    assert_eq!(first, vec![vec![json!(12.5)]]);
    assert_eq!(second, first);
    assert_eq!(h.transport.count("/BALANCE/"), 1);
}

#[tokio::test]
async fn test_text_answer_is_returned_but_not_cached() {
    let h = harness();
    h.transport.route("/TVL/nowhere/", 200, "Exchange not supported");
    let args = [json!("nowhere")];

    let first = h.gateway.registry.call("CRYPTOTVL", &args).await.unwrap();
    let second = h.gateway.registry.call("CRYPTOTVL", &args).await.unwrap();

    assert_eq!(first, vec![vec![json!("Exchange not supported")]]);
    assert_eq!(second, first);
    assert_eq!(h.transport.count("/TVL/"), 2);
}

#[tokio::test]
async fn test_user_values_stay_inside_their_path_segment() {
    let h = harness();
    h.transport.route("/BALANCE/ETH/", 200, "1.5");
    let registry = &h.gateway.registry;

    let balance = registry
        .call("CRYPTOBALANCE", &[json!("eth"), json!("0xabc/../../TVL/UNISWAP?x=1")])
        .await
        .unwrap();
    assert_eq!(balance, vec![vec![json!(1.5)]]);
    let url = h.transport.calls().pop().unwrap();
    assert!(
        url.ends_with(&format!("/BALANCE/ETH/0xabc%2F..%2F..%2FTVL%2FUNISWAP%3Fx%3D1/{}", KEY_ID)),
        "{}",
        url
    );

    let err = registry.call("CRYPTOSUMETH", &[json!("..")]).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::Validation(_))
    ));
    assert_eq!(h.transport.calls().len(), 1);
}

#[tokio::test]
async fn test_missing_arguments_fail_before_requesting() {
    let h = harness();
    let registry = &h.gateway.registry;

    let no_ticker = registry
        .call("CRYPTOBALANCE", &[json!(""), json!("0xabc")])
        .await
        .unwrap_err();
    assert_eq!(no_ticker.to_string(), "Expected ticker value");

    let no_side = registry
        .call("CRYPTODISTRIBUTIONRATE", &[json!("aave"), json!("usdc")])
        .await
        .unwrap_err();
    assert_eq!(no_side.to_string(), "Expected side input");

    let no_exchanges = registry
        .call("CRYPTOPOOLPRICE", &[json!([["CAKE", "BNB"]])])
        .await
        .unwrap_err();
    assert_eq!(no_exchanges.to_string(), "Expected exchange array input");

    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_scalar_paths_are_normalized() {
    let h = harness();
    h.transport.route("/LPOOLS/", 200, "0.42");
    h.transport.route("/DISTRIBUTIONRATE/", 200, "0.031");
    h.transport.route("/TOTALBSCBALANCE/", 200, "1500");
    let registry = &h.gateway.registry;

    let lp = registry
        .call("CRYPTOLP", &[json!("pancakeswap"), json!("cake-bnb"), json!("apr")])
        .await
        .unwrap();
    let rate = registry
        .call(
            "CRYPTODISTRIBUTIONRATE",
            &[json!("aave"), json!("usdc"), json!("borrow")],
        )
        .await
        .unwrap();
    let sum = registry.call("CRYPTOSUMBSC", &[json!("0xdef")]).await.unwrap();

    assert_eq!(lp, vec![vec![json!(0.42)]]);
    assert_eq!(rate, vec![vec![json!(0.031)]]);
    assert_eq!(sum, vec![vec![json!(1500.0)]]);

    let calls = h.transport.calls();
    assert!(calls[0].ends_with(&format!("/LPOOLS/PANCAKESWAP/CAKEBNB/APR/{}", KEY_ID)));
    assert!(calls[1].ends_with(&format!("/DISTRIBUTIONRATE/AAVE/USDC/BORROW/{}", KEY_ID)));
    assert!(calls[2].ends_with(&format!("/TOTALBSCBALANCE/0xdef/{}", KEY_ID)));
}

#[tokio::test]
async fn test_list_functions_return_a_column() {
    let h = harness();
    h.transport.route(
        "/DEXPRICE2/",
        200,
        r#"[{"TOKEN":"UNI","PRICE":"0.0031"},{"TOKEN":"AAVE","PRICE":"n/a"},{"TOKEN":"LINK","PRICE":0.0052}]"#,
    );

    let result = h
        .gateway
        .registry
        .call(
            "CRYPTODEXPRICE",
            &[json!([["UNI", "AAVE", "LINK"]]), json!("WETH"), json!("uniswap")],
        )
        .await
        .unwrap();

    assert_eq!(
        result,
        vec![vec![json!(0.0031)], vec![json!("")], vec![json!(0.0052)]]
    );
    let url = h.transport.calls().pop().unwrap();
    assert!(url.contains("/DEXPRICE2/UNI%2CAAVE%2CLINK/WETH/uniswap/"), "{}", url);
}

#[tokio::test]
async fn test_pool_price_keeps_pair_separators() {
    let h = harness();
    h.transport.route("/POOLPRICE/", 200, r#"[{"PRICE": 12.0}]"#);

    let result = h
        .gateway
        .registry
        .call("CRYPTOPOOLPRICE", &[json!("CAKE-BNB"), json!("pancakeswap")])
        .await
        .unwrap();

    assert_eq!(result, vec![vec![json!(12.0)]]);
    let url = h.transport.calls().pop().unwrap();
    assert!(url.contains("/POOLPRICE/pancakeswap/CAKE-BNB/"), "{}", url);
}

#[tokio::test]
async fn test_non_json_list_is_a_parse_error() {
    let h = harness();
    h.transport.route("/LENDING2/", 200, "Invalid key");

    let err = h
        .gateway
        .registry
        .call("CRYPTOLENDING", &[json!("aave"), json!("usdc"), json!("borrow")])
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::Parse(_))
    ));
}

#[tokio::test]
async fn test_new_pairs_table_has_header_row() {
    let h = harness();
    h.transport.route(
        "/UNISWAPFILTER/7/1000/5000/10/",
        200,
        r#"[{"PAIR":"ABC/WETH","VOLUME":1200.5},{"PAIR":"XYZ/WETH","VOLUME":90}]"#,
    );

    let result = h
        .gateway
        .registry
        .call("UNISWAP", &[json!(7), json!(1000), json!(5000), json!(10)])
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result[0], vec![json!("PAIR"), json!("VOLUME")]);
    assert_eq!(result[2], vec![json!("XYZ/WETH"), json!(90)]);
}

#[tokio::test]
async fn test_holders_and_transactions_omit_headers() {
    let h = harness();
    h.transport.route(
        "/ERC20HOLDERS/UNI/",
        200,
        r#"[{"address":"0x1","balance":10},{"address":"0x2","balance":5}]"#,
    );
    h.transport.route("/TXBEP20/0xabc/30/", 200, r#"[{"hash":"0xh","value":1}]"#);
    let registry = &h.gateway.registry;

    let holders = registry
        .call("CRYPTO_ERC20HOLDERS", &[json!("uni")])
        .await
        .unwrap();
    let txs = registry
        .call("CRYPTOTX_BEP20", &[json!("0xabc")])
        .await
        .unwrap();

    assert_eq!(
        holders,
        vec![vec![json!("0x1"), json!(10)], vec![json!("0x2"), json!(5)]]
    );
    assert_eq!(txs, vec![vec![json!("0xh"), json!(1)]]);
}

#[tokio::test]
async fn test_tables_are_not_cached() {
    let h = harness();
    h.transport.route("/BTCFUTURES/", 200, r#"[{"EXCHANGE":"X","BASIS":0.02}]"#);

    for _ in 0..2 {
        h.gateway
            .registry
            .call("CRYPTOFUTURES", &[json!("btc")])
            .await
            .unwrap();
    }

    assert_eq!(h.transport.count("/BTCFUTURES/"), 2);
}

#[tokio::test]
async fn test_throttling_is_not_retried() {
    let h = harness();
    h.transport.route("/STAKING/", 429, "slow down");

    let err = h
        .gateway
        .registry
        .call("CRYPTOSTAKING", &[json!("dot"), json!("1abc")])
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::Upstream { status: 429, attempts: 1, .. })
    ));
    assert!(h.sleeper.waits().is_empty());
}

#[tokio::test]
async fn test_lp_staking_extracts_paths() {
    let h = harness();
    h.transport.route_json(
        "yieldwatch.net/api/all/0xabc",
        json!({
            "status": "1",
            "result": {
                "PancakeSwap": {
                    "staking": {"totalUSDValues": {"deposit": 120.5, "yield": 3.25}},
                    "vaults": [{"name": "CAKE-BNB", "apr": 41.2}]
                }
            }
        }),
    );
    let paths = json!([
        ["result.PancakeSwap.staking.totalUSDValues.deposit"],
        ["result/PancakeSwap/vaults/0/name"],
        ["result.PancakeSwap.farms"]
    ]);

    let first = h
        .gateway
        .registry
        .call("LP_STAKING", &[json!("0xabc"), paths.clone()])
        .await
        .unwrap();
    let second = h
        .gateway
        .registry
        .call("LP_STAKING", &[json!("0xabc"), paths])
        .await
        .unwrap();

    assert_eq!(
        first,
        vec![vec![json!(120.5)], vec![json!("CAKE-BNB")], vec![json!("")]]
    );
    assert_eq!(second, first);
    assert_eq!(h.transport.count("yieldwatch"), 1);
    assert!(h.transport.calls()[0].ends_with("/0xabc?platforms=pancake"));
}

#[tokio::test]
async fn test_lp_staking_without_paths_is_empty() {
    let h = harness();

    let result = h
        .gateway
        .registry
        .call("LP_STAKING", &[json!("0xabc")])
        .await
        .unwrap();

    assert!(result.is_empty());
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_every_listed_function_dispatches() {
    for name in FUNCTION_NAMES {
        let h = harness();
        let outcome = h.gateway.registry.call(&name.to_lowercase(), &[]).await;
        if let Err(err) = outcome {
            assert!(
                !matches!(
                    err.downcast_ref::<GatewayError>(),
                    Some(GatewayError::UnknownFunction(_))
                ),
                "{} did not dispatch",
                name
            );
        }
    }
}

#[tokio::test]
async fn test_unknown_function() {
    let h = harness();

    let err = h
        .gateway
        .registry
        .call("GECKOMOON", &[json!("btc")])
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::UnknownFunction(name)) if name == "GECKOMOON"
    ));
}
