//! Scripted upstreams for the integration tests.
//!
//! `ScriptedTransport` answers by URL substring, first registered route wins.
//! A route with several responses plays them in order and then repeats the
//! last one. Unrouted URLs answer 404.

#![allow(dead_code)]

use async_trait::async_trait;
use cryptotools_gateway::application::Gateway;
use cryptotools_gateway::config::{ApiKeys, Config};
use cryptotools_gateway::domain::{HttpTransport, Sleeper, UpstreamResponse};
use cryptotools_gateway::infrastructure::InMemoryCache;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Route {
    pattern: String,
    responses: VecDeque<UpstreamResponse>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, pattern: &str, status: u16, body: impl Into<String>) {
        self.route_sequence(pattern, vec![(status, body.into())]);
    }

    pub fn route_json(&self, pattern: &str, body: Value) {
        self.route(pattern, 200, body.to_string());
    }

    pub fn route_sequence(&self, pattern: &str, responses: Vec<(u16, String)>) {
        self.routes.lock().unwrap().push(Route {
            pattern: pattern.to_string(),
            responses: responses
                .into_iter()
                .map(|(status, body)| UpstreamResponse::new(status, body))
                .collect(),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests whose URL contains `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|url| url.contains(pattern)).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str, _headers: &[(String, String)]) -> anyhow::Result<UpstreamResponse> {
        self.calls.lock().unwrap().push(url.to_string());

        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.iter_mut().find(|r| url.contains(&r.pattern)) else {
            return Ok(UpstreamResponse::new(404, r#"{"error":"not found"}"#));
        };
        let response = if route.responses.len() > 1 {
            route.responses.pop_front()
        } else {
            route.responses.front().cloned()
        };
        Ok(response.unwrap_or_else(|| UpstreamResponse::new(404, "")))
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

pub struct Harness {
    pub gateway: Gateway,
    pub transport: Arc<ScriptedTransport>,
    pub sleeper: Arc<RecordingSleeper>,
}

/// A gateway over the scripted transport, with jitter disabled and an empty
/// in-memory cache.
pub fn harness() -> Harness {
    let mut config = Config::default();
    config.fetch.request_jitter_ms = 0;
    let keys = ApiKeys::from_lookup(|_| None);

    let transport = ScriptedTransport::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let gateway = Gateway::build(
        &config,
        &keys,
        transport.clone(),
        sleeper.clone(),
        Arc::new(InMemoryCache::new()),
    );
    Harness {
        gateway,
        transport,
        sleeper,
    }
}

/// CoinGecko `search` directory with BTC, ETH and SOL.
pub fn route_directory(transport: &ScriptedTransport) {
    transport.route_json(
        "/search",
        json!({
            "coins": [
                {"id": "bitcoin", "symbol": "BTC", "name": "Bitcoin"},
                {"id": "ethereum", "symbol": "ETH", "name": "Ethereum"},
                {"id": "solana", "symbol": "SOL", "name": "Solana"}
            ]
        }),
    );
}

pub fn simple_prices() -> Value {
    json!({
        "bitcoin": {"usd": 50000.0, "eur": 46000.0},
        "ethereum": {"usd": 3000.0, "eur": 2760.0},
        "solana": {"usd": 150.0, "eur": 138.0}
    })
}
