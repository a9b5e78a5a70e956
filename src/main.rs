//! CryptoTools Gateway
//!
//! HTTP gateway serving spreadsheet custom functions for cryptocurrency market
//! data from CoinGecko, CoinMarketCap, the CryptoTools aggregator and
//! YieldWatch, with fingerprinted TTL caching and status-code retry.
//!
//! # Architecture
//!
//! The API follows clean/onion architecture with clear separation of concerns:
//! - **Domain**: grids, pairs, the error taxonomy and the collaborator traits
//! - **Application**: cache, ticker resolution and one service per upstream
//! - **Infrastructure**: HTTP transport, retrying fetcher, upstream clients, cache stores
//! - **API**: HTTP handlers, routing, and middleware
//!
//! # Configuration
//!
//! The gateway is configured via `config.yaml` and environment variables:
//! - `CONFIG_PATH`: config file location (default: config.yaml)
//! - `PORT`: overrides `server.port`
//! - `REDIS_URL`: share the cache through Redis instead of process memory
//! - `CG_PRO_API_KEY`, `CMC_PRO_API_KEY`, `CRYPTOTOOLS_API_KEY`, `CRYPTOTOOLS_KEY_ID`
//! - `RUST_LOG`: Logging level (default: info)
//! - `LOG_FORMAT`: `json` or `text` (default: text)
//!
//! # Quick Start
//!
//! ```bash
//! export CMC_PRO_API_KEY="your_key_here"
//! cargo run --release
//!
//! curl http://localhost:3010/health
//! curl -X POST http://localhost:3010/v1/functions/GECKOPRICE \
//!      -H 'content-type: application/json' \
//!      -d '{"args": [[["BTC","ETH"]], "usd"]}'
//! ```

use anyhow::Context;
use cryptotools_gateway::api::routes::create_router;
use cryptotools_gateway::api::state::AppState;
use cryptotools_gateway::application::Gateway;
use cryptotools_gateway::config::{ApiKeys, Config};
use cryptotools_gateway::domain::CacheRepository;
use cryptotools_gateway::infrastructure::{InMemoryCache, RedisRepository, ReqwestTransport, TokioSleeper};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::env;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = EnvFilter::new(env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load Config
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&config_path)?;
    let keys = ApiKeys::from_env();

    if keys.coingecko.is_none() {
        tracing::info!("CG_PRO_API_KEY not set - using the public CoinGecko API");
    }

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    // Infrastructure
    let redis_url = env::var("REDIS_URL").ok().filter(|u| !u.trim().is_empty());
    let cache_backend = if redis_url.is_some() { "redis" } else { "memory" };
    let store: Arc<dyn CacheRepository> = match redis_url {
        Some(url) => Arc::new(RedisRepository::new(&url)?),
        None => {
            tracing::info!("REDIS_URL not set - caching in process memory");
            Arc::new(InMemoryCache::new())
        }
    };
    let transport = Arc::new(ReqwestTransport::new()?);

    // Application
    let gateway = Gateway::build(&config, &keys, transport, Arc::new(TokioSleeper), store);
    tracing::info!(
        "Serving {} functions, cache TTL {}s",
        gateway.registry.function_names().len(),
        config.cache.default_ttl_secs
    );

    let state = AppState {
        registry: gateway.registry,
        cache: gateway.cache,
        metrics,
        cache_backend,
    };

    let app = create_router(state, &config.server.allowed_origins);

    // Allow PORT env var override
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(config.server.port);
    let addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    tracing::info!("CryptoTools gateway running at http://{}", addr);

    // Graceful shutdown handling
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error during operation")?;

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C) to initiate graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
