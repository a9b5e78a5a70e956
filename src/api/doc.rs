use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health_handler,
        crate::api::handlers::metrics_handler,
        crate::api::handlers::call_function_handler,
        crate::api::handlers::list_functions_handler,
        crate::api::handlers::cache_stats_handler
    ),
    components(
        schemas(
            crate::api::handlers::HealthResponse,
            crate::api::handlers::FunctionCallRequest,
            crate::api::handlers::FunctionCallResponse,
            crate::api::handlers::FunctionListResponse,
            crate::api::handlers::ErrorResponse,
            crate::application::CacheStats,
            crate::application::TagStats
        )
    ),
    tags(
        (name = "system", description = "System endpoints for health checks and metrics"),
        (name = "Functions", description = "Spreadsheet crypto functions backed by CoinGecko, CoinMarketCap, CryptoTools and YieldWatch"),
        (name = "Cache", description = "Cache statistics")
    ),
    info(
        title = "CryptoTools Gateway",
        version = "0.1.0",
        description = "Spreadsheet custom functions for cryptocurrency market data, with fingerprinted TTL caching and upstream retry."
    )
)]
pub struct ApiDoc;
