use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::state::AppState;
use crate::application::CacheStats;
use crate::domain::GatewayError;

#[allow(unused_imports)]
use serde_json::json; // Used in utoipa::path examples

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Positional arguments of a spreadsheet function call.
#[derive(Deserialize, ToSchema, Debug, Validate)]
pub struct FunctionCallRequest {
    /// One entry per argument: a scalar for a single cell, a 2D array for a range
    #[serde(default)]
    #[validate(length(max = 16))]
    #[schema(value_type = Vec<Object>, example = json!([[["BTC", "ETH"]], "usd"]))]
    pub args: Vec<Value>,
}

#[derive(Serialize, ToSchema)]
pub struct FunctionCallResponse {
    /// Canonical (upper case) function name
    pub function: String,
    /// Rows of cells; blank cells are empty strings
    #[schema(value_type = Vec<Vec<Object>>)]
    pub result: Vec<Vec<Value>>,
}

#[derive(Serialize, ToSchema)]
pub struct FunctionListResponse {
    pub functions: Vec<String>,
    pub count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cache_backend: String,
    pub functions: usize,
}

/// Map an application error to an HTTP status and body.
///
/// Validation → 400, unknown function → 404, upstream failure → 502,
/// anything else → 500.
pub fn error_response(err: anyhow::Error) -> (StatusCode, Json<ErrorResponse>) {
    let (status, details) = match err.downcast_ref::<GatewayError>() {
        Some(GatewayError::Validation(_)) => (StatusCode::BAD_REQUEST, None),
        Some(GatewayError::UnknownFunction(_)) => (StatusCode::NOT_FOUND, None),
        Some(GatewayError::Upstream { body, .. }) => (StatusCode::BAD_GATEWAY, Some(body.clone())),
        Some(GatewayError::Parse(_)) => (StatusCode::BAD_GATEWAY, None),
        None => (StatusCode::INTERNAL_SERVER_ERROR, Some(format!("{:#}", err))),
    };
    if status.is_server_error() {
        warn!("Function call failed with {}: {:#}", status, err);
    }

    let error = match err.downcast_ref::<GatewayError>() {
        Some(gateway) => gateway.to_string(),
        None => "Internal server error".to_string(),
    };
    (status, Json(ErrorResponse { error, details }))
}

/// Call a spreadsheet function.
///
/// Arguments are positional and shaped like the spreadsheet cells they came
/// from. The result is a 2D array the host renders as-is.
#[utoipa::path(
    post,
    path = "/v1/functions/{name}",
    tag = "Functions",
    params(
        ("name" = String, Path, description = "Function name, case-insensitive", example = "GECKOPRICE")
    ),
    request_body = FunctionCallRequest,
    responses(
        (status = 200, description = "Function result", body = FunctionCallResponse,
            example = json!({"function": "GECKOPRICE", "result": [[50123.5, 2650.12]]})),
        (status = 400, description = "Invalid argument", body = ErrorResponse,
            example = json!({"error": "Expected ticker value"})),
        (status = 404, description = "Unknown function", body = ErrorResponse),
        (status = 502, description = "Upstream API failure", body = ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn call_function_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<FunctionCallRequest>,
) -> Result<Json<FunctionCallResponse>, (StatusCode, Json<ErrorResponse>)> {
    if let Err(e) = request.validate() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Invalid request".to_string(),
                details: Some(e.to_string()),
            }),
        ));
    }

    let result = state
        .registry
        .call(&name, &request.args)
        .await
        .map_err(error_response)?;

    Ok(Json(FunctionCallResponse {
        function: name.trim().to_uppercase(),
        result,
    }))
}

/// List supported functions
#[utoipa::path(
    get,
    path = "/v1/functions",
    tag = "Functions",
    responses(
        (status = 200, description = "Supported function names", body = FunctionListResponse)
    )
)]
pub async fn list_functions_handler(State(state): State<AppState>) -> Json<FunctionListResponse> {
    let functions: Vec<String> = state
        .registry
        .function_names()
        .iter()
        .map(|f| f.to_string())
        .collect();
    Json(FunctionListResponse {
        count: functions.len(),
        functions,
    })
}

/// Get cache statistics
#[utoipa::path(
    get,
    path = "/v1/cache/stats",
    tag = "Cache",
    responses(
        (status = 200, description = "Cache hit/miss counters per function", body = CacheStats)
    )
)]
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Health check passed", body = HealthResponse)
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        cache_backend: state.cache_backend.to_string(),
        functions: state.registry.function_names().len(),
    })
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "system",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain")
    )
)]
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}
