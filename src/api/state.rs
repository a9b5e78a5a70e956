use crate::application::{CacheService, FunctionRegistry};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FunctionRegistry>,
    pub cache: Arc<CacheService>,
    /// Renders the process-wide recorder installed at startup
    pub metrics: PrometheusHandle,
    /// "memory" or "redis"
    pub cache_backend: &'static str,
}
