//! Health checks, metrics, and cache statistics.

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use storage::CacheStats;

use crate::metrics::MetricsSnapshot;
use crate::state::AppState;

/// GET /health - basic health check
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "tile-api",
        "version": env!("CARGO_PKG_VERSION"),
        "progress_connections": state.progress.len(),
        "active_jobs": state.jobs.active_count(),
    }))
}

/// GET /metrics - Prometheus metrics endpoint
pub async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// GET /api/metrics - JSON metrics
pub async fn api_metrics_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// GET /cache/stats - tile cache statistics
pub async fn cache_stats_handler(Extension(state): Extension<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.pipeline.cache_stats())
}
