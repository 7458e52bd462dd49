//! Satellite band-algebra tile service.
//!
//! Renders XYZ tiles from Sentinel-2 scenes found through a STAC catalog,
//! runs area-of-interest computations in the background and streams their
//! progress over a websocket.

pub mod bands;
pub mod config;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod state;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// Build the HTTP router over `state`.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Tiles and search
        .route("/tile/:z/:x/:y", get(handlers::tile_handler))
        .route("/search", get(handlers::search_handler))
        // Background computations
        .route("/compute", post(handlers::compute_handler))
        .route("/compute/jobs", get(handlers::list_jobs_handler))
        .route(
            "/compute/:id",
            get(handlers::job_status_handler).delete(handlers::cancel_job_handler),
        )
        .route("/ws", get(handlers::ws_handler))
        // Band metadata
        .route("/sentinel2-bands", get(handlers::bands_handler))
        // Health and metrics
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/metrics", get(handlers::api_metrics_handler))
        .route("/cache/stats", get(handlers::cache_stats_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
