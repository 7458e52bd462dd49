//! HTTP request handlers.
//!
//! - `tile`: XYZ tile rendering
//! - `search`: raw catalog search
//! - `compute`: background area computations and their status
//! - `progress`: websocket progress channel
//! - `bands`: spectral band metadata
//! - `health`: health, metrics and cache statistics
//! - `common`: JSON error envelope and query extraction helpers

pub mod bands;
pub mod common;
pub mod compute;
pub mod health;
pub mod progress;
pub mod search;
pub mod tile;

pub use bands::bands_handler;
pub use common::{ApiError, ApiResult};
pub use compute::{
    cancel_job_handler, compute_handler, job_status_handler, list_jobs_handler, ComputeParams,
};
pub use health::{api_metrics_handler, cache_stats_handler, health_handler, metrics_handler};
pub use progress::ws_handler;
pub use search::{search_handler, SearchParams};
pub use tile::{tile_handler, TileParams};
