//! Catalog search endpoint.

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    Json,
};
use catalog::SceneQuery;
use scene_common::{BoundingBox, Lookback, ServiceError, TimeWindow};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use super::common::{non_empty, ApiResult};
use crate::metrics::Timer;
use crate::state::AppState;

/// Page size for interactive searches.
pub const SEARCH_LIMIT: u32 = 100;

/// Query parameters of `GET /search`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    /// "west,south,east,north"
    pub bbox: Option<String>,
    pub cloud_cover: Option<u32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// GET /search - catalog search, returning the catalog's own response
#[instrument(skip_all)]
pub async fn search_handler(
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;

    let bbox = non_empty(params.bbox)
        .ok_or_else(|| ServiceError::invalid("bbox is required (west,south,east,north)"))?;
    let bbox = BoundingBox::from_query_string(&bbox).map_err(ServiceError::from)?;
    let window = TimeWindow::from_query_now(
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        Lookback::SEARCH,
    )
    .map_err(ServiceError::from)?;
    let cloud_cover = params.cloud_cover.unwrap_or(state.config.default_cloud_cover);

    let query = SceneQuery::new(bbox, window, cloud_cover, SEARCH_LIMIT);

    let timer = Timer::start();
    let result = state.catalog.search(&query).await;
    state
        .metrics
        .record_catalog_search(timer.elapsed_us(), result.is_ok());

    let response = result.map_err(|e| ServiceError::CatalogUnavailable(e.to_string()))?;
    Ok(Json(response.raw))
}
