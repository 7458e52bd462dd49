//! Spectral band metadata endpoint.

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    Json,
};
use scene_common::ServiceError;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::common::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct BandParams {
    pub band: Option<String>,
}

/// GET /sentinel2-bands - band titles, or one band's record with `?band=`
pub async fn bands_handler(
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<BandParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;
    match params.band.filter(|b| !b.is_empty()) {
        Some(name) => state
            .bands
            .band(&name)
            .map(Json)
            .ok_or_else(|| ServiceError::NotFound("Band not found".to_string()).into()),
        None => Ok(Json(state.bands.titles())),
    }
}
