//! XYZ tile endpoint.

use axum::{
    extract::{Extension, Path, Query},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use axum::extract::rejection::{PathRejection, QueryRejection};
use scene_common::{Lookback, TileCoord, TimeWindow};
use serde::Deserialize;
use std::sync::Arc;

use super::common::{non_empty, ApiResult};
use crate::pipeline::{TileRequest, TileResponse};
use crate::state::AppState;

pub const DEFAULT_BAND: &str = "visual";
pub const DEFAULT_FORMULA: &str = "band1";

/// Query parameters of `GET /tile/:z/:x/:y`.
#[derive(Debug, Default, Deserialize)]
pub struct TileParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub cloud_cover: Option<u32>,
    pub band1: Option<String>,
    pub band2: Option<String>,
    pub formula: Option<String>,
}

impl TileParams {
    /// Fill defaults and resolve the time window against today's date.
    pub fn into_request(self, tile: TileCoord, default_cloud_cover: u32) -> ApiResult<TileRequest> {
        let window = TimeWindow::from_query_now(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            Lookback::TILE,
        )
        .map_err(scene_common::ServiceError::from)?;

        Ok(TileRequest {
            tile,
            window,
            cloud_cover: self.cloud_cover.unwrap_or(default_cloud_cover),
            // present-but-empty band1 is rejected by the pipeline
            band1: self.band1.unwrap_or_else(|| DEFAULT_BAND.to_string()),
            band2: non_empty(self.band2),
            formula: non_empty(self.formula).unwrap_or_else(|| DEFAULT_FORMULA.to_string()),
        })
    }
}

/// GET /tile/:z/:x/:y - render one PNG tile
pub async fn tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<(u32, u32, u32)>, PathRejection>,
    params: Result<Query<TileParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Path((z, x, y)) = path?;
    let Query(params) = params?;
    let tile = TileCoord::new(z, x, y);

    // zoom first, so a bad zoom is reported even when other params are bad too
    tile.validate(&state.pipeline.zoom_range())
        .map_err(scene_common::ServiceError::InvalidRequest)?;

    let request = params.into_request(tile, state.config.default_cloud_cover)?;
    let response = state.pipeline.render(&request).await?;
    Ok(png_response(response))
}

fn png_response(response: TileResponse) -> Response {
    let scene = &response.tile.scene;
    let image_date = scene.datetime.clone().unwrap_or_default();
    let cloud_cover = scene.cloud_cover.map(|c| c.to_string()).unwrap_or_default();

    let header_value =
        |s: String| HeaderValue::from_str(&s).unwrap_or_else(|_| HeaderValue::from_static(""));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (
                HeaderName::from_static("x-computation-time"),
                header_value(response.elapsed_secs.to_string()),
            ),
            (HeaderName::from_static("x-image-date"), header_value(image_date)),
            (HeaderName::from_static("x-cloud-cover"), header_value(cloud_cover)),
            (
                HeaderName::from_static("x-cache"),
                HeaderValue::from_static(if response.cache_hit { "HIT" } else { "MISS" }),
            ),
        ],
        response.tile.png,
    )
        .into_response()
}
