//! Background computation endpoints.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Extension, Path, Query,
    },
    Json,
};
use band_math::Formula;
use scene_common::{BoundingBox, Lookback, ServiceError, TimeWindow};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::common::{non_empty, ApiResult};
use crate::jobs::{ComputeRequest, JobInfo, JobList};
use crate::state::AppState;

pub const DEFAULT_COMPUTE_FORMULA: &str = "(band2 - band1) / (band2 + band1)";

/// Query parameters of `POST /compute`.
#[derive(Debug, Deserialize)]
pub struct ComputeParams {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub cloud_cover: Option<u32>,
    pub formula: Option<String>,
    pub band1: Option<String>,
    pub band2: Option<String>,
    pub operation: Option<String>,
    pub export_band: Option<String>,
    pub output_dir: Option<String>,
}

impl ComputeParams {
    pub fn into_request(self, default_cloud_cover: u32) -> ApiResult<ComputeRequest> {
        let bbox = BoundingBox::checked(self.min_x, self.min_y, self.max_x, self.max_y)
            .map_err(ServiceError::from)?;
        let window = TimeWindow::from_query_now(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            Lookback::COMPUTE,
        )
        .map_err(ServiceError::from)?;

        let formula =
            non_empty(self.formula).unwrap_or_else(|| DEFAULT_COMPUTE_FORMULA.to_string());
        Formula::parse(&formula)
            .map_err(|e| ServiceError::invalid(format!("Invalid formula: {e}")))?;

        let or = |v: Option<String>, default: &str| non_empty(v).unwrap_or_else(|| default.to_string());

        Ok(ComputeRequest {
            bbox,
            window,
            cloud_cover: self.cloud_cover.unwrap_or(default_cloud_cover),
            formula,
            band1: or(self.band1, "red"),
            band2: or(self.band2, "nir"),
            operation: or(self.operation, "mean"),
            export_band: or(self.export_band, "visual"),
            output_dir: or(self.output_dir, "output"),
        })
    }
}

/// POST /compute - start an area computation in the background
pub async fn compute_handler(
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<ComputeParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;
    let request = params.into_request(state.config.default_cloud_cover)?;
    let job_id = state.jobs.submit(request);
    Ok(Json(json!({ "message": "Processing started", "job_id": job_id })))
}

/// GET /compute/jobs - running and recently finished jobs
pub async fn list_jobs_handler(Extension(state): Extension<Arc<AppState>>) -> Json<JobList> {
    Json(state.jobs.list())
}

/// GET /compute/:id - status of one job
pub async fn job_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<JobInfo>> {
    let Path(id) = id?;
    state
        .jobs
        .status(id)
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound(format!("Job {id} not found")).into())
}

/// DELETE /compute/:id - cancel a running job
pub async fn cancel_job_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    if state.jobs.cancel(id) {
        Ok(Json(json!({ "message": "Cancellation requested", "job_id": id })))
    } else {
        Err(ServiceError::NotFound(format!("No running job {id}")).into())
    }
}
