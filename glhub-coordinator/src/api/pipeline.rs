//! Pipeline API Handlers
//!
//! Management endpoints under `/api/v3/gitlabhub`.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use glhub_core::dto::pipeline::{
    CanceledPipeline, JobView, PipelineView, SubmitPipeline, SubmittedPipeline,
};
use glhub_core::{JobId, PipelineId};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{JsonBody, server_host};
use crate::scheduler::SchedulerError;
use crate::service::pipeline_service::{self, PipelineError};

fn map_error(err: PipelineError) -> ApiError {
    match err {
        PipelineError::Parse(err) => ApiError::BadRequest(err.to_string()),
        PipelineError::CapacityExceeded(max) => ApiError::TooManyRequests(format!(
            "too many active pipelines (limit {})",
            max
        )),
        PipelineError::NotFound(id) => ApiError::NotFound(format!("Pipeline {} not found", id)),
        PipelineError::Scheduler(err) => match err {
            SchedulerError::ProjectNotFound(_)
            | SchedulerError::PipelineNotFound(_)
            | SchedulerError::JobNotFound(_) => ApiError::NotFound(err.to_string()),
            SchedulerError::UnknownNeed { .. }
            | SchedulerError::NeedsCycle(_)
            | SchedulerError::FilteredByWorkflow
            | SchedulerError::NotPlayable(_) => ApiError::BadRequest(err.to_string()),
        },
    }
}

// =============================================================================
// Pipeline Endpoints
// =============================================================================

/// POST /api/v3/gitlabhub/pipeline
/// Create a project from the submitted files and start its pipeline
pub async fn submit_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<SubmitPipeline>,
) -> ApiResult<(StatusCode, Json<SubmittedPipeline>)> {
    let server = server_host(&headers, &state.config);
    let submitted = pipeline_service::submit(
        &state.store,
        &state.metrics,
        state.config.max_pipelines,
        &server,
        req,
    )
    .map_err(map_error)?;

    Ok((StatusCode::CREATED, Json(submitted)))
}

/// GET /api/v3/gitlabhub/pipelines/{id}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<PipelineId>,
) -> ApiResult<Json<PipelineView>> {
    tracing::debug!("Getting pipeline: {}", id);

    let view = pipeline_service::get_pipeline(&state.store, id).map_err(map_error)?;
    Ok(Json(view))
}

/// POST /api/v3/gitlabhub/pipelines/{id}/cancel
pub async fn cancel_pipeline(
    State(state): State<AppState>,
    Path(id): Path<PipelineId>,
) -> ApiResult<Json<CanceledPipeline>> {
    let canceled = pipeline_service::cancel_pipeline(&state.store, id).map_err(map_error)?;
    Ok(Json(canceled))
}

/// POST /api/v3/gitlabhub/jobs/{id}/play
/// Start a manual job
pub async fn play_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobView>> {
    let job = pipeline_service::play_job(&state.store, id).map_err(map_error)?;
    Ok(Json(job))
}
