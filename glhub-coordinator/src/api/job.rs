//! Job API Handlers
//!
//! The runner side of a job: claiming it, reporting its state and
//! streaming its log.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use glhub_core::JobId;
use glhub_core::dto::job::UpdateJob;
use glhub_core::dto::runner::RunnerToken;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{JsonBody, JsonOrForm, job_token};
use crate::service::job_service::{self, JobError};

fn map_error(err: JobError) -> ApiError {
    match err {
        JobError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
        JobError::Forbidden => ApiError::Forbidden("403 Forbidden".to_string()),
        JobError::InvalidState(msg) => ApiError::BadRequest(msg),
    }
}

// =============================================================================
// Job Lifecycle Endpoints
// =============================================================================

/// POST /api/v4/jobs/request
/// Long-poll for the next pending job
pub async fn request_job(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RunnerToken>,
) -> ApiResult<Response> {
    let payload = job_service::request_job(
        &state.store,
        &state.metrics,
        req.token.as_deref(),
        state.config.long_poll_timeout,
        state.config.long_poll_interval,
    )
    .await
    .map_err(map_error)?;

    Ok(match payload {
        Some(payload) => (StatusCode::CREATED, Json(payload)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// PUT /api/v4/jobs/{id}
/// Report the job state; the response carries the current status
pub async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    headers: HeaderMap,
    JsonOrForm(req): JsonOrForm<UpdateJob>,
) -> ApiResult<Response> {
    let token = job_token(&headers);
    let status = job_service::update_job(&state.store, &state.metrics, id, token.as_deref(), req)
        .map_err(map_error)?;

    Ok((
        StatusCode::OK,
        [("Job-Status", status.as_str())],
        Json(serde_json::json!({ "id": id, "status": status })),
    )
        .into_response())
}

/// PATCH /api/v4/jobs/{id}/trace
/// Append a chunk of build log
pub async fn append_trace(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let token = job_token(&headers);
    let (status, len) =
        job_service::append_trace(&state.store, id, token.as_deref(), &body).map_err(map_error)?;

    let range = format!("0-{}", len.saturating_sub(1));
    Ok((
        StatusCode::ACCEPTED,
        [("Job-Status", status.as_str().to_string()), ("Range", range)],
    )
        .into_response())
}
