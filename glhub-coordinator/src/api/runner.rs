//! Runner API Handlers
//!
//! HTTP endpoints for runner registration and verification.

use axum::{Json, extract::State, http::StatusCode};
use glhub_core::dto::runner::{RegisterRunner, RegisteredRunner, RunnerToken};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::JsonBody;
use crate::service::runner_service;

fn map_error(err: runner_service::RunnerError) -> ApiError {
    match err {
        runner_service::RunnerError::MissingToken => {
            ApiError::BadRequest("registration token is required".to_string())
        }
        runner_service::RunnerError::Forbidden => ApiError::Forbidden("403 Forbidden".to_string()),
    }
}

// =============================================================================
// Runner Registration & Lifecycle
// =============================================================================

/// POST /api/v4/runners
/// Register a runner with the coordinator
pub async fn register_runner(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRunner>,
) -> ApiResult<(StatusCode, Json<RegisteredRunner>)> {
    let runner = runner_service::register(&state.store, req).map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(runner)))
}

/// POST /api/v4/runners/verify
/// Check that a runner token is still valid
pub async fn verify_runner(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RunnerToken>,
) -> ApiResult<Json<RegisteredRunner>> {
    tracing::debug!("Verifying runner");

    let runner = runner_service::verify(&state.store, req.token.as_deref()).map_err(map_error)?;
    Ok(Json(runner))
}

/// DELETE /api/v4/runners
pub async fn unregister_runner(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RunnerToken>,
) -> ApiResult<StatusCode> {
    runner_service::unregister(&state.store, req.token.as_deref()).map_err(map_error)?;
    Ok(StatusCode::NO_CONTENT)
}
