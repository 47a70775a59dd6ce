//! Variable API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use glhub_core::ProjectId;
use glhub_core::domain::project::Variable;
use glhub_core::dto::variable::CreateVariable;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::JsonBody;
use crate::service::variable_service::{self, VariableError};

fn map_error(err: VariableError) -> ApiError {
    match err {
        VariableError::ProjectNotFound(id) => {
            ApiError::NotFound(format!("Project {} not found", id))
        }
        VariableError::MissingKey => ApiError::BadRequest("key is missing".to_string()),
        VariableError::NotFound(key) => ApiError::NotFound(format!("Variable {} not found", key)),
    }
}

/// POST /api/v4/projects/{id}/variables
pub async fn create_variable(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    JsonBody(req): JsonBody<CreateVariable>,
) -> ApiResult<(StatusCode, Json<Variable>)> {
    let variable =
        variable_service::create_variable(&state.store, project_id, req).map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(variable)))
}

/// GET /api/v4/projects/{id}/variables
pub async fn list_variables(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
) -> ApiResult<Json<Vec<Variable>>> {
    let variables = variable_service::list_variables(&state.store, project_id).map_err(map_error)?;
    Ok(Json(variables))
}

/// DELETE /api/v4/projects/{id}/variables/{key}
pub async fn delete_variable(
    State(state): State<AppState>,
    Path((project_id, key)): Path<(ProjectId, String)>,
) -> ApiResult<StatusCode> {
    variable_service::delete_variable(&state.store, project_id, &key).map_err(map_error)?;
    tracing::info!(project_id, key = %key, "Variable deleted");
    Ok(StatusCode::NO_CONTENT)
}
