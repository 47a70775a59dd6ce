//! Artifact API Handlers
//!
//! Job artifact upload/download and the build cache.

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use glhub_core::JobId;
use glhub_core::dto::job::ArtifactUploaded;
use serde::Deserialize;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::job_token;
use crate::service::artifact_service::{self, ArtifactError, ArtifactKind};
use crate::service::payload::ARTIFACTS_FILENAME;

fn map_error(err: ArtifactError) -> ApiError {
    match err {
        ArtifactError::JobNotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
        ArtifactError::NotFound(id) => {
            ApiError::NotFound(format!("No artifacts for job {}", id))
        }
        ArtifactError::Forbidden => ApiError::Forbidden("403 Forbidden".to_string()),
        ArtifactError::InvalidReport(err) => ApiError::BadRequest(err.to_string()),
        ArtifactError::InvalidCacheKey => ApiError::BadRequest("cache key is required".to_string()),
        ArtifactError::CacheMiss(key) => ApiError::NotFound(format!("Cache {} not found", key)),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtifactQuery {
    pub artifact_type: Option<String>,
    pub artifact_format: Option<String>,
}

// =============================================================================
// Artifacts
// =============================================================================

/// POST /api/v4/jobs/{id}/artifacts
/// Multipart upload, file in the `file` field
pub async fn upload_artifact(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Query(query): Query<ArtifactQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ArtifactUploaded>)> {
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("file") {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            file = Some(data.to_vec());
            break;
        }
    }
    let data = file.ok_or_else(|| ApiError::BadRequest("missing file field".to_string()))?;

    let kind = ArtifactKind::from_query(
        query.artifact_type.as_deref(),
        query.artifact_format.as_deref(),
    );
    let token = job_token(&headers);
    let uploaded = artifact_service::upload(&state.store, id, token.as_deref(), kind, data)
        .map_err(map_error)?;

    Ok((StatusCode::CREATED, Json(uploaded)))
}

/// GET /api/v4/jobs/{id}/artifacts
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> ApiResult<Response> {
    let data = artifact_service::download(&state.store, id).map_err(map_error)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", ARTIFACTS_FILENAME),
            ),
        ],
        data,
    )
        .into_response())
}

// =============================================================================
// Cache
// =============================================================================

/// PUT /cache/{key}
pub async fn put_cache(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    artifact_service::put_cache(&state.store, &key, body.to_vec()).map_err(map_error)?;
    Ok(StatusCode::OK)
}

/// GET /cache/{key}
pub async fn get_cache(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    let data = artifact_service::get_cache(&state.store, &key).map_err(map_error)?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data).into_response())
}

/// HEAD /cache/{key}
pub async fn head_cache(State(state): State<AppState>, Path(key): Path<String>) -> StatusCode {
    if artifact_service::has_cache(&state.store, &key) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}
