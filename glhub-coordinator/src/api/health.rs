//! Health Check API Handlers
//!
//! Liveness plus the internal status and metrics views.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::api::AppState;
use crate::metrics::MetricsSnapshot;
use crate::service::status_service::{self, StatusReport};

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "service": "gitlabhub" })),
    )
}

/// GET /internal/status
/// Active pipelines, job counts and registered runners
pub async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(status_service::status(&state.store, &state.metrics))
}

/// GET /internal/metrics
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(status_service::metrics(&state.store, &state.metrics))
}
