//! API Module
//!
//! HTTP API layer for the coordinator.
//! Each submodule handles endpoints for a specific domain:
//! - `/api/v4/...`: the GitLab Runner protocol and project variables
//! - `/api/v3/gitlabhub/...`: pipeline management
//! - `/<project>.git/...`: git smart-HTTP
//! - `/health`, `/internal/...`: operational endpoints

pub mod artifact;
pub mod error;
pub mod extract;
pub mod git;
pub mod health;
pub mod job;
pub mod pipeline;
pub mod runner;
pub mod variable;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::metrics::Metrics;
use crate::store::Store;

/// Largest accepted artifact or cache upload
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            store: Arc::new(Store::new()),
            metrics: Arc::new(Metrics::new()),
            config: Arc::new(config),
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and introspection
        .route("/health", get(health::health_check))
        .route("/internal/status", get(health::status))
        .route("/internal/metrics", get(health::metrics))
        // Runner registration
        .route(
            "/api/v4/runners",
            post(runner::register_runner).delete(runner::unregister_runner),
        )
        .route("/api/v4/runners/verify", post(runner::verify_runner))
        // Job lifecycle
        .route("/api/v4/jobs/request", post(job::request_job))
        .route("/api/v4/jobs/{id}", put(job::update_job))
        .route("/api/v4/jobs/{id}/trace", patch(job::append_trace))
        // Artifacts and cache
        .route(
            "/api/v4/jobs/{id}/artifacts",
            post(artifact::upload_artifact)
                .get(artifact::download_artifact)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/cache/{*key}",
            get(artifact::get_cache)
                .head(artifact::head_cache)
                .put(artifact::put_cache)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // Project variables
        .route(
            "/api/v4/projects/{id}/variables",
            post(variable::create_variable).get(variable::list_variables),
        )
        .route(
            "/api/v4/projects/{id}/variables/{key}",
            delete(variable::delete_variable),
        )
        // Pipeline management
        .route("/api/v3/gitlabhub/pipeline", post(pipeline::submit_pipeline))
        .route("/api/v3/gitlabhub/pipelines/{id}", get(pipeline::get_pipeline))
        .route(
            "/api/v3/gitlabhub/pipelines/{id}/cancel",
            post(pipeline::cancel_pipeline),
        )
        .route("/api/v3/gitlabhub/jobs/{id}/play", post(pipeline::play_job))
        // Git smart-HTTP
        .route("/{repo}/info/refs", get(git::info_refs))
        .route("/{repo}/git-upload-pack", post(git::upload_pack))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
