//! Git smart-HTTP Handlers
//!
//! Errors are answered with a status and a plain-text body, which is what
//! git clients print.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::api::AppState;
use crate::git::upload_pack::{ADVERTISEMENT_CONTENT_TYPE, RESULT_CONTENT_TYPE};
use crate::service::git_service::{self, GitServiceError};

#[derive(Debug, Default, Deserialize)]
pub struct InfoRefsQuery {
    pub service: Option<String>,
}

fn error_response(err: GitServiceError) -> Response {
    match err {
        GitServiceError::RepositoryNotFound(name) => {
            (StatusCode::NOT_FOUND, format!("repository {} not found", name)).into_response()
        }
        GitServiceError::UnsupportedService(service) => (
            StatusCode::FORBIDDEN,
            format!("service '{}' is not supported", service),
        )
            .into_response(),
        GitServiceError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
    }
}

fn pkt_response(content_type: &'static str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

/// GET /{repo}/info/refs?service=git-upload-pack
pub async fn info_refs(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    Query(query): Query<InfoRefsQuery>,
) -> Response {
    match git_service::advertise(&state.store, &repo, query.service.as_deref()) {
        Ok(body) => pkt_response(ADVERTISEMENT_CONTENT_TYPE, body),
        Err(err) => error_response(err),
    }
}

/// POST /{repo}/git-upload-pack
pub async fn upload_pack(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let gzip = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

    match git_service::upload_pack(&state.store, &repo, &body, gzip) {
        Ok(body) => pkt_response(RESULT_CONTENT_TYPE, body),
        Err(err) => error_response(err),
    }
}
