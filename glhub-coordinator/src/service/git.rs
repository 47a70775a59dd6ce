//! Git Service
//!
//! Serves the per-project repositories. The repository handle is cloned out
//! of the store so pack generation never runs under the lock.

use std::sync::Arc;

use crate::git::upload_pack::{self, UploadRequest};
use crate::git::{GitError, Repository};
use crate::compress::{self, MAX_INFLATED_REQUEST};
use crate::store::Store;

/// Service error type
#[derive(Debug)]
pub enum GitServiceError {
    RepositoryNotFound(String),
    UnsupportedService(String),
    BadRequest(String),
}

impl From<GitError> for GitServiceError {
    fn from(err: GitError) -> Self {
        GitServiceError::BadRequest(err.to_string())
    }
}

/// Look up a repository by its URL segment, with or without `.git`
fn repository(store: &Store, name: &str) -> Result<Arc<Repository>, GitServiceError> {
    let name = name.strip_suffix(".git").unwrap_or(name);
    store
        .read()
        .git_storage(name)
        .ok_or_else(|| GitServiceError::RepositoryNotFound(name.to_string()))
}

/// `GET /<repo>/info/refs?service=git-upload-pack`
pub fn advertise(
    store: &Store,
    name: &str,
    service: Option<&str>,
) -> Result<Vec<u8>, GitServiceError> {
    match service {
        Some("git-upload-pack") => {}
        other => {
            return Err(GitServiceError::UnsupportedService(
                other.unwrap_or_default().to_string(),
            ));
        }
    }

    let repo = repository(store, name)?;
    tracing::debug!(repo = name, "Advertising refs");
    Ok(upload_pack::advertise_refs(&repo))
}

/// `POST /<repo>/git-upload-pack`
pub fn upload_pack(
    store: &Store,
    name: &str,
    body: &[u8],
    gzip: bool,
) -> Result<Vec<u8>, GitServiceError> {
    let repo = repository(store, name)?;

    let inflated;
    let body = if gzip {
        inflated = compress::gunzip(body, MAX_INFLATED_REQUEST)
            .map_err(|e| GitServiceError::BadRequest(e.to_string()))?;
        inflated.as_slice()
    } else {
        body
    };

    let req = UploadRequest::parse(body)?;
    let response = upload_pack::upload_pack(&repo, &req)?;
    tracing::debug!(
        repo = name,
        wants = req.wants.len(),
        haves = req.haves.len(),
        bytes = response.len(),
        "Upload pack"
    );
    Ok(response)
}
