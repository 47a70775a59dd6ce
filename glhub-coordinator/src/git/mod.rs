//! Embedded git smart-HTTP server
//!
//! In-memory bare repositories holding a single commit, served read-only
//! through `info/refs` and `git-upload-pack`.

pub mod object;
pub mod pack;
pub mod pktline;
pub mod repository;
pub mod upload_pack;

use thiserror::Error;

pub use object::{ObjectId, ObjectKind};
pub use repository::Repository;

/// Git protocol and object store errors
#[derive(Debug, Error)]
pub enum GitError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("not our ref {0}")]
    UnknownObject(ObjectId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
