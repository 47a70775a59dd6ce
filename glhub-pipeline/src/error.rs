//! Parser error types

use thiserror::Error;

/// Errors produced while turning a document into a pipeline definition
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pipeline document must be a mapping")]
    NotAMapping,

    #[error("pipeline has no jobs")]
    NoJobs,

    #[error("job {job:?}: missing required field {field:?}")]
    MissingField { job: String, field: &'static str },

    #[error("job {job:?}: invalid {field}: {reason}")]
    InvalidField {
        job: String,
        field: &'static str,
        reason: String,
    },

    #[error("circular extends detected: {0}")]
    ExtendsCycle(String),

    #[error("extends: template {0:?} not found")]
    UnknownTemplate(String),

    #[error("include: file {0:?} not found")]
    IncludeNotFound(String),

    #[error("include: {0}")]
    InvalidInclude(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
