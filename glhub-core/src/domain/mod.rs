//! Core domain types
//!
//! Entities shared between the pipeline parser (which produces definitions)
//! and the coordinator (which owns the running instances).

pub mod job;
pub mod pipeline;
pub mod project;
pub mod runner;

/// Identifier of a pipeline job, unique across the process
pub type JobId = u64;
/// Identifier of a running pipeline
pub type PipelineId = u64;
/// Identifier of a project
pub type ProjectId = u64;
/// Identifier of a registered runner
pub type RunnerId = u64;
