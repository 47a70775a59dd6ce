//! Gitlabhub Core
//!
//! Core types for the Gitlabhub pipeline coordinator.
//!
//! This crate contains:
//! - Domain types: projects, runners, pipeline definitions and running pipelines
//! - DTOs: runner wire protocol payloads and management API views

pub mod domain;
pub mod dto;

pub use domain::{JobId, PipelineId, ProjectId, RunnerId};
