//! Gitlabhub Coordinator
//!
//! An in-memory pipeline coordinator speaking the GitLab Runner protocol.
//! It parses submitted `.gitlab-ci.yml` documents, schedules their jobs,
//! hands them to runners through long-polling and serves each project's
//! repository over git smart-HTTP.

pub mod api;
pub mod compress;
pub mod config;
pub mod git;
pub mod metrics;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod token;
