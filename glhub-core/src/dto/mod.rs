//! Data Transfer Objects
//!
//! Wire types for the runner protocol (`/api/v4`) and the management API
//! (`/api/v3/gitlabhub`). Field names follow what GitLab Runner sends and
//! expects, so several structs carry serde renames.

pub mod job;
pub mod pipeline;
pub mod runner;
pub mod variable;
