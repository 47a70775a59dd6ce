//! Gitlabhub Pipeline
//!
//! Parsing of `.gitlab-ci.yml` documents into a normalized [`PipelineDef`]
//! and evaluation of the `rules:` condition language.
//!
//! The parser never touches the filesystem: files referenced by
//! `include: local:` are read through the [`FileSource`] trait.
//!
//! [`PipelineDef`]: glhub_core::domain::pipeline::PipelineDef

pub mod duration;
pub mod error;
pub mod expression;
pub mod extends;
pub mod include;
pub mod parallel;
pub mod parser;
pub mod rules;
mod yaml;

pub use error::{ParseError, Result};
pub use expression::{Variables, evaluate};
pub use include::FileSource;
pub use parser::parse_pipeline;
pub use rules::evaluate_rules;
