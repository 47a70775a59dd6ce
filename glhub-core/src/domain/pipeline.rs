//! Pipeline domain types
//!
//! `PipelineDef` is the parsed, normalized form of a `.gitlab-ci.yml`
//! document. `Pipeline` is a running instance of one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::job::{JobStatus, PipelineJob, When};
use super::{JobId, PipelineId, ProjectId};

/// Stages used when a document does not declare any
pub const DEFAULT_STAGES: [&str; 3] = ["build", "test", "deploy"];

/// Stage assigned to jobs that do not name one
pub const DEFAULT_STAGE: &str = "test";

/// Job timeout in seconds when none is declared
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

// =============================================================================
// Definitions
// =============================================================================

/// Parsed pipeline description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
    pub stages: Vec<String>,
    pub variables: IndexMap<String, String>,
    pub image: Option<String>,
    /// `workflow:rules`, evaluated once when the pipeline is submitted
    pub workflow_rules: Vec<Rule>,
    pub jobs: IndexMap<String, PipelineJobDef>,
}

impl PipelineDef {
    /// Zero-based position of a stage, if declared
    pub fn stage_index(&self, stage: &str) -> Option<usize> {
        stage_index(&self.stages, stage)
    }
}

/// Zero-based position of `stage` in `stages`
pub fn stage_index(stages: &[String], stage: &str) -> Option<usize> {
    stages.iter().position(|s| s == stage)
}

/// Declared properties of a single job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineJobDef {
    pub name: String,
    pub stage: String,
    pub image: Option<String>,
    pub before_script: Vec<String>,
    pub script: Vec<String>,
    pub after_script: Vec<String>,
    /// Global variables overlaid with the job's own
    pub variables: IndexMap<String, String>,
    pub artifacts: Option<ArtifactsDef>,
    pub services: Vec<ServiceDef>,
    pub needs: Vec<String>,
    /// `None` when the key is absent; `Some(vec![])` disables artifact download
    pub dependencies: Option<Vec<String>>,
    pub rules: Vec<Rule>,
    pub allow_failure: bool,
    pub when: When,
    pub cache: Option<CacheDef>,
    pub timeout: Option<u64>,
    pub retry: u32,
    pub parallel: Option<ParallelDef>,
    pub resource_group: Option<String>,
    /// Name of the job this one was expanded from by `parallel`
    pub matrix_group: Option<String>,
}

/// One entry of a `rules:` list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "if")]
    pub condition: Option<String>,
    pub when: Option<When>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsDef {
    pub name: Option<String>,
    pub paths: Vec<String>,
    pub expire_in: Option<String>,
    pub when: Option<String>,
    /// File name of the `reports:dotenv` report
    pub dotenv: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheDef {
    pub key: Option<String>,
    pub paths: Vec<String>,
    pub policy: Option<String>,
    pub when: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDef {
    pub name: String,
    pub alias: Option<String>,
    pub entrypoint: Vec<String>,
    pub command: Vec<String>,
    pub variables: IndexMap<String, String>,
}

/// `parallel:` descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelDef {
    Count(u32),
    /// Each entry maps variable names to the values to combine
    Matrix(Vec<IndexMap<String, Vec<String>>>),
}

// =============================================================================
// Running pipelines
// =============================================================================

/// Pipeline status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Running,
    Success,
    Failed,
    Canceled,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PipelineStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStatus::Running => "running",
            PipelineStatus::Success => "success",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A running instance of a `PipelineDef`
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub id: PipelineId,
    pub project_id: ProjectId,
    pub status: PipelineStatus,
    pub def: Arc<PipelineDef>,
    pub stages: Vec<String>,
    pub sha: String,
    pub ref_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// `host[:port]` runners use to reach this coordinator, e.g. `ci.local:8080`
    pub server_url: String,
    /// Image supplied with the submission, overriding the document default
    pub image: Option<String>,
    pub jobs: IndexMap<String, PipelineJob>,
    /// Current holder of each resource group
    pub resource_groups: HashMap<String, JobId>,
}

impl Pipeline {
    pub fn job_by_id(&self, id: JobId) -> Option<&PipelineJob> {
        self.jobs.values().find(|job| job.id == id)
    }

    pub fn job_by_id_mut(&mut self, id: JobId) -> Option<&mut PipelineJob> {
        self.jobs.values_mut().find(|job| job.id == id)
    }

    pub fn all_jobs_terminal(&self) -> bool {
        self.jobs.values().all(|job| job.status.is_terminal())
    }

    /// Status a fully terminal pipeline settles on
    pub fn final_status(&self) -> PipelineStatus {
        let failed = self
            .jobs
            .values()
            .any(|job| job.status == JobStatus::Failed && !job.allow_failure);
        if failed {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Success
        }
    }

    /// Release the resource group held by `job_id`, if any
    pub fn release_resource_group(&mut self, job_id: JobId) {
        self.resource_groups.retain(|_, holder| *holder != job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_index() {
        let stages: Vec<String> = DEFAULT_STAGES.iter().map(|s| s.to_string()).collect();
        assert_eq!(stage_index(&stages, "build"), Some(0));
        assert_eq!(stage_index(&stages, "deploy"), Some(2));
        assert_eq!(stage_index(&stages, "lint"), None);
    }

    #[test]
    fn test_rule_serde_uses_if_key() {
        let rule: Rule =
            serde_json::from_str(r#"{"if": "$A == \"1\"", "when": "manual"}"#).unwrap();
        assert_eq!(rule.condition.as_deref(), Some("$A == \"1\""));
        assert_eq!(rule.when, Some(When::Manual));
    }
}
