//! Job DTOs
//!
//! The job payload handed to a runner when it claims a job, plus the bodies
//! the runner sends back while the job executes.

use serde::{Deserialize, Serialize};

use crate::domain::{JobId, ProjectId};

// =============================================================================
// Job payload
// =============================================================================

/// Response body of `POST /api/v4/jobs/request`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub id: JobId,
    pub token: String,
    pub allow_git_fetch: bool,
    pub job_info: JobInfo,
    pub git_info: GitInfo,
    pub runner_info: RunnerInfo,
    pub variables: Vec<JobVariable>,
    pub steps: Vec<Step>,
    pub image: Option<Image>,
    pub services: Vec<Service>,
    pub artifacts: Vec<ArtifactSpec>,
    pub cache: Vec<CacheSpec>,
    pub dependencies: Vec<Dependency>,
    pub features: Features,
}

impl JobPayload {
    /// Last value bound to `key`, matching how the runner resolves duplicates
    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variables
            .iter()
            .rev()
            .find(|v| v.key == key)
            .map(|v| v.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub stage: String,
    pub project_id: ProjectId,
    pub project_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitInfo {
    pub repo_url: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
    pub before_sha: String,
    pub ref_type: String,
    pub refspecs: Vec<String>,
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerInfo {
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobVariable {
    pub key: String,
    pub value: String,
    pub public: bool,
    #[serde(default)]
    pub masked: bool,
}

impl JobVariable {
    pub fn public(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            public: true,
            masked: false,
        }
    }

    pub fn secret(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            public: false,
            masked: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub script: Vec<String>,
    pub timeout: u64,
    pub when: String,
    pub allow_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub alias: String,
    pub entrypoint: Vec<String>,
    pub command: Vec<String>,
    pub variables: Vec<JobVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub untracked: bool,
    pub paths: Vec<String>,
    pub when: String,
    pub artifact_type: String,
    pub artifact_format: String,
    pub expire_in: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSpec {
    pub key: String,
    pub untracked: bool,
    pub policy: String,
    pub paths: Vec<String>,
    pub when: String,
}

/// A job whose artifacts the runner should download before the build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub id: JobId,
    pub name: String,
    pub token: String,
    pub artifacts_file: ArtifactFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub filename: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Features {
    pub trace_sections: bool,
    pub trace_checksum: bool,
    pub trace_size: bool,
    pub failure_reasons: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            trace_sections: true,
            trace_checksum: true,
            trace_size: true,
            failure_reasons: true,
        }
    }
}

// =============================================================================
// Runner → coordinator
// =============================================================================

/// Body of `PUT /api/v4/jobs/{id}`, sent as JSON or as a form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateJob {
    pub token: Option<String>,
    pub state: Option<String>,
    pub failure_reason: Option<String>,
    pub exit_code: Option<i32>,
}

/// Response of `POST /api/v4/jobs/{id}/artifacts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactUploaded {
    pub id: JobId,
    pub size: u64,
    pub filename: String,
}
