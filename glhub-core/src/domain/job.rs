//! Job domain types

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{JobId, PipelineId};

/// Job status
///
/// Jobs move `created → pending → running` and finish in one of the
/// terminal states. A failed job with retry budget left goes back to
/// `created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Created,
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Success,
        JobStatus::Failed,
        JobStatus::Canceled,
        JobStatus::Skipped,
    ];

    /// Whether the job can no longer change state through the scheduler
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Canceled | JobStatus::Skipped
        )
    }

    /// Whether the job currently occupies a runner slot or the queue
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status: {}", s))
    }
}

/// When a job should run relative to the outcome of earlier jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum When {
    #[default]
    OnSuccess,
    Always,
    Never,
    Manual,
}

impl When {
    pub fn as_str(self) -> &'static str {
        match self {
            When::OnSuccess => "on_success",
            When::Always => "always",
            When::Never => "never",
            When::Manual => "manual",
        }
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for When {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_success" => Ok(When::OnSuccess),
            "always" => Ok(When::Always),
            "never" => Ok(When::Never),
            "manual" => Ok(When::Manual),
            other => Err(format!("unknown when value: {}", other)),
        }
    }
}

/// Running instance of a job inside a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineJob {
    pub id: JobId,
    pub pipeline_id: PipelineId,
    pub name: String,
    pub stage: String,
    pub status: JobStatus,
    pub result: Option<JobStatus>,
    pub allow_failure: bool,
    pub when: When,
    pub needs: Vec<String>,
    /// Per-job secret used by the runner for updates and repository access
    pub token: String,
    pub retry_count: u32,
    pub retry_max: u32,
    pub timeout: u64,
    pub matrix_group: Option<String>,
    pub resource_group: Option<String>,
    /// Variables exported by this job's dotenv report
    pub dotenv: IndexMap<String, String>,
    #[serde(skip)]
    pub trace: Vec<u8>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PipelineJob {
    /// Move the job to a status, recording the result for terminal ones
    pub fn transition(&mut self, status: JobStatus) {
        self.status = status;
        match status {
            JobStatus::Running => self.started_at = Some(chrono::Utc::now()),
            s if s.is_terminal() => {
                self.result = Some(s);
                self.finished_at = Some(chrono::Utc::now());
            }
            _ => {}
        }
    }

    /// Reset a failed job for another attempt under a fresh token
    pub fn reset_for_retry(&mut self, token: String) {
        self.retry_count += 1;
        self.token = token;
        self.status = JobStatus::Created;
        self.result = None;
        self.trace.clear();
        self.started_at = None;
        self.finished_at = None;
    }
}
