//! Pipeline DTOs
//!
//! Management API request and response bodies.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::job::{JobStatus, PipelineJob};
use crate::domain::pipeline::{Pipeline, PipelineStatus};
use crate::domain::{JobId, PipelineId};

/// Body of `POST /api/v3/gitlabhub/pipeline`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitPipeline {
    /// Contents of `.gitlab-ci.yml`
    #[serde(default)]
    pub pipeline: String,
    /// Image overriding the document's default image
    #[serde(default)]
    pub image: Option<String>,
    /// Extra repository files, keyed by path
    #[serde(default)]
    pub files: IndexMap<String, String>,
}

/// Response of a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedPipeline {
    #[serde(rename = "pipelineId")]
    pub pipeline_id: PipelineId,
    pub status: PipelineStatus,
    pub jobs: IndexMap<String, JobView>,
}

/// Job summary used by the management API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub name: String,
    pub stage: String,
    pub status: JobStatus,
    pub result: Option<JobStatus>,
}

impl From<&PipelineJob> for JobView {
    fn from(job: &PipelineJob) -> Self {
        JobView {
            id: job.id,
            name: job.name.clone(),
            stage: job.stage.clone(),
            status: job.status,
            result: job.result,
        }
    }
}

/// Response of `GET /api/v3/gitlabhub/pipelines/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineView {
    pub id: PipelineId,
    pub status: PipelineStatus,
    pub result: Option<PipelineStatus>,
    pub jobs: IndexMap<String, JobView>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Pipeline> for PipelineView {
    fn from(pipeline: &Pipeline) -> Self {
        PipelineView {
            id: pipeline.id,
            status: pipeline.status,
            result: pipeline.status.is_terminal().then_some(pipeline.status),
            jobs: job_views(pipeline),
            created_at: pipeline.created_at,
        }
    }
}

/// Response of `POST /api/v3/gitlabhub/pipelines/{id}/cancel`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanceledPipeline {
    pub id: PipelineId,
    pub status: PipelineStatus,
}

pub fn job_views(pipeline: &Pipeline) -> IndexMap<String, JobView> {
    pipeline
        .jobs
        .iter()
        .map(|(name, job)| (name.clone(), JobView::from(job)))
        .collect()
}
