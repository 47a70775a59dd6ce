//! Scheduler Module
//!
//! The pipeline engine. Every entry point takes the locked [`State`] and runs
//! a complete wave (materialise, dispatch, complete, cancel, play) before
//! returning, so the lock is held for exactly one wave.
//!
//! Waves never log; they return a [`Wave`] describing what changed and the
//! caller reports it once the lock is released.
//!
//! [`State`]: crate::store::State

pub mod complete;
pub mod dispatch;
pub mod submit;

use glhub_core::domain::pipeline::PipelineStatus;
use glhub_core::{JobId, PipelineId, ProjectId};
use thiserror::Error;

pub use complete::{cancel_pipeline, complete_job, play_job};
pub use dispatch::{dispatch, dispatch_ready_jobs};
pub use submit::{SubmitOptions, submit_pipeline};

/// Engine error type
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job {job} needs unknown job {need}")]
    UnknownNeed { job: String, need: String },

    #[error("circular needs detected at job {0}")]
    NeedsCycle(String),

    #[error("pipeline filtered out by workflow rules")]
    FilteredByWorkflow,

    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    #[error("pipeline {0} not found")]
    PipelineNotFound(PipelineId),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("job {0} is not a manual job waiting to be played")]
    NotPlayable(JobId),
}

/// What a single engine wave changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wave {
    pub pipeline_id: PipelineId,
    /// Jobs moved to `pending` and appended to the queue
    pub enqueued: Vec<JobId>,
    pub skipped: Vec<JobId>,
    /// Failed jobs reset to `created` for another attempt
    pub retried: Vec<JobId>,
    pub canceled: Vec<JobId>,
    /// New terminal status of the pipeline, if it settled in this wave
    pub finished: Option<PipelineStatus>,
}

impl Wave {
    pub fn new(pipeline_id: PipelineId) -> Self {
        Self {
            pipeline_id,
            ..Self::default()
        }
    }

    pub fn merge(&mut self, other: Wave) {
        self.enqueued.extend(other.enqueued);
        self.skipped.extend(other.skipped);
        self.retried.extend(other.retried);
        self.canceled.extend(other.canceled);
        if other.finished.is_some() {
            self.finished = other.finished;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enqueued.is_empty()
            && self.skipped.is_empty()
            && self.retried.is_empty()
            && self.canceled.is_empty()
            && self.finished.is_none()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wave_merge() {
        let mut wave = Wave::new(1);
        assert!(wave.is_empty());

        wave.merge(Wave {
            pipeline_id: 1,
            enqueued: vec![3],
            finished: Some(PipelineStatus::Success),
            ..Wave::default()
        });
        wave.merge(Wave {
            pipeline_id: 1,
            skipped: vec![4],
            ..Wave::default()
        });

        assert_eq!(wave.enqueued, vec![3]);
        assert_eq!(wave.skipped, vec![4]);
        assert_eq!(wave.finished, Some(PipelineStatus::Success));
        assert!(!wave.is_empty());
    }
}
