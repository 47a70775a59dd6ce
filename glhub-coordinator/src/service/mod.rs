//! Service Module
//!
//! Business logic layer for the coordinator.
//! Services take the store lock, run one engine wave or lookup, release the
//! lock and only then log and update metrics.

pub mod artifact;
pub mod dotenv;
pub mod git;
pub mod job;
pub mod payload;
pub mod pipeline;
pub mod runner;
pub mod status;
pub mod variable;

// Re-export for convenience
pub use artifact as artifact_service;
pub use git as git_service;
pub use job as job_service;
pub use pipeline as pipeline_service;
pub use runner as runner_service;
pub use status as status_service;
pub use variable as variable_service;

use crate::scheduler::Wave;

/// Log what an engine wave changed
pub(crate) fn report_wave(wave: &Wave) {
    if wave.is_empty() {
        return;
    }
    tracing::debug!(
        pipeline_id = wave.pipeline_id,
        enqueued = ?wave.enqueued,
        skipped = ?wave.skipped,
        retried = ?wave.retried,
        canceled = ?wave.canceled,
        "Dispatch wave"
    );
    for job_id in &wave.retried {
        tracing::info!(job_id, pipeline_id = wave.pipeline_id, "Job failed, retrying");
    }
    if let Some(status) = wave.finished {
        tracing::info!(pipeline_id = wave.pipeline_id, %status, "Pipeline finished");
    }
}
