//! Completion, cancellation and manual play

use glhub_core::{JobId, PipelineId};
use glhub_core::domain::job::{JobStatus, When};
use glhub_core::domain::pipeline::PipelineStatus;

use super::{SchedulerError, Wave, dispatch};
use crate::store::State;
use crate::token::generate_job_token;

/// Record a terminal state reported for a job and run the next wave
///
/// A failed job with retry budget left goes back to `created`. Reports for
/// jobs that are not running are acknowledged without changing anything.
/// In a canceled pipeline the reported state is kept as the job's result
/// and nothing else happens.
pub fn complete_job(
    state: &mut State,
    job_id: JobId,
    status: JobStatus,
) -> Result<Wave, SchedulerError> {
    let pipeline_id = state
        .pipeline_of_job(job_id)
        .ok_or(SchedulerError::JobNotFound(job_id))?;
    let pipeline = state
        .pipeline_mut(pipeline_id)
        .ok_or(SchedulerError::PipelineNotFound(pipeline_id))?;
    let mut wave = Wave::new(pipeline_id);

    let canceled = pipeline.status == PipelineStatus::Canceled;
    let job = pipeline
        .job_by_id_mut(job_id)
        .ok_or(SchedulerError::JobNotFound(job_id))?;

    if canceled {
        job.result = Some(status);
        job.finished_at = Some(chrono::Utc::now());
        return Ok(wave);
    }
    if job.status != JobStatus::Running || !status.is_terminal() {
        return Ok(wave);
    }

    job.transition(status);
    if status == JobStatus::Failed && job.retry_count < job.retry_max {
        job.reset_for_retry(generate_job_token());
        wave.retried.push(job_id);
    }
    pipeline.release_resource_group(job_id);

    wave.merge(dispatch(state, pipeline_id)?);
    Ok(wave)
}

/// Cancel every unfinished job of a pipeline and purge its queue entries
///
/// Canceling a pipeline that already finished changes nothing.
pub fn cancel_pipeline(
    state: &mut State,
    pipeline_id: PipelineId,
) -> Result<Wave, SchedulerError> {
    let pipeline = state
        .pipeline_mut(pipeline_id)
        .ok_or(SchedulerError::PipelineNotFound(pipeline_id))?;
    let mut wave = Wave::new(pipeline_id);
    if pipeline.status.is_terminal() {
        return Ok(wave);
    }

    for job in pipeline.jobs.values_mut() {
        if !job.status.is_terminal() {
            job.transition(JobStatus::Canceled);
            wave.canceled.push(job.id);
        }
    }
    pipeline.status = PipelineStatus::Canceled;
    pipeline.resource_groups.clear();
    wave.finished = Some(PipelineStatus::Canceled);

    state.purge_pending(pipeline_id);
    Ok(wave)
}

/// Release a manual job so the next wave can dispatch it
pub fn play_job(state: &mut State, job_id: JobId) -> Result<Wave, SchedulerError> {
    let pipeline_id = state
        .pipeline_of_job(job_id)
        .ok_or(SchedulerError::JobNotFound(job_id))?;
    let pipeline = state
        .pipeline_mut(pipeline_id)
        .ok_or(SchedulerError::PipelineNotFound(pipeline_id))?;
    if pipeline.status.is_terminal() {
        return Err(SchedulerError::NotPlayable(job_id));
    }

    let job = pipeline
        .job_by_id_mut(job_id)
        .ok_or(SchedulerError::JobNotFound(job_id))?;
    if job.status != JobStatus::Created || job.when != When::Manual {
        return Err(SchedulerError::NotPlayable(job_id));
    }
    job.when = When::OnSuccess;

    dispatch(state, pipeline_id)
}
