//! Ready-job dispatch
//!
//! Promotes `created` jobs to `pending` once their upstream jobs are
//! terminal, skipping them instead when an upstream failure applies. Runs to
//! a fixpoint so that skips cascade within a single wave.

use glhub_core::{JobId, PipelineId};
use glhub_core::domain::job::{JobStatus, PipelineJob, When};
use glhub_core::domain::pipeline::{Pipeline, PipelineStatus, stage_index};

use super::{SchedulerError, Wave};
use crate::store::State;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Wait,
    Skip,
    Ready,
}

/// Dispatch every ready job of a pipeline and settle its status
///
/// Queues the jobs the fixpoint promoted and, once every job is terminal,
/// records the final pipeline status.
pub fn dispatch(state: &mut State, pipeline_id: PipelineId) -> Result<Wave, SchedulerError> {
    let pipeline = state
        .pipeline_mut(pipeline_id)
        .ok_or(SchedulerError::PipelineNotFound(pipeline_id))?;

    let mut wave = dispatch_ready_jobs(pipeline);
    if pipeline.status == PipelineStatus::Running && pipeline.all_jobs_terminal() {
        pipeline.status = pipeline.final_status();
        wave.finished = Some(pipeline.status);
    }

    for id in &wave.enqueued {
        state.enqueue_job(*id);
    }
    Ok(wave)
}

/// Promote ready jobs until a pass changes nothing
///
/// Promoted jobs are marked `pending` and listed in the returned wave; the
/// caller owns the queue they must be appended to.
pub fn dispatch_ready_jobs(pipeline: &mut Pipeline) -> Wave {
    let mut wave = Wave::new(pipeline.id);
    if pipeline.status.is_terminal() {
        return wave;
    }

    loop {
        let candidates: Vec<JobId> = pipeline
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Created)
            .map(|job| job.id)
            .collect();

        let mut changed = false;
        for id in candidates {
            let Some(job) = pipeline.job_by_id(id) else {
                continue;
            };
            match readiness(pipeline, job) {
                Readiness::Wait => {}
                Readiness::Skip => {
                    if let Some(job) = pipeline.job_by_id_mut(id) {
                        job.transition(JobStatus::Skipped);
                    }
                    wave.skipped.push(id);
                    changed = true;
                }
                Readiness::Ready => {
                    let Some(job) = pipeline.job_by_id_mut(id) else {
                        continue;
                    };
                    job.transition(JobStatus::Pending);
                    if let Some(group) = job.resource_group.clone() {
                        pipeline.resource_groups.insert(group, id);
                    }
                    wave.enqueued.push(id);
                    changed = true;
                }
            }
        }

        if !changed {
            return wave;
        }
    }
}

fn readiness(pipeline: &Pipeline, job: &PipelineJob) -> Readiness {
    if matches!(job.when, When::Manual | When::Never) {
        return Readiness::Wait;
    }

    let upstream: Vec<&PipelineJob> = if job.needs.is_empty() {
        match stage_index(&pipeline.stages, &job.stage) {
            Some(index) => pipeline
                .jobs
                .values()
                .filter(|other| {
                    stage_index(&pipeline.stages, &other.stage).is_some_and(|i| i < index)
                })
                .collect(),
            None => Vec::new(),
        }
    } else {
        let needed: Option<Vec<&PipelineJob>> = job
            .needs
            .iter()
            .map(|name| pipeline.jobs.get(name))
            .collect();
        match needed {
            Some(needed) => needed,
            None => return Readiness::Wait,
        }
    };

    if !upstream.iter().all(|up| up.status.is_terminal()) {
        return Readiness::Wait;
    }

    let upstream_failed = upstream
        .iter()
        .any(|up| up.status == JobStatus::Failed && !up.allow_failure);
    if upstream_failed && job.when == When::OnSuccess {
        return Readiness::Skip;
    }

    if resource_group_busy(pipeline, job) {
        return Readiness::Wait;
    }

    Readiness::Ready
}

/// Whether another job currently holds the job's resource group
fn resource_group_busy(pipeline: &Pipeline, job: &PipelineJob) -> bool {
    let Some(group) = job.resource_group.as_deref() else {
        return false;
    };
    match pipeline.resource_groups.get(group) {
        Some(holder) if *holder != job.id => pipeline
            .job_by_id(*holder)
            .is_some_and(|h| h.status.is_active()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::complete_job;
    use crate::scheduler::testing::{claim, pipeline, status, submit};

    const STAGES: &str = "
stages: [build, test, deploy]
build:
  stage: build
  script: [make]
test:
  stage: test
  script: [make test]
deploy:
  stage: deploy
  script: [make deploy]
";

    #[test]
    fn test_stage_ordering() {
        let mut state = State::default();
        let (id, wave) = submit(&mut state, STAGES);
        assert_eq!(wave.enqueued.len(), 1);
        assert_eq!(status(&state, id, "build"), JobStatus::Pending);
        assert_eq!(status(&state, id, "test"), JobStatus::Created);
        assert_eq!(status(&state, id, "deploy"), JobStatus::Created);

        for (current, next) in [("build", Some("test")), ("test", Some("deploy")), ("deploy", None)] {
            let job_id = claim(&mut state).unwrap();
            assert_eq!(pipeline(&state, id).job_by_id(job_id).unwrap().name, current);
            complete_job(&mut state, job_id, JobStatus::Success).unwrap();
            if let Some(next) = next {
                assert_eq!(status(&state, id, next), JobStatus::Pending);
                assert_eq!(state.pending_len(), 1);
            }
        }
        assert_eq!(pipeline(&state, id).status, PipelineStatus::Success);
    }

    #[test]
    fn test_needs_override_stage_order() {
        let mut state = State::default();
        let (id, _) = submit(
            &mut state,
            "
build_a:
  stage: build
  script: [a]
build_b:
  stage: build
  script: [b]
test:
  stage: test
  needs: [build_a]
  script: [t]
",
        );
        let a = claim(&mut state).unwrap();
        let _b = claim(&mut state).unwrap();
        complete_job(&mut state, a, JobStatus::Success).unwrap();

        assert_eq!(status(&state, id, "test"), JobStatus::Pending);
        assert_eq!(status(&state, id, "build_b"), JobStatus::Running);
    }

    #[test]
    fn test_resource_group_gate() {
        let mut state = State::default();
        let (id, wave) = submit(
            &mut state,
            "
deploy_eu:
  stage: deploy
  resource_group: production
  script: [deploy eu]
deploy_us:
  stage: deploy
  resource_group: production
  script: [deploy us]
",
        );
        assert_eq!(wave.enqueued.len(), 1);
        assert_eq!(status(&state, id, "deploy_eu"), JobStatus::Pending);
        assert_eq!(status(&state, id, "deploy_us"), JobStatus::Created);

        let first = claim(&mut state).unwrap();
        assert_eq!(status(&state, id, "deploy_us"), JobStatus::Created);
        complete_job(&mut state, first, JobStatus::Success).unwrap();
        assert_eq!(status(&state, id, "deploy_us"), JobStatus::Pending);
    }

    #[test]
    fn test_dispatch_is_idempotent() {
        let mut state = State::default();
        let (id, _) = submit(&mut state, STAGES);
        let queued = state.pending_len();

        let again = dispatch(&mut state, id).unwrap();
        assert!(again.is_empty());
        assert_eq!(state.pending_len(), queued);

        let p = state.pipeline_mut(id).unwrap();
        assert!(dispatch_ready_jobs(p).is_empty());
    }

    #[test]
    fn test_always_job_runs_after_failure() {
        let mut state = State::default();
        let (id, _) = submit(
            &mut state,
            "
build:
  stage: build
  script: [make]
notify:
  stage: deploy
  when: always
  script: [notify]
publish:
  stage: deploy
  script: [publish]
",
        );
        let build = claim(&mut state).unwrap();
        let wave = complete_job(&mut state, build, JobStatus::Failed).unwrap();

        assert_eq!(status(&state, id, "notify"), JobStatus::Pending);
        assert_eq!(status(&state, id, "publish"), JobStatus::Skipped);
        assert_eq!(wave.finished, None);
    }

    #[test]
    fn test_allow_failure_does_not_skip_needs() {
        let mut state = State::default();
        let (id, _) = submit(
            &mut state,
            "
lint:
  stage: build
  allow_failure: true
  script: [lint]
test:
  stage: test
  needs: [lint]
  script: [test]
",
        );
        let lint = claim(&mut state).unwrap();
        complete_job(&mut state, lint, JobStatus::Failed).unwrap();
        assert_eq!(status(&state, id, "test"), JobStatus::Pending);
    }

    #[test]
    fn test_manual_job_waits() {
        let mut state = State::default();
        let (id, wave) = submit(
            &mut state,
            "
deploy:
  when: manual
  script: [deploy]
",
        );
        assert!(wave.enqueued.is_empty());
        assert_eq!(status(&state, id, "deploy"), JobStatus::Created);
        assert_eq!(pipeline(&state, id).status, PipelineStatus::Running);
    }
}
