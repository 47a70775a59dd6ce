//! Pipeline Service
//!
//! Submission, status, cancellation and manual play of pipelines.

use std::sync::Arc;

use glhub_core::dto::pipeline::{
    CanceledPipeline, JobView, PipelineView, SubmitPipeline, SubmittedPipeline, job_views,
};
use glhub_core::{JobId, PipelineId};
use glhub_pipeline::{ParseError, parse_pipeline};

use super::report_wave;
use crate::git::Repository;
use crate::metrics::Metrics;
use crate::scheduler::{self, SchedulerError, SubmitOptions};
use crate::store::Store;

/// Name of the pipeline definition inside a project repository
pub const PIPELINE_FILE: &str = ".gitlab-ci.yml";

/// Service error type
#[derive(Debug)]
pub enum PipelineError {
    Parse(ParseError),
    Scheduler(SchedulerError),
    CapacityExceeded(usize),
    NotFound(PipelineId),
}

impl From<ParseError> for PipelineError {
    fn from(err: ParseError) -> Self {
        PipelineError::Parse(err)
    }
}

impl From<SchedulerError> for PipelineError {
    fn from(err: SchedulerError) -> Self {
        PipelineError::Scheduler(err)
    }
}

/// Create a project and repository for `req` and start its pipeline
///
/// `server` is the `host[:port]` the request came in through; runners use
/// it to reach the coordinator and the repository.
pub fn submit(
    store: &Store,
    metrics: &Metrics,
    max_pipelines: usize,
    server: &str,
    req: SubmitPipeline,
) -> Result<SubmittedPipeline, PipelineError> {
    check_capacity(store.read().active_pipeline_count(), max_pipelines)?;

    let files = req
        .files
        .iter()
        .filter(|(path, _)| path.as_str() != PIPELINE_FILE)
        .map(|(path, content)| (path.as_str(), content.as_str()));
    let repo = Repository::from_files(
        std::iter::once((PIPELINE_FILE, req.pipeline.as_str())).chain(files),
    );
    let def = parse_pipeline(&req.pipeline, Some(&repo))?;

    let (project, pipeline_id, wave, response) = {
        let mut state = store.write();
        check_capacity(state.active_pipeline_count(), max_pipelines)?;

        let project = state.create_project("").clone();
        state.set_git_storage(project.name.clone(), Arc::new(repo));
        let (pipeline_id, wave) = scheduler::submit_pipeline(
            &mut state,
            project.id,
            Arc::new(def),
            SubmitOptions {
                server_url: server.to_string(),
                image: req.image,
            },
        )?;

        let pipeline = state
            .pipeline(pipeline_id)
            .ok_or(PipelineError::NotFound(pipeline_id))?;
        let response = SubmittedPipeline {
            pipeline_id,
            status: pipeline.status,
            jobs: job_views(pipeline),
        };
        (project, pipeline_id, wave, response)
    };

    metrics.record_submission();
    tracing::info!(
        pipeline_id,
        project_id = project.id,
        project = %project.name,
        jobs = response.jobs.len(),
        "Pipeline submitted"
    );
    report_wave(&wave);

    Ok(response)
}

fn check_capacity(active: usize, max_pipelines: usize) -> Result<(), PipelineError> {
    if active >= max_pipelines {
        tracing::warn!(active, max_pipelines, "Pipeline capacity reached");
        return Err(PipelineError::CapacityExceeded(max_pipelines));
    }
    Ok(())
}

/// Current status of a pipeline and its jobs
pub fn get_pipeline(store: &Store, id: PipelineId) -> Result<PipelineView, PipelineError> {
    store
        .read()
        .pipeline(id)
        .map(PipelineView::from)
        .ok_or(PipelineError::NotFound(id))
}

/// Cancel a pipeline; a finished pipeline keeps its status
pub fn cancel_pipeline(store: &Store, id: PipelineId) -> Result<CanceledPipeline, PipelineError> {
    let (wave, status) = {
        let mut state = store.write();
        let wave = scheduler::cancel_pipeline(&mut state, id).map_err(|e| match e {
            SchedulerError::PipelineNotFound(id) => PipelineError::NotFound(id),
            other => PipelineError::Scheduler(other),
        })?;
        let status = state
            .pipeline(id)
            .map(|p| p.status)
            .ok_or(PipelineError::NotFound(id))?;
        (wave, status)
    };

    if !wave.is_empty() {
        tracing::info!(pipeline_id = id, jobs = wave.canceled.len(), "Pipeline canceled");
    }
    Ok(CanceledPipeline { id, status })
}

/// Promote a manual job and dispatch it
pub fn play_job(store: &Store, job_id: JobId) -> Result<JobView, PipelineError> {
    let (wave, view) = {
        let mut state = store.write();
        let wave = scheduler::play_job(&mut state, job_id)?;
        let view = state
            .job(job_id)
            .map(|(_, job)| JobView::from(job))
            .ok_or(PipelineError::Scheduler(SchedulerError::JobNotFound(job_id)))?;
        (wave, view)
    };

    tracing::info!(job_id, name = %view.name, "Manual job played");
    report_wave(&wave);
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glhub_core::domain::job::JobStatus;
    use glhub_core::domain::pipeline::PipelineStatus;
    use indexmap::IndexMap;

    fn request(pipeline: &str) -> SubmitPipeline {
        SubmitPipeline {
            pipeline: pipeline.to_string(),
            ..SubmitPipeline::default()
        }
    }

    #[test]
    fn test_submit_creates_project_and_repository() {
        let store = Store::new();
        let metrics = Metrics::new();
        let submitted = submit(
            &store,
            &metrics,
            10,
            "ci.local:8080",
            request("test:\n  script: [echo hello]\n"),
        )
        .unwrap();

        assert_eq!(submitted.status, PipelineStatus::Running);
        assert_eq!(submitted.jobs["test"].status, JobStatus::Pending);

        let state = store.read();
        let pipeline = state.pipeline(submitted.pipeline_id).unwrap();
        assert_eq!(pipeline.server_url, "ci.local:8080");
        let project = state.project(pipeline.project_id).unwrap();
        let repo = state.git_storage(&project.name).unwrap();
        assert_eq!(repo.head_commit().unwrap().to_hex(), pipeline.sha);
        assert_eq!(
            repo.read_file(PIPELINE_FILE),
            Some(b"test:\n  script: [echo hello]\n".as_slice())
        );
        drop(state);
        assert_eq!(metrics.snapshot(0, 0).pipeline_submissions, 1);
    }

    #[test]
    fn test_submit_resolves_includes_from_files() {
        let store = Store::new();
        let mut files = IndexMap::new();
        files.insert(
            "ci/templates.yml".to_string(),
            ".base:\n  image: alpine:latest\n  before_script: [echo setup]\n".to_string(),
        );
        let req = SubmitPipeline {
            pipeline: "include:\n  - local: ci/templates.yml\ntest:\n  extends: .base\n  script: [echo test]\n"
                .to_string(),
            image: None,
            files,
        };

        let submitted = submit(&store, &Metrics::new(), 10, "localhost", req).unwrap();
        let state = store.read();
        let def = &state.pipeline(submitted.pipeline_id).unwrap().def.jobs["test"];
        assert_eq!(def.image.as_deref(), Some("alpine:latest"));
        assert_eq!(def.before_script, vec!["echo setup"]);
    }

    #[test]
    fn test_submit_errors() {
        let store = Store::new();
        let metrics = Metrics::new();
        assert!(matches!(
            submit(&store, &metrics, 10, "localhost", request("test: [")),
            Err(PipelineError::Parse(_))
        ));
        assert!(matches!(
            submit(
                &store,
                &metrics,
                10,
                "localhost",
                request("a:\n  script: [a]\n  needs: [ghost]\n")
            ),
            Err(PipelineError::Scheduler(SchedulerError::UnknownNeed { .. }))
        ));
    }

    #[test]
    fn test_capacity_limit() {
        let store = Store::new();
        let metrics = Metrics::new();
        let yaml = "test:\n  script: [t]\n";
        submit(&store, &metrics, 1, "localhost", request(yaml)).unwrap();
        assert!(matches!(
            submit(&store, &metrics, 1, "localhost", request(yaml)),
            Err(PipelineError::CapacityExceeded(1))
        ));
    }

    #[test]
    fn test_cancel_and_status() {
        let store = Store::new();
        let submitted = submit(
            &store,
            &Metrics::new(),
            10,
            "localhost",
            request("test:\n  script: [t]\n"),
        )
        .unwrap();
        let id = submitted.pipeline_id;

        let canceled = cancel_pipeline(&store, id).unwrap();
        assert_eq!(canceled.status, PipelineStatus::Canceled);
        let view = get_pipeline(&store, id).unwrap();
        assert_eq!(view.result, Some(PipelineStatus::Canceled));
        assert_eq!(view.jobs["test"].status, JobStatus::Canceled);

        assert!(matches!(cancel_pipeline(&store, 99), Err(PipelineError::NotFound(99))));
        assert!(matches!(get_pipeline(&store, 99), Err(PipelineError::NotFound(99))));
    }

    #[test]
    fn test_play_manual_job() {
        let store = Store::new();
        let submitted = submit(
            &store,
            &Metrics::new(),
            10,
            "localhost",
            request("deploy:\n  when: manual\n  script: [deploy]\n"),
        )
        .unwrap();
        let job_id = submitted.jobs["deploy"].id;
        assert_eq!(submitted.jobs["deploy"].status, JobStatus::Created);

        let view = play_job(&store, job_id).unwrap();
        assert_eq!(view.status, JobStatus::Pending);
        assert!(matches!(
            play_job(&store, job_id),
            Err(PipelineError::Scheduler(SchedulerError::NotPlayable(_)))
        ));
    }
}
