//! Job Service
//!
//! Runner-facing job lifecycle: long-poll claiming, state updates and
//! trace appends.

use std::time::Duration;

use glhub_core::{JobId, RunnerId};
use glhub_core::domain::job::JobStatus;
use glhub_core::dto::job::{JobPayload, UpdateJob};
use tokio::time::{Instant, interval_at, sleep};

use super::payload::build_payload;
use super::report_wave;
use super::runner::{self, RunnerError};
use crate::metrics::Metrics;
use crate::scheduler::{SchedulerError, complete_job};
use crate::store::Store;

/// Service error type
#[derive(Debug)]
pub enum JobError {
    NotFound(JobId),
    Forbidden,
    InvalidState(String),
}

impl From<RunnerError> for JobError {
    fn from(_: RunnerError) -> Self {
        JobError::Forbidden
    }
}

impl From<SchedulerError> for JobError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobNotFound(id) => JobError::NotFound(id),
            other => JobError::InvalidState(other.to_string()),
        }
    }
}

/// Claim the next pending job for a runner, waiting up to `timeout`
///
/// The queue is checked immediately and then every `interval`. Returns
/// `None` when the wait runs out. Dropping the future mid-wait claims
/// nothing, since a claim happens entirely under the store lock.
pub async fn request_job(
    store: &Store,
    metrics: &Metrics,
    token: Option<&str>,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<JobPayload>, JobError> {
    let runner_id = runner::authenticate(store, token)?;

    if let Some(payload) = try_claim(store, metrics, runner_id) {
        return Ok(Some(payload));
    }

    let interval = interval.max(Duration::from_millis(1));
    let deadline = sleep(timeout);
    tokio::pin!(deadline);
    let mut ticker = interval_at(Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::debug!(runner_id, "No job available");
                return Ok(None);
            }
            _ = ticker.tick() => {
                if let Some(payload) = try_claim(store, metrics, runner_id) {
                    return Ok(Some(payload));
                }
            }
        }
    }
}

/// Pop pending jobs until one can be handed out
fn try_claim(store: &Store, metrics: &Metrics, runner_id: RunnerId) -> Option<JobPayload> {
    let payload = {
        let mut state = store.write();
        loop {
            let job_id = state.dequeue_job()?;
            let Some(job) = state.job_mut(job_id) else {
                continue;
            };
            if job.status != JobStatus::Pending {
                continue;
            }
            job.transition(JobStatus::Running);
            if let Some(payload) = build_payload(&state, job_id) {
                break payload;
            }
        }
    };

    metrics.record_dispatch();
    tracing::info!(
        job_id = payload.id,
        runner_id,
        name = %payload.job_info.name,
        "Job claimed"
    );
    Some(payload)
}

/// Apply a state reported by the runner and return the job's status
///
/// The job token may come from a header or the body. A missing `state` or
/// `running` is a keep-alive and changes nothing.
pub fn update_job(
    store: &Store,
    metrics: &Metrics,
    job_id: JobId,
    header_token: Option<&str>,
    req: UpdateJob,
) -> Result<JobStatus, JobError> {
    let token = header_token
        .map(str::to_string)
        .or(req.token)
        .ok_or(JobError::Forbidden)?;

    let reported = match req.state.as_deref() {
        None | Some("") => None,
        Some(state) => Some(parse_state(state)?),
    };

    let (previous, current, wave) = {
        let mut state = store.write();
        let (_, job) = state.job(job_id).ok_or(JobError::NotFound(job_id))?;
        if job.token != token {
            return Err(JobError::Forbidden);
        }
        let previous = job.status;

        // Only a claim moves a job out of pending, so `running` is a keep-alive
        let wave = match reported {
            Some(status) if status.is_terminal() => {
                Some(complete_job(&mut state, job_id, status)?)
            }
            _ => None,
        };

        let current = state
            .job(job_id)
            .map(|(_, job)| job.status)
            .ok_or(JobError::NotFound(job_id))?;
        (previous, current, wave)
    };

    if let Some(status) = reported {
        if status.is_terminal() && previous == JobStatus::Running {
            metrics.record_completion(status);
            tracing::info!(job_id, %status, "Job completed");
        } else {
            tracing::debug!(job_id, %status, %previous, "Job update");
        }
    }
    if let Some(wave) = &wave {
        report_wave(wave);
    }

    Ok(current)
}

fn parse_state(state: &str) -> Result<JobStatus, JobError> {
    match state.parse::<JobStatus>() {
        Ok(
            status @ (JobStatus::Running
            | JobStatus::Success
            | JobStatus::Failed
            | JobStatus::Canceled),
        ) => Ok(status),
        _ => Err(JobError::InvalidState(format!("invalid job state: {}", state))),
    }
}

/// Append a chunk of build log; returns the job status and the trace length
///
/// The token is checked only when the runner sends one.
pub fn append_trace(
    store: &Store,
    job_id: JobId,
    token: Option<&str>,
    chunk: &[u8],
) -> Result<(JobStatus, usize), JobError> {
    let mut state = store.write();
    let job = state.job_mut(job_id).ok_or(JobError::NotFound(job_id))?;
    if token.is_some_and(|t| t != job.token) {
        return Err(JobError::Forbidden);
    }

    job.trace.extend_from_slice(chunk);
    Ok((job.status, job.trace.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SubmitOptions;
    use crate::scheduler::submit_pipeline;
    use glhub_core::domain::pipeline::PipelineStatus;
    use glhub_core::dto::runner::RegisterRunner;
    use std::sync::Arc;

    const FAST: Duration = Duration::from_millis(50);
    const TICK: Duration = Duration::from_millis(5);

    fn setup(yaml: &str) -> (Store, Metrics, String) {
        let store = Store::new();
        let token = runner::register(
            &store,
            RegisterRunner {
                token: Some("registration".into()),
                ..RegisterRunner::default()
            },
        )
        .unwrap()
        .token;
        {
            let mut state = store.write();
            let def = glhub_pipeline::parse_pipeline(yaml, None).unwrap();
            let project_id = state.create_project("").id;
            submit_pipeline(
                &mut state,
                project_id,
                Arc::new(def),
                SubmitOptions {
                    server_url: "localhost:8080".into(),
                    image: None,
                },
            )
            .unwrap();
        }
        (store, Metrics::new(), token)
    }

    fn update(state: &str, token: &str) -> UpdateJob {
        UpdateJob {
            token: Some(token.to_string()),
            state: Some(state.to_string()),
            ..UpdateJob::default()
        }
    }

    #[tokio::test]
    async fn test_request_claims_pending_job() {
        let (store, metrics, token) = setup("test:\n  script: [echo hello]\n");

        let payload = request_job(&store, &metrics, Some(&token), FAST, TICK)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.job_info.name, "test");
        assert_eq!(store.read().job(payload.id).unwrap().1.status, JobStatus::Running);

        let none = request_job(&store, &metrics, Some(&token), FAST, TICK)
            .await
            .unwrap();
        assert!(none.is_none());
        assert_eq!(metrics.snapshot(0, 0).job_dispatches, 1);
    }

    #[tokio::test]
    async fn test_request_rejects_unknown_runner() {
        let (store, metrics, _) = setup("test:\n  script: [t]\n");
        let result = request_job(&store, &metrics, Some("glrt-nope"), FAST, TICK).await;
        assert!(matches!(result, Err(JobError::Forbidden)));
        assert_eq!(store.read().pending_len(), 1);
    }

    #[tokio::test]
    async fn test_long_poll_picks_up_late_job() {
        let (store, metrics, token) = setup("test:\n  script: [t]\n");
        let first = request_job(&store, &metrics, Some(&token), FAST, TICK)
            .await
            .unwrap()
            .unwrap();

        let store = Arc::new(store);
        let waiter = {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let metrics = Metrics::new();
                request_job(&store, &metrics, Some(&token), Duration::from_secs(5), TICK).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(first.job_info.name, "test");
        {
            let mut state = store.write();
            let def = glhub_pipeline::parse_pipeline("late:\n  script: [t]\n", None).unwrap();
            let project_id = state.create_project("").id;
            submit_pipeline(
                &mut state,
                project_id,
                Arc::new(def),
                SubmitOptions {
                    server_url: "localhost:8080".into(),
                    image: None,
                },
            )
            .unwrap();
        }

        let payload = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(payload.job_info.name, "late");
    }

    #[tokio::test]
    async fn test_concurrent_requests_claim_each_job_once() {
        let (store, _, token) = setup(
            "
a:
  script: [a]
b:
  script: [b]
c:
  script: [c]
",
        );
        let store = Arc::new(store);
        let metrics = Arc::new(Metrics::new());

        let mut handles = Vec::new();
        for _ in 0..6 {
            let store = store.clone();
            let metrics = metrics.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                request_job(&store, &metrics, Some(&token), FAST, TICK).await
            }));
        }

        let mut claimed = Vec::new();
        for handle in handles {
            if let Some(payload) = handle.await.unwrap().unwrap() {
                claimed.push(payload.id);
            }
        }
        claimed.sort();
        assert_eq!(claimed.len(), 3);
        claimed.dedup();
        assert_eq!(claimed.len(), 3);
    }

    #[tokio::test]
    async fn test_update_job_lifecycle() {
        let (store, metrics, token) = setup("test:\n  script: [t]\n");
        let payload = request_job(&store, &metrics, Some(&token), FAST, TICK)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            update_job(&store, &metrics, payload.id, None, update("success", "wrong")),
            Err(JobError::Forbidden)
        ));
        assert!(matches!(
            update_job(&store, &metrics, payload.id, Some(&payload.token), update("done", "")),
            Err(JobError::InvalidState(_))
        ));
        assert!(matches!(
            update_job(&store, &metrics, 999, Some(&payload.token), update("success", "")),
            Err(JobError::NotFound(999))
        ));

        let status = update_job(
            &store,
            &metrics,
            payload.id,
            None,
            update("success", &payload.token),
        )
        .unwrap();
        assert_eq!(status, JobStatus::Success);

        let state = store.read();
        let (pipeline, _) = state.job(payload.id).unwrap();
        assert!(pipeline.status.is_terminal());
        drop(state);
        assert_eq!(metrics.snapshot(0, 0).job_completions["success"], 1);
    }

    #[tokio::test]
    async fn test_stale_running_update_does_not_strand_retry() {
        let (store, metrics, token) = setup("flaky:\n  retry: 1\n  script: [t]\n");
        let first = request_job(&store, &metrics, Some(&token), FAST, TICK)
            .await
            .unwrap()
            .unwrap();

        let status = update_job(&store, &metrics, first.id, Some(&first.token), update("failed", ""))
            .unwrap();
        assert_eq!(status, JobStatus::Pending);
        assert!(store.read().is_queued(first.id));

        // The first attempt's runner no longer holds a valid token
        assert!(matches!(
            update_job(&store, &metrics, first.id, Some(&first.token), update("running", "")),
            Err(JobError::Forbidden)
        ));

        let retry_token = store.read().job(first.id).unwrap().1.token.clone();
        assert_ne!(retry_token, first.token);
        let status = update_job(&store, &metrics, first.id, Some(&retry_token), update("running", ""))
            .unwrap();
        assert_eq!(status, JobStatus::Pending);
        assert!(store.read().is_queued(first.id));

        let second = request_job(&store, &metrics, Some(&token), FAST, TICK)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.token, retry_token);

        update_job(&store, &metrics, second.id, Some(&second.token), update("success", ""))
            .unwrap();
        let state = store.read();
        assert_eq!(state.job(second.id).unwrap().0.status, PipelineStatus::Success);
    }

    #[tokio::test]
    async fn test_update_without_token_is_forbidden() {
        let (store, metrics, token) = setup("test:\n  script: [t]\n");
        let payload = request_job(&store, &metrics, Some(&token), FAST, TICK)
            .await
            .unwrap()
            .unwrap();
        let req = UpdateJob {
            state: Some("success".into()),
            ..UpdateJob::default()
        };
        assert!(matches!(
            update_job(&store, &metrics, payload.id, None, req),
            Err(JobError::Forbidden)
        ));
    }

    #[test]
    fn test_append_trace() {
        let (store, _, _) = setup("test:\n  script: [t]\n");
        let (job_id, job_token) = {
            let state = store.read();
            let job = state.pipelines().next().unwrap().jobs["test"].clone();
            (job.id, job.token)
        };

        assert_eq!(
            append_trace(&store, job_id, None, b"hello ").unwrap(),
            (JobStatus::Pending, 6)
        );
        assert_eq!(
            append_trace(&store, job_id, Some(&job_token), b"world").unwrap(),
            (JobStatus::Pending, 11)
        );
        assert!(matches!(
            append_trace(&store, job_id, Some("bad"), b"x"),
            Err(JobError::Forbidden)
        ));
        assert!(matches!(
            append_trace(&store, 404, None, b"x"),
            Err(JobError::NotFound(404))
        ));
    }
}
