//! Status Service
//!
//! Operational views over the store for `/internal/status` and
//! `/internal/metrics`.

use std::collections::BTreeMap;

use glhub_core::domain::job::JobStatus;
use serde::Serialize;

use crate::metrics::{Metrics, MetricsSnapshot};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub active_pipelines: usize,
    pub total_pipelines: usize,
    pub pending_jobs: usize,
    pub jobs_by_status: BTreeMap<&'static str, usize>,
    pub registered_runners: usize,
    pub uptime_seconds: u64,
}

pub fn status(store: &Store, metrics: &Metrics) -> StatusReport {
    let state = store.read();

    let mut jobs_by_status: BTreeMap<&'static str, usize> =
        JobStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    let mut total_pipelines = 0;
    for pipeline in state.pipelines() {
        total_pipelines += 1;
        for job in pipeline.jobs.values() {
            *jobs_by_status.entry(job.status.as_str()).or_default() += 1;
        }
    }

    StatusReport {
        active_pipelines: state.active_pipeline_count(),
        total_pipelines,
        pending_jobs: state.pending_len(),
        jobs_by_status,
        registered_runners: state.runner_count(),
        uptime_seconds: metrics.uptime_seconds(),
    }
}

pub fn metrics(store: &Store, metrics: &Metrics) -> MetricsSnapshot {
    let (active, runners) = {
        let state = store.read();
        (state.active_pipeline_count(), state.runner_count())
    };
    metrics.snapshot(active, runners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::testing::submit;

    #[test]
    fn test_status_counts_jobs() {
        let store = Store::new();
        submit(
            &mut store.write(),
            "build:\n  stage: build\n  script: [b]\ntest:\n  stage: test\n  script: [t]\n",
        );
        store.write().register_runner("r".into(), Vec::new());

        let report = status(&store, &Metrics::new());
        assert_eq!(report.active_pipelines, 1);
        assert_eq!(report.total_pipelines, 1);
        assert_eq!(report.pending_jobs, 1);
        assert_eq!(report.jobs_by_status["pending"], 1);
        assert_eq!(report.jobs_by_status["created"], 1);
        assert_eq!(report.jobs_by_status["success"], 0);
        assert_eq!(report.registered_runners, 1);

        let snapshot = metrics(&store, &Metrics::new());
        assert_eq!(snapshot.active_pipelines, 1);
        assert_eq!(snapshot.registered_runners, 1);
    }
}
