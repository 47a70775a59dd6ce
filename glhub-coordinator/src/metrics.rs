//! Operational counters
//!
//! Counters are updated after the store lock is released; gauges such as
//! active pipelines are read from the store when a snapshot is taken.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use glhub_core::domain::job::JobStatus;
use serde::Serialize;

#[derive(Debug)]
pub struct Metrics {
    pipeline_submissions: AtomicU64,
    job_dispatches: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    canceled: AtomicU64,
    started_at: Instant,
}

/// Point-in-time report served by `GET /internal/metrics`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub pipeline_submissions: u64,
    pub job_dispatches: u64,
    pub job_completions: BTreeMap<&'static str, u64>,
    pub active_pipelines: usize,
    pub registered_runners: usize,
    pub uptime_seconds: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            pipeline_submissions: AtomicU64::new(0),
            job_dispatches: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            canceled: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_submission(&self) {
        self.pipeline_submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.job_dispatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a terminal state reported by a runner
    pub fn record_completion(&self, status: JobStatus) {
        let counter = match status {
            JobStatus::Success => &self.succeeded,
            JobStatus::Failed => &self.failed,
            JobStatus::Canceled => &self.canceled,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn snapshot(&self, active_pipelines: usize, registered_runners: usize) -> MetricsSnapshot {
        let mut job_completions = BTreeMap::new();
        for (status, counter) in [
            (JobStatus::Success, &self.succeeded),
            (JobStatus::Failed, &self.failed),
            (JobStatus::Canceled, &self.canceled),
        ] {
            let count = counter.load(Ordering::Relaxed);
            if count > 0 {
                job_completions.insert(status.as_str(), count);
            }
        }

        MetricsSnapshot {
            pipeline_submissions: self.pipeline_submissions.load(Ordering::Relaxed),
            job_dispatches: self.job_dispatches.load(Ordering::Relaxed),
            job_completions,
            active_pipelines,
            registered_runners,
            uptime_seconds: self.uptime_seconds(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
