//! Store Module
//!
//! Process-wide in-memory state behind a single readers-writer lock.
//! Each submodule adds the operations for one kind of entity to [`State`].
//!
//! Callers holding a guard must not perform I/O or re-acquire the lock.

pub mod blob;
pub mod job;
pub mod project;
pub mod runner;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glhub_core::domain::pipeline::Pipeline;
use glhub_core::domain::project::Project;
use glhub_core::domain::runner::Runner;
use glhub_core::{JobId, PipelineId, ProjectId, RunnerId};

use crate::git::Repository;

/// Shared handle to the coordinator state
#[derive(Debug, Default)]
pub struct Store {
    state: RwLock<State>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the shared lock
    pub fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the exclusive lock
    pub fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything the coordinator knows
#[derive(Debug)]
pub struct State {
    runners: HashMap<RunnerId, Runner>,
    runners_by_token: HashMap<String, RunnerId>,
    projects: HashMap<ProjectId, Project>,
    pipelines: BTreeMap<PipelineId, Pipeline>,
    /// Owning pipeline of every job ever created
    job_index: HashMap<JobId, PipelineId>,
    artifacts: HashMap<JobId, Vec<u8>>,
    cache: HashMap<String, Vec<u8>>,
    git_storages: HashMap<String, Arc<Repository>>,
    pending: VecDeque<JobId>,
    next_runner_id: RunnerId,
    next_project_id: ProjectId,
    next_pipeline_id: PipelineId,
    next_job_id: JobId,
}

impl Default for State {
    fn default() -> Self {
        Self {
            runners: HashMap::new(),
            runners_by_token: HashMap::new(),
            projects: HashMap::new(),
            pipelines: BTreeMap::new(),
            job_index: HashMap::new(),
            artifacts: HashMap::new(),
            cache: HashMap::new(),
            git_storages: HashMap::new(),
            pending: VecDeque::new(),
            next_runner_id: 1,
            next_project_id: 1,
            next_pipeline_id: 1,
            next_job_id: 1,
        }
    }
}
