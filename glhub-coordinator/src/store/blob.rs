//! Artifact, cache and git repository storage

use std::sync::Arc;

use glhub_core::JobId;

use super::State;
use crate::git::Repository;

impl State {
    /// Store (or replace) the artifact archive of a job
    pub fn store_artifact(&mut self, job_id: JobId, data: Vec<u8>) {
        self.artifacts.insert(job_id, data);
    }

    pub fn artifact(&self, job_id: JobId) -> Option<&[u8]> {
        self.artifacts.get(&job_id).map(Vec::as_slice)
    }

    pub fn set_cache(&mut self, key: String, data: Vec<u8>) {
        self.cache.insert(key, data);
    }

    pub fn cache(&self, key: &str) -> Option<&[u8]> {
        self.cache.get(key).map(Vec::as_slice)
    }

    /// Repository served under `name`
    pub fn git_storage(&self, name: &str) -> Option<Arc<Repository>> {
        self.git_storages.get(name).cloned()
    }

    pub fn set_git_storage(&mut self, name: String, repo: Arc<Repository>) {
        self.git_storages.insert(name, repo);
    }
}
