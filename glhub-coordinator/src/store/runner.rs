//! Runner storage
//!
//! Runners are indexed by id and by token; the token index is what every
//! runner-facing request authenticates against.

use glhub_core::domain::runner::Runner;

use super::State;
use crate::token::generate_runner_token;

impl State {
    /// Register a new runner with a fresh id and token
    pub fn register_runner(&mut self, description: String, tag_list: Vec<String>) -> Runner {
        let id = self.next_runner_id;
        self.next_runner_id += 1;

        let runner = Runner {
            id,
            token: generate_runner_token(),
            description,
            tag_list,
            active: true,
            registered_at: chrono::Utc::now(),
            contacted_at: None,
        };

        self.runners_by_token.insert(runner.token.clone(), id);
        self.runners.insert(id, runner.clone());
        runner
    }

    pub fn runner_by_token(&self, token: &str) -> Option<&Runner> {
        self.runners_by_token
            .get(token)
            .and_then(|id| self.runners.get(id))
    }

    /// Record that a runner talked to us
    pub fn touch_runner(&mut self, token: &str) -> Option<&Runner> {
        let id = *self.runners_by_token.get(token)?;
        let runner = self.runners.get_mut(&id)?;
        runner.contacted_at = Some(chrono::Utc::now());
        Some(runner)
    }

    /// Remove a runner; false when the token is unknown
    pub fn unregister_runner(&mut self, token: &str) -> bool {
        match self.runners_by_token.remove(token) {
            Some(id) => self.runners.remove(&id).is_some(),
            None => false,
        }
    }

    pub fn runner_count(&self) -> usize {
        self.runners.len()
    }
}
