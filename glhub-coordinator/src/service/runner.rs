//! Runner Service
//!
//! Registration and token authentication of runners.

use glhub_core::RunnerId;
use glhub_core::dto::runner::{RegisterRunner, RegisteredRunner};

use crate::store::Store;

/// Service error type
#[derive(Debug)]
pub enum RunnerError {
    MissingToken,
    Forbidden,
}

/// Register a runner; any non-empty registration token is accepted
pub fn register(store: &Store, req: RegisterRunner) -> Result<RegisteredRunner, RunnerError> {
    let has_token = req.token.as_deref().is_some_and(|t| !t.trim().is_empty());
    if !has_token {
        return Err(RunnerError::MissingToken);
    }

    let tags = req.tag_list.map(|t| t.into_tags()).unwrap_or_default();
    let runner = store
        .write()
        .register_runner(req.description.unwrap_or_default(), tags);

    tracing::info!(
        runner_id = runner.id,
        description = %runner.description,
        tags = ?runner.tag_list,
        "Runner registered"
    );

    Ok(RegisteredRunner {
        id: runner.id,
        token: runner.token,
    })
}

/// Check a runner token, recording the contact
pub fn verify(store: &Store, token: Option<&str>) -> Result<RegisteredRunner, RunnerError> {
    let token = token.ok_or(RunnerError::Forbidden)?;
    let mut state = store.write();
    let runner = state.touch_runner(token).ok_or(RunnerError::Forbidden)?;

    Ok(RegisteredRunner {
        id: runner.id,
        token: runner.token.clone(),
    })
}

/// Remove a runner
pub fn unregister(store: &Store, token: Option<&str>) -> Result<(), RunnerError> {
    let token = token.ok_or(RunnerError::Forbidden)?;
    if !store.write().unregister_runner(token) {
        return Err(RunnerError::Forbidden);
    }

    tracing::info!("Runner unregistered");
    Ok(())
}

/// Resolve a runner token to the runner's id
pub fn authenticate(store: &Store, token: Option<&str>) -> Result<RunnerId, RunnerError> {
    let token = token.ok_or(RunnerError::Forbidden)?;
    store
        .write()
        .touch_runner(token)
        .map(|runner| runner.id)
        .ok_or(RunnerError::Forbidden)
}
