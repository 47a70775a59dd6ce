//! Variable Service
//!
//! Project-scoped CI variables.

use glhub_core::ProjectId;
use glhub_core::domain::project::Variable;
use glhub_core::dto::variable::CreateVariable;

use crate::store::Store;

/// Service error type
#[derive(Debug)]
pub enum VariableError {
    ProjectNotFound(ProjectId),
    MissingKey,
    NotFound(String),
}

/// Create or overwrite a variable
pub fn create_variable(
    store: &Store,
    project_id: ProjectId,
    req: CreateVariable,
) -> Result<Variable, VariableError> {
    let key = req
        .key
        .filter(|k| !k.trim().is_empty())
        .ok_or(VariableError::MissingKey)?;

    let variable = Variable {
        key,
        value: req.value,
        protected: req.protected,
        masked: req.masked,
    };
    let created = store
        .write()
        .set_variable(project_id, variable)
        .cloned()
        .ok_or(VariableError::ProjectNotFound(project_id))?;

    tracing::info!(project_id, key = %created.key, masked = created.masked, "Variable set");
    Ok(created)
}

pub fn list_variables(store: &Store, project_id: ProjectId) -> Result<Vec<Variable>, VariableError> {
    store
        .read()
        .project(project_id)
        .map(|p| p.variables.values().cloned().collect())
        .ok_or(VariableError::ProjectNotFound(project_id))
}

pub fn delete_variable(store: &Store, project_id: ProjectId, key: &str) -> Result<(), VariableError> {
    let mut state = store.write();
    if state.project(project_id).is_none() {
        return Err(VariableError::ProjectNotFound(project_id));
    }
    state
        .delete_variable(project_id, key)
        .map(|_| ())
        .ok_or_else(|| VariableError::NotFound(key.to_string()))
}
