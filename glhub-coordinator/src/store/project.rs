//! Project storage

use glhub_core::ProjectId;
use glhub_core::domain::project::{Project, Variable};

use super::State;

impl State {
    /// Create a project; an empty name becomes `project-<id>`
    pub fn create_project(&mut self, name: &str) -> &Project {
        let id = self.next_project_id;
        self.next_project_id += 1;

        let name = if name.is_empty() {
            format!("project-{}", id)
        } else {
            name.to_string()
        };
        self.projects.entry(id).or_insert(Project::new(id, name))
    }

    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(&id)
    }

    /// Insert or replace a project variable
    pub fn set_variable(&mut self, project_id: ProjectId, variable: Variable) -> Option<&Variable> {
        let project = self.projects.get_mut(&project_id)?;
        let key = variable.key.clone();
        project.variables.insert(key.clone(), variable);
        project.variables.get(&key)
    }

    /// Remove a project variable; `None` when the project or key is unknown
    pub fn delete_variable(&mut self, project_id: ProjectId, key: &str) -> Option<Variable> {
        self.projects
            .get_mut(&project_id)?
            .variables
            .shift_remove(key)
    }
}
