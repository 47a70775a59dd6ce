//! Project domain types

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::ProjectId;

/// Logical container for a repository and its secret variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub variables: IndexMap<String, Variable>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Project {
    pub fn new(id: ProjectId, name: String) -> Self {
        Self {
            id,
            name,
            variables: IndexMap::new(),
            created_at: chrono::Utc::now(),
        }
    }
}

/// Project-scoped CI variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub masked: bool,
}
