//! Variable DTOs

use serde::{Deserialize, Serialize};

/// Body of `POST /api/v4/projects/{id}/variables`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateVariable {
    pub key: Option<String>,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub masked: bool,
}
