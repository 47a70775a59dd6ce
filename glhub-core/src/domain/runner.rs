//! Runner domain types

use serde::{Deserialize, Serialize};

use super::RunnerId;

/// Prefix of every runner authentication token
pub const RUNNER_TOKEN_PREFIX: &str = "glrt-";

/// Registered runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runner {
    pub id: RunnerId,
    pub token: String,
    pub description: String,
    pub tag_list: Vec<String>,
    pub active: bool,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub contacted_at: Option<chrono::DateTime<chrono::Utc>>,
}
