//! Runner DTOs
//!
//! Registration, verification and job request bodies.

use serde::{Deserialize, Serialize};

use crate::domain::RunnerId;

/// Body of `POST /api/v4/runners`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRunner {
    /// Registration token; any non-empty value is accepted
    pub token: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tag_list: Option<TagList>,
}

/// Tags arrive either as a comma separated string or as a list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagList {
    List(Vec<String>),
    Csv(String),
}

impl TagList {
    pub fn into_tags(self) -> Vec<String> {
        match self {
            TagList::List(tags) => tags,
            TagList::Csv(csv) => csv
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Response of a successful registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredRunner {
    pub id: RunnerId,
    pub token: String,
}

/// Body carrying only a runner token (verify, unregister, job request)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerToken {
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_list_shapes() {
        let req: RegisterRunner =
            serde_json::from_str(r#"{"token": "t", "tag_list": "docker, linux,"}"#).unwrap();
        assert_eq!(
            req.tag_list.unwrap().into_tags(),
            vec!["docker".to_string(), "linux".to_string()]
        );

        let req: RegisterRunner =
            serde_json::from_str(r#"{"token": "t", "tag_list": ["a", "b"]}"#).unwrap();
        assert_eq!(req.tag_list.unwrap().into_tags().len(), 2);
    }
}
