//! `include: local:` resolution
//!
//! Included documents are merged underneath the main document: the main
//! document wins on every key except `stages` (union, included first) and
//! `variables` (merged key by key, main wins). Includes inside included
//! files are not expanded.

use serde_yaml::{Mapping, Sequence, Value};

use crate::error::{ParseError, Result};
use crate::yaml::take_key;

/// Read access to the repository a pipeline document lives in
pub trait FileSource {
    /// Contents of `path` on the default branch, if present
    fn read_file(&self, path: &str) -> Option<Vec<u8>>;
}

/// Resolve the `include:` key of `doc` in place
pub fn resolve_includes(doc: &mut Mapping, source: &dyn FileSource) -> Result<()> {
    let Some(include) = take_key(doc, "include") else {
        return Ok(());
    };

    let paths = include_paths(&include)?;
    if paths.is_empty() {
        return Ok(());
    }

    // Later includes override earlier ones; the main document overrides all
    let mut base = Mapping::new();
    for path in &paths {
        let included = load_included(source, path)?;
        base = merge_underneath(included, base);
    }

    let main = std::mem::take(doc);
    *doc = merge_underneath(main, base);
    Ok(())
}

fn include_paths(include: &Value) -> Result<Vec<String>> {
    match include {
        Value::Sequence(items) => items.iter().map(include_path).collect(),
        single => Ok(vec![include_path(single)?]),
    }
}

fn include_path(entry: &Value) -> Result<String> {
    let path = match entry {
        Value::String(path) => path.as_str(),
        Value::Mapping(map) => match map.get("local").and_then(Value::as_str) {
            Some(path) => path,
            None => {
                return Err(ParseError::InvalidInclude(
                    "only local includes are supported".to_string(),
                ));
            }
        },
        _ => {
            return Err(ParseError::InvalidInclude(
                "entry must be a path or a {local: path} mapping".to_string(),
            ));
        }
    };
    Ok(path.trim_start_matches('/').to_string())
}

fn load_included(source: &dyn FileSource, path: &str) -> Result<Mapping> {
    let bytes = source
        .read_file(path)
        .ok_or_else(|| ParseError::IncludeNotFound(path.to_string()))?;

    let mut value: Value = serde_yaml::from_slice(&bytes)?;
    value.apply_merge()?;

    let mut mapping = match value {
        Value::Mapping(mapping) => mapping,
        Value::Null => Mapping::new(),
        _ => {
            return Err(ParseError::InvalidInclude(format!(
                "{} is not a mapping",
                path
            )));
        }
    };
    take_key(&mut mapping, "include");
    tracing::debug!(path, keys = mapping.len(), "Loaded included file");
    Ok(mapping)
}

/// Merge `lower` underneath `upper`, returning the combined document
fn merge_underneath(upper: Mapping, lower: Mapping) -> Mapping {
    let mut merged = lower;

    for (key, value) in upper {
        let Some(existing) = merged.get_mut(&key) else {
            merged.insert(key, value);
            continue;
        };
        match (key.as_str(), existing, value) {
            (Some("stages"), Value::Sequence(lower), Value::Sequence(upper)) => {
                union_stages(lower, upper);
            }
            (Some("variables"), Value::Mapping(lower), Value::Mapping(upper)) => {
                for (k, v) in upper {
                    lower.insert(k, v);
                }
            }
            (_, existing, value) => *existing = value,
        }
    }

    merged
}

fn union_stages(first: &mut Sequence, second: Sequence) {
    for stage in second {
        if !first.contains(&stage) {
            first.push(stage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Files(HashMap<String, String>);

    impl FileSource for Files {
        fn read_file(&self, path: &str) -> Option<Vec<u8>> {
            self.0.get(path).map(|s| s.as_bytes().to_vec())
        }
    }

    fn files(pairs: &[(&str, &str)]) -> Files {
        Files(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_include_merges_underneath_main() {
        let source = files(&[(
            "templates.yml",
            "stages: [lint, build]\nvariables:\n  A: inc\n  B: inc\n.base:\n  image: alpine:latest\nbuild:\n  script: [make]\n",
        )]);
        let mut doc = mapping(
            "include:\n  - local: templates.yml\nstages: [build, test]\nvariables:\n  B: main\nbuild:\n  script: [cargo build]\n",
        );

        resolve_includes(&mut doc, &source).unwrap();

        assert!(!doc.contains_key("include"));
        let stages: Vec<&str> = doc["stages"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(stages, vec!["lint", "build", "test"]);
        assert_eq!(doc["variables"]["A"].as_str(), Some("inc"));
        assert_eq!(doc["variables"]["B"].as_str(), Some("main"));
        assert_eq!(doc["build"]["script"][0].as_str(), Some("cargo build"));
        assert_eq!(doc[".base"]["image"].as_str(), Some("alpine:latest"));
    }

    #[test]
    fn test_include_string_form_strips_leading_slash() {
        let source = files(&[("ci/common.yml", "lint:\n  script: [lint]\n")]);
        let mut doc = mapping("include: /ci/common.yml\n");
        resolve_includes(&mut doc, &source).unwrap();
        assert!(doc.contains_key("lint"));
    }

    #[test]
    fn test_nested_include_is_not_expanded() {
        let source = files(&[
            ("a.yml", "include: b.yml\na:\n  script: [a]\n"),
            ("b.yml", "b:\n  script: [b]\n"),
        ]);
        let mut doc = mapping("include: a.yml\n");
        resolve_includes(&mut doc, &source).unwrap();
        assert!(doc.contains_key("a"));
        assert!(!doc.contains_key("b"));
        assert!(!doc.contains_key("include"));
    }

    #[test]
    fn test_missing_include_is_an_error() {
        let mut doc = mapping("include: {local: nope.yml}\n");
        let err = resolve_includes(&mut doc, &files(&[])).unwrap_err();
        assert!(matches!(err, ParseError::IncludeNotFound(p) if p == "nope.yml"));
    }

    #[test]
    fn test_remote_include_is_rejected() {
        let mut doc = mapping("include:\n  remote: https://example.com/ci.yml\n");
        let err = resolve_includes(&mut doc, &files(&[])).unwrap_err();
        assert!(matches!(err, ParseError::InvalidInclude(_)));
    }
}
