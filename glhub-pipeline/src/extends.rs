//! `extends:` resolution
//!
//! A job that extends others is rebuilt by folding its parents in order and
//! then the job itself. `variables` merge key by key with the later value
//! winning; every other key, including the replace-on-override keys
//! (`script`, `before_script`, `after_script`, `services`, `artifacts`,
//! `cache`, `rules`), is replaced wholesale.

use serde_yaml::{Mapping, Value};

use crate::error::{ParseError, Result};
use crate::parser::is_job_key;
use crate::yaml::take_key;

/// Resolve `extends` for every job of `doc` in place
pub fn resolve_extends(doc: &mut Mapping) -> Result<()> {
    let jobs: Vec<String> = doc
        .iter()
        .filter_map(|(key, value)| {
            let name = key.as_str()?;
            let extends = value.as_mapping()?.contains_key("extends");
            (is_job_key(name) && extends).then(|| name.to_string())
        })
        .collect();

    for name in jobs {
        let resolved = resolve(doc, &name, &[])?;
        if let Some(slot) = doc.get_mut(name.as_str()) {
            *slot = Value::Mapping(resolved);
        }
    }
    Ok(())
}

/// Fully merged definition of `name`, with `extends` removed
fn resolve(doc: &Mapping, name: &str, path: &[String]) -> Result<Mapping> {
    if let Some(start) = path.iter().position(|seen| seen == name) {
        let mut chain = path[start..].to_vec();
        chain.push(name.to_string());
        return Err(ParseError::ExtendsCycle(chain.join(" -> ")));
    }

    let mut def = doc
        .get(name)
        .and_then(Value::as_mapping)
        .cloned()
        .ok_or_else(|| ParseError::UnknownTemplate(name.to_string()))?;

    let parents = match take_key(&mut def, "extends") {
        Some(Value::String(parent)) => vec![parent],
        Some(Value::Sequence(parents)) => parents
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    if parents.is_empty() {
        return Ok(def);
    }

    let mut branch = path.to_vec();
    branch.push(name.to_string());

    let mut merged = Mapping::new();
    for parent in &parents {
        let parent_def = resolve(doc, parent, &branch)?;
        fold(&mut merged, parent_def);
    }
    fold(&mut merged, def);
    Ok(merged)
}

/// Overlay `overlay` on top of `base`
fn fold(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        let Some(existing) = base.get_mut(&key) else {
            base.insert(key, value);
            continue;
        };
        match (existing, value) {
            (Value::Mapping(existing), Value::Mapping(vars))
                if key.as_str() == Some("variables") =>
            {
                for (k, v) in vars {
                    existing.insert(k, v);
                }
            }
            (existing, value) => *existing = value,
        }
    }
}
