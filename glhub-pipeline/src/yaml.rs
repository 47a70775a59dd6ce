//! Helpers for reading loosely-typed YAML values

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

/// Render a scalar the way CI variables see it
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// A single string or a list of scalars
pub(crate) fn string_or_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Sequence(items) => Some(items.iter().filter_map(scalar_to_string).collect()),
        Value::Null => Some(Vec::new()),
        other => scalar_to_string(other).map(|s| vec![s]),
    }
}

/// Variables block: scalars, or `{value: ..., description: ...}` objects
pub(crate) fn variables(value: Option<&Value>) -> IndexMap<String, String> {
    let Some(Value::Mapping(map)) = value else {
        return IndexMap::new();
    };

    map.iter()
        .filter_map(|(key, value)| {
            let key = key.as_str()?;
            let value = match value {
                Value::Mapping(obj) => obj.get("value").and_then(scalar_to_string)?,
                scalar => scalar_to_string(scalar)?,
            };
            Some((key.to_string(), value))
        })
        .collect()
}

/// Fetch a string field from a mapping
pub(crate) fn get_str<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Remove `key` from `map` while keeping the order of the other entries
pub(crate) fn take_key(map: &mut Mapping, key: &str) -> Option<Value> {
    if !map.contains_key(key) {
        return None;
    }
    let mut taken = None;
    for (k, v) in std::mem::take(map) {
        if taken.is_none() && k.as_str() == Some(key) {
            taken = Some(v);
        } else {
            map.insert(k, v);
        }
    }
    taken
}
