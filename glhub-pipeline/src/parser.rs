//! Pipeline document parser
//!
//! Turns `.gitlab-ci.yml` source into a [`PipelineDef`] in two passes: a
//! generic YAML decode (with includes and `extends` resolved on the raw
//! mapping), then a structured normalization of every job.

use glhub_core::domain::job::When;
use glhub_core::domain::pipeline::{
    ArtifactsDef, CacheDef, DEFAULT_STAGE, DEFAULT_STAGES, ParallelDef, PipelineDef,
    PipelineJobDef, Rule, ServiceDef,
};
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use crate::duration::{parse_duration, parse_retry};
use crate::error::{ParseError, Result};
use crate::extends::resolve_extends;
use crate::include::{FileSource, resolve_includes};
use crate::parallel::{MAX_PARALLEL, expand_parallel, matrix_size};
use crate::yaml::{get_str, scalar_to_string, string_or_list, variables};

/// Top-level keys that never define a job
pub const RESERVED_KEYS: [&str; 11] = [
    "stages",
    "variables",
    "image",
    "default",
    "include",
    "workflow",
    "services",
    "before_script",
    "after_script",
    "cache",
    "pages",
];

/// Whether a top-level key names a job (not reserved, not a template)
pub(crate) fn is_job_key(name: &str) -> bool {
    !name.starts_with('.') && !RESERVED_KEYS.contains(&name)
}

/// Parse a pipeline document
///
/// `source` gives access to the repository for `include: local:`; without
/// one, an `include:` key is an error.
///
/// # Errors
/// Returns an error if:
/// - The YAML is malformed or not a mapping
/// - An include cannot be found or an `extends` target is unknown or cyclic
/// - A job lacks `script` or has a malformed field
/// - No jobs remain after templates are set aside
///
/// # Example
/// ```
/// use glhub_pipeline::parse_pipeline;
///
/// let def = parse_pipeline("test:\n  script: [echo hello]\n", None)?;
/// assert_eq!(def.stages, vec!["build", "test", "deploy"]);
/// assert_eq!(def.jobs["test"].stage, "test");
/// # Ok::<(), glhub_pipeline::ParseError>(())
/// ```
pub fn parse_pipeline(source: &str, files: Option<&dyn FileSource>) -> Result<PipelineDef> {
    let mut doc = decode(source)?;

    match files {
        Some(files) => resolve_includes(&mut doc, files)?,
        None if doc.contains_key("include") => {
            return Err(ParseError::InvalidInclude(
                "no repository available to resolve includes".to_string(),
            ));
        }
        None => {}
    }
    resolve_extends(&mut doc)?;

    let globals = Globals::from_document(&doc);

    let mut jobs = IndexMap::new();
    for (key, value) in &doc {
        let Some(name) = key.as_str() else {
            continue;
        };
        if !is_job_key(name) {
            continue;
        }
        let job = normalize_job(name, value, &globals)?;
        jobs.insert(name.to_string(), job);
    }

    if jobs.is_empty() {
        return Err(ParseError::NoJobs);
    }

    Ok(PipelineDef {
        stages: globals.stages,
        variables: globals.variables,
        image: globals.image,
        workflow_rules: globals.workflow_rules,
        jobs: expand_parallel(jobs),
    })
}

fn decode(source: &str) -> Result<Mapping> {
    if source.trim().is_empty() {
        return Err(ParseError::NoJobs);
    }
    let mut value: Value = serde_yaml::from_str(source)?;
    value.apply_merge()?;

    match value {
        Value::Mapping(doc) => Ok(doc),
        Value::Null => Err(ParseError::NoJobs),
        _ => Err(ParseError::NotAMapping),
    }
}

// =============================================================================
// Global settings
// =============================================================================

/// Document-wide settings that jobs inherit
struct Globals {
    stages: Vec<String>,
    variables: IndexMap<String, String>,
    image: Option<String>,
    workflow_rules: Vec<Rule>,
    before_script: Option<Vec<String>>,
    after_script: Option<Vec<String>>,
    services: Option<Value>,
    cache: Option<Value>,
}

impl Globals {
    fn from_document(doc: &Mapping) -> Self {
        let default = doc.get("default").and_then(Value::as_mapping);
        // `default:` takes precedence over the legacy top-level keywords
        let inherited = |key: &str| {
            default
                .and_then(|d| d.get(key))
                .or_else(|| doc.get(key))
                .cloned()
        };

        let stages = match doc.get("stages").and_then(string_or_list) {
            Some(stages) if !stages.is_empty() => stages,
            _ => DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
        };

        let workflow_rules = doc
            .get("workflow")
            .and_then(Value::as_mapping)
            .and_then(|w| w.get("rules"))
            .map(parse_rules_lenient)
            .unwrap_or_default();

        Globals {
            stages,
            variables: variables(doc.get("variables")),
            image: inherited("image").as_ref().and_then(image_name),
            workflow_rules,
            before_script: inherited("before_script").as_ref().and_then(string_or_list),
            after_script: inherited("after_script").as_ref().and_then(string_or_list),
            services: inherited("services"),
            cache: inherited("cache"),
        }
    }
}

// =============================================================================
// Job normalization
// =============================================================================

fn normalize_job(name: &str, value: &Value, globals: &Globals) -> Result<PipelineJobDef> {
    let invalid = |field: &'static str, reason: &str| ParseError::InvalidField {
        job: name.to_string(),
        field,
        reason: reason.to_string(),
    };

    let Value::Mapping(def) = value else {
        return Err(invalid("definition", "job must be a mapping"));
    };

    let script = def
        .get("script")
        .and_then(string_or_list)
        .ok_or_else(|| ParseError::MissingField {
            job: name.to_string(),
            field: "script",
        })?;

    let mut vars = globals.variables.clone();
    vars.extend(variables(def.get("variables")));

    let when = match get_str(def, "when") {
        Some(when) => when.parse::<When>().map_err(|e| invalid("when", &e))?,
        None => When::OnSuccess,
    };

    let rules = match def.get("rules") {
        Some(rules) => parse_rules(rules).map_err(|e| invalid("rules", &e))?,
        None => Vec::new(),
    };

    let services = match def.get("services").or(globals.services.as_ref()) {
        Some(services) => parse_services(services),
        None => Vec::new(),
    };

    let cache = def
        .get("cache")
        .or(globals.cache.as_ref())
        .and_then(parse_cache);

    let parallel = match def.get("parallel") {
        Some(value) => Some(parse_parallel(value).map_err(|e| invalid("parallel", &e))?),
        None => None,
    };

    Ok(PipelineJobDef {
        name: name.to_string(),
        stage: get_str(def, "stage").unwrap_or(DEFAULT_STAGE).to_string(),
        image: def.get("image").and_then(image_name),
        before_script: match def.get("before_script") {
            Some(value) => string_or_list(value).unwrap_or_default(),
            None => globals.before_script.clone().unwrap_or_default(),
        },
        script,
        after_script: match def.get("after_script") {
            Some(value) => string_or_list(value).unwrap_or_default(),
            None => globals.after_script.clone().unwrap_or_default(),
        },
        variables: vars,
        artifacts: def.get("artifacts").and_then(parse_artifacts),
        services,
        needs: def.get("needs").map(job_refs).unwrap_or_default(),
        dependencies: def.get("dependencies").map(job_refs),
        rules,
        allow_failure: parse_allow_failure(def.get("allow_failure")),
        when,
        cache,
        timeout: def.get("timeout").map(parse_duration),
        retry: def.get("retry").map(parse_retry).unwrap_or(0),
        parallel,
        resource_group: get_str(def, "resource_group")
            .filter(|group| !group.is_empty())
            .map(str::to_string),
        matrix_group: None,
    })
}

/// `image: name` or `image: {name: ...}`
fn image_name(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Mapping(map) => get_str(map, "name").map(str::to_string),
        _ => None,
    }
}

fn parse_allow_failure(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

/// Job names from `needs`/`dependencies`: a name, a list, or `{job: name}` items
fn job_refs(value: &Value) -> Vec<String> {
    let item = |v: &Value| match v {
        Value::Mapping(map) => get_str(map, "job").map(str::to_string),
        Value::String(name) => Some(name.clone()),
        _ => None,
    };
    match value {
        Value::Sequence(items) => items.iter().filter_map(item).collect(),
        other => item(other).into_iter().collect(),
    }
}

fn parse_rules(value: &Value) -> std::result::Result<Vec<Rule>, String> {
    let Value::Sequence(items) = value else {
        return Err("rules must be a list".to_string());
    };

    items
        .iter()
        .map(|item| {
            let Value::Mapping(rule) = item else {
                return Err("each rule must be a mapping".to_string());
            };
            let when = match get_str(rule, "when") {
                Some(when) => Some(when.parse::<When>()?),
                None => None,
            };
            Ok(Rule {
                condition: get_str(rule, "if").map(str::to_string),
                when,
            })
        })
        .collect()
}

/// Workflow rules are advisory: malformed entries are dropped
fn parse_rules_lenient(value: &Value) -> Vec<Rule> {
    parse_rules(value).unwrap_or_else(|reason| {
        tracing::warn!(reason = %reason, "Ignoring malformed workflow rules");
        Vec::new()
    })
}

fn parse_services(value: &Value) -> Vec<ServiceDef> {
    let Value::Sequence(items) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(ServiceDef {
                name: name.clone(),
                ..Default::default()
            }),
            Value::Mapping(map) => Some(ServiceDef {
                name: get_str(map, "name")?.to_string(),
                alias: get_str(map, "alias").map(str::to_string),
                entrypoint: map
                    .get("entrypoint")
                    .and_then(string_or_list)
                    .unwrap_or_default(),
                command: map
                    .get("command")
                    .and_then(string_or_list)
                    .unwrap_or_default(),
                variables: variables(map.get("variables")),
            }),
            _ => None,
        })
        .collect()
}

fn parse_artifacts(value: &Value) -> Option<ArtifactsDef> {
    let map = value.as_mapping()?;
    let dotenv = map
        .get("reports")
        .and_then(Value::as_mapping)
        .and_then(|reports| reports.get("dotenv"))
        .and_then(string_or_list)
        .and_then(|files| files.into_iter().next());

    Some(ArtifactsDef {
        name: get_str(map, "name").map(str::to_string),
        paths: map
            .get("paths")
            .and_then(string_or_list)
            .unwrap_or_default(),
        expire_in: map.get("expire_in").and_then(scalar_to_string),
        when: get_str(map, "when").map(str::to_string),
        dotenv,
    })
}

fn parse_cache(value: &Value) -> Option<CacheDef> {
    let map = match value {
        Value::Mapping(map) => map,
        // A list of caches: the runner payload carries the first one
        Value::Sequence(items) => items.first()?.as_mapping()?,
        _ => return None,
    };

    Some(CacheDef {
        key: map.get("key").and_then(|key| match key {
            Value::Mapping(_) => None,
            scalar => scalar_to_string(scalar),
        }),
        paths: map
            .get("paths")
            .and_then(string_or_list)
            .unwrap_or_default(),
        policy: get_str(map, "policy").map(str::to_string),
        when: get_str(map, "when").map(str::to_string),
    })
}

fn parse_parallel(value: &Value) -> std::result::Result<ParallelDef, String> {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(count @ 1..=MAX_PARALLEL) => Ok(ParallelDef::Count(count as u32)),
            Some(count) if count > MAX_PARALLEL => Err(format!(
                "count {} exceeds the limit of {}",
                count, MAX_PARALLEL
            )),
            _ => Err("count must be a positive integer".to_string()),
        },
        Value::Mapping(map) => {
            let Some(Value::Sequence(entries)) = map.get("matrix") else {
                return Err("expected a count or a matrix".to_string());
            };
            let entries = entries
                .iter()
                .map(|entry| {
                    let Value::Mapping(entry) = entry else {
                        return Err("matrix entries must be mappings".to_string());
                    };
                    Ok(entry
                        .iter()
                        .filter_map(|(key, values)| {
                            Some((key.as_str()?.to_string(), string_or_list(values)?))
                        })
                        .collect::<IndexMap<_, _>>())
                })
                .collect::<std::result::Result<Vec<_>, String>>()?;
            let size = matrix_size(&entries);
            if size > MAX_PARALLEL {
                return Err(format!(
                    "matrix expands to {} jobs, the limit is {}",
                    size, MAX_PARALLEL
                ));
            }
            Ok(ParallelDef::Matrix(entries))
        }
        _ => Err("expected a count or a matrix".to_string()),
    }
}
