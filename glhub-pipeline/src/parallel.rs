//! `parallel:` expansion
//!
//! Jobs with `parallel: N` become N jobs named `"<name> i/N"`; jobs with
//! `parallel: {matrix: [...]}` become one job per combination, named
//! `"<name> (v1, v2)"` with values in sorted-key order. Every expansion
//! remembers the unexpanded name as its matrix group.

use std::collections::HashMap;

use glhub_core::domain::pipeline::{ParallelDef, PipelineJobDef};
use indexmap::IndexMap;

/// Most jobs a single `parallel:` entry may expand into
pub const MAX_PARALLEL: u64 = 200;

/// Number of jobs a matrix expands into, saturating on overflow
pub fn matrix_size(entries: &[IndexMap<String, Vec<String>>]) -> u64 {
    entries
        .iter()
        .map(|entry| {
            entry
                .values()
                .fold(1u64, |acc, values| acc.saturating_mul(values.len() as u64))
        })
        .fold(0u64, u64::saturating_add)
}

/// Expand parallel jobs, then rewrite `needs`/`dependencies` that name a
/// whole group into the list of its expansions
pub fn expand_parallel(jobs: IndexMap<String, PipelineJobDef>) -> IndexMap<String, PipelineJobDef> {
    let mut expanded = IndexMap::with_capacity(jobs.len());
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();

    for (name, mut job) in jobs {
        let Some(parallel) = job.parallel.take() else {
            expanded.insert(name, job);
            continue;
        };

        let copies = match parallel {
            ParallelDef::Count(total) => expand_count(&name, &job, total),
            ParallelDef::Matrix(entries) => expand_matrix(&name, &job, &entries),
        };
        groups.insert(
            name.clone(),
            copies.iter().map(|copy| copy.name.clone()).collect(),
        );
        for copy in copies {
            expanded.insert(copy.name.clone(), copy);
        }
    }

    if !groups.is_empty() {
        for job in expanded.values_mut() {
            job.needs = expand_group_refs(&job.needs, &groups);
            if let Some(deps) = &job.dependencies {
                job.dependencies = Some(expand_group_refs(deps, &groups));
            }
        }
    }

    expanded
}

fn expand_count(name: &str, job: &PipelineJobDef, total: u32) -> Vec<PipelineJobDef> {
    (1..=total)
        .map(|index| {
            let mut copy = job.clone();
            copy.name = format!("{} {}/{}", name, index, total);
            copy.matrix_group = Some(name.to_string());
            copy.variables
                .insert("CI_NODE_INDEX".to_string(), index.to_string());
            copy.variables
                .insert("CI_NODE_TOTAL".to_string(), total.to_string());
            copy
        })
        .collect()
}

fn expand_matrix(
    name: &str,
    job: &PipelineJobDef,
    entries: &[IndexMap<String, Vec<String>>],
) -> Vec<PipelineJobDef> {
    let combinations: Vec<Vec<(String, String)>> =
        entries.iter().flat_map(cartesian_product).collect();
    let total = combinations.len();

    combinations
        .into_iter()
        .enumerate()
        .map(|(i, combo)| {
            let mut copy = job.clone();
            let values: Vec<&str> = combo.iter().map(|(_, v)| v.as_str()).collect();
            copy.name = format!("{} ({})", name, values.join(", "));
            copy.matrix_group = Some(name.to_string());
            for (key, value) in combo {
                copy.variables.insert(key, value);
            }
            copy.variables
                .insert("CI_NODE_INDEX".to_string(), (i + 1).to_string());
            copy.variables
                .insert("CI_NODE_TOTAL".to_string(), total.to_string());
            copy
        })
        .collect()
}

/// All assignments of one matrix entry, keys sorted
fn cartesian_product(entry: &IndexMap<String, Vec<String>>) -> Vec<Vec<(String, String)>> {
    let mut keys: Vec<&String> = entry.keys().collect();
    keys.sort();

    let mut combos: Vec<Vec<(String, String)>> = vec![Vec::new()];
    for key in keys {
        let values = &entry[key];
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                values.iter().map(move |value| {
                    let mut next = prefix.clone();
                    next.push((key.clone(), value.clone()));
                    next
                })
            })
            .collect();
    }
    combos
}

fn expand_group_refs(names: &[String], groups: &HashMap<String, Vec<String>>) -> Vec<String> {
    names
        .iter()
        .flat_map(|name| match groups.get(name) {
            Some(members) => members.clone(),
            None => vec![name.clone()],
        })
        .collect()
}
