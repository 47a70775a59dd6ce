//! Pipeline materialisation
//!
//! Turns a parsed definition into a running pipeline: validates the `needs`
//! graph, applies workflow and job rules, allocates job ids and tokens and
//! runs the first dispatch wave.

use std::collections::HashMap;
use std::sync::Arc;

use glhub_core::domain::job::{JobStatus, PipelineJob, When};
use glhub_core::domain::pipeline::{
    DEFAULT_TIMEOUT_SECS, Pipeline, PipelineDef, PipelineJobDef, PipelineStatus,
};
use glhub_core::{JobId, PipelineId, ProjectId};
use glhub_pipeline::evaluate_rules;
use indexmap::IndexMap;

use super::{SchedulerError, Wave, dispatch};
use crate::git::repository::DEFAULT_BRANCH;
use crate::store::State;
use crate::token::generate_job_token;

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// Submission parameters that are not part of the definition
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// `host[:port]` runners use to reach the coordinator
    pub server_url: String,
    /// Image overriding the definition's default image
    pub image: Option<String>,
}

/// Materialise `def` as a new pipeline of `project_id` and dispatch it
pub fn submit_pipeline(
    state: &mut State,
    project_id: ProjectId,
    def: Arc<PipelineDef>,
    options: SubmitOptions,
) -> Result<(PipelineId, Wave), SchedulerError> {
    validate_needs(&def)?;

    let project_name = state
        .project(project_id)
        .map(|p| p.name.clone())
        .ok_or(SchedulerError::ProjectNotFound(project_id))?;
    let sha = state
        .git_storage(&project_name)
        .and_then(|repo| repo.head_commit())
        .map(|id| id.to_hex())
        .unwrap_or_else(|| ZERO_SHA.to_string());

    let pipeline_id = state.allocate_pipeline_id();
    let predefined = predefined_variables(pipeline_id, project_id, &project_name, &sha);

    if !def.workflow_rules.is_empty() {
        let mut context = predefined.clone();
        context.extend(def.variables.clone());
        if evaluate_rules(&def.workflow_rules, &context) == When::Never {
            return Err(SchedulerError::FilteredByWorkflow);
        }
    }

    let mut wave = Wave::new(pipeline_id);
    let mut jobs = IndexMap::with_capacity(def.jobs.len());
    for (name, job_def) in &def.jobs {
        let id = state.allocate_job_id();
        let when = if job_def.rules.is_empty() {
            job_def.when
        } else {
            let mut context = predefined.clone();
            context.insert("CI_JOB_NAME".into(), name.clone());
            context.insert("CI_JOB_STAGE".into(), job_def.stage.clone());
            context.extend(job_def.variables.clone());
            evaluate_rules(&job_def.rules, &context)
        };

        let mut job = new_job(id, pipeline_id, name, job_def, when);
        if when == When::Never {
            job.transition(JobStatus::Skipped);
            wave.skipped.push(id);
        }
        jobs.insert(name.clone(), job);
    }

    state.insert_pipeline(Pipeline {
        id: pipeline_id,
        project_id,
        status: PipelineStatus::Running,
        stages: def.stages.clone(),
        def,
        sha,
        ref_name: DEFAULT_BRANCH.to_string(),
        created_at: chrono::Utc::now(),
        server_url: options.server_url,
        image: options.image,
        jobs,
        resource_groups: HashMap::new(),
    });

    wave.merge(dispatch(state, pipeline_id)?);
    Ok((pipeline_id, wave))
}

fn new_job(
    id: JobId,
    pipeline_id: PipelineId,
    name: &str,
    def: &PipelineJobDef,
    when: When,
) -> PipelineJob {
    PipelineJob {
        id,
        pipeline_id,
        name: name.to_string(),
        stage: def.stage.clone(),
        status: JobStatus::Created,
        result: None,
        allow_failure: def.allow_failure,
        when,
        needs: def.needs.clone(),
        token: generate_job_token(),
        retry_count: 0,
        retry_max: def.retry,
        timeout: def.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
        matrix_group: def.matrix_group.clone(),
        resource_group: def.resource_group.clone(),
        dotenv: IndexMap::new(),
        trace: Vec::new(),
        started_at: None,
        finished_at: None,
    }
}

/// Variables every rule condition can see
pub fn predefined_variables(
    pipeline_id: PipelineId,
    project_id: ProjectId,
    project_name: &str,
    sha: &str,
) -> IndexMap<String, String> {
    [
        ("CI", "true".to_string()),
        ("GITLAB_CI", "true".to_string()),
        ("CI_PIPELINE_SOURCE", "push".to_string()),
        ("CI_PIPELINE_ID", pipeline_id.to_string()),
        ("CI_PROJECT_ID", project_id.to_string()),
        ("CI_PROJECT_NAME", project_name.to_string()),
        ("CI_COMMIT_SHA", sha.to_string()),
        ("CI_COMMIT_BRANCH", DEFAULT_BRANCH.to_string()),
        ("CI_COMMIT_REF_NAME", DEFAULT_BRANCH.to_string()),
        ("CI_DEFAULT_BRANCH", DEFAULT_BRANCH.to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Reject unknown `needs` targets and cycles in the `needs` graph
pub fn validate_needs(def: &PipelineDef) -> Result<(), SchedulerError> {
    for (name, job) in &def.jobs {
        if let Some(need) = job.needs.iter().find(|n| !def.jobs.contains_key(*n)) {
            return Err(SchedulerError::UnknownNeed {
                job: name.clone(),
                need: need.clone(),
            });
        }
    }

    let mut visits: HashMap<&str, Visit> = HashMap::new();
    for name in def.jobs.keys() {
        visit(def, name, &mut visits)?;
    }
    Ok(())
}

fn visit<'a>(
    def: &'a PipelineDef,
    name: &'a str,
    visits: &mut HashMap<&'a str, Visit>,
) -> Result<(), SchedulerError> {
    match visits.get(name) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => return Err(SchedulerError::NeedsCycle(name.to_string())),
        None => {}
    }

    visits.insert(name, Visit::InProgress);
    if let Some(job) = def.jobs.get(name) {
        for need in &job.needs {
            visit(def, need, visits)?;
        }
    }
    visits.insert(name, Visit::Done);
    Ok(())
}
