//! Job Payload
//!
//! Builds the response of `POST /api/v4/jobs/request` for a claimed job:
//! git checkout details, steps, image and services, predefined CI
//! variables, artifacts from upstream jobs and their dotenv exports.

use glhub_core::JobId;
use glhub_core::domain::job::{JobStatus, PipelineJob};
use glhub_core::domain::pipeline::{
    DEFAULT_TIMEOUT_SECS, Pipeline, PipelineJobDef, ServiceDef, stage_index,
};
use glhub_core::dto::job::{
    ArtifactFile, ArtifactSpec, CacheSpec, Dependency, Features, GitInfo, Image, JobInfo,
    JobPayload, JobVariable, RunnerInfo, Service, Step,
};

use crate::git::object::ObjectId;
use crate::store::State;

pub const ARTIFACTS_FILENAME: &str = "artifacts.zip";

const SERVER_NAME: &str = "gitlabhub";
const SERVER_VERSION: &str = "17.0.0";
const CLONE_DEPTH: u32 = 50;

const DIND_VARIABLES: [(&str, &str); 3] = [
    ("DOCKER_HOST", "tcp://docker:2375"),
    ("DOCKER_TLS_CERTDIR", ""),
    ("DOCKER_DRIVER", "overlay2"),
];

/// Build the payload for `job_id`; `None` if the job is unknown
pub fn build_payload(state: &State, job_id: JobId) -> Option<JobPayload> {
    let (pipeline, job) = state.job(job_id)?;
    let def = pipeline.def.jobs.get(&job.name);
    let project = state
        .project(pipeline.project_id)
        .map(|p| p.name.as_str())
        .unwrap_or_default();

    let timeout = if job.timeout > 0 {
        job.timeout
    } else {
        DEFAULT_TIMEOUT_SECS
    };

    let image = def
        .and_then(|d| d.image.clone())
        .or_else(|| pipeline.image.clone())
        .or_else(|| pipeline.def.image.clone())
        .map(|name| Image { name });

    let mut variables = ci_variables(pipeline, job, project);
    let mut payload = JobPayload {
        id: job.id,
        token: job.token.clone(),
        allow_git_fetch: true,
        job_info: JobInfo {
            id: job.id,
            name: job.name.clone(),
            stage: job.stage.clone(),
            project_id: pipeline.project_id,
            project_name: project.to_string(),
        },
        git_info: GitInfo {
            repo_url: format!("http://{}/{}.git", pipeline.server_url, project),
            ref_name: pipeline.ref_name.clone(),
            sha: pipeline.sha.clone(),
            before_sha: ObjectId::ZERO.to_hex(),
            ref_type: "branch".to_string(),
            refspecs: vec!["+refs/heads/*:refs/remotes/origin/*".to_string()],
            depth: CLONE_DEPTH,
        },
        runner_info: RunnerInfo { timeout },
        variables: Vec::new(),
        steps: Vec::new(),
        image,
        services: Vec::new(),
        artifacts: Vec::new(),
        cache: Vec::new(),
        dependencies: Vec::new(),
        features: Features::default(),
    };

    if let Some(def) = def {
        variables.extend(
            def.variables
                .iter()
                .map(|(key, value)| JobVariable::public(key.as_str(), value.as_str())),
        );
        payload.steps = steps(def, job, timeout);
        payload.services = def.services.iter().map(service).collect();
        payload.artifacts = artifacts(def);
        payload.cache = cache(def);
    }

    if let Some(project) = state.project(pipeline.project_id) {
        variables.extend(project.variables.values().map(|v| JobVariable {
            key: v.key.clone(),
            value: v.value.clone(),
            public: !v.masked,
            masked: v.masked,
        }));
    }

    if payload.services.iter().any(|s| is_dind(&s.name)) {
        for (key, value) in DIND_VARIABLES {
            if !variables.iter().any(|v| v.key == key) {
                variables.push(JobVariable::public(key, value));
            }
        }
    }

    let upstream = dependency_names(pipeline, job, def);
    for name in &upstream {
        let Some(dep) = pipeline.jobs.get(name) else {
            continue;
        };
        if let Some(artifact) = state.artifact(dep.id) {
            payload.dependencies.push(Dependency {
                id: dep.id,
                name: name.clone(),
                token: dep.token.clone(),
                artifacts_file: ArtifactFile {
                    filename: ARTIFACTS_FILENAME.to_string(),
                    size: artifact.len() as u64,
                },
            });
        }
        variables.extend(
            dep.dotenv
                .iter()
                .map(|(key, value)| JobVariable::public(key.as_str(), value.as_str())),
        );
    }

    payload.variables = variables;
    Some(payload)
}

/// Predefined variables of a job, in the order GitLab sends them
fn ci_variables(pipeline: &Pipeline, job: &PipelineJob, project: &str) -> Vec<JobVariable> {
    let server = pipeline.server_url.as_str();
    let (host, port) = split_host(server);
    let short_sha: String = pipeline.sha.chars().take(8).collect();

    let mut vars = vec![
        JobVariable::public("CI", "true"),
        JobVariable::public("GITLAB_CI", "true"),
        JobVariable::public("CI_SERVER", "yes"),
        JobVariable::public("CI_SERVER_URL", format!("http://{}", server)),
        JobVariable::public("CI_SERVER_HOST", host),
        JobVariable::public("CI_SERVER_PORT", port),
        JobVariable::public("CI_SERVER_PROTOCOL", "http"),
        JobVariable::public("CI_SERVER_NAME", SERVER_NAME),
        JobVariable::public("CI_SERVER_VERSION", SERVER_VERSION),
        JobVariable::public("CI_API_V4_URL", format!("http://{}/api/v4", server)),
        JobVariable::public("CI_JOB_ID", job.id.to_string()),
        JobVariable::secret("CI_JOB_TOKEN", job.token.as_str()),
        JobVariable::public("CI_JOB_NAME", job.name.as_str()),
        JobVariable::public("CI_JOB_STAGE", job.stage.as_str()),
        JobVariable::public("CI_JOB_STATUS", JobStatus::Running.as_str()),
        JobVariable::public("CI_PIPELINE_ID", pipeline.id.to_string()),
        JobVariable::public("CI_PIPELINE_SOURCE", "push"),
        JobVariable::public(
            "CI_PIPELINE_URL",
            format!("http://{}/{}/-/pipelines/{}", server, project, pipeline.id),
        ),
        JobVariable::public("CI_PROJECT_ID", pipeline.project_id.to_string()),
        JobVariable::public("CI_PROJECT_NAME", project),
        JobVariable::public("CI_PROJECT_PATH", project),
        JobVariable::public("CI_PROJECT_URL", format!("http://{}/{}", server, project)),
        JobVariable::public("CI_PROJECT_DIR", format!("/builds/{}", project)),
        JobVariable::public("CI_COMMIT_SHA", pipeline.sha.as_str()),
        JobVariable::public("CI_COMMIT_SHORT_SHA", short_sha),
        JobVariable::public("CI_COMMIT_REF_NAME", pipeline.ref_name.as_str()),
        JobVariable::public("CI_COMMIT_BRANCH", pipeline.ref_name.as_str()),
        JobVariable::public("CI_COMMIT_REF_SLUG", ref_slug(&pipeline.ref_name)),
        JobVariable::public("CI_DEFAULT_BRANCH", pipeline.ref_name.as_str()),
        JobVariable::secret(
            "CI_REPOSITORY_URL",
            format!(
                "http://gitlab-ci-token:{}@{}/{}.git",
                job.token, server, project
            ),
        ),
        JobVariable::public("CI_BUILDS_DIR", "/builds"),
        JobVariable::public("CI_CONCURRENT_ID", "0"),
        JobVariable::public("CI_CONCURRENT_PROJECT_ID", "0"),
    ];
    if let Some(group) = &job.matrix_group {
        vars.push(JobVariable::public("CI_JOB_GROUP_NAME", group.as_str()));
    }
    vars
}

/// Split `host[:port]`, defaulting the port to 80
fn split_host(server: &str) -> (&str, &str) {
    match server.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (host, port)
        }
        _ => (server, "80"),
    }
}

/// Lowercased ref with every non-alphanumeric character replaced by `-`
fn ref_slug(ref_name: &str) -> String {
    let slug: String = ref_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .take(63)
        .collect();
    slug.trim_matches('-').to_string()
}

fn steps(def: &PipelineJobDef, job: &PipelineJob, timeout: u64) -> Vec<Step> {
    let mut steps = Vec::new();

    let script: Vec<String> = def
        .before_script
        .iter()
        .chain(&def.script)
        .cloned()
        .collect();
    if !script.is_empty() {
        steps.push(Step {
            name: "script".to_string(),
            script,
            timeout,
            when: "on_success".to_string(),
            allow_failure: job.allow_failure,
        });
    }

    if !def.after_script.is_empty() {
        steps.push(Step {
            name: "after_script".to_string(),
            script: def.after_script.clone(),
            timeout,
            when: "always".to_string(),
            allow_failure: true,
        });
    }

    steps
}

fn service(def: &ServiceDef) -> Service {
    Service {
        name: def.name.clone(),
        alias: def
            .alias
            .clone()
            .unwrap_or_else(|| default_alias(&def.name)),
        entrypoint: def.entrypoint.clone(),
        command: def.command.clone(),
        variables: def
            .variables
            .iter()
            .map(|(key, value)| JobVariable::public(key.as_str(), value.as_str()))
            .collect(),
    }
}

/// Image name without registry path, tag or digest
pub fn default_alias(image: &str) -> String {
    let last = image.rsplit('/').next().unwrap_or(image);
    let last = last.split('@').next().unwrap_or(last);
    last.split(':').next().unwrap_or(last).to_string()
}

/// Docker-in-Docker service images: `docker:dind` and `docker:<tag>-dind`
pub fn is_dind(image: &str) -> bool {
    image == "docker:dind" || (image.starts_with("docker:") && image.ends_with("-dind"))
}

fn artifacts(def: &PipelineJobDef) -> Vec<ArtifactSpec> {
    let Some(artifacts) = &def.artifacts else {
        return Vec::new();
    };

    let mut specs = Vec::new();
    if !artifacts.paths.is_empty() {
        specs.push(ArtifactSpec {
            name: artifacts.name.clone().unwrap_or_else(|| "default".to_string()),
            untracked: false,
            paths: artifacts.paths.clone(),
            when: artifacts
                .when
                .clone()
                .unwrap_or_else(|| "on_success".to_string()),
            artifact_type: "archive".to_string(),
            artifact_format: "zip".to_string(),
            expire_in: artifacts.expire_in.clone(),
        });
    }
    if let Some(report) = &artifacts.dotenv {
        specs.push(ArtifactSpec {
            name: "dotenv".to_string(),
            untracked: false,
            paths: vec![report.clone()],
            when: "always".to_string(),
            artifact_type: "dotenv".to_string(),
            artifact_format: "gzip".to_string(),
            expire_in: artifacts.expire_in.clone(),
        });
    }
    specs
}

fn cache(def: &PipelineJobDef) -> Vec<CacheSpec> {
    let Some(cache) = &def.cache else {
        return Vec::new();
    };
    vec![CacheSpec {
        key: cache
            .key
            .clone()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "default".to_string()),
        untracked: false,
        policy: cache
            .policy
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "pull-push".to_string()),
        paths: cache.paths.clone(),
        when: cache
            .when
            .clone()
            .unwrap_or_else(|| "on_success".to_string()),
    }]
}

/// Jobs whose artifacts and dotenv exports a job receives
///
/// An explicit `dependencies:` list wins (even when empty), then `needs:`,
/// then every successful job of an earlier stage.
pub fn dependency_names(
    pipeline: &Pipeline,
    job: &PipelineJob,
    def: Option<&PipelineJobDef>,
) -> Vec<String> {
    if let Some(deps) = def.and_then(|d| d.dependencies.as_ref()) {
        return deps.clone();
    }
    if !job.needs.is_empty() {
        return job.needs.clone();
    }

    let Some(index) = stage_index(&pipeline.stages, &job.stage) else {
        return Vec::new();
    };
    pipeline
        .jobs
        .values()
        .filter(|other| {
            other.status == JobStatus::Success
                && stage_index(&pipeline.stages, &other.stage).is_some_and(|i| i < index)
        })
        .map(|other| other.name.clone())
        .collect()
}
