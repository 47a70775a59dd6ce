//! Artifact Service
//!
//! Job artifact archives, dotenv reports and the shared build cache.
//! Archive inspection and decompression run with the store lock released.

use glhub_core::JobId;
use glhub_core::dto::job::ArtifactUploaded;
use indexmap::IndexMap;

use super::dotenv::{self, DotenvError};
use super::payload::ARTIFACTS_FILENAME;
use crate::store::Store;

/// Service error type
#[derive(Debug)]
pub enum ArtifactError {
    JobNotFound(JobId),
    Forbidden,
    NotFound(JobId),
    InvalidReport(DotenvError),
    InvalidCacheKey,
    CacheMiss(String),
}

/// What an upload carries, from the `artifact_type`/`artifact_format` query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Archive,
    DotenvReport { gzip: bool },
}

impl ArtifactKind {
    pub fn from_query(artifact_type: Option<&str>, artifact_format: Option<&str>) -> Self {
        match artifact_type {
            Some("dotenv") => ArtifactKind::DotenvReport {
                gzip: artifact_format == Some("gzip"),
            },
            _ => ArtifactKind::Archive,
        }
    }
}

/// Store an upload for a job
///
/// An archive replaces the job's artifact; if the job declares a dotenv
/// report, the report is read out of the archive on a best-effort basis. A
/// separate dotenv upload only updates the job's exported variables.
pub fn upload(
    store: &Store,
    job_id: JobId,
    token: Option<&str>,
    kind: ArtifactKind,
    data: Vec<u8>,
) -> Result<ArtifactUploaded, ArtifactError> {
    let report = {
        let state = store.read();
        let (pipeline, job) = state.job(job_id).ok_or(ArtifactError::JobNotFound(job_id))?;
        if token.is_some_and(|t| t != job.token) {
            return Err(ArtifactError::Forbidden);
        }
        pipeline
            .def
            .jobs
            .get(&job.name)
            .and_then(|def| def.artifacts.as_ref())
            .and_then(|artifacts| artifacts.dotenv.clone())
    };

    let size = data.len() as u64;
    match kind {
        ArtifactKind::Archive => {
            let vars = report.and_then(|name| dotenv_from_archive(job_id, &data, &name));
            let mut state = store.write();
            state.store_artifact(job_id, data);
            if let Some(vars) = vars {
                if let Some(job) = state.job_mut(job_id) {
                    job.dotenv = vars;
                }
            }
            tracing::info!(job_id, size, "Artifact stored");
        }
        ArtifactKind::DotenvReport { gzip } => {
            let raw = dotenv::read_report(data, gzip).map_err(ArtifactError::InvalidReport)?;
            let vars = dotenv::parse_dotenv(&String::from_utf8_lossy(&raw));
            let count = vars.len();
            if let Some(job) = store.write().job_mut(job_id) {
                job.dotenv.extend(vars);
            }
            tracing::info!(job_id, variables = count, "Dotenv report stored");
        }
    }

    Ok(ArtifactUploaded {
        id: job_id,
        size,
        filename: ARTIFACTS_FILENAME.to_string(),
    })
}

fn dotenv_from_archive(job_id: JobId, archive: &[u8], name: &str) -> Option<IndexMap<String, String>> {
    match dotenv::extract_from_zip(archive, name) {
        Ok(Some(content)) => Some(dotenv::parse_dotenv(&content)),
        Ok(None) => {
            tracing::debug!(job_id, report = name, "Dotenv report not in archive");
            None
        }
        Err(err) => {
            tracing::warn!(job_id, report = name, error = %err, "Failed to read dotenv report");
            None
        }
    }
}

/// Stored archive of a job
pub fn download(store: &Store, job_id: JobId) -> Result<Vec<u8>, ArtifactError> {
    store
        .read()
        .artifact(job_id)
        .map(<[u8]>::to_vec)
        .ok_or(ArtifactError::NotFound(job_id))
}

// =============================================================================
// Cache
// =============================================================================

pub fn put_cache(store: &Store, key: &str, data: Vec<u8>) -> Result<(), ArtifactError> {
    if key.is_empty() {
        return Err(ArtifactError::InvalidCacheKey);
    }
    let size = data.len();
    store.write().set_cache(key.to_string(), data);
    tracing::debug!(key, size, "Cache stored");
    Ok(())
}

pub fn get_cache(store: &Store, key: &str) -> Result<Vec<u8>, ArtifactError> {
    store
        .read()
        .cache(key)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| ArtifactError::CacheMiss(key.to_string()))
}

pub fn has_cache(store: &Store, key: &str) -> bool {
    store.read().cache(key).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{SubmitOptions, submit_pipeline};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};
    use std::sync::Arc;
    use zip::write::SimpleFileOptions;

    fn setup() -> (Store, JobId, String) {
        let store = Store::new();
        let job = {
            let mut state = store.write();
            let def = glhub_pipeline::parse_pipeline(
                "build:\n  script: [make]\n  artifacts:\n    reports:\n      dotenv: build.env\n",
                None,
            )
            .unwrap();
            let project_id = state.create_project("").id;
            let (id, _) = submit_pipeline(
                &mut state,
                project_id,
                Arc::new(def),
                SubmitOptions {
                    server_url: "localhost".into(),
                    image: None,
                },
            )
            .unwrap();
            state.pipeline(id).unwrap().jobs["build"].clone()
        };
        (store, job.id, job.token)
    }

    fn zip_with(name: &str, content: &[u8]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_archive_upload_extracts_dotenv() {
        let (store, job_id, token) = setup();
        let archive = zip_with("build.env", b"VERSION=1.2.3\n");
        let size = archive.len() as u64;

        let uploaded = upload(&store, job_id, Some(&token), ArtifactKind::Archive, archive).unwrap();
        assert_eq!(uploaded.size, size);
        assert_eq!(uploaded.filename, "artifacts.zip");

        let state = store.read();
        assert_eq!(state.job(job_id).unwrap().1.dotenv["VERSION"], "1.2.3");
        assert_eq!(state.artifact(job_id).unwrap().len() as u64, size);
    }

    #[test]
    fn test_malformed_archive_is_still_stored() {
        let (store, job_id, _) = setup();
        upload(&store, job_id, None, ArtifactKind::Archive, b"not a zip".to_vec()).unwrap();

        assert_eq!(download(&store, job_id).unwrap(), b"not a zip");
        assert!(store.read().job(job_id).unwrap().1.dotenv.is_empty());
    }

    #[test]
    fn test_gzip_dotenv_report_keeps_archive() {
        let (store, job_id, _) = setup();
        upload(&store, job_id, None, ArtifactKind::Archive, b"archive".to_vec()).unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"IMAGE=app:2\n").unwrap();
        let report = encoder.finish().unwrap();
        let kind = ArtifactKind::from_query(Some("dotenv"), Some("gzip"));
        upload(&store, job_id, None, kind, report).unwrap();

        assert_eq!(download(&store, job_id).unwrap(), b"archive");
        assert_eq!(store.read().job(job_id).unwrap().1.dotenv["IMAGE"], "app:2");

        assert!(matches!(
            upload(&store, job_id, None, kind, b"plain".to_vec()),
            Err(ArtifactError::InvalidReport(_))
        ));
    }

    #[test]
    fn test_upload_errors() {
        let (store, job_id, _) = setup();
        assert!(matches!(
            upload(&store, job_id, Some("bad"), ArtifactKind::Archive, Vec::new()),
            Err(ArtifactError::Forbidden)
        ));
        assert!(matches!(
            upload(&store, 77, None, ArtifactKind::Archive, Vec::new()),
            Err(ArtifactError::JobNotFound(77))
        ));
        assert!(matches!(download(&store, job_id), Err(ArtifactError::NotFound(_))));
    }

    #[test]
    fn test_kind_from_query() {
        assert_eq!(ArtifactKind::from_query(None, None), ArtifactKind::Archive);
        assert_eq!(
            ArtifactKind::from_query(Some("archive"), Some("zip")),
            ArtifactKind::Archive
        );
        assert_eq!(
            ArtifactKind::from_query(Some("dotenv"), None),
            ArtifactKind::DotenvReport { gzip: false }
        );
    }

    #[test]
    fn test_cache_roundtrip() {
        let store = Store::new();
        assert!(!has_cache(&store, "deps"));
        assert!(matches!(get_cache(&store, "deps"), Err(ArtifactError::CacheMiss(_))));
        assert!(matches!(put_cache(&store, "", vec![1]), Err(ArtifactError::InvalidCacheKey)));

        put_cache(&store, "deps", vec![1, 2, 3]).unwrap();
        assert!(has_cache(&store, "deps"));
        assert_eq!(get_cache(&store, "deps").unwrap(), vec![1, 2, 3]);
    }
}
