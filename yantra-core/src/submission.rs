use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::broker::{Broker, JobPayload};
use crate::staging::{FileMetadata, FileStager, UploadedFile};
use crate::store::models::{BuildStatus, JobStatus, Submission};
use crate::store::Store;
use crate::{Error, Result};

/// Accepts user code jobs and reads back their results.
#[derive(Clone)]
pub struct SubmissionService {
    store: Store,
    broker: Broker,
    stager: FileStager,
}

/// What `get_results` hands to the HTTP adapter.
#[derive(Debug)]
pub struct SubmissionResults {
    pub status: String,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub uploaded_files: Option<Vec<FileMetadata>>,
}

impl SubmissionService {
    pub fn new(store: Store, broker: Broker, stager: FileStager) -> Self {
        Self {
            store,
            broker,
            stager,
        }
    }

    /// Validates the target language, stages any uploaded files, persists the
    /// submission and enqueues the job. The row is committed before the queue
    /// push, so a worker observing the payload always finds the row.
    pub async fn submit(
        &self,
        code: String,
        language: String,
        files: Vec<UploadedFile>,
    ) -> Result<String> {
        let mut session = self.store.session().await?;
        let compiler = session
            .get_compiler(&language)
            .await?
            .ok_or_else(|| Error::LanguageNotFound(language.clone()))?;
        session.commit().await?;

        if !compiler.enabled {
            return Err(Error::LanguageDisabled(language));
        }
        if compiler.build_status() != Some(BuildStatus::Ready) {
            return Err(Error::LanguageNotReady {
                language,
                status: compiler.build_status.clone(),
            });
        }

        let job_id = Uuid::new_v4();

        let (files_directory, uploaded_files) = if files.is_empty() {
            (None, None)
        } else {
            let (dir, metadata) = self.stager.stage(&job_id.to_string(), &files).await?;
            (
                Some(dir.to_string_lossy().into_owned()),
                Some(serde_json::to_string(&metadata)?),
            )
        };

        let submission = Submission {
            job_id,
            code: code.clone(),
            language: language.clone(),
            status: JobStatus::Pending.as_str().to_string(),
            output_stdout: None,
            output_stderr: None,
            uploaded_files,
            files_directory,
            created_at: Utc::now(),
            completed_at: None,
        };

        let mut session = self.store.session().await?;
        session.insert_submission(&submission).await?;
        session.commit().await?;

        self.broker
            .push_job(&JobPayload {
                job_id: job_id.to_string(),
                code,
                language,
            })
            .await?;

        info!(job_id = %job_id, language = %submission.language, "job submitted");
        Ok(job_id.to_string())
    }

    /// Read-only result lookup. An unknown or malformed id yields `None`,
    /// which the adapter reports as `{"status": "NOT_FOUND"}`.
    pub async fn get_results(&self, job_id: &str) -> Result<Option<SubmissionResults>> {
        let Ok(job_id) = Uuid::parse_str(job_id) else {
            return Ok(None);
        };

        let mut session = self.store.session().await?;
        let submission = session.get_submission(job_id).await?;
        session.commit().await?;

        let Some(submission) = submission else {
            return Ok(None);
        };

        let uploaded_files = submission
            .uploaded_files
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        Ok(Some(SubmissionResults {
            status: submission.status,
            stdout: submission.output_stdout,
            stderr: submission.output_stderr,
            completed_at: submission.completed_at,
            uploaded_files,
        }))
    }
}
