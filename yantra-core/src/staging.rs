use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::{ErrContext, Error, Result};

/// An uploaded file as handed over by the HTTP adapter: fully buffered
/// content plus the client-declared name and MIME type. Neither declared
/// value is trusted.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// What gets recorded on the submission row per staged file. The name is the
/// post-sanitization one; the MIME type is stored as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub size: u64,
    pub mime_type: Option<String>,
}

/// Validates, sanitizes and stores uploaded files under a per-job directory.
///
/// Staging is atomic: any rejection or I/O failure removes the whole job
/// directory before the error propagates.
#[derive(Debug, Clone)]
pub struct FileStager {
    jobs_dir: PathBuf,
    max_files: usize,
    max_total_size: u64,
    allowed_extensions: HashSet<String>,
}

impl FileStager {
    pub fn new(config: &Config) -> Self {
        Self {
            jobs_dir: config.jobs_dir.clone(),
            max_files: config.max_files_per_submission,
            max_total_size: config.max_upload_size,
            allowed_extensions: config.allowed_extensions.clone(),
        }
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }

    /// Stages `files` under `{jobs_dir}/{job_id}/` and returns the absolute
    /// directory path together with the metadata records, in upload order.
    pub async fn stage(
        &self,
        job_id: &str,
        files: &[UploadedFile],
    ) -> Result<(PathBuf, Vec<FileMetadata>)> {
        if files.len() > self.max_files {
            return Err(Error::TooManyFiles {
                max: self.max_files,
            });
        }

        let job_dir = self.jobs_dir.join(job_id);
        tokio::fs::create_dir_all(&job_dir)
            .await
            .context("failed to create job directory")?;
        // The sandbox user must be able to traverse and read the mount.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = tokio::fs::set_permissions(&job_dir, std::fs::Permissions::from_mode(0o755))
                .await;
        }

        match self.stage_into(&job_dir, files).await {
            Ok(metadata) => Ok((job_dir, metadata)),
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&job_dir).await {
                    warn!(dir = %job_dir.display(), error = %cleanup, "failed to clean up job directory");
                }
                Err(e)
            }
        }
    }

    async fn stage_into(&self, job_dir: &Path, files: &[UploadedFile]) -> Result<Vec<FileMetadata>> {
        let mut metadata = Vec::with_capacity(files.len());
        let mut total_size: u64 = 0;

        for file in files {
            let size = file.bytes.len() as u64;
            if size == 0 {
                return Err(Error::EmptyFile(file.filename.clone()));
            }

            total_size += size;
            if total_size > self.max_total_size {
                return Err(Error::SizeLimitExceeded {
                    max_mib: self.max_total_size / (1024 * 1024),
                });
            }

            // Extension and sanitization checks are complementary: the
            // whitelist restricts format, the character filter kills
            // traversal. Both run against every file.
            if !self.extension_allowed(&file.filename) {
                return Err(Error::ExtensionNotAllowed(file.filename.clone()));
            }

            let safe_name = sanitize_filename(&file.filename);
            let path = job_dir.join(&safe_name);
            debug!(file = %safe_name, size, "staging file");
            tokio::fs::write(&path, &file.bytes)
                .await
                .context("failed to write staged file")?;

            metadata.push(FileMetadata {
                filename: safe_name,
                size,
                mime_type: file.content_type.clone(),
            });
        }

        Ok(metadata)
    }

    /// The final suffix of the *original* name, lowercased, must be in the
    /// whitelist. A name without a suffix never passes.
    fn extension_allowed(&self, filename: &str) -> bool {
        match Path::new(filename).extension() {
            Some(ext) => {
                let dotted = format!(".{}", ext.to_string_lossy().to_lowercase());
                self.allowed_extensions.contains(&dotted)
            }
            None => false,
        }
    }
}

/// Keeps only `[A-Za-z0-9._-]`, replacing everything else (path separators
/// included) with `_`. An empty or `.` result falls back to a generated name
/// so the file still lands in the job directory.
pub fn sanitize_filename(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized == "." {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("file_{}", &suffix[..8])
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempdir::TempDir;

    fn stager_in(dir: &Path, max_files: usize, max_total: u64) -> FileStager {
        let mut config = Config::default();
        config.jobs_dir = dir.to_path_buf();
        config.max_files_per_submission = max_files;
        config.max_upload_size = max_total;
        FileStager::new(&config)
    }

    fn upload(name: &str, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            content_type: Some("text/plain".to_string()),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn sanitization_replaces_path_separators() {
        assert_eq!(sanitize_filename("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_filename("data file.txt"), "data_file.txt");
        assert_eq!(sanitize_filename("ok-name_1.csv"), "ok-name_1.csv");
        assert_eq!(sanitize_filename("über.txt"), "_ber.txt");
    }

    #[test]
    fn sanitization_falls_back_on_degenerate_names() {
        assert!(sanitize_filename("").starts_with("file_"));
        assert!(sanitize_filename(".").starts_with("file_"));
        assert_eq!(sanitize_filename("").len(), "file_".len() + 8);
    }

    #[tokio::test]
    async fn stages_files_and_reports_metadata() {
        let tmp = TempDir::new("staging").unwrap();
        let stager = stager_in(tmp.path(), 10, 1024);
        let files = vec![upload("input.txt", b"hi"), upload("more.csv", b"a,b\n")];

        let (dir, metadata) = stager.stage("job-1", &files).await.unwrap();

        assert_eq!(dir, tmp.path().join("job-1"));
        assert_eq!(
            metadata,
            vec![
                FileMetadata {
                    filename: "input.txt".into(),
                    size: 2,
                    mime_type: Some("text/plain".into()),
                },
                FileMetadata {
                    filename: "more.csv".into(),
                    size: 4,
                    mime_type: Some("text/plain".into()),
                },
            ]
        );
        assert_eq!(std::fs::read(dir.join("input.txt")).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn rejects_too_many_files() {
        let tmp = TempDir::new("staging").unwrap();
        let stager = stager_in(tmp.path(), 2, 1024);
        let files = vec![
            upload("a.txt", b"x"),
            upload("b.txt", b"x"),
            upload("c.txt", b"x"),
        ];

        let err = stager.stage("job-2", &files).await.unwrap_err();
        assert!(matches!(err, Error::TooManyFiles { max: 2 }));
        assert!(!tmp.path().join("job-2").exists());
    }

    #[tokio::test]
    async fn rejects_empty_file_and_removes_directory() {
        let tmp = TempDir::new("staging").unwrap();
        let stager = stager_in(tmp.path(), 10, 1024);
        let files = vec![upload("good.txt", b"x"), upload("empty.txt", b"")];

        let err = stager.stage("job-3", &files).await.unwrap_err();
        assert!(matches!(err, Error::EmptyFile(name) if name == "empty.txt"));
        // atomic: the already-written file is gone with the directory
        assert!(!tmp.path().join("job-3").exists());
    }

    #[tokio::test]
    async fn rejects_when_running_total_exceeds_cap() {
        let tmp = TempDir::new("staging").unwrap();
        let stager = stager_in(tmp.path(), 10, 8);
        // 5 + 4 = 9 > 8: the second file tips the total over by one byte
        let files = vec![upload("a.txt", b"aaaaa"), upload("b.txt", b"bbbb")];

        let err = stager.stage("job-4", &files).await.unwrap_err();
        assert!(matches!(err, Error::SizeLimitExceeded { .. }));
        assert!(!tmp.path().join("job-4").exists());
    }

    #[tokio::test]
    async fn accepts_total_exactly_at_cap() {
        let tmp = TempDir::new("staging").unwrap();
        let stager = stager_in(tmp.path(), 10, 8);
        let files = vec![upload("a.txt", b"aaaa"), upload("b.txt", b"bbbb")];

        assert!(stager.stage("job-5", &files).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_disallowed_extensions() {
        let tmp = TempDir::new("staging").unwrap();
        let stager = stager_in(tmp.path(), 10, 1024);

        for name in ["run.exe", "lib.so", "noext", "../etc/passwd"] {
            let err = stager.stage("job-6", &[upload(name, b"x")]).await.unwrap_err();
            assert!(
                matches!(&err, Error::ExtensionNotAllowed(n) if n == name),
                "expected rejection for {name}"
            );
        }
        assert!(!tmp.path().join("job-6").exists());
    }

    #[tokio::test]
    async fn extension_check_is_case_insensitive() {
        let tmp = TempDir::new("staging").unwrap();
        let stager = stager_in(tmp.path(), 10, 1024);

        let (_, metadata) = stager
            .stage("job-7", &[upload("README.MD", b"# hello")])
            .await
            .unwrap();
        assert_eq!(metadata[0].filename, "README.MD");
    }
}
