use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{Error, Result};

/// Lifecycle of a compiler's image build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Building,
    Ready,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Building => "building",
            BuildStatus::Ready => "ready",
            BuildStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(BuildStatus::Pending),
            "building" => Ok(BuildStatus::Building),
            "ready" => Ok(BuildStatus::Ready),
            "failed" => Ok(BuildStatus::Failed),
            other => Err(Error::Other(anyhow::anyhow!(
                "unknown build status '{other}'"
            ))),
        }
    }
}

/// Lifecycle of a submission. Monotone: PENDING -> RUNNING -> terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Timeout,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Timeout => "TIMEOUT",
            JobStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Timeout | JobStatus::Error
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiler row: a user-defined language runtime with its build recipe,
/// invocation command and resource caps. Status columns are stored as text,
/// so an unknown value degrades to "not eligible" rather than a decode error.
#[derive(Debug, Clone, FromRow)]
pub struct Compiler {
    pub id: String,
    pub name: String,
    pub dockerfile_content: String,
    /// JSON array of argv tokens.
    pub run_command: String,
    pub image_tag: String,
    pub version: Option<String>,
    pub memory_limit: String,
    pub cpu_limit: String,
    pub timeout_seconds: i32,
    pub enabled: bool,
    pub build_status: String,
    pub build_error: Option<String>,
    pub build_logs: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub built_at: Option<DateTime<Utc>>,
}

impl Compiler {
    pub fn build_status(&self) -> Option<BuildStatus> {
        self.build_status.parse().ok()
    }

    /// A compiler is an eligible submission target only when its image is
    /// built and it has not been disabled by an operator.
    pub fn is_ready(&self) -> bool {
        self.enabled && self.build_status() == Some(BuildStatus::Ready)
    }

    pub fn run_command(&self) -> Result<Vec<String>> {
        Ok(serde_json::from_str(&self.run_command)?)
    }
}

/// A submission row: one scheduled execution of user code.
#[derive(Debug, Clone, FromRow)]
pub struct Submission {
    pub job_id: Uuid,
    pub code: String,
    pub language: String,
    pub status: String,
    pub output_stdout: Option<String>,
    pub output_stderr: Option<String>,
    /// JSON array of `FileMetadata`, when files were uploaded.
    pub uploaded_files: Option<String>,
    pub files_directory: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Submission {
    pub fn status(&self) -> Option<JobStatus> {
        match self.status.as_str() {
            "PENDING" => Some(JobStatus::Pending),
            "RUNNING" => Some(JobStatus::Running),
            "COMPLETED" => Some(JobStatus::Completed),
            "TIMEOUT" => Some(JobStatus::Timeout),
            "ERROR" => Some(JobStatus::Error),
            _ => None,
        }
    }
}

/// A curated, inert runtime definition available for operators to clone.
#[derive(Debug, Clone, FromRow)]
pub struct DockerfileTemplate {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub dockerfile_template: String,
    /// JSON array of argv tokens, when the template suggests one.
    pub default_run_command: Option<String>,
    /// JSON array of tag strings.
    pub tags: Option<String>,
    pub icon: Option<String>,
    pub author: String,
    pub is_official: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DockerfileTemplate {
    pub fn default_run_command(&self) -> Result<Option<Vec<String>>> {
        self.default_run_command
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(Error::from)
    }

    pub fn tags(&self) -> Result<Option<Vec<String>>> {
        self.tags
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compiler(status: &str, enabled: bool) -> Compiler {
        Compiler {
            id: "python-3.12".into(),
            name: "Python 3.12".into(),
            dockerfile_content: "FROM python:3.12-slim".into(),
            run_command: r#"["python", "-"]"#.into(),
            image_tag: crate::image_tag("python-3.12"),
            version: None,
            memory_limit: "512m".into(),
            cpu_limit: "1".into(),
            timeout_seconds: 10,
            enabled,
            build_status: status.into(),
            build_error: None,
            build_logs: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            built_at: None,
        }
    }

    #[test]
    fn readiness_requires_built_and_enabled() {
        assert!(compiler("ready", true).is_ready());
        assert!(!compiler("ready", false).is_ready());
        assert!(!compiler("pending", true).is_ready());
        assert!(!compiler("building", true).is_ready());
        assert!(!compiler("failed", true).is_ready());
        // unknown status text must never make a compiler eligible
        assert!(!compiler("READY", true).is_ready());
    }

    #[test]
    fn run_command_parses_json_argv() {
        let argv = compiler("ready", true).run_command().unwrap();
        assert_eq!(argv, vec!["python".to_string(), "-".to_string()]);
    }

    #[test]
    fn job_status_terminality() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
