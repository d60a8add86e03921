use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

/// Process-wide configuration, read once at startup.
///
/// Every field has a default suitable for the docker-compose deployment; the
/// corresponding env var overrides it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection URL.
    pub database_url: String,
    /// Redis connection URL.
    pub redis_url: String,
    /// Port the HTTP adapter binds to.
    pub http_port: u16,
    /// Name of the submission queue.
    pub job_queue: String,
    /// Name of the build/cleanup queue.
    pub build_queue: String,
    /// Total upload cap per submission, in bytes.
    pub max_upload_size: u64,
    /// Maximum number of uploaded files per submission.
    pub max_files_per_submission: usize,
    /// Whitelisted upload extensions, lowercased, with the leading dot.
    pub allowed_extensions: HashSet<String>,
    /// Host directory holding per-job staging directories.
    pub jobs_dir: PathBuf,
    /// Path at which a job directory is bind-mounted inside the sandbox.
    pub container_mount_path: String,
    /// Binary used to drive the container runtime.
    pub container_runtime_bin: String,
    /// Wall-clock ceiling for image builds, in seconds.
    pub build_timeout_secs: u64,
    /// Worker sleep when both queues were empty, in milliseconds.
    pub worker_poll_interval_ms: u64,
    /// Age before a `pending` compiler is considered orphaned at worker start.
    pub reconcile_grace_secs: u64,
    /// Retention window before a finished job's staging directory is swept.
    pub jobs_dir_retention_secs: u64,
    /// Store pool sizing.
    pub db_min_connections: u32,
    pub db_max_connections: u32,
}

pub const DEFAULT_JOB_QUEUE: &str = "job_queue";
pub const DEFAULT_BUILD_QUEUE: &str = "build_queue";
pub const DEFAULT_JOBS_DIR: &str = "/tmp/executor_jobs";
pub const DEFAULT_MOUNT_PATH: &str = "/data";
pub const MAX_UPLOAD_SIZE: u64 = 25 * 1024 * 1024;
pub const MAX_FILES_PER_SUBMISSION: usize = 10;
pub const BUILD_TIMEOUT_SECS: u64 = 600;
pub const WORKER_POLL_INTERVAL_MS: u64 = 500;

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".txt",
    ".json",
    ".csv",
    ".xml",
    ".yaml",
    ".yml",
    ".md",
    ".dat",
    ".log",
    ".tsv",
    ".ini",
    ".conf",
    ".properties",
    ".sql",
    ".html",
    ".css",
    ".js",
];

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgresql://admin:admin@db/yantra_db".to_string(),
            redis_url: "redis://queue:6379".to_string(),
            http_port: 8000,
            job_queue: DEFAULT_JOB_QUEUE.to_string(),
            build_queue: DEFAULT_BUILD_QUEUE.to_string(),
            max_upload_size: MAX_UPLOAD_SIZE,
            max_files_per_submission: MAX_FILES_PER_SUBMISSION,
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            jobs_dir: PathBuf::from(DEFAULT_JOBS_DIR),
            container_mount_path: DEFAULT_MOUNT_PATH.to_string(),
            container_runtime_bin: "docker".to_string(),
            build_timeout_secs: BUILD_TIMEOUT_SECS,
            worker_poll_interval_ms: WORKER_POLL_INTERVAL_MS,
            reconcile_grace_secs: 60,
            jobs_dir_retention_secs: 3600,
            db_min_connections: 10,
            db_max_connections: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// the defaults above for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            http_port: parse_var("HTTP_PORT", defaults.http_port),
            job_queue: env::var("JOB_QUEUE").unwrap_or(defaults.job_queue),
            build_queue: env::var("BUILD_QUEUE").unwrap_or(defaults.build_queue),
            max_upload_size: parse_var("MAX_UPLOAD_SIZE", defaults.max_upload_size),
            max_files_per_submission: parse_var(
                "MAX_FILES_PER_SUBMISSION",
                defaults.max_files_per_submission,
            ),
            allowed_extensions: defaults.allowed_extensions,
            jobs_dir: env::var("EXECUTOR_JOBS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.jobs_dir),
            container_mount_path: env::var("CONTAINER_MOUNT_PATH")
                .unwrap_or(defaults.container_mount_path),
            container_runtime_bin: env::var("CONTAINER_RUNTIME_BIN")
                .unwrap_or(defaults.container_runtime_bin),
            build_timeout_secs: parse_var("BUILD_TIMEOUT_SECS", defaults.build_timeout_secs),
            worker_poll_interval_ms: parse_var(
                "WORKER_POLL_INTERVAL_MS",
                defaults.worker_poll_interval_ms,
            ),
            reconcile_grace_secs: parse_var("RECONCILE_GRACE_SECS", defaults.reconcile_grace_secs),
            jobs_dir_retention_secs: parse_var(
                "JOBS_DIR_RETENTION_SECS",
                defaults.jobs_dir_retention_secs,
            ),
            db_min_connections: parse_var("DB_MIN_CONNECTIONS", defaults.db_min_connections),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", defaults.db_max_connections),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_deployment_values() {
        let config = Config::default();
        assert_eq!(config.max_upload_size, 25 * 1024 * 1024);
        assert_eq!(config.max_files_per_submission, 10);
        assert_eq!(config.build_timeout_secs, 600);
        assert_eq!(config.worker_poll_interval_ms, 500);
        assert_eq!(config.jobs_dir, PathBuf::from("/tmp/executor_jobs"));
        assert_eq!(config.container_mount_path, "/data");
        assert!(config.allowed_extensions.contains(".txt"));
        assert!(config.allowed_extensions.contains(".sql"));
        assert!(!config.allowed_extensions.contains(".exe"));
        assert_eq!(config.allowed_extensions.len(), 17);
    }
}
