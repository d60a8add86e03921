use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, BuildPayload, JobPayload};
use crate::config::Config;
use crate::sandbox::{ExecLimits, SandboxExecutor};
use crate::store::models::JobStatus;
use crate::store::Store;
use crate::{ErrContext, Error, Result};

/// How much of a failed build log is copied into `build_error`.
const BUILD_ERROR_TAIL_LINES: usize = 20;

/// How often the staging-directory sweeper runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Single-threaded queue drainer. One iteration pops at most one job and one
/// build; when both queues were empty it sleeps for the poll interval.
/// Handler failures are absorbed: the affected row is moved to a terminal
/// failure state and the loop keeps going. Scale-out is horizontal, by
/// running more worker processes.
pub struct Worker {
    store: Store,
    broker: Broker,
    executor: SandboxExecutor,
    config: Config,
    last_sweep: Instant,
}

impl Worker {
    pub fn new(store: Store, broker: Broker, executor: SandboxExecutor, config: Config) -> Self {
        Self {
            store,
            broker,
            executor,
            config,
            last_sweep: Instant::now(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("worker started, waiting for jobs");
        if let Err(e) = self.reconcile().await {
            error!(error = %e, "startup reconciliation failed");
        }

        loop {
            let processed_job = match self.broker.pop_job().await? {
                Some(payload) => {
                    self.dispatch_job(payload).await;
                    true
                }
                None => false,
            };

            let processed_build = match self.broker.pop_build().await? {
                Some(payload) => {
                    self.dispatch_build(payload).await;
                    true
                }
                None => false,
            };

            self.maybe_sweep().await;

            if !processed_job && !processed_build {
                time::sleep(Duration::from_millis(self.config.worker_poll_interval_ms)).await;
            }
        }
    }

    async fn dispatch_job(&self, payload: JobPayload) {
        let job_id = payload.job_id.clone();
        info!(job_id = %job_id, language = %payload.language, "running job");
        if let Err(e) = self.run_submission(payload).await {
            error!(job_id = %job_id, error = %e, "job handler failed");
            // Best effort: make sure the row does not stay RUNNING forever.
            if let Ok(id) = Uuid::parse_str(&job_id) {
                if let Err(e) = self
                    .finish(id, JobStatus::Error, None, Some(&e.to_string()))
                    .await
                {
                    error!(job_id = %job_id, error = %e, "failed to record job failure");
                }
            }
        }
    }

    async fn dispatch_build(&self, payload: BuildPayload) {
        if let Err(e) = self.handle_build(&payload).await {
            match &payload {
                BuildPayload::Build { compiler_id } => {
                    error!(compiler = %compiler_id, error = %e, "build handler failed");
                    if let Err(e) = self.record_build_failure(compiler_id, &e.to_string()).await {
                        error!(compiler = %compiler_id, error = %e, "failed to record build failure");
                    }
                }
                BuildPayload::Cleanup { compiler_id, .. } => {
                    warn!(compiler = %compiler_id, error = %e, "cleanup failed, ignoring");
                }
            }
        }
    }

    /// Executes one submission inside the sandbox and records the outcome.
    async fn run_submission(&self, payload: JobPayload) -> Result<()> {
        let job_id = Uuid::parse_str(&payload.job_id).context("malformed job id in payload")?;

        let mut session = self.store.session().await?;
        let found = session.mark_submission_running(job_id).await?;
        let submission = session.get_submission(job_id).await?;
        session.commit().await?;

        if !found {
            // Rows are committed before the push, so this only happens for
            // foreign payloads; nothing to update either way.
            warn!(job_id = %job_id, "no submission row for queued job, dropping");
            return Ok(());
        }

        let mut session = self.store.session().await?;
        let compiler = session.get_compiler(&payload.language).await?;
        session.commit().await?;

        let compiler = match compiler {
            Some(compiler) if compiler.is_ready() => compiler,
            _ => {
                let message = format!(
                    "Compiler for language '{}' is not available or not ready",
                    payload.language
                );
                return self
                    .finish(job_id, JobStatus::Error, None, Some(&message))
                    .await;
            }
        };

        let argv = compiler.run_command()?;
        let limits = ExecLimits {
            memory: compiler.memory_limit.clone(),
            cpus: compiler.cpu_limit.clone(),
            timeout_seconds: compiler.timeout_seconds.max(1) as u64,
        };
        let files_dir = submission
            .as_ref()
            .and_then(|s| s.files_directory.as_deref())
            .map(Path::new);

        match self
            .executor
            .run_sandboxed(
                &compiler.image_tag,
                &argv,
                payload.code.as_bytes(),
                files_dir,
                &limits,
            )
            .await
        {
            Ok(output) => {
                debug!(job_id = %job_id, exit_code = ?output.exit_code, "job finished");
                self.finish(
                    job_id,
                    JobStatus::Completed,
                    Some(&output.stdout),
                    Some(&output.stderr),
                )
                .await
            }
            Err(Error::ExecTimeout { seconds }) => {
                let message = format!("Execution timed out after {seconds} seconds.");
                self.finish(job_id, JobStatus::Timeout, None, Some(&message))
                    .await
            }
            Err(e) => {
                self.finish(job_id, JobStatus::Error, None, Some(&e.to_string()))
                    .await
            }
        }
    }

    /// Builds or removes a compiler image, advancing the build state machine.
    async fn handle_build(&self, payload: &BuildPayload) -> Result<()> {
        match payload {
            BuildPayload::Build { compiler_id } => self.build_compiler(compiler_id).await,
            BuildPayload::Cleanup { image_tag, .. } => {
                self.executor.remove_image(image_tag).await;
                Ok(())
            }
        }
    }

    async fn build_compiler(&self, compiler_id: &str) -> Result<()> {
        let mut session = self.store.session().await?;
        let compiler = session.get_compiler(compiler_id).await?;
        session.commit().await?;

        let Some(compiler) = compiler else {
            warn!(compiler = %compiler_id, "compiler disappeared before build, dropping");
            return Ok(());
        };

        info!(compiler = %compiler_id, image = %compiler.image_tag, "building image");
        let mut session = self.store.session().await?;
        session.mark_build_started(compiler_id).await?;
        session.commit().await?;

        match self
            .executor
            .build_image(&compiler.dockerfile_content, &compiler.image_tag)
            .await
        {
            Ok(output) if output.success => {
                let mut session = self.store.session().await?;
                session.mark_build_succeeded(compiler_id, &output.log).await?;
                session.commit().await?;
                info!(compiler = %compiler_id, "image ready");
                Ok(())
            }
            Ok(output) => {
                let tail = tail_lines(&output.log, BUILD_ERROR_TAIL_LINES);
                let mut session = self.store.session().await?;
                session
                    .mark_build_failed(compiler_id, &tail, &output.log)
                    .await?;
                session.commit().await?;
                warn!(compiler = %compiler_id, "image build failed");
                Ok(())
            }
            Err(e @ Error::BuildTimeout { .. }) => {
                let message = e.to_string();
                let mut session = self.store.session().await?;
                session
                    .mark_build_failed(compiler_id, &message, &message)
                    .await?;
                session.commit().await?;
                warn!(compiler = %compiler_id, "image build timed out");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn record_build_failure(&self, compiler_id: &str, message: &str) -> Result<()> {
        let mut session = self.store.session().await?;
        session
            .mark_build_failed(compiler_id, message, message)
            .await?;
        session.commit().await
    }

    async fn finish(
        &self,
        job_id: Uuid,
        status: JobStatus,
        stdout: Option<&str>,
        stderr: Option<&str>,
    ) -> Result<()> {
        let mut session = self.store.session().await?;
        session
            .finish_submission(job_id, status, stdout, stderr)
            .await?;
        session.commit().await?;
        info!(job_id = %job_id, status = %status, "job recorded");
        Ok(())
    }

    /// Repairs state orphaned by crashes: re-enqueues builds for compilers
    /// stuck in `pending`, and finalizes submissions stuck in `RUNNING`
    /// longer than twice their compiler's timeout.
    async fn reconcile(&self) -> Result<()> {
        let grace = self.config.reconcile_grace_secs;

        let mut session = self.store.session().await?;
        let pending = session.pending_compilers_older_than(grace as f64).await?;
        let running = session.running_submissions().await?;
        session.commit().await?;

        for compiler in &pending {
            info!(compiler = %compiler.id, "re-enqueueing orphaned pending build");
            self.broker
                .push_build(&BuildPayload::Build {
                    compiler_id: compiler.id.clone(),
                })
                .await?;
        }

        for submission in running {
            let timeout = self.compiler_timeout(&submission.language).await?;
            let deadline = 2 * timeout.max(1) as i64;
            let age = (Utc::now() - submission.created_at).num_seconds();
            if age > deadline + grace as i64 {
                warn!(job_id = %submission.job_id, age, "finalizing job orphaned in RUNNING");
                self.finish(
                    submission.job_id,
                    JobStatus::Error,
                    None,
                    Some("Worker restarted while the job was running"),
                )
                .await?;
            }
        }

        Ok(())
    }

    async fn compiler_timeout(&self, language: &str) -> Result<i32> {
        let mut session = self.store.session().await?;
        let compiler = session.get_compiler(language).await?;
        session.commit().await?;
        Ok(compiler.map(|c| c.timeout_seconds).unwrap_or(10))
    }

    /// Removes staging directories of long-finished jobs. Runs every few
    /// minutes inside the drain loop; failures are logged and retried on the
    /// next pass.
    async fn maybe_sweep(&mut self) {
        if self.last_sweep.elapsed() < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = Instant::now();

        if let Err(e) = self.sweep_job_dirs().await {
            error!(error = %e, "staging directory sweep failed");
        }
    }

    async fn sweep_job_dirs(&self) -> Result<()> {
        let retention = self.config.jobs_dir_retention_secs as f64;
        let mut session = self.store.session().await?;
        let sweepable = session.sweepable_submissions(retention).await?;
        session.commit().await?;

        for submission in sweepable {
            let Some(dir) = submission.files_directory.as_deref() else {
                continue;
            };
            let path = Path::new(dir);
            // Never remove anything outside the configured staging root.
            if !path.starts_with(&self.config.jobs_dir) {
                warn!(job_id = %submission.job_id, dir, "staging path outside jobs dir, skipping");
                continue;
            }

            match tokio::fs::remove_dir_all(path).await {
                Ok(()) => debug!(job_id = %submission.job_id, dir, "staging directory removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(job_id = %submission.job_id, dir, error = %e, "failed to remove staging directory");
                    continue;
                }
            }

            let mut session = self.store.session().await?;
            session.clear_files_directory(submission.job_id).await?;
            session.commit().await?;
        }

        Ok(())
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tail_keeps_last_lines_only() {
        let log = (1..=30).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&log, 20);
        assert!(tail.starts_with("line 11"));
        assert!(tail.ends_with("line 30"));
        assert_eq!(tail.lines().count(), 20);
    }

    #[test]
    fn tail_of_short_text_is_the_text() {
        assert_eq!(tail_lines("only line", 20), "only line");
        assert_eq!(tail_lines("", 20), "");
    }
}
