pub mod models;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{ErrContext, Result};
use models::{Compiler, DockerfileTemplate, JobStatus, Submission};

/// Typed persistence over Postgres.
///
/// The pool is cheap to clone; every unit of work goes through a [`Session`],
/// which wraps one transaction. Dropping a session without calling
/// [`Session::commit`] rolls the transaction back and returns the connection
/// to the pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(url: &str, min_connections: u32, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("failed to connect to the database")?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn session(&self) -> Result<Session> {
        Ok(Session {
            tx: self.pool.begin().await?,
        })
    }
}

pub struct Session {
    tx: Transaction<'static, Postgres>,
}

impl Session {
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    // ── compilers ──────────────────────────────────────────────────────

    pub async fn get_compiler(&mut self, id: &str) -> Result<Option<Compiler>> {
        let row = sqlx::query_as::<_, Compiler>("SELECT * FROM compilers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    pub async fn list_compilers(&mut self, enabled_only: bool) -> Result<Vec<Compiler>> {
        let rows = sqlx::query_as::<_, Compiler>(
            "SELECT * FROM compilers WHERE (NOT $1 OR enabled) ORDER BY created_at DESC",
        )
        .bind(enabled_only)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    pub async fn insert_compiler(&mut self, compiler: &Compiler) -> Result<()> {
        sqlx::query(
            "INSERT INTO compilers \
             (id, name, dockerfile_content, run_command, image_tag, version, \
              memory_limit, cpu_limit, timeout_seconds, enabled, build_status, \
              build_error, build_logs, created_at, updated_at, built_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(&compiler.id)
        .bind(&compiler.name)
        .bind(&compiler.dockerfile_content)
        .bind(&compiler.run_command)
        .bind(&compiler.image_tag)
        .bind(&compiler.version)
        .bind(&compiler.memory_limit)
        .bind(&compiler.cpu_limit)
        .bind(compiler.timeout_seconds)
        .bind(compiler.enabled)
        .bind(&compiler.build_status)
        .bind(&compiler.build_error)
        .bind(&compiler.build_logs)
        .bind(compiler.created_at)
        .bind(compiler.updated_at)
        .bind(compiler.built_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Writes back every mutable column of an already-loaded compiler row.
    /// `image_tag` and `created_at` are immutable after creation.
    pub async fn update_compiler(&mut self, compiler: &Compiler) -> Result<()> {
        sqlx::query(
            "UPDATE compilers SET \
             name = $2, dockerfile_content = $3, run_command = $4, version = $5, \
             memory_limit = $6, cpu_limit = $7, timeout_seconds = $8, enabled = $9, \
             build_status = $10, build_error = $11, build_logs = $12, \
             updated_at = now(), built_at = $13 \
             WHERE id = $1",
        )
        .bind(&compiler.id)
        .bind(&compiler.name)
        .bind(&compiler.dockerfile_content)
        .bind(&compiler.run_command)
        .bind(&compiler.version)
        .bind(&compiler.memory_limit)
        .bind(&compiler.cpu_limit)
        .bind(compiler.timeout_seconds)
        .bind(compiler.enabled)
        .bind(&compiler.build_status)
        .bind(&compiler.build_error)
        .bind(&compiler.build_logs)
        .bind(compiler.built_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn delete_compiler(&mut self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM compilers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_build_started(&mut self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE compilers SET build_status = 'building', updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn mark_build_succeeded(&mut self, id: &str, logs: &str) -> Result<()> {
        sqlx::query(
            "UPDATE compilers SET build_status = 'ready', build_error = NULL, \
             build_logs = $2, built_at = now(), updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(logs)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn mark_build_failed(&mut self, id: &str, error: &str, logs: &str) -> Result<()> {
        sqlx::query(
            "UPDATE compilers SET build_status = 'failed', build_error = $2, \
             build_logs = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(logs)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Pending compilers whose last state change is older than `secs`.
    /// Used by worker-start reconciliation to re-enqueue lost builds.
    pub async fn pending_compilers_older_than(&mut self, secs: f64) -> Result<Vec<Compiler>> {
        let rows = sqlx::query_as::<_, Compiler>(
            "SELECT * FROM compilers WHERE build_status = 'pending' \
             AND updated_at < now() - make_interval(secs => $1)",
        )
        .bind(secs)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    // ── submissions ────────────────────────────────────────────────────

    pub async fn get_submission(&mut self, job_id: Uuid) -> Result<Option<Submission>> {
        let row = sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    pub async fn insert_submission(&mut self, submission: &Submission) -> Result<()> {
        sqlx::query(
            "INSERT INTO submissions \
             (job_id, code, language, status, output_stdout, output_stderr, \
              uploaded_files, files_directory, created_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(submission.job_id)
        .bind(&submission.code)
        .bind(&submission.language)
        .bind(&submission.status)
        .bind(&submission.output_stdout)
        .bind(&submission.output_stderr)
        .bind(&submission.uploaded_files)
        .bind(&submission.files_directory)
        .bind(submission.created_at)
        .bind(submission.completed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn mark_submission_running(&mut self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE submissions SET status = 'RUNNING' WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Moves a submission into a terminal state and stamps `completed_at`.
    pub async fn finish_submission(
        &mut self,
        job_id: Uuid,
        status: JobStatus,
        stdout: Option<&str>,
        stderr: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE submissions SET status = $2, output_stdout = $3, \
             output_stderr = $4, completed_at = now() WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(stdout)
        .bind(stderr)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn running_submissions(&mut self) -> Result<Vec<Submission>> {
        let rows =
            sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE status = 'RUNNING'")
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(rows)
    }

    /// Terminal submissions that still own a staging directory and finished
    /// more than `retention_secs` ago.
    pub async fn sweepable_submissions(&mut self, retention_secs: f64) -> Result<Vec<Submission>> {
        let rows = sqlx::query_as::<_, Submission>(
            "SELECT * FROM submissions \
             WHERE status IN ('COMPLETED', 'TIMEOUT', 'ERROR') \
             AND files_directory IS NOT NULL \
             AND completed_at < now() - make_interval(secs => $1)",
        )
        .bind(retention_secs)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    pub async fn clear_files_directory(&mut self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE submissions SET files_directory = NULL WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // ── templates ──────────────────────────────────────────────────────

    pub async fn get_template(&mut self, id: &str) -> Result<Option<DockerfileTemplate>> {
        let row = sqlx::query_as::<_, DockerfileTemplate>(
            "SELECT * FROM dockerfile_templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    pub async fn list_templates(
        &mut self,
        category: Option<&str>,
        official_only: bool,
    ) -> Result<Vec<DockerfileTemplate>> {
        let rows = sqlx::query_as::<_, DockerfileTemplate>(
            "SELECT * FROM dockerfile_templates \
             WHERE ($1::varchar IS NULL OR category = $1) \
             AND (NOT $2 OR is_official) \
             ORDER BY name",
        )
        .bind(category)
        .bind(official_only)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    pub async fn insert_template(&mut self, template: &DockerfileTemplate) -> Result<()> {
        sqlx::query(
            "INSERT INTO dockerfile_templates \
             (id, name, description, category, dockerfile_template, \
              default_run_command, tags, icon, author, is_official, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.category)
        .bind(&template.dockerfile_template)
        .bind(&template.default_run_command)
        .bind(&template.tags)
        .bind(&template.icon)
        .bind(&template.author)
        .bind(template.is_official)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn delete_template(&mut self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM dockerfile_templates WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
