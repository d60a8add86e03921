use chrono::{DateTime, Utc};
use tracing::info;

use crate::broker::{Broker, BuildPayload};
use crate::store::models::{BuildStatus, Compiler};
use crate::store::Store;
use crate::{image_tag, Error, Result};

/// Request to register a new language runtime.
#[derive(Debug, Clone)]
pub struct NewCompiler {
    pub id: String,
    pub name: String,
    pub dockerfile_content: String,
    pub run_command: Vec<String>,
    pub version: Option<String>,
    pub memory_limit: Option<String>,
    pub cpu_limit: Option<String>,
    pub timeout_seconds: Option<i32>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CompilerUpdate {
    pub name: Option<String>,
    pub dockerfile_content: Option<String>,
    pub run_command: Option<Vec<String>>,
    pub version: Option<String>,
    pub memory_limit: Option<String>,
    pub cpu_limit: Option<String>,
    pub timeout_seconds: Option<i32>,
    pub enabled: Option<bool>,
}

impl CompilerUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.dockerfile_content.is_none()
            && self.run_command.is_none()
            && self.version.is_none()
            && self.memory_limit.is_none()
            && self.cpu_limit.is_none()
            && self.timeout_seconds.is_none()
            && self.enabled.is_none()
    }

    /// Mutating the recipe or the invocation command invalidates the image.
    fn forces_rebuild(&self) -> bool {
        self.dockerfile_content.is_some() || self.run_command.is_some()
    }
}

/// Everything an operator sees when inspecting a build.
#[derive(Debug)]
pub struct BuildLogs {
    pub compiler_id: String,
    pub compiler_name: String,
    pub build_status: String,
    pub build_logs: Option<String>,
    pub build_error: Option<String>,
    pub built_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// CRUD plus rebuild and cleanup on runtime definitions; drives the build
/// state machine by committing row state first, then pushing to the build
/// queue.
#[derive(Clone)]
pub struct CompilerService {
    store: Store,
    broker: Broker,
}

impl CompilerService {
    pub fn new(store: Store, broker: Broker) -> Self {
        Self { store, broker }
    }

    pub async fn create(&self, request: NewCompiler) -> Result<Compiler> {
        let mut session = self.store.session().await?;
        if session.get_compiler(&request.id).await?.is_some() {
            return Err(Error::DuplicateCompiler(request.id));
        }

        let now = Utc::now();
        let compiler = Compiler {
            image_tag: image_tag(&request.id),
            id: request.id,
            name: request.name,
            dockerfile_content: request.dockerfile_content,
            run_command: serde_json::to_string(&request.run_command)?,
            version: request.version,
            memory_limit: request.memory_limit.unwrap_or_else(|| "512m".to_string()),
            cpu_limit: request.cpu_limit.unwrap_or_else(|| "1".to_string()),
            timeout_seconds: request.timeout_seconds.unwrap_or(10),
            enabled: true,
            build_status: BuildStatus::Pending.as_str().to_string(),
            build_error: None,
            build_logs: None,
            created_at: now,
            updated_at: now,
            built_at: None,
        };

        session.insert_compiler(&compiler).await?;
        session.commit().await?;

        self.broker
            .push_build(&BuildPayload::Build {
                compiler_id: compiler.id.clone(),
            })
            .await?;

        info!(compiler = %compiler.id, "compiler created, build queued");
        Ok(compiler)
    }

    pub async fn list(&self, enabled_only: bool) -> Result<Vec<Compiler>> {
        let mut session = self.store.session().await?;
        let compilers = session.list_compilers(enabled_only).await?;
        session.commit().await?;
        Ok(compilers)
    }

    pub async fn get(&self, id: &str) -> Result<Compiler> {
        let mut session = self.store.session().await?;
        let compiler = session
            .get_compiler(id)
            .await?
            .ok_or_else(|| Error::CompilerNotFound(id.to_string()))?;
        session.commit().await?;
        Ok(compiler)
    }

    /// Applies the non-null fields of `update`. A change to the recipe or
    /// run command resets the build state and enqueues exactly one build.
    pub async fn update(&self, id: &str, update: CompilerUpdate) -> Result<Compiler> {
        if update.is_empty() {
            return Err(Error::NothingToUpdate);
        }
        let rebuild = update.forces_rebuild();

        let mut session = self.store.session().await?;
        let mut compiler = session
            .get_compiler(id)
            .await?
            .ok_or_else(|| Error::CompilerNotFound(id.to_string()))?;

        if let Some(name) = update.name {
            compiler.name = name;
        }
        if let Some(dockerfile_content) = update.dockerfile_content {
            compiler.dockerfile_content = dockerfile_content;
        }
        if let Some(run_command) = update.run_command {
            compiler.run_command = serde_json::to_string(&run_command)?;
        }
        if let Some(version) = update.version {
            compiler.version = Some(version);
        }
        if let Some(memory_limit) = update.memory_limit {
            compiler.memory_limit = memory_limit;
        }
        if let Some(cpu_limit) = update.cpu_limit {
            compiler.cpu_limit = cpu_limit;
        }
        if let Some(timeout_seconds) = update.timeout_seconds {
            compiler.timeout_seconds = timeout_seconds;
        }
        if let Some(enabled) = update.enabled {
            compiler.enabled = enabled;
        }

        if rebuild {
            compiler.build_status = BuildStatus::Pending.as_str().to_string();
            compiler.build_error = None;
            compiler.built_at = None;
        }
        compiler.updated_at = Utc::now();

        session.update_compiler(&compiler).await?;
        session.commit().await?;

        if rebuild {
            self.broker
                .push_build(&BuildPayload::Build {
                    compiler_id: compiler.id.clone(),
                })
                .await?;
            info!(compiler = %compiler.id, "compiler updated, rebuild queued");
        }

        Ok(compiler)
    }

    /// Removes the row unconditionally; image cleanup happens asynchronously
    /// and its failure does not resurrect the compiler.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut session = self.store.session().await?;
        let compiler = session
            .get_compiler(id)
            .await?
            .ok_or_else(|| Error::CompilerNotFound(id.to_string()))?;
        session.delete_compiler(id).await?;
        session.commit().await?;

        self.broker
            .push_build(&BuildPayload::Cleanup {
                compiler_id: compiler.id,
                image_tag: compiler.image_tag,
            })
            .await?;

        info!(compiler = %id, "compiler deleted, cleanup queued");
        Ok(())
    }

    /// Re-enqueues a build, e.g. to retry a failed one.
    pub async fn trigger_build(&self, id: &str) -> Result<()> {
        let mut session = self.store.session().await?;
        let mut compiler = session
            .get_compiler(id)
            .await?
            .ok_or_else(|| Error::CompilerNotFound(id.to_string()))?;

        compiler.build_status = BuildStatus::Pending.as_str().to_string();
        compiler.build_error = None;
        compiler.updated_at = Utc::now();
        session.update_compiler(&compiler).await?;
        session.commit().await?;

        self.broker
            .push_build(&BuildPayload::Build {
                compiler_id: id.to_string(),
            })
            .await?;

        info!(compiler = %id, "build queued");
        Ok(())
    }

    pub async fn build_logs(&self, id: &str) -> Result<BuildLogs> {
        let compiler = self.get(id).await?;
        Ok(BuildLogs {
            compiler_id: compiler.id,
            compiler_name: compiler.name,
            build_status: compiler.build_status,
            build_logs: compiler.build_logs,
            build_error: compiler.build_error,
            built_at: compiler.built_at,
            updated_at: compiler.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_with_no_fields_is_empty() {
        assert!(CompilerUpdate::default().is_empty());
        let update = CompilerUpdate {
            name: Some("Python".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn only_recipe_or_run_command_changes_force_a_rebuild() {
        let cosmetic = CompilerUpdate {
            name: Some("Python 3.12".into()),
            version: Some("3.12.1".into()),
            memory_limit: Some("1g".into()),
            enabled: Some(false),
            ..Default::default()
        };
        assert!(!cosmetic.forces_rebuild());

        let recipe = CompilerUpdate {
            dockerfile_content: Some("FROM python:3.12-slim".into()),
            ..Default::default()
        };
        assert!(recipe.forces_rebuild());

        let command = CompilerUpdate {
            run_command: Some(vec!["python".into(), "-".into()]),
            ..Default::default()
        };
        assert!(command.forces_rebuild());
    }
}
