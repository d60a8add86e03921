pub mod catalog;

use chrono::Utc;
use tracing::{error, info};

use crate::store::models::DockerfileTemplate;
use crate::store::Store;
use crate::{Error, Result};

/// Request to store a new Dockerfile template.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub dockerfile_template: String,
    pub default_run_command: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub icon: Option<String>,
    pub author: Option<String>,
    pub is_official: bool,
}

/// Outcome of one catalog seeding pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub added: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
}

/// Template CRUD plus the idempotent catalog seeder.
#[derive(Clone)]
pub struct TemplateService {
    store: Store,
}

impl TemplateService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn create(&self, request: NewTemplate) -> Result<DockerfileTemplate> {
        let mut session = self.store.session().await?;
        if session.get_template(&request.id).await?.is_some() {
            return Err(Error::DuplicateTemplate(request.id));
        }

        let now = Utc::now();
        let template = DockerfileTemplate {
            id: request.id,
            name: request.name,
            description: request.description,
            category: request.category,
            dockerfile_template: request.dockerfile_template,
            default_run_command: request
                .default_run_command
                .map(|argv| serde_json::to_string(&argv))
                .transpose()?,
            tags: request.tags.map(|tags| serde_json::to_string(&tags)).transpose()?,
            icon: request.icon,
            author: request.author.unwrap_or_else(|| catalog::AUTHOR.to_string()),
            is_official: request.is_official,
            created_at: now,
            updated_at: now,
        };

        session.insert_template(&template).await?;
        session.commit().await?;

        info!(template = %template.id, "template created");
        Ok(template)
    }

    pub async fn list(
        &self,
        category: Option<&str>,
        official_only: bool,
    ) -> Result<Vec<DockerfileTemplate>> {
        let mut session = self.store.session().await?;
        let templates = session.list_templates(category, official_only).await?;
        session.commit().await?;
        Ok(templates)
    }

    pub async fn get(&self, id: &str) -> Result<DockerfileTemplate> {
        let mut session = self.store.session().await?;
        let template = session
            .get_template(id)
            .await?
            .ok_or_else(|| Error::TemplateNotFound(id.to_string()))?;
        session.commit().await?;
        Ok(template)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut session = self.store.session().await?;
        if !session.delete_template(id).await? {
            return Err(Error::TemplateNotFound(id.to_string()));
        }
        session.commit().await?;
        info!(template = %id, "template deleted");
        Ok(())
    }

    /// Seeds the curated catalog. Existing rows are left untouched so
    /// operator edits survive restarts; all inserts commit as one batch, and
    /// a failed commit voids the whole pass.
    pub async fn seed(&self) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();
        let mut session = self.store.session().await?;

        for entry in catalog::entries() {
            if session.get_template(entry.id).await?.is_some() {
                summary.skipped.push(entry.id.to_string());
                continue;
            }

            let now = Utc::now();
            let template = DockerfileTemplate {
                id: entry.id.to_string(),
                name: entry.name.to_string(),
                description: Some(entry.description.to_string()),
                category: entry.category.to_string(),
                dockerfile_template: entry.dockerfile_template.to_string(),
                default_run_command: Some(serde_json::to_string(entry.default_run_command)?),
                tags: Some(serde_json::to_string(entry.tags)?),
                icon: Some(entry.icon.to_string()),
                author: catalog::AUTHOR.to_string(),
                is_official: true,
                created_at: now,
                updated_at: now,
            };

            if let Err(e) = session.insert_template(&template).await {
                // The transaction is aborted at this point; dropping the
                // session rolls the whole batch back.
                error!(template = %template.id, error = %e, "failed to seed template");
                summary.errors.push(template.id);
                summary.added.clear();
                return Ok(summary);
            }
            summary.added.push(template.id);
        }

        session.commit().await?;
        info!(
            added = summary.added.len(),
            skipped = summary.skipped.len(),
            errors = summary.errors.len(),
            "template catalog seeded"
        );
        Ok(summary)
    }
}
