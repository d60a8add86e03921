use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use yantra_core::store::models::DockerfileTemplate;
use yantra_core::template::NewTemplate;

use super::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    pub dockerfile_template: String,
    #[serde(default)]
    pub default_run_command: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default = "default_official")]
    pub is_official: bool,
}

fn default_official() -> bool {
    false
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub category: Option<String>,
    pub official_only: bool,
}

#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub dockerfile_template: String,
    pub default_run_command: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub icon: Option<String>,
    pub author: String,
    pub is_official: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TemplateResponse {
    fn from_model(template: DockerfileTemplate) -> ApiResult<Self> {
        let default_run_command = template.default_run_command()?;
        let tags = template.tags()?;
        Ok(Self {
            id: template.id,
            name: template.name,
            description: template.description,
            category: template.category,
            dockerfile_template: template.dockerfile_template,
            default_run_command,
            tags,
            icon: template.icon,
            author: template.author,
            is_official: template.is_official,
            created_at: template.created_at,
            updated_at: template.updated_at,
        })
    }
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateTemplateRequest>,
) -> ApiResult<(StatusCode, Json<TemplateResponse>)> {
    let template = state
        .templates
        .create(NewTemplate {
            id: request.id,
            name: request.name,
            description: request.description,
            category: request.category,
            dockerfile_template: request.dockerfile_template,
            default_run_command: request.default_run_command,
            tags: request.tags,
            icon: request.icon,
            author: request.author,
            is_official: request.is_official,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(TemplateResponse::from_model(template)?)))
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<TemplateResponse>>> {
    let templates = state
        .templates
        .list(params.category.as_deref(), params.official_only)
        .await?;
    let responses = templates
        .into_iter()
        .map(TemplateResponse::from_model)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(responses))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TemplateResponse>> {
    let template = state.templates.get(&id).await?;
    Ok(Json(TemplateResponse::from_model(template)?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.templates.delete(&id).await?;
    Ok(Json(json!({
        "message": format!("Template '{id}' deleted successfully")
    })))
}
