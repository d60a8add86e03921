use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use yantra_core::compiler::{CompilerUpdate, NewCompiler};
use yantra_core::store::models::Compiler;

use super::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateCompilerRequest {
    pub id: String,
    pub name: String,
    pub dockerfile_content: String,
    pub run_command: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub memory_limit: Option<String>,
    #[serde(default)]
    pub cpu_limit: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateCompilerRequest {
    pub name: Option<String>,
    pub dockerfile_content: Option<String>,
    pub run_command: Option<Vec<String>>,
    pub version: Option<String>,
    pub memory_limit: Option<String>,
    pub cpu_limit: Option<String>,
    pub timeout_seconds: Option<i32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub enabled_only: bool,
}

#[derive(Debug, Serialize)]
pub struct CompilerResponse {
    pub id: String,
    pub name: String,
    pub dockerfile_content: String,
    pub run_command: Vec<String>,
    pub image_tag: String,
    pub version: Option<String>,
    pub memory_limit: String,
    pub cpu_limit: String,
    pub timeout_seconds: i32,
    pub enabled: bool,
    pub build_status: String,
    pub build_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub built_at: Option<DateTime<Utc>>,
}

impl CompilerResponse {
    fn from_model(compiler: Compiler) -> ApiResult<Self> {
        let run_command = compiler.run_command()?;
        Ok(Self {
            id: compiler.id,
            name: compiler.name,
            dockerfile_content: compiler.dockerfile_content,
            run_command,
            image_tag: compiler.image_tag,
            version: compiler.version,
            memory_limit: compiler.memory_limit,
            cpu_limit: compiler.cpu_limit,
            timeout_seconds: compiler.timeout_seconds,
            enabled: compiler.enabled,
            build_status: compiler.build_status,
            build_error: compiler.build_error,
            created_at: compiler.created_at,
            updated_at: compiler.updated_at,
            built_at: compiler.built_at,
        })
    }
}

/// `POST /compilers`: 201 with the created row; the image build is queued
/// asynchronously.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateCompilerRequest>,
) -> ApiResult<(StatusCode, Json<CompilerResponse>)> {
    let compiler = state
        .compilers
        .create(NewCompiler {
            id: request.id,
            name: request.name,
            dockerfile_content: request.dockerfile_content,
            run_command: request.run_command,
            version: request.version,
            memory_limit: request.memory_limit,
            cpu_limit: request.cpu_limit,
            timeout_seconds: request.timeout_seconds,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(CompilerResponse::from_model(compiler)?)))
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<CompilerResponse>>> {
    let compilers = state.compilers.list(params.enabled_only).await?;
    let responses = compilers
        .into_iter()
        .map(CompilerResponse::from_model)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(responses))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CompilerResponse>> {
    let compiler = state.compilers.get(&id).await?;
    Ok(Json(CompilerResponse::from_model(compiler)?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCompilerRequest>,
) -> ApiResult<Json<CompilerResponse>> {
    let compiler = state
        .compilers
        .update(
            &id,
            CompilerUpdate {
                name: request.name,
                dockerfile_content: request.dockerfile_content,
                run_command: request.run_command,
                version: request.version,
                memory_limit: request.memory_limit,
                cpu_limit: request.cpu_limit,
                timeout_seconds: request.timeout_seconds,
                enabled: request.enabled,
            },
        )
        .await?;

    Ok(Json(CompilerResponse::from_model(compiler)?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.compilers.delete(&id).await?;
    Ok(Json(json!({
        "message": format!("Compiler '{id}' deleted and cleanup queued")
    })))
}

pub async fn trigger_build(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.compilers.trigger_build(&id).await?;
    Ok(Json(json!({
        "message": format!("Build queued for compiler '{id}'")
    })))
}

pub async fn build_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let logs = state.compilers.build_logs(&id).await?;
    Ok(Json(json!({
        "compiler_id": logs.compiler_id,
        "compiler_name": logs.compiler_name,
        "build_status": logs.build_status,
        "build_logs": logs.build_logs.as_deref().unwrap_or("No build logs available"),
        "build_error": logs.build_error,
        "built_at": logs.built_at,
        "updated_at": logs.updated_at,
    })))
}
