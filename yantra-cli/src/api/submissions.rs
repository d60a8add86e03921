use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde_json::{json, Value};

use yantra_core::staging::UploadedFile;

use super::{ApiError, ApiResult, AppState};

/// `POST /submit`: multipart form with `code`, `language` and up to ten
/// `files` parts. The whole payload is buffered before staging.
pub async fn submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut code = None;
    let mut language = None;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("code") => {
                code = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read field 'code': {e}"))
                })?);
            }
            Some("language") => {
                language = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read field 'language': {e}"))
                })?);
            }
            Some("files") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read file '{filename}': {e}"))
                })?;
                files.push(UploadedFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let code = code.ok_or_else(|| ApiError::bad_request("Field 'code' is required"))?;
    let language = language.ok_or_else(|| ApiError::bad_request("Field 'language' is required"))?;

    let job_id = state.submissions.submit(code, language, files).await?;
    Ok(Json(json!({"message": "Job submitted", "job_id": job_id})))
}

/// `GET /submit/results/{job_id}`: read-only; an unknown id answers with a
/// NOT_FOUND status in the body rather than a 404.
pub async fn results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Value>> {
    match state.submissions.get_results(&job_id).await? {
        Some(results) => Ok(Json(json!({
            "status": results.status,
            "stdout": results.stdout,
            "stderr": results.stderr,
            "completed_at": results.completed_at,
            "uploaded_files": results.uploaded_files,
        }))),
        None => Ok(Json(json!({"status": "NOT_FOUND"}))),
    }
}
