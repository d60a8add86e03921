mod compilers;
mod submissions;
mod templates;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use yantra_core::compiler::CompilerService;
use yantra_core::submission::SubmissionService;
use yantra_core::template::TemplateService;
use yantra_core::Error;

/// Uploads are capped at 25 MiB total; leave headroom for the code field
/// and multipart framing.
const BODY_LIMIT: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub submissions: SubmissionService,
    pub compilers: CompilerService,
    pub templates: TemplateService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/submit", post(submissions::submit))
        .route("/submit/results/{job_id}", get(submissions::results))
        .route("/compilers", post(compilers::create).get(compilers::list))
        .route(
            "/compilers/{id}",
            get(compilers::get).put(compilers::update).delete(compilers::delete),
        )
        .route("/compilers/{id}/build", post(compilers::trigger_build))
        .route("/compilers/{id}/logs", get(compilers::build_logs))
        .route("/templates", post(templates::create).get(templates::list))
        .route("/templates/{id}", get(templates::get).delete(templates::delete))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "yantra-api"}))
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error responses are always `{"detail": "..."}`, with the status derived
/// from the core taxonomy: validation 400, lookup misses 404, the rest 500.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = if err.is_validation() {
            StatusCode::BAD_REQUEST
        } else if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };

        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"detail": self.detail}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn validation_errors_map_to_400() {
        let err = ApiError::from(Error::LanguageNotFound("python-3.12".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.detail, "Language 'python-3.12' not found");

        let err = ApiError::from(Error::NothingToUpdate);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn lookup_misses_map_to_404() {
        let err = ApiError::from(Error::CompilerNotFound("gcc".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.detail, "Compiler 'gcc' not found");
    }

    #[test]
    fn infrastructure_errors_map_to_500() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "redis down");
        let err = ApiError::from(Error::Io(io));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
