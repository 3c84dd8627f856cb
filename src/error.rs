//! Error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    /// Request-level schema violation. Carries the names of every missing or
    /// malformed required field.
    #[error("Missing required field(s): {}", .0.join(", "))]
    Validation(Vec<String>),

    /// Model or scaler blob unavailable or corrupt. Transient from the
    /// caller's point of view; retried with backoff upstream, never here.
    #[error("Model artifact unavailable: {0}")]
    ArtifactLoad(String),

    /// Per-item scoring failure. Absorbed into batch results; only surfaces
    /// as a request error on single-item paths.
    #[error("Scoring failed: {0}")]
    Scoring(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::ArtifactLoad(msg) => {
                tracing::error!("Artifact load failure: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Model artifact unavailable".to_string())
            }
            AppError::Scoring(msg) => {
                tracing::error!("Scoring error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::Store(msg) => {
                tracing::error!("Store error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Store error occurred".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Store(err.to_string())
    }
}
