//! Crate-wide error taxonomy, mapped to HTTP status codes and a stable
//! `{"detail": "..."}` JSON body at the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Authentication failure messages, held to a fixed enumerated set so
/// clients can match on them. Mirrors the original service's
/// `AuthError` class verbatim.
pub mod auth_messages {
    pub const MISSING_TOKEN: &str = "Missing authorization token";
    pub const INVALID_FORMAT: &str = "Invalid token format. Use: Bearer YOUR_TOKEN";
    pub const INVALID_API_KEY: &str = "Invalid or inactive API key";
    pub const INVALID_MASTER_TOKEN: &str = "Invalid master token";
    pub const MISSING_MASTER_TOKEN_QUERY: &str = "Missing master token in query parameters";
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(&'static str),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Server overloaded. Please try again later.")]
    QueueSaturated,

    #[error("Insufficient memory for model '{model_size}': {reason}")]
    InsufficientMemory { model_size: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("transcriber error: {0}")]
    Transcriber(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Auth(_) => StatusCode::UNAUTHORIZED,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::QueueSaturated => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::InsufficientMemory { .. } => StatusCode::INSUFFICIENT_STORAGE,
            CoreError::Store(_) | CoreError::Transcriber(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed with internal error");
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec_taxonomy() {
        assert_eq!(
            CoreError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::Auth(auth_messages::MISSING_TOKEN).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CoreError::NotFound("task".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CoreError::Conflict("busy".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CoreError::QueueSaturated.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            CoreError::InsufficientMemory {
                model_size: "large".into(),
                reason: "n/a".into()
            }
            .status_code(),
            StatusCode::INSUFFICIENT_STORAGE
        );
    }
}
