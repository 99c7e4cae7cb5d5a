use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::store::RepoError;

/// Errors surfaced to API callers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A path parameter or referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// An authorization predicate denied the operation.
    #[error("{0}")]
    Forbidden(String),

    /// Invariant violation or malformed field.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid session.
    #[error("{0}")]
    Unauthenticated(String),

    /// Refresh or logout with a revoked, expired or malformed token.
    #[error("{0}")]
    InvalidToken(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("You do not have permission to perform this action".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Validation(_) => "validation_error",
            ApiError::Unauthenticated(_) => "not_authenticated",
            ApiError::InvalidToken(_) => "token_not_valid",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict(msg) => ApiError::Validation(msg),
            RepoError::Other(e) => ApiError::Internal(e),
        }
    }
}

/// Unreadable or mistyped request bodies.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), "json body rejected");
        ApiError::Validation(rejection.body_text())
    }
}

/// A path id that does not parse cannot name an existing record.
impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        debug!(reason = %rejection.body_text(), "path rejected");
        ApiError::NotFound("Not found".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Internal(e) => {
                error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({ "error": self.kind(), "detail": detail }));
        (status, body).into_response()
    }
}
