use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::codec::CodecError;
use crate::models::LicenseStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: LicenseStatus,
        to: LicenseStatus,
    },

    #[error("License key already exists: {0}")]
    DuplicateKey(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MalformedInput(_) => "malformed_input",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::DuplicateKey(_) => "duplicate_key",
            AppError::Storage(_) => "storage_failure",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedInput(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::InvalidTransition { .. } | AppError::DuplicateKey(_) => StatusCode::CONFLICT,
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Infrastructure details stay in the logs, not in the response
        let message = match &self {
            AppError::Storage(detail) => {
                tracing::error!(error = %detail, "Storage error");
                "Storage temporarily unavailable, retry later".to_string()
            }
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                code: self.code(),
            }),
        )
            .into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::Storage(format!("connection pool: {}", e))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", e))
    }
}

impl From<CodecError> for AppError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Malformed(msg) => AppError::MalformedInput(msg),
            CodecError::Generation(msg) | CodecError::InvalidSecret(msg) => AppError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}
