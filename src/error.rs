//! Error types for Lendwise server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable machine-readable error codes returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    QuotaExceeded,
    LicenseTaken,
    Expired,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::LicenseTaken => "LICENSE_TAKEN",
            ErrorCode::Expired => "EXPIRED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Quota exceeded: {message}")]
    QuotaExceeded {
        message: String,
        details: serde_json::Value,
    },

    #[error("License taken: {0}")]
    LicenseTaken(String),

    #[error("Expired: {0}")]
    Expired(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized),
            AppError::Authorization(_) | AppError::Forbidden(_) => {
                (StatusCode::FORBIDDEN, ErrorCode::Forbidden)
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            AppError::Validation(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadRequest)
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Conflict),
            AppError::QuotaExceeded { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::QuotaExceeded)
            }
            AppError::LicenseTaken(_) => (StatusCode::CONFLICT, ErrorCode::LicenseTaken),
            AppError::Expired(_) => (StatusCode::GONE, ErrorCode::Expired),
            AppError::Database(_) | AppError::Configuration(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError)
            }
        }
    }

    /// Conditions a user can resolve by choosing differently (another copy, fewer loans)
    pub fn is_user_retryable(&self) -> bool {
        matches!(self, AppError::LicenseTaken(_) | AppError::QuotaExceeded { .. })
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if self.is_user_retryable() {
            tracing::warn!(code = code.as_str(), "{}", self);
        }

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::QuotaExceeded { message, .. } => message.clone(),
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg)
            | AppError::LicenseTaken(msg)
            | AppError::Expired(msg) => msg.clone(),
        };

        let details = match self {
            AppError::QuotaExceeded { details, .. } => Some(details),
            _ => None,
        };

        let body = Json(ErrorResponse {
            code: code.as_str().to_string(),
            error: format!("{:?}", code),
            message,
            details,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
