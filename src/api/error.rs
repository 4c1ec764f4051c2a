//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::pharmacy::PharmacyError;
use crate::session_manager::AuthError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::CapacityExceeded(_) => StatusCode::INSUFFICIENT_STORAGE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match self {
            ApiError::Unauthorized => ("AUTH_REQUIRED", "Authentication required".to_string()),
            ApiError::InvalidCredentials => {
                ("INVALID_CREDENTIALS", "Invalid username or password".to_string())
            }
            ApiError::NotFound(detail) => ("NOT_FOUND", detail),
            ApiError::CapacityExceeded(detail) => ("CAPACITY_EXCEEDED", detail),
            ApiError::BadRequest(detail) => ("BAD_REQUEST", detail),
            ApiError::Conflict(detail) => ("CONFLICT", detail),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                ("INTERNAL", "An internal error occurred".to_string())
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            DatabaseError::CapacityExceeded { .. } => ApiError::CapacityExceeded(err.to_string()),
            DatabaseError::DuplicateKey { .. } => ApiError::Conflict(err.to_string()),
            DatabaseError::InvalidEnum { .. } | DatabaseError::MalformedInput(_) => {
                ApiError::BadRequest(err.to_string())
            }
            DatabaseError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::Unauthorized => ApiError::Unauthorized,
            AuthError::UserExists(_) => ApiError::Conflict(err.to_string()),
            AuthError::Database(e) => e.into(),
        }
    }
}

impl From<PharmacyError> for ApiError {
    fn from(err: PharmacyError) -> Self {
        match err {
            PharmacyError::MalformedInput(detail) => ApiError::BadRequest(detail),
            PharmacyError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            PharmacyError::Auth(e) => e.into(),
            PharmacyError::Database(e) => e.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::LockPoisoned => ApiError::Internal("lock poisoned".into()),
            CoreError::Auth(e) => e.into(),
            CoreError::Pharmacy(e) => e.into(),
            CoreError::Database(e) => e.into(),
        }
    }
}
