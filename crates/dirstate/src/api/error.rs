//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dirstate_core::ReconcileError;
use dirstate_ldap::DirectoryError;
use kameo::error::SendError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

impl ApiError {
    /// Create an error with the given code
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

/// Wrapper for API errors with status codes
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ApiError,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiError::new(code, message),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::internal(message),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }

    /// Map an actor reply error
    pub fn from_send<M>(error: SendError<M, ReconcileError>) -> Self {
        match error {
            SendError::HandlerError(e) => e.into(),
            _ => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "ACTOR_UNAVAILABLE",
                "directory actor is not running",
            ),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(error: ReconcileError) -> Self {
        let (status, code) = match &error {
            ReconcileError::Configuration(_) => (StatusCode::BAD_REQUEST, "CONFIGURATION_ERROR"),
            ReconcileError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ReconcileError::NotConfigured(_) => (StatusCode::NOT_IMPLEMENTED, "NOT_CONFIGURED"),
            ReconcileError::CreateRace { .. } => (StatusCode::CONFLICT, "CREATE_RACE"),
            ReconcileError::ActorError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ReconcileError::Directory { source, .. } => match source {
                DirectoryError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                DirectoryError::AlreadyExists(_) | DirectoryError::ConstraintViolation(_) => {
                    (StatusCode::CONFLICT, "CONSTRAINT_VIOLATION")
                }
                DirectoryError::ConnectionError(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "CONNECTION_ERROR")
                }
                DirectoryError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
                DirectoryError::Other { .. } => (StatusCode::BAD_GATEWAY, "DIRECTORY_ERROR"),
            },
        };
        Self::new(status, code, error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
