//! Error types for the washboard service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Service error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Control plane unavailable: {0}")]
    UpstreamUnavailable(#[from] reqwest::Error),

    #[error("Control plane rejected request ({status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("Stack settings not found: {0}")]
    SettingsNotFound(String),

    #[error("Cannot insert stack settings: {0}")]
    SettingsConflict(String),

    #[error("Operation already in progress: {0}")]
    AlreadyInProgress(String),

    #[error("Settings storage error: {0}")]
    Storage(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Build an `UpstreamRejected` from a status code and message.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        AppError::UpstreamRejected {
            status,
            message: message.into(),
        }
    }

    /// True when the control plane answered 409: the stack is already in the requested state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::UpstreamRejected { status: 409, .. })
    }

    /// Machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::UpstreamRejected { status: 409, .. } => "ALREADY_IN_STATE",
            AppError::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
            AppError::SettingsNotFound(_) => "SETTINGS_NOT_FOUND",
            AppError::SettingsConflict(_) => "SETTINGS_CONFLICT",
            AppError::AlreadyInProgress(_) => "ALREADY_IN_PROGRESS",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::JsonError(_) => "INVALID_JSON",
            AppError::IoError(_) => "IO_ERROR",
            AppError::ConfigError(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::UpstreamUnavailable(_) => {
                (StatusCode::BAD_GATEWAY, "Control plane communication error")
            }
            AppError::UpstreamRejected { status, .. } => {
                let status = match StatusCode::from_u16(*status) {
                    Ok(code) if code.is_client_error() => code,
                    _ => StatusCode::BAD_GATEWAY,
                };
                if status == StatusCode::CONFLICT {
                    (status, "Stack is already in the requested state")
                } else {
                    (status, "Control plane rejected the request")
                }
            }
            AppError::SettingsNotFound(_) => (StatusCode::NOT_FOUND, "No result"),
            AppError::SettingsConflict(_) => (
                StatusCode::NOT_ACCEPTABLE,
                "There was an issue with the insert operation",
            ),
            AppError::AlreadyInProgress(_) => {
                (StatusCode::CONFLICT, "Operation is already in progress")
            }
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Settings storage error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            AppError::JsonError(_) => (StatusCode::BAD_REQUEST, "Invalid JSON"),
            AppError::IoError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO error"),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        let body = Json(json!({
            "code": self.code(),
            "message": message,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
