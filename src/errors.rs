use crate::{providers::FileStorageError, services::StorageError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<FileStorageError> for AppError {
    fn from(err: FileStorageError) -> Self {
        let status = match &err {
            FileStorageError::NotFound(_) => StatusCode::NOT_FOUND,
            FileStorageError::AlreadyExists(_) => StatusCode::CONFLICT,
            FileStorageError::InvalidPath(_) | FileStorageError::DetailsMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            FileStorageError::Unauthorized(_)
            | FileStorageError::Remote { .. }
            | FileStorageError::Http(_) => StatusCode::BAD_GATEWAY,
            FileStorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Provider error: {}", err);
        }
        AppError::new(status, err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let err = match err {
            StorageError::Provider(inner) => return inner.into(),
            other => other,
        };
        let status = match &err {
            StorageError::DriveNotFound(_)
            | StorageError::FolderNotFound(_)
            | StorageError::FolderNotAttached { .. }
            | StorageError::LocationNotFound(_) => StatusCode::NOT_FOUND,
            StorageError::DriveAlreadyExists(_)
            | StorageError::FolderPathExists { .. }
            | StorageError::FolderAlreadyAttached { .. }
            | StorageError::LocationOverlap { .. }
            | StorageError::DriveInactive(_)
            | StorageError::FolderNotWritable(_) => StatusCode::CONFLICT,
            StorageError::InvalidDriveName(_)
            | StorageError::DetailsMismatch { .. }
            | StorageError::DetailsInconsistent { .. }
            | StorageError::InvalidPath(_)
            | StorageError::InvalidName(_) => StatusCode::BAD_REQUEST,
            StorageError::ProviderNotRegistered(_)
            | StorageError::Provider(_)
            | StorageError::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Storage error: {}", err);
        }
        AppError::new(status, err.to_string())
    }
}
