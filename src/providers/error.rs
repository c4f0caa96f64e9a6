use crate::models::DriveType;
use std::io;
use thiserror::Error;

/// Failures raised while talking to a storage provider. These are not
/// retried; the caller decides what to report.
#[derive(Debug, Error)]
pub enum FileStorageError {
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("`{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid path `{0}`")]
    InvalidPath(String),
    #[error("{provider} details expected, got {actual}")]
    DetailsMismatch {
        provider: DriveType,
        actual: DriveType,
    },
    #[error("{0} rejected the configured credentials")]
    Unauthorized(DriveType),
    #[error("{provider} request failed: {message}")]
    Remote { provider: DriveType, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type FileStorageResult<T> = Result<T, FileStorageError>;

impl FileStorageError {
    pub(crate) fn remote(provider: DriveType, message: impl Into<String>) -> Self {
        Self::Remote {
            provider,
            message: message.into(),
        }
    }
}
