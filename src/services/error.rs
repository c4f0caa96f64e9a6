use crate::{
    models::{DriveType, FolderOwner},
    providers::FileStorageError,
};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the registration and lookup services.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage drive `{0}` not found")]
    DriveNotFound(Uuid),
    #[error("storage drive `{0}` already exists")]
    DriveAlreadyExists(String),
    #[error("storage drive `{0}` is inactive")]
    DriveInactive(Uuid),
    #[error("storage drive name invalid: {0}")]
    InvalidDriveName(String),
    #[error("storage folder `{0}` not found")]
    FolderNotFound(Uuid),
    #[error("path `{path}` is already registered on drive `{drive_id}`")]
    FolderPathExists { drive_id: Uuid, path: String },
    #[error("storage folder `{0}` is not writable")]
    FolderNotWritable(Uuid),
    #[error("folder `{folder_id}` is not attached to {owner}")]
    FolderNotAttached { owner: FolderOwner, folder_id: Uuid },
    #[error("folder `{folder_id}` is already attached to {owner}")]
    FolderAlreadyAttached { owner: FolderOwner, folder_id: Uuid },
    #[error("details of type {actual} cannot be attached to a {expected} drive")]
    DetailsMismatch { expected: DriveType, actual: DriveType },
    #[error("folder {field} `{actual}` does not match the drive (expected `{expected}`)")]
    DetailsInconsistent {
        field: &'static str,
        expected: String,
        actual: String,
    },
    #[error("invalid path `{0}`")]
    InvalidPath(String),
    #[error("invalid folder name `{0}`")]
    InvalidName(String),
    #[error("file storage location `{0}` not found")]
    LocationNotFound(Uuid),
    #[error("root path `{path}` overlaps location `{existing}`")]
    LocationOverlap { path: String, existing: String },
    #[error("no storage service is registered for {0} drives")]
    ProviderNotRegistered(DriveType),
    #[error(transparent)]
    Provider(#[from] FileStorageError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Return true if SQLx error indicates a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
