//! Represents a folder registered on a storage drive.

use super::drive::DriveType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Provider-specific payload attached to a folder.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum StorageDriveFolderDetails {
    #[serde(rename = "LOCAL")]
    Local(LocalDriveFolderDetails),
    #[serde(rename = "S3")]
    S3(S3BucketFolderDetails),
    #[serde(rename = "EGNYTE")]
    Egnyte(EgnyteFolderDetails),
    #[serde(rename = "ONEDRIVE")]
    OneDrive(OneDriveFolderDetails),
}

impl StorageDriveFolderDetails {
    /// The drive type this payload belongs to.
    pub fn drive_type(&self) -> DriveType {
        match self {
            StorageDriveFolderDetails::Local(_) => DriveType::Local,
            StorageDriveFolderDetails::S3(_) => DriveType::S3,
            StorageDriveFolderDetails::Egnyte(_) => DriveType::Egnyte,
            StorageDriveFolderDetails::OneDrive(_) => DriveType::OneDrive,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalDriveFolderDetails {}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct S3BucketFolderDetails {
    pub bucket_name: String,
    pub key: String,
    #[serde(default)]
    pub e_tag: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EgnyteFolderDetails {
    pub folder_id: String,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OneDriveFolderDetails {
    pub drive_id: String,
    pub folder_id: String,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Role flags of a folder. Each flag is independent of the others.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderOptions {
    pub browser_root: bool,
    pub study_root: bool,
    pub write_enabled: bool,
    pub delete_enabled: bool,
}

impl Default for FolderOptions {
    fn default() -> Self {
        Self {
            browser_root: false,
            study_root: false,
            write_enabled: true,
            delete_enabled: false,
        }
    }
}

/// An addressable subtree within a drive.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageDriveFolder {
    pub id: Uuid,
    pub storage_drive_id: Uuid,

    /// Path relative to the drive root, without a trailing slash.
    pub path: String,

    pub name: String,

    #[serde(flatten)]
    pub options: FolderOptions,

    pub details: StorageDriveFolderDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a folder on a drive.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StorageDriveFolderDraft {
    pub path: String,

    /// Defaults to the last path segment when omitted.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub options: FolderOptions,

    pub details: StorageDriveFolderDetails,
}

#[derive(FromRow, Debug)]
pub(crate) struct StorageDriveFolderRow {
    pub id: Uuid,
    pub storage_drive_id: Uuid,
    pub path: String,
    pub name: String,
    pub browser_root: bool,
    pub study_root: bool,
    pub write_enabled: bool,
    pub delete_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StorageDriveFolderRow {
    pub(crate) fn with_details(self, details: StorageDriveFolderDetails) -> StorageDriveFolder {
        StorageDriveFolder {
            id: self.id,
            storage_drive_id: self.storage_drive_id,
            path: self.path,
            name: self.name,
            options: FolderOptions {
                browser_root: self.browser_root,
                study_root: self.study_root,
                write_enabled: self.write_enabled,
                delete_enabled: self.delete_enabled,
            },
            details,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
