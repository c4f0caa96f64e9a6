//! Represents a legacy file storage location: a mount point onto a storage
//! system reached through an integration instance.

use super::drive::DriveType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoragePermissions {
    ReadOnly,
    ReadWrite,
}

impl StoragePermissions {
    pub fn can_write(&self) -> bool {
        matches!(self, StoragePermissions::ReadWrite)
    }
}

/// A mount point onto a provider. Root folder paths of locations on the same
/// provider and integration instance never overlap.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileStorageLocation {
    pub id: Uuid,

    /// Integration instance the location is reached through, if any.
    pub integration_instance_id: Option<Uuid>,

    #[serde(rename = "type")]
    pub drive_type: DriveType,

    pub display_name: String,
    pub name: String,
    pub root_folder_path: String,

    /// Provider-side identifier of the root folder.
    pub reference_id: Option<String>,

    pub url: Option<String>,
    pub permissions: StoragePermissions,
    pub default_study_location: bool,
    pub default_data_location: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileStorageLocationDraft {
    #[serde(default)]
    pub integration_instance_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub drive_type: DriveType,
    pub display_name: String,
    pub name: String,
    pub root_folder_path: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub permissions: StoragePermissions,
    #[serde(default)]
    pub default_study_location: bool,
    #[serde(default)]
    pub default_data_location: bool,
}
