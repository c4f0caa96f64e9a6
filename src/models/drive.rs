//! Represents a registered storage drive: one provider account, bucket,
//! site or local mount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Storage provider backing a drive, folder or location.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum DriveType {
    Local,
    S3,
    Egnyte,
    OneDrive,
}

impl DriveType {
    pub const ALL: [DriveType; 4] = [
        DriveType::Local,
        DriveType::S3,
        DriveType::Egnyte,
        DriveType::OneDrive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriveType::Local => "LOCAL",
            DriveType::S3 => "S3",
            DriveType::Egnyte => "EGNYTE",
            DriveType::OneDrive => "ONEDRIVE",
        }
    }
}

impl fmt::Display for DriveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriveType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DriveType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| format!("unknown drive type `{}`", value))
    }
}

/// Provider-specific payload attached to a drive.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum StorageDriveDetails {
    #[serde(rename = "LOCAL")]
    Local(LocalDriveDetails),
    #[serde(rename = "S3")]
    S3(S3BucketDetails),
    #[serde(rename = "EGNYTE")]
    Egnyte(EgnyteDriveDetails),
    #[serde(rename = "ONEDRIVE")]
    OneDrive(OneDriveDriveDetails),
}

impl StorageDriveDetails {
    /// The drive type this payload belongs to.
    pub fn drive_type(&self) -> DriveType {
        match self {
            StorageDriveDetails::Local(_) => DriveType::Local,
            StorageDriveDetails::S3(_) => DriveType::S3,
            StorageDriveDetails::Egnyte(_) => DriveType::Egnyte,
            StorageDriveDetails::OneDrive(_) => DriveType::OneDrive,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalDriveDetails {}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct S3BucketDetails {
    pub bucket_name: String,
    #[serde(default)]
    pub arn: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EgnyteDriveDetails {
    /// Tenant subdomain, e.g. `acme` for `acme.egnyte.com`.
    pub tenant_name: String,
    #[serde(default)]
    pub root_folder_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OneDriveDriveDetails {
    pub drive_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

/// A registered storage endpoint.
///
/// Drives are never deleted; `active` is the only lifecycle switch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageDrive {
    pub id: Uuid,

    /// Organisation-wide unique name.
    pub display_name: String,

    /// Always equal to `details.drive_type()`.
    pub drive_type: DriveType,

    /// Path the drive is rooted at on the provider (a directory for local
    /// drives, a key prefix for S3, a folder path for Egnyte/OneDrive).
    pub root_path: String,

    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub details: StorageDriveDetails,
}

/// Input for registering a drive. The drive type is taken from `details`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StorageDriveDraft {
    pub display_name: String,
    #[serde(default)]
    pub root_path: String,
    pub details: StorageDriveDetails,
}

/// Generic `storage_drives` row, before its satellite payload is attached.
#[derive(FromRow, Debug)]
pub(crate) struct StorageDriveRow {
    pub id: Uuid,
    pub display_name: String,
    pub drive_type: DriveType,
    pub root_path: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StorageDriveRow {
    pub(crate) fn with_details(self, details: StorageDriveDetails) -> StorageDrive {
        StorageDrive {
            id: self.id,
            display_name: self.display_name,
            drive_type: self.drive_type,
            root_path: self.root_path,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            details,
        }
    }
}
