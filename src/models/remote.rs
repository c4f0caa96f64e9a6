//! Folder and file listings returned by storage providers.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A file on a provider.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageFile {
    pub name: String,

    /// Provider path of the file (a key for S3).
    pub path: String,

    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub e_tag: Option<String>,
}

/// A folder on a provider. `files` and `sub_folders` hold immediate children
/// only; sub-folders are returned without their own contents.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageFolder {
    pub name: String,
    pub path: String,

    /// Provider-side identifier (Egnyte folder id, Graph item id).
    pub folder_id: Option<String>,

    pub url: Option<String>,
    pub files: Vec<StorageFile>,
    pub sub_folders: Vec<StorageFolder>,
}
