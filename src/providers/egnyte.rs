//! Egnyte provider, talking to the Egnyte public file-system API (v1).
//!
//! Folder paths are absolute Egnyte paths such as `/Shared/Studies`; a drive
//! is one tenant and its `root_path` is the folder studies live under.

use super::{
    FileStorageError, FileStorageResult, StudyStorageService, check_response,
    ensure_folder_provider, full_path, relative_path, segment_url,
};
use crate::{
    models::{
        DriveType, StorageDrive, StorageDriveDetails, StorageDriveFolder,
        StorageDriveFolderDetails, StorageFile, StorageFolder, folder::EgnyteFolderDetails,
    },
    paths::{is_valid_name, join_path},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::{debug, info};

const FS_PREFIX: [&str; 3] = ["pubapi", "v1", "fs"];
const FS_CONTENT_PREFIX: [&str; 3] = ["pubapi", "v1", "fs-content"];

#[derive(Deserialize, Debug)]
struct EgnyteFolderListing {
    name: String,
    path: String,
    #[serde(default)]
    folder_id: Option<String>,
    #[serde(default)]
    is_folder: bool,
    #[serde(default)]
    folders: Vec<EgnyteFolderEntry>,
    #[serde(default)]
    files: Vec<EgnyteFileEntry>,
}

#[derive(Deserialize, Debug)]
struct EgnyteFolderEntry {
    name: String,
    path: String,
    #[serde(default)]
    folder_id: Option<String>,
}

#[derive(Deserialize, Debug)]
struct EgnyteFileEntry {
    name: String,
    path: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    checksum: Option<String>,
}

#[derive(Deserialize, Debug)]
struct EgnyteUploadResponse {
    #[serde(default)]
    checksum: Option<String>,
}

#[derive(Clone, Debug)]
pub struct EgnyteStudyStorageService {
    http: reqwest::Client,
    token: String,

    /// Overrides `https://{tenant}.egnyte.com`, mainly for proxies.
    base_url: Option<String>,
}

impl EgnyteStudyStorageService {
    pub fn new(http: reqwest::Client, token: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            http,
            token: token.into(),
            base_url,
        }
    }

    fn base_url(&self, drive: &StorageDrive) -> FileStorageResult<String> {
        match &drive.details {
            StorageDriveDetails::Egnyte(details) => Ok(self
                .base_url
                .clone()
                .unwrap_or_else(|| format!("https://{}.egnyte.com", details.tenant_name))),
            other => Err(FileStorageError::DetailsMismatch {
                provider: DriveType::Egnyte,
                actual: other.drive_type(),
            }),
        }
    }

    fn folder_url(base: &str, folder_id: Option<&str>) -> Option<String> {
        folder_id.map(|id| format!("{}/navigate/folder/{}", base.trim_end_matches('/'), id))
    }

    async fn get_listing(
        &self,
        drive: &StorageDrive,
        full: &str,
        display: &str,
    ) -> FileStorageResult<StorageFolder> {
        let base = self.base_url(drive)?;
        let mut url = segment_url(&base, &FS_PREFIX, full)?;
        url.query_pairs_mut().append_pair("list_content", "true");
        debug!("GET {}", url);

        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = check_response(DriveType::Egnyte, response, display).await?;
        let listing: EgnyteFolderListing = response.json().await?;
        if !listing.is_folder {
            return Err(FileStorageError::NotFound(display.to_string()));
        }

        let mut folder = StorageFolder {
            name: listing.name,
            path: relative_path(drive, &listing.path),
            url: Self::folder_url(&base, listing.folder_id.as_deref()),
            folder_id: listing.folder_id,
            ..Default::default()
        };
        folder.sub_folders = listing
            .folders
            .into_iter()
            .map(|entry| StorageFolder {
                name: entry.name,
                path: relative_path(drive, &entry.path),
                url: Self::folder_url(&base, entry.folder_id.as_deref()),
                folder_id: entry.folder_id,
                ..Default::default()
            })
            .collect();
        folder.files = listing
            .files
            .into_iter()
            .map(|entry| StorageFile {
                name: entry.name,
                path: relative_path(drive, &entry.path),
                size: entry.size,
                last_modified: entry
                    .last_modified
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
                    .map(|t| t.with_timezone(&Utc)),
                url: None,
                e_tag: entry.checksum,
            })
            .collect();
        Ok(folder)
    }
}

#[async_trait]
impl StudyStorageService for EgnyteStudyStorageService {
    fn drive_type(&self) -> DriveType {
        DriveType::Egnyte
    }

    async fn find_folder(
        &self,
        drive: &StorageDrive,
        folder: &StorageDriveFolder,
    ) -> FileStorageResult<StorageFolder> {
        ensure_folder_provider(DriveType::Egnyte, folder)?;
        let full = full_path(drive, &folder.path)?;
        self.get_listing(drive, &full, &folder.path).await
    }

    async fn find_folder_by_path(
        &self,
        drive: &StorageDrive,
        path: &str,
    ) -> FileStorageResult<StorageFolder> {
        let full = full_path(drive, path)?;
        self.get_listing(drive, &full, path).await
    }

    async fn create_folder(
        &self,
        drive: &StorageDrive,
        parent_path: &str,
        name: &str,
    ) -> FileStorageResult<StorageFolder> {
        if !is_valid_name(name) {
            return Err(FileStorageError::InvalidPath(name.to_string()));
        }
        let base = self.base_url(drive)?;
        let full = join_path(&full_path(drive, parent_path)?, name);
        let url = segment_url(&base, &FS_PREFIX, &full)?;
        debug!("POST {} add_folder", url);

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "action": "add_folder" }))
            .send()
            .await?;
        check_response(DriveType::Egnyte, response, &full).await?;
        info!("Created Egnyte folder {}", full);

        self.get_listing(drive, &full, &full).await
    }

    async fn save_file(
        &self,
        drive: &StorageDrive,
        folder: &StorageDriveFolder,
        local_file: &Path,
    ) -> FileStorageResult<StorageFile> {
        ensure_folder_provider(DriveType::Egnyte, folder)?;
        let base = self.base_url(drive)?;
        let file_name = local_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| is_valid_name(n))
            .ok_or_else(|| FileStorageError::InvalidPath(local_file.display().to_string()))?;
        let full = join_path(&full_path(drive, &folder.path)?, &file_name);
        let url = segment_url(&base, &FS_CONTENT_PREFIX, &full)?;

        let bytes = tokio::fs::read(local_file).await?;
        let size = bytes.len() as u64;
        debug!("POST {} ({} bytes)", url, size);

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .body(bytes)
            .send()
            .await?;
        let response = check_response(DriveType::Egnyte, response, &full).await?;
        let uploaded: EgnyteUploadResponse = response.json().await?;
        info!("Uploaded {} bytes to Egnyte {}", size, full);

        Ok(StorageFile {
            name: file_name,
            path: relative_path(drive, &full),
            size: Some(size),
            last_modified: Some(Utc::now()),
            url: None,
            e_tag: uploaded.checksum,
        })
    }

    fn folder_details(
        &self,
        drive: &StorageDrive,
        folder: &StorageFolder,
    ) -> FileStorageResult<StorageDriveFolderDetails> {
        self.base_url(drive)?;
        let folder_id = folder
            .folder_id
            .clone()
            .ok_or_else(|| FileStorageError::NotFound(folder.path.clone()))?;
        Ok(StorageDriveFolderDetails::Egnyte(EgnyteFolderDetails {
            folder_id,
            web_url: folder.url.clone(),
        }))
    }
}
