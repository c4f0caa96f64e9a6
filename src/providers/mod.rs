//! Storage provider abstraction.
//!
//! Each provider (local filesystem, S3, Egnyte, OneDrive) implements
//! [`StudyStorageService`]. The [`StudyStorageRegistry`] maps a [`DriveType`]
//! to its implementation; it is filled once at startup and an unregistered
//! type is reported as a configuration error.

pub mod egnyte;
pub mod error;
pub mod local;
pub mod onedrive;
pub mod s3;

pub use egnyte::EgnyteStudyStorageService;
pub use error::{FileStorageError, FileStorageResult};
pub use local::LocalStudyStorageService;
pub use onedrive::OneDriveStudyStorageService;
pub use s3::S3StudyStorageService;

use crate::{
    models::{
        DriveType, FileStorageLocation, StorageDrive, StorageDriveFolder,
        StorageDriveFolderDetails, StorageFile, StorageFolder,
    },
    paths::{join_path, normalize_path},
    services::error::{StorageError, StorageResult},
};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    path::Path,
    sync::Arc,
};
use tracing::{error, warn};

/// Provider-specific operations on drives and folders.
///
/// Folder paths passed in and returned are relative to the drive's
/// `root_path`.
#[async_trait]
pub trait StudyStorageService: Send + Sync {
    /// The drive type this implementation serves.
    fn drive_type(&self) -> DriveType;

    /// List the immediate children of a registered folder.
    async fn find_folder(
        &self,
        drive: &StorageDrive,
        folder: &StorageDriveFolder,
    ) -> FileStorageResult<StorageFolder>;

    /// List the folder at `path`. Returns `NotFound` when nothing exists
    /// there.
    async fn find_folder_by_path(
        &self,
        drive: &StorageDrive,
        path: &str,
    ) -> FileStorageResult<StorageFolder>;

    /// Create `name` under `parent_path` and return the new, empty folder.
    async fn create_folder(
        &self,
        drive: &StorageDrive,
        parent_path: &str,
        name: &str,
    ) -> FileStorageResult<StorageFolder>;

    /// Upload a locally staged file into `folder`, keeping its file name.
    async fn save_file(
        &self,
        drive: &StorageDrive,
        folder: &StorageDriveFolder,
        local_file: &Path,
    ) -> FileStorageResult<StorageFile>;

    /// Details payload for registering a folder this provider returned.
    fn folder_details(
        &self,
        drive: &StorageDrive,
        folder: &StorageFolder,
    ) -> FileStorageResult<StorageDriveFolderDetails>;
}

impl Debug for dyn StudyStorageService {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "StudyStorageService({})", self.drive_type())
    }
}

/// Anything that resolves to a provider.
pub trait ProviderTyped {
    fn provider_type(&self) -> DriveType;
}

impl ProviderTyped for StorageDrive {
    fn provider_type(&self) -> DriveType {
        self.drive_type
    }
}

impl ProviderTyped for StorageDriveFolder {
    fn provider_type(&self) -> DriveType {
        self.details.drive_type()
    }
}

impl ProviderTyped for FileStorageLocation {
    fn provider_type(&self) -> DriveType {
        self.drive_type
    }
}

/// Startup-built map from drive type to provider implementation.
#[derive(Default, Clone)]
pub struct StudyStorageRegistry {
    services: HashMap<DriveType, Arc<dyn StudyStorageService>>,
}

impl StudyStorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under its own drive type, replacing any previous
    /// registration.
    pub fn register(&mut self, service: Arc<dyn StudyStorageService>) -> &mut Self {
        let drive_type = service.drive_type();
        if self.services.insert(drive_type, service).is_some() {
            warn!("Replaced storage service registered for {}", drive_type);
        }
        self
    }

    pub fn with(mut self, service: Arc<dyn StudyStorageService>) -> Self {
        self.register(service);
        self
    }

    pub fn registered_types(&self) -> Vec<DriveType> {
        let mut types: Vec<DriveType> = self.services.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    pub fn lookup(&self, drive_type: DriveType) -> StorageResult<Arc<dyn StudyStorageService>> {
        self.services.get(&drive_type).cloned().ok_or_else(|| {
            error!(
                "No storage service registered for {}; check provider configuration",
                drive_type
            );
            StorageError::ProviderNotRegistered(drive_type)
        })
    }

    /// Resolve the provider for a drive, folder or location.
    pub fn lookup_study_storage_service(
        &self,
        location: &impl ProviderTyped,
    ) -> StorageResult<Arc<dyn StudyStorageService>> {
        self.lookup(location.provider_type())
    }

    /// Fail if any of `types` has no registered provider. Run at startup
    /// against every active drive and location.
    pub fn ensure_registered(
        &self,
        types: impl IntoIterator<Item = DriveType>,
    ) -> StorageResult<()> {
        for drive_type in types {
            self.lookup(drive_type)?;
        }
        Ok(())
    }
}

impl Debug for StudyStorageRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StudyStorageRegistry")
            .field("registered", &self.registered_types())
            .finish()
    }
}

/// Provider path for a drive-relative path.
pub(crate) fn full_path(drive: &StorageDrive, path: &str) -> FileStorageResult<String> {
    let normalized =
        normalize_path(path).ok_or_else(|| FileStorageError::InvalidPath(path.to_string()))?;
    Ok(join_path(&drive.root_path, &normalized))
}

/// Drive-relative path for a provider path under the drive root.
pub(crate) fn relative_path(drive: &StorageDrive, full: &str) -> String {
    let root = drive.root_path.trim_matches('/');
    let full = full.trim_matches('/');
    if root.is_empty() {
        return full.to_string();
    }
    match full.strip_prefix(root) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            rest.trim_start_matches('/').to_string()
        }
        _ => full.to_string(),
    }
}

/// Reject folders whose details belong to another provider.
pub(crate) fn ensure_folder_provider(
    provider: DriveType,
    folder: &StorageDriveFolder,
) -> FileStorageResult<()> {
    let actual = folder.details.drive_type();
    if actual != provider {
        return Err(FileStorageError::DetailsMismatch { provider, actual });
    }
    Ok(())
}

/// Map an HTTP response from a REST provider onto `FileStorageError`.
pub(crate) async fn check_response(
    provider: DriveType,
    response: reqwest::Response,
    path: &str,
) -> FileStorageResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::NOT_FOUND => Err(FileStorageError::NotFound(path.to_string())),
        StatusCode::CONFLICT => Err(FileStorageError::AlreadyExists(path.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(FileStorageError::Unauthorized(provider))
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            warn!("{} returned {} for `{}`: {}", provider, status, path, body);
            Err(FileStorageError::remote(provider, format!("{}: {}", status, body)))
        }
    }
}

/// Build `base` + `/` + each segment of `prefix` and `path`, percent-encoding
/// every segment.
pub(crate) fn segment_url(base: &str, prefix: &[&str], path: &str) -> FileStorageResult<Url> {
    let mut url = Url::parse(base).map_err(|_| FileStorageError::InvalidPath(base.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| FileStorageError::InvalidPath(base.to_string()))?;
        segments.pop_if_empty();
        segments.extend(prefix.iter().copied());
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
    }
    Ok(url)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::{FolderOptions, StorageDriveDetails, drive::LocalDriveDetails};
    use axum::Router;
    use chrono::Utc;
    use tokio::net::TcpListener;
    use uuid::Uuid;

    pub fn drive(drive_type_details: StorageDriveDetails, root_path: &str) -> StorageDrive {
        StorageDrive {
            id: Uuid::new_v4(),
            display_name: "test drive".into(),
            drive_type: drive_type_details.drive_type(),
            root_path: root_path.into(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            details: drive_type_details,
        }
    }

    pub fn local_drive(root_path: &str) -> StorageDrive {
        drive(StorageDriveDetails::Local(LocalDriveDetails {}), root_path)
    }

    /// A registered folder on `drive` at `path`.
    pub fn folder(
        drive: &StorageDrive,
        path: &str,
        details: StorageDriveFolderDetails,
    ) -> StorageDriveFolder {
        StorageDriveFolder {
            id: Uuid::new_v4(),
            storage_drive_id: drive.id,
            path: path.into(),
            name: crate::paths::last_segment(path).into(),
            options: FolderOptions::default(),
            details,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Serve a stand-in provider API on an ephemeral local port. `build`
    /// receives the base URL so responses can link back to the server.
    pub async fn serve(build: impl FnOnce(String) -> Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = build(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::{StorageDriveDetails, drive::S3BucketDetails};

    #[test]
    fn lookup_returns_registered_provider() {
        let registry = StudyStorageRegistry::new().with(Arc::new(LocalStudyStorageService::new()));
        let drive = local_drive("/tmp");
        let service = registry.lookup_study_storage_service(&drive).unwrap();
        assert_eq!(service.drive_type(), DriveType::Local);
        assert_eq!(registry.registered_types(), vec![DriveType::Local]);
    }

    #[test]
    fn lookup_of_missing_provider_fails() {
        let registry = StudyStorageRegistry::new().with(Arc::new(LocalStudyStorageService::new()));
        let err = registry.lookup(DriveType::Egnyte).err().unwrap();
        assert!(matches!(err, StorageError::ProviderNotRegistered(DriveType::Egnyte)));

        assert!(registry.ensure_registered([DriveType::Local]).is_ok());
        assert!(
            registry
                .ensure_registered([DriveType::Local, DriveType::OneDrive])
                .is_err()
        );
    }

    #[test]
    fn paths_are_resolved_against_drive_root() {
        let drive = drive(
            StorageDriveDetails::S3(S3BucketDetails {
                bucket_name: "b".into(),
                arn: None,
            }),
            "tenant-a",
        );
        assert_eq!(full_path(&drive, "studies/ABC/").unwrap(), "tenant-a/studies/ABC");
        assert_eq!(relative_path(&drive, "tenant-a/studies/ABC/"), "studies/ABC");
        assert!(full_path(&drive, "../other").is_err());
        assert_eq!(relative_path(&drive, "tenant-ab/x"), "tenant-ab/x");

        let rootless = local_drive("");
        assert_eq!(relative_path(&rootless, "/studies"), "studies");
        assert_eq!(full_path(&rootless, "studies").unwrap(), "studies");
        assert_eq!(relative_path(&rootless, "studies/"), "studies");
    }

    #[test]
    fn segment_url_encodes_each_segment() {
        let url = segment_url(
            "https://acme.egnyte.com",
            &["pubapi", "v1", "fs"],
            "/Shared/Study #1/raw data",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://acme.egnyte.com/pubapi/v1/fs/Shared/Study%20%231/raw%20data"
        );
    }
}
