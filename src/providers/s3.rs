//! AWS S3 provider. A drive is one bucket; folders are key prefixes. Empty
//! `key/` marker objects stand in for folders that hold no files yet.

use super::{
    FileStorageError, FileStorageResult, StudyStorageService, full_path, relative_path,
};
use crate::{
    models::{
        DriveType, StorageDrive, StorageDriveDetails, StorageDriveFolder,
        StorageDriveFolderDetails, StorageFile, StorageFolder, folder::S3BucketFolderDetails,
    },
    paths::{is_valid_name, join_path, last_segment},
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{Client, error::DisplayErrorContext, primitives::ByteStream};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info};

const DELIMITER: &str = "/";

#[derive(Clone, Debug)]
pub struct S3StudyStorageService {
    client: Client,
}

impl S3StudyStorageService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential chain, optionally
    /// pinned to `region`.
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        info!("AWS S3 client initialized");
        Self::new(Client::new(&config))
    }

    fn bucket(drive: &StorageDrive) -> FileStorageResult<&str> {
        match &drive.details {
            StorageDriveDetails::S3(details) => Ok(details.bucket_name.as_str()),
            other => Err(FileStorageError::DetailsMismatch {
                provider: DriveType::S3,
                actual: other.drive_type(),
            }),
        }
    }

    fn remote<E>(err: E) -> FileStorageError
    where
        E: std::error::Error,
    {
        FileStorageError::remote(DriveType::S3, DisplayErrorContext(err).to_string())
    }

    /// List the objects and common prefixes directly beneath `key`.
    async fn list_prefix(
        &self,
        drive: &StorageDrive,
        bucket: &str,
        key: &str,
    ) -> FileStorageResult<Option<StorageFolder>> {
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}{}", key, DELIMITER)
        };
        let rel = relative_path(drive, key);
        let mut folder = StorageFolder {
            name: last_segment(&rel).to_string(),
            path: rel.clone(),
            ..Default::default()
        };

        let mut seen_anything = false;
        let mut continuation: Option<String> = None;
        loop {
            debug!("Listing s3://{}/{} (token {:?})", bucket, prefix, continuation);
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(&prefix)
                .delimiter(DELIMITER)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(Self::remote)?;

            for common in output.common_prefixes() {
                let Some(child) = common.prefix() else { continue };
                seen_anything = true;
                let child_key = child.trim_end_matches('/');
                folder.sub_folders.push(StorageFolder {
                    name: last_segment(child_key).to_string(),
                    path: relative_path(drive, child_key),
                    ..Default::default()
                });
            }

            for object in output.contents() {
                let Some(object_key) = object.key() else { continue };
                seen_anything = true;
                if object_key == prefix {
                    // folder marker
                    continue;
                }
                folder.files.push(StorageFile {
                    name: last_segment(object_key).to_string(),
                    path: relative_path(drive, object_key),
                    size: object.size().and_then(|s| u64::try_from(s).ok()),
                    last_modified: object.last_modified().and_then(|t| {
                        DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())
                    }),
                    url: None,
                    e_tag: object.e_tag().map(|e| e.trim_matches('"').to_string()),
                });
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        if !seen_anything && !key.is_empty() {
            return Ok(None);
        }
        Ok(Some(folder))
    }
}

#[async_trait]
impl StudyStorageService for S3StudyStorageService {
    fn drive_type(&self) -> DriveType {
        DriveType::S3
    }

    async fn find_folder(
        &self,
        drive: &StorageDrive,
        folder: &StorageDriveFolder,
    ) -> FileStorageResult<StorageFolder> {
        let bucket = Self::bucket(drive)?;
        let key = match &folder.details {
            StorageDriveFolderDetails::S3(details) => details.key.trim_end_matches('/').to_string(),
            other => {
                return Err(FileStorageError::DetailsMismatch {
                    provider: DriveType::S3,
                    actual: other.drive_type(),
                });
            }
        };
        self.list_prefix(drive, bucket, &key)
            .await?
            .ok_or_else(|| FileStorageError::NotFound(folder.path.clone()))
    }

    async fn find_folder_by_path(
        &self,
        drive: &StorageDrive,
        path: &str,
    ) -> FileStorageResult<StorageFolder> {
        let bucket = Self::bucket(drive)?;
        let key = full_path(drive, path)?;
        self.list_prefix(drive, bucket, key.trim_matches('/'))
            .await?
            .ok_or_else(|| FileStorageError::NotFound(path.to_string()))
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
        let bucket = Self::bucket(drive)?;
        let parent_key = full_path(drive, parent_path)?;
        let key = join_path(parent_key.trim_matches('/'), name);

        if self.list_prefix(drive, bucket, &key).await?.is_some() {
            return Err(FileStorageError::AlreadyExists(key));
        }

        self.client
            .put_object()
            .bucket(bucket)
            .key(format!("{}{}", key, DELIMITER))
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(Self::remote)?;
        info!("Created s3://{}/{}/", bucket, key);

        Ok(StorageFolder {
            name: name.to_string(),
            path: relative_path(drive, &key),
            ..Default::default()
        })
    }

    async fn save_file(
        &self,
        drive: &StorageDrive,
        folder: &StorageDriveFolder,
        local_file: &Path,
    ) -> FileStorageResult<StorageFile> {
        let bucket = Self::bucket(drive)?;
        let folder_key = match &folder.details {
            StorageDriveFolderDetails::S3(details) => details.key.trim_end_matches('/').to_string(),
            other => {
                return Err(FileStorageError::DetailsMismatch {
                    provider: DriveType::S3,
                    actual: other.drive_type(),
                });
            }
        };
        let file_name = local_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| is_valid_name(n))
            .ok_or_else(|| FileStorageError::InvalidPath(local_file.display().to_string()))?;
        let size = tokio::fs::metadata(local_file).await?.len();
        let key = join_path(&folder_key, &file_name);

        let body = ByteStream::from_path(local_file)
            .await
            .map_err(|e| FileStorageError::remote(DriveType::S3, e.to_string()))?;
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(Self::remote)?;
        info!("Uploaded {} bytes to s3://{}/{}", size, bucket, key);

        Ok(StorageFile {
            name: file_name,
            path: relative_path(drive, &key),
            size: Some(size),
            last_modified: Some(Utc::now()),
            url: None,
            e_tag: output.e_tag().map(|e| e.trim_matches('"').to_string()),
        })
    }

    fn folder_details(
        &self,
        drive: &StorageDrive,
        folder: &StorageFolder,
    ) -> FileStorageResult<StorageDriveFolderDetails> {
        let bucket = Self::bucket(drive)?;
        let key = full_path(drive, &folder.path)?;
        Ok(StorageDriveFolderDetails::S3(S3BucketFolderDetails {
            bucket_name: bucket.to_string(),
            key: key.trim_matches('/').to_string(),
            e_tag: None,
        }))
    }
}
