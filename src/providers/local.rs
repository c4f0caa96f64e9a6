//! Local filesystem provider. A local drive's `root_path` is a directory on
//! the host; folders are directories beneath it.

use super::{
    FileStorageError, FileStorageResult, StudyStorageService, full_path, relative_path,
};
use crate::{
    models::{
        DriveType, StorageDrive, StorageDriveFolder, StorageDriveFolderDetails, StorageFile,
        StorageFolder, folder::LocalDriveFolderDetails,
    },
    paths::{is_valid_name, join_path, last_segment},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use md5::Context;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Default, Clone)]
pub struct LocalStudyStorageService;

impl LocalStudyStorageService {
    pub fn new() -> Self {
        Self
    }

    fn ensure_local(folder: &StorageDriveFolder) -> FileStorageResult<()> {
        match &folder.details {
            StorageDriveFolderDetails::Local(_) => Ok(()),
            other => Err(FileStorageError::DetailsMismatch {
                provider: DriveType::Local,
                actual: other.drive_type(),
            }),
        }
    }

    async fn ensure_directory(path: &Path, display: &str) -> FileStorageResult<()> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(FileStorageError::NotFound(display.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(FileStorageError::NotFound(display.to_string()))
            }
            Err(err) => Err(FileStorageError::Io(err)),
        }
    }

    /// Copy `source` to `dest` through a temp file in the destination
    /// directory, returning the byte count and MD5 digest.
    async fn copy_with_digest(source: &Path, dest: &Path) -> FileStorageResult<(u64, String)> {
        let parent = dest
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| FileStorageError::InvalidPath(dest.display().to_string()))?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result = async {
            let mut input = File::open(source).await?;
            let mut output = File::create(&tmp_path).await?;
            let mut digest = Context::new();
            let mut size: u64 = 0;
            let mut buf = vec![0u8; COPY_BUFFER_SIZE];
            loop {
                let read = input.read(&mut buf).await?;
                if read == 0 {
                    break;
                }
                digest.consume(&buf[..read]);
                output.write_all(&buf[..read]).await?;
                size += read as u64;
            }
            output.flush().await?;
            output.sync_all().await?;
            fs::rename(&tmp_path, dest).await?;
            Ok::<_, std::io::Error>((size, format!("{:x}", digest.compute())))
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        Ok(result?)
    }
}

fn modified_at(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl StudyStorageService for LocalStudyStorageService {
    fn drive_type(&self) -> DriveType {
        DriveType::Local
    }

    async fn find_folder(
        &self,
        drive: &StorageDrive,
        folder: &StorageDriveFolder,
    ) -> FileStorageResult<StorageFolder> {
        Self::ensure_local(folder)?;
        self.find_folder_by_path(drive, &folder.path).await
    }

    async fn find_folder_by_path(
        &self,
        drive: &StorageDrive,
        path: &str,
    ) -> FileStorageResult<StorageFolder> {
        let full = PathBuf::from(full_path(drive, path)?);
        Self::ensure_directory(&full, path).await?;
        debug!("Listing local folder {}", full.display());

        let rel = relative_path(drive, &full.to_string_lossy());
        let mut folder = StorageFolder {
            name: last_segment(&rel).to_string(),
            path: rel.clone(),
            ..Default::default()
        };

        let mut entries = fs::read_dir(&full).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(".tmp-") {
                continue;
            }
            let meta = entry.metadata().await?;
            let child_path = join_path(&rel, &name);
            if meta.is_dir() {
                folder.sub_folders.push(StorageFolder {
                    name,
                    path: child_path,
                    ..Default::default()
                });
            } else {
                folder.files.push(StorageFile {
                    name,
                    path: child_path,
                    size: Some(meta.len()),
                    last_modified: modified_at(&meta),
                    ..Default::default()
                });
            }
        }

        folder.sub_folders.sort_by(|a, b| a.name.cmp(&b.name));
        folder.files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folder)
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
        let parent = PathBuf::from(full_path(drive, parent_path)?);
        Self::ensure_directory(&parent, parent_path).await?;

        let target = parent.join(name);
        match fs::create_dir(&target).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(FileStorageError::AlreadyExists(
                    target.display().to_string(),
                ));
            }
            Err(err) => return Err(FileStorageError::Io(err)),
        }
        debug!("Created local folder {}", target.display());

        let rel = relative_path(drive, &target.to_string_lossy());
        Ok(StorageFolder {
            name: name.to_string(),
            path: rel,
            ..Default::default()
        })
    }

    async fn save_file(
        &self,
        drive: &StorageDrive,
        folder: &StorageDriveFolder,
        local_file: &Path,
    ) -> FileStorageResult<StorageFile> {
        Self::ensure_local(folder)?;
        let file_name = local_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| is_valid_name(n))
            .ok_or_else(|| FileStorageError::InvalidPath(local_file.display().to_string()))?;

        let dir = PathBuf::from(full_path(drive, &folder.path)?);
        Self::ensure_directory(&dir, &folder.path).await?;

        let dest = dir.join(&file_name);
        let (size, e_tag) = Self::copy_with_digest(local_file, &dest).await?;
        let meta = fs::metadata(&dest).await?;
        debug!("Saved {} bytes to {}", size, dest.display());

        Ok(StorageFile {
            name: file_name.clone(),
            path: join_path(&folder.path, &file_name),
            size: Some(size),
            last_modified: modified_at(&meta),
            url: None,
            e_tag: Some(e_tag),
        })
    }

    fn folder_details(
        &self,
        _drive: &StorageDrive,
        _folder: &StorageFolder,
    ) -> FileStorageResult<StorageDriveFolderDetails> {
        Ok(StorageDriveFolderDetails::Local(LocalDriveFolderDetails {}))
    }
}
