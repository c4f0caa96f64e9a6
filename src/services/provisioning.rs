//! Creating a folder on a provider and registering it for an owner in one
//! step.

use super::{
    drive_service::StorageDriveService,
    error::{StorageError, StorageResult},
    folder_service::StorageDriveFolderService,
};
use crate::{
    models::{FolderOptions, FolderOwner, OwnedFolder, StorageDriveFolderDraft},
    paths::is_valid_name,
};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct StorageProvisioner {
    drives: StorageDriveService,
    folders: StorageDriveFolderService,
}

impl StorageProvisioner {
    pub fn new(drives: StorageDriveService, folders: StorageDriveFolderService) -> Self {
        Self { drives, folders }
    }

    /// Create `name` beneath a registered parent folder, register the new
    /// folder with the details its provider reports, and attach it to
    /// `owner`.
    ///
    /// The parent's drive must be active and the parent write-enabled.
    /// Registration and the owner link are written in one transaction, so
    /// either both exist or neither does. A failure after the remote folder
    /// exists leaves the remote folder in place; retrying then reports
    /// `AlreadyExists` from the provider.
    pub async fn provision_owner_folder(
        &self,
        owner: FolderOwner,
        parent_folder_id: Uuid,
        name: &str,
        primary: bool,
    ) -> StorageResult<OwnedFolder> {
        let name = name.trim();
        if !is_valid_name(name) {
            return Err(StorageError::InvalidName(name.to_string()));
        }

        let parent = self
            .folders
            .find_by_id(parent_folder_id)
            .await?
            .ok_or(StorageError::FolderNotFound(parent_folder_id))?;
        let drive = self
            .drives
            .find_drive_by_id(parent.storage_drive_id)
            .await?
            .ok_or(StorageError::DriveNotFound(parent.storage_drive_id))?;

        if !drive.active {
            return Err(StorageError::DriveInactive(drive.id));
        }
        if !parent.options.write_enabled {
            return Err(StorageError::FolderNotWritable(parent.id));
        }

        let service = self.drives.lookup_study_storage_service(&drive)?;
        let remote = service.create_folder(&drive, &parent.path, name).await?;
        let details = service.folder_details(&drive, &remote)?;

        let owned = self
            .folders
            .register_and_attach(
                StorageDriveFolderDraft {
                    path: remote.path,
                    name: Some(name.to_string()),
                    options: FolderOptions::default(),
                    details,
                },
                &drive,
                owner,
                primary,
            )
            .await?;

        info!(
            "Provisioned folder `{}` on drive `{}` for {}",
            owned.folder.path, drive.display_name, owner
        );
        Ok(owned)
    }
}
