//! Core data models for the storage drive service.
//!
//! Drives and folders are stored as a generic row plus one satellite row per
//! provider. The provider payloads are closed sum types tagged with a `type`
//! discriminator so every dispatch site matches them exhaustively.

pub mod drive;
pub mod folder;
pub mod location;
pub mod owner;
pub mod remote;

pub use drive::{DriveType, StorageDrive, StorageDriveDetails, StorageDriveDraft};
pub use folder::{FolderOptions, StorageDriveFolder, StorageDriveFolderDetails, StorageDriveFolderDraft};
pub use location::{FileStorageLocation, FileStorageLocationDraft, StoragePermissions};
pub use owner::{FolderOwner, OwnedFolder};
pub use remote::{StorageFile, StorageFolder};
