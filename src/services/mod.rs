pub(crate) mod details_store;
pub mod drive_service;
pub mod error;
pub mod folder_service;
pub mod location_service;
pub mod provisioning;

pub use drive_service::StorageDriveService;
pub use error::{StorageError, StorageResult};
pub use folder_service::StorageDriveFolderService;
pub use location_service::FileStorageLocationService;
pub use provisioning::StorageProvisioner;

/// Opens write transactions with the SQLite write lock already held, so
/// concurrent writers queue on the busy timeout instead of failing when a
/// read lock cannot be upgraded.
pub(crate) const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";
