//! Routes of the storage drive API.
//!
//! ## Structure
//! - **Drives**: `/drives`, `/drives/{id}`, `/drives/{id}/status`,
//!   `/drives/{id}/folders`, `/drives/{id}/browse`
//! - **Folders**: `/folders/study-roots`, `/folders/browser-roots`,
//!   `/folders/{id}`, `/folders/{id}/options`, `/folders/{id}/contents`,
//!   `/folders/{id}/files`
//! - **Owners**: `/owners/{kind}/{owner_id}/folders[...]` where `kind` is
//!   `program`, `study` or `assay`
//! - **Locations**: `/locations`, `/locations/{id}[/status|/default-study|/default-data]`

use crate::{
    handlers::{
        drive_handlers::{
            browse_drive, get_drive, list_drive_folders, list_drives, register_drive,
            register_drive_folder, set_drive_status,
        },
        folder_handlers::{
            browser_root_folders, folder_contents, get_folder, study_root_folders,
            update_folder_options, upload_files,
        },
        health_handlers::{healthz, readyz},
        location_handlers::{
            get_location, list_locations, register_location, set_default_data,
            set_default_study, set_location_status,
        },
        owner_handlers::{
            attach_owner_folder, detach_owner_folder, list_owner_folders,
            provision_owner_folder, set_primary_folder,
        },
    },
    providers::StudyStorageRegistry,
    services::{
        FileStorageLocationService, StorageDriveFolderService, StorageDriveService,
        StorageProvisioner,
    },
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub registry: Arc<StudyStorageRegistry>,
    pub drives: StorageDriveService,
    pub folders: StorageDriveFolderService,
    pub locations: FileStorageLocationService,
    pub provisioner: StorageProvisioner,
    pub staging_dir: PathBuf,
}

impl AppState {
    pub fn new(
        db: Arc<SqlitePool>,
        registry: Arc<StudyStorageRegistry>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        let drives = StorageDriveService::new(db.clone(), registry.clone());
        let folders = StorageDriveFolderService::new(db.clone(), registry.clone());
        let locations = FileStorageLocationService::new(db.clone(), registry.clone());
        let provisioner = StorageProvisioner::new(drives.clone(), folders.clone());
        Self {
            db,
            registry,
            drives,
            folders,
            locations,
            provisioner,
            staging_dir: staging_dir.into(),
        }
    }
}

/// Build and return the router carrying `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // drives
        .route("/drives", get(list_drives).post(register_drive))
        .route("/drives/{id}", get(get_drive))
        .route("/drives/{id}/status", put(set_drive_status))
        .route(
            "/drives/{id}/folders",
            get(list_drive_folders).post(register_drive_folder),
        )
        .route("/drives/{id}/browse", get(browse_drive))
        // folders; the static segments win over `{id}`
        .route("/folders/study-roots", get(study_root_folders))
        .route("/folders/browser-roots", get(browser_root_folders))
        .route("/folders/{id}", get(get_folder))
        .route("/folders/{id}/options", put(update_folder_options))
        .route("/folders/{id}/contents", get(folder_contents))
        .route("/folders/{id}/files", post(upload_files))
        // owner links
        .route(
            "/owners/{kind}/{owner_id}/folders",
            get(list_owner_folders).post(attach_owner_folder),
        )
        .route(
            "/owners/{kind}/{owner_id}/folders/provision",
            post(provision_owner_folder),
        )
        .route(
            "/owners/{kind}/{owner_id}/folders/{folder_id}/primary",
            put(set_primary_folder),
        )
        .route(
            "/owners/{kind}/{owner_id}/folders/{folder_id}",
            delete(detach_owner_folder),
        )
        // legacy locations
        .route("/locations", get(list_locations).post(register_location))
        .route("/locations/{id}", get(get_location))
        .route("/locations/{id}/status", put(set_location_status))
        .route("/locations/{id}/default-study", put(set_default_study))
        .route("/locations/{id}/default-data", put(set_default_data))
}
