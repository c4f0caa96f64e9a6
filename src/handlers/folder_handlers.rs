//! HTTP handlers for registered folders: lookups, role flags, provider
//! listings and file uploads.

use super::drive_handlers::require_drive;
use crate::{
    errors::AppError,
    models::{FolderOptions, StorageDriveFolder, StorageFile, StorageFolder},
    paths::is_valid_name,
    routes::AppState,
    services::StorageError,
    staging::stage_stream,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use futures::TryStreamExt;
use std::io;
use tracing::{info, warn};
use uuid::Uuid;

pub(crate) async fn require_folder(
    state: &AppState,
    id: Uuid,
) -> Result<StorageDriveFolder, AppError> {
    state
        .folders
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("storage folder `{}` not found", id)))
}

/// GET `/folders/study-roots`
pub async fn study_root_folders(
    State(state): State<AppState>,
) -> Result<Json<Vec<StorageDriveFolder>>, AppError> {
    Ok(Json(state.folders.find_study_root_folders().await?))
}

/// GET `/folders/browser-roots`
pub async fn browser_root_folders(
    State(state): State<AppState>,
) -> Result<Json<Vec<StorageDriveFolder>>, AppError> {
    Ok(Json(state.folders.find_browser_root_folders().await?))
}

/// GET `/folders/{id}`
pub async fn get_folder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StorageDriveFolder>, AppError> {
    Ok(Json(require_folder(&state, id).await?))
}

/// PUT `/folders/{id}/options`
pub async fn update_folder_options(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(options): Json<FolderOptions>,
) -> Result<Json<StorageDriveFolder>, AppError> {
    Ok(Json(state.folders.update_folder_options(id, options).await?))
}

/// GET `/folders/{id}/contents` lists the folder through its provider.
pub async fn folder_contents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StorageFolder>, AppError> {
    let folder = require_folder(&state, id).await?;
    let drive = require_drive(&state, folder.storage_drive_id).await?;
    if !drive.active {
        return Err(StorageError::DriveInactive(drive.id).into());
    }
    let service = state.folders.lookup_study_storage_service(&folder)?;
    Ok(Json(service.find_folder(&drive, &folder).await?))
}

/// POST `/folders/{id}/files`
///
/// Every multipart field carrying a file name is staged on local disk and
/// then saved into the folder by its provider.
pub async fn upload_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let folder = require_folder(&state, id).await?;
    let drive = require_drive(&state, folder.storage_drive_id).await?;
    if !drive.active {
        return Err(StorageError::DriveInactive(drive.id).into());
    }
    if !folder.options.write_enabled {
        return Err(StorageError::FolderNotWritable(folder.id).into());
    }
    let service = state.folders.lookup_study_storage_service(&folder)?;

    let mut saved: Vec<StorageFile> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if !is_valid_name(&file_name) {
            return Err(AppError::bad_request(format!("invalid file name `{}`", file_name)));
        }

        let stream = field.map_err(io::Error::other);
        let staged = stage_stream(&state.staging_dir, &file_name, stream)
            .await
            .map_err(|e| AppError::bad_request(format!("upload of `{}` failed: {}", file_name, e)))?;

        let (staged_size, staged_md5) = (staged.size, staged.md5.clone());
        let result = service.save_file(&drive, &folder, &staged.path).await;
        staged.discard().await;
        let mut file = result?;
        if file.size.is_some_and(|size| size != staged_size) {
            warn!(
                "{} reports {:?} bytes for `{}`, {} were uploaded",
                drive.drive_type, file.size, file.path, staged_size
            );
        }
        file.size.get_or_insert(staged_size);
        info!(
            "Stored `{}` ({} bytes, md5 {}) in folder {} on drive `{}`",
            file.path, staged_size, staged_md5, folder.id, drive.display_name
        );
        saved.push(file);
    }

    if saved.is_empty() {
        return Err(AppError::bad_request("no file fields in upload"));
    }
    Ok((StatusCode::CREATED, Json(saved)))
}
