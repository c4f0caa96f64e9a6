//! HTTP handlers for storage drives and the folders registered on them.

use super::ActiveUpdate;
use crate::{
    errors::AppError,
    models::{StorageDrive, StorageDriveDraft, StorageDriveFolder, StorageDriveFolderDraft, StorageFolder},
    routes::AppState,
    services::StorageError,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    #[serde(default)]
    pub path: String,
}

pub(crate) async fn require_drive(state: &AppState, id: Uuid) -> Result<StorageDrive, AppError> {
    state
        .drives
        .find_drive_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("storage drive `{}` not found", id)))
}

/// GET `/drives`
pub async fn list_drives(
    State(state): State<AppState>,
) -> Result<Json<Vec<StorageDrive>>, AppError> {
    Ok(Json(state.drives.find_all_drives().await?))
}

/// POST `/drives`
pub async fn register_drive(
    State(state): State<AppState>,
    Json(draft): Json<StorageDriveDraft>,
) -> Result<impl IntoResponse, AppError> {
    let drive = state.drives.register_drive(draft).await?;
    Ok((StatusCode::CREATED, Json(drive)))
}

/// GET `/drives/{id}`
pub async fn get_drive(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StorageDrive>, AppError> {
    Ok(Json(require_drive(&state, id).await?))
}

/// PUT `/drives/{id}/status`
pub async fn set_drive_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ActiveUpdate>,
) -> Result<Json<StorageDrive>, AppError> {
    Ok(Json(state.drives.set_drive_active(id, update.active).await?))
}

/// GET `/drives/{id}/folders`
pub async fn list_drive_folders(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StorageDriveFolder>>, AppError> {
    let drive = require_drive(&state, id).await?;
    Ok(Json(state.folders.find_by_drive(drive.id).await?))
}

/// POST `/drives/{id}/folders`
pub async fn register_drive_folder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<StorageDriveFolderDraft>,
) -> Result<impl IntoResponse, AppError> {
    let drive = require_drive(&state, id).await?;
    let folder = state.folders.register_folder(draft, &drive).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

/// GET `/drives/{id}/browse?path=` lists a path on the provider, registered
/// or not.
pub async fn browse_drive(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<StorageFolder>, AppError> {
    let drive = require_drive(&state, id).await?;
    if !drive.active {
        return Err(StorageError::DriveInactive(drive.id).into());
    }
    let service = state.drives.lookup_study_storage_service(&drive)?;
    Ok(Json(service.find_folder_by_path(&drive, &query.path).await?))
}
