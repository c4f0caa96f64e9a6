//! HTTP handlers for folders attached to programs, studies and assays.

use crate::{errors::AppError, models::{FolderOwner, OwnedFolder}, routes::AppState};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachFolderRequest {
    pub folder_id: Uuid,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionFolderRequest {
    pub parent_folder_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub primary: bool,
}

fn owner(kind: &str, id: Uuid) -> Result<FolderOwner, AppError> {
    FolderOwner::from_kind(kind, id)
        .ok_or_else(|| AppError::bad_request(format!("unknown owner kind `{}`", kind)))
}

/// GET `/owners/{kind}/{owner_id}/folders`
pub async fn list_owner_folders(
    State(state): State<AppState>,
    Path((kind, owner_id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<OwnedFolder>>, AppError> {
    let owner = owner(&kind, owner_id)?;
    Ok(Json(state.folders.find_owner_folders(owner).await?))
}

/// POST `/owners/{kind}/{owner_id}/folders`
pub async fn attach_owner_folder(
    State(state): State<AppState>,
    Path((kind, owner_id)): Path<(String, Uuid)>,
    Json(request): Json<AttachFolderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let owner = owner(&kind, owner_id)?;
    let owned = state
        .folders
        .attach_folder(owner, request.folder_id, request.primary)
        .await?;
    Ok((StatusCode::CREATED, Json(owned)))
}

/// POST `/owners/{kind}/{owner_id}/folders/provision`
pub async fn provision_owner_folder(
    State(state): State<AppState>,
    Path((kind, owner_id)): Path<(String, Uuid)>,
    Json(request): Json<ProvisionFolderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let owner = owner(&kind, owner_id)?;
    let owned = state
        .provisioner
        .provision_owner_folder(owner, request.parent_folder_id, &request.name, request.primary)
        .await?;
    Ok((StatusCode::CREATED, Json(owned)))
}

/// PUT `/owners/{kind}/{owner_id}/folders/{folder_id}/primary`
pub async fn set_primary_folder(
    State(state): State<AppState>,
    Path((kind, owner_id, folder_id)): Path<(String, Uuid, Uuid)>,
) -> Result<Json<OwnedFolder>, AppError> {
    let owner = owner(&kind, owner_id)?;
    Ok(Json(state.folders.set_default_folder(owner, folder_id).await?))
}

/// DELETE `/owners/{kind}/{owner_id}/folders/{folder_id}`
pub async fn detach_owner_folder(
    State(state): State<AppState>,
    Path((kind, owner_id, folder_id)): Path<(String, Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let owner = owner(&kind, owner_id)?;
    state.folders.detach_folder(owner, folder_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
