//! HTTP handlers for legacy file storage locations.

use super::ActiveUpdate;
use crate::{
    errors::AppError,
    models::{FileStorageLocation, FileStorageLocationDraft},
    routes::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// GET `/locations`
pub async fn list_locations(
    State(state): State<AppState>,
) -> Result<Json<Vec<FileStorageLocation>>, AppError> {
    Ok(Json(state.locations.find_all_locations().await?))
}

/// POST `/locations`
pub async fn register_location(
    State(state): State<AppState>,
    Json(draft): Json<FileStorageLocationDraft>,
) -> Result<impl IntoResponse, AppError> {
    let location = state.locations.register_location(draft).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

/// GET `/locations/{id}`
pub async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileStorageLocation>, AppError> {
    state
        .locations
        .find_location_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("file storage location `{}` not found", id)))
}

/// PUT `/locations/{id}/status`
pub async fn set_location_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ActiveUpdate>,
) -> Result<Json<FileStorageLocation>, AppError> {
    Ok(Json(state.locations.set_location_active(id, update.active).await?))
}

/// PUT `/locations/{id}/default-study`
pub async fn set_default_study(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileStorageLocation>, AppError> {
    Ok(Json(state.locations.set_default_study_location(id).await?))
}

/// PUT `/locations/{id}/default-data`
pub async fn set_default_data(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileStorageLocation>, AppError> {
    Ok(Json(state.locations.set_default_data_location(id).await?))
}
