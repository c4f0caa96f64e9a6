//! StorageDriveService: registration, lookup and activation of storage
//! drives, plus resolution of the provider service that operates on them.

use super::{
    BEGIN_WRITE,
    details_store::{insert_drive_details, load_drive_details},
    error::{StorageError, StorageResult, is_unique_violation},
};
use crate::{
    models::{StorageDrive, StorageDriveDraft, drive::StorageDriveRow},
    paths::normalize_path,
    providers::{StudyStorageRegistry, StudyStorageService},
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const MAX_DISPLAY_NAME_LEN: usize = 255;

const DRIVE_COLUMNS: &str =
    "id, display_name, drive_type, root_path, active, created_at, updated_at";

#[derive(Clone)]
pub struct StorageDriveService {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    registry: Arc<StudyStorageRegistry>,
}

impl StorageDriveService {
    pub fn new(db: Arc<SqlitePool>, registry: Arc<StudyStorageRegistry>) -> Self {
        Self { db, registry }
    }

    /// Register a new drive. The drive type follows the details variant, so
    /// a drive can never carry a payload of another provider.
    pub async fn register_drive(&self, draft: StorageDriveDraft) -> StorageResult<StorageDrive> {
        let display_name = draft.display_name.trim();
        if display_name.is_empty() || display_name.len() > MAX_DISPLAY_NAME_LEN {
            return Err(StorageError::InvalidDriveName(draft.display_name.clone()));
        }
        let root_path = normalize_path(&draft.root_path)
            .ok_or_else(|| StorageError::InvalidPath(draft.root_path.clone()))?;

        let now = Utc::now();
        let drive = StorageDrive {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            drive_type: draft.details.drive_type(),
            root_path,
            active: true,
            created_at: now,
            updated_at: now,
            details: draft.details,
        };

        let mut tx = self.db.begin_with(BEGIN_WRITE).await?;
        let inserted = sqlx::query(
            "INSERT INTO storage_drives
                (id, display_name, drive_type, root_path, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(drive.id)
        .bind(&drive.display_name)
        .bind(drive.drive_type)
        .bind(&drive.root_path)
        .bind(drive.active)
        .bind(drive.created_at)
        .bind(drive.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StorageError::DriveAlreadyExists(drive.display_name));
            }
            Err(err) => return Err(StorageError::Sqlx(err)),
        }

        insert_drive_details(&mut *tx, drive.id, &drive.details).await?;
        tx.commit().await?;

        info!(
            "Registered {} drive `{}` ({})",
            drive.drive_type, drive.display_name, drive.id
        );
        Ok(drive)
    }

    /// Look up a drive by id. Absence is `None`; callers decide whether that
    /// is an error.
    pub async fn find_drive_by_id(&self, id: Uuid) -> StorageResult<Option<StorageDrive>> {
        let mut conn = self.db.acquire().await?;
        Ok(fetch_drive(&mut *conn, id).await?)
    }

    pub async fn find_drive_by_name(&self, name: &str) -> StorageResult<Option<StorageDrive>> {
        let row = sqlx::query_as::<_, StorageDriveRow>(&format!(
            "SELECT {} FROM storage_drives WHERE display_name = ?",
            DRIVE_COLUMNS
        ))
        .bind(name.trim())
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) => {
                let mut conn = self.db.acquire().await?;
                Ok(Some(hydrate(&mut *conn, row).await?))
            }
            None => Ok(None),
        }
    }

    /// All drives, active and inactive, ordered by display name.
    pub async fn find_all_drives(&self) -> StorageResult<Vec<StorageDrive>> {
        let rows = sqlx::query_as::<_, StorageDriveRow>(&format!(
            "SELECT {} FROM storage_drives ORDER BY display_name ASC",
            DRIVE_COLUMNS
        ))
        .fetch_all(&*self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        let mut drives = Vec::with_capacity(rows.len());
        for row in rows {
            drives.push(hydrate(&mut *conn, row).await?);
        }
        debug!("Loaded {} storage drives", drives.len());
        Ok(drives)
    }

    /// Toggle the active flag. Folders and satellite rows are left untouched.
    pub async fn set_drive_active(&self, id: Uuid, active: bool) -> StorageResult<StorageDrive> {
        let result =
            sqlx::query("UPDATE storage_drives SET active = ?, updated_at = ? WHERE id = ?")
                .bind(active)
                .bind(Utc::now())
                .bind(id)
                .execute(&*self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::DriveNotFound(id));
        }

        info!(
            "Storage drive {} {}",
            id,
            if active { "activated" } else { "deactivated" }
        );
        self.find_drive_by_id(id)
            .await?
            .ok_or(StorageError::DriveNotFound(id))
    }

    /// Resolve the provider service for a drive's type.
    pub fn lookup_study_storage_service(
        &self,
        drive: &StorageDrive,
    ) -> StorageResult<Arc<dyn StudyStorageService>> {
        self.registry.lookup_study_storage_service(drive)
    }
}

/// Load a drive with its details on an existing connection.
pub(crate) async fn fetch_drive(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<StorageDrive>, sqlx::Error> {
    let row = sqlx::query_as::<_, StorageDriveRow>(&format!(
        "SELECT {} FROM storage_drives WHERE id = ?",
        DRIVE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(hydrate(conn, row).await?)),
        None => Ok(None),
    }
}

async fn hydrate(
    conn: &mut SqliteConnection,
    row: StorageDriveRow,
) -> Result<StorageDrive, sqlx::Error> {
    let details = load_drive_details(conn, row.id, row.drive_type).await?;
    Ok(row.with_details(details))
}
