//! StorageDriveFolderService: folders registered on drives, their role
//! flags, and the program/study/assay links that reference them.

use super::{
    BEGIN_WRITE,
    details_store::{insert_folder_details, load_folder_details},
    drive_service::fetch_drive,
    error::{StorageError, StorageResult, is_unique_violation},
};
use crate::{
    models::{
        DriveType, FolderOptions, FolderOwner, OwnedFolder, StorageDrive, StorageDriveDetails,
        StorageDriveFolder, StorageDriveFolderDetails, StorageDriveFolderDraft,
        folder::StorageDriveFolderRow,
    },
    paths::{is_valid_name, last_segment, normalize_path},
    providers::{StudyStorageRegistry, StudyStorageService, full_path},
};
use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const FOLDER_COLUMNS: &str = "f.id AS id, f.storage_drive_id AS storage_drive_id, \
     f.path AS path, f.name AS name, f.browser_root AS browser_root, \
     f.study_root AS study_root, f.write_enabled AS write_enabled, \
     f.delete_enabled AS delete_enabled, f.created_at AS created_at, \
     f.updated_at AS updated_at, d.drive_type AS drive_type";

const FOLDER_JOIN: &str =
    "storage_drive_folders f JOIN storage_drives d ON d.id = f.storage_drive_id";

/// A folder row together with its drive's type, which selects the satellite
/// table holding the details.
#[derive(FromRow)]
struct TypedFolderRow {
    #[sqlx(flatten)]
    folder: StorageDriveFolderRow,
    drive_type: DriveType,
}

#[derive(FromRow)]
struct OwnedFolderRow {
    #[sqlx(flatten)]
    typed: TypedFolderRow,
    is_primary: bool,
}

#[derive(Clone)]
pub struct StorageDriveFolderService {
    pub db: Arc<SqlitePool>,
    registry: Arc<StudyStorageRegistry>,
}

impl StorageDriveFolderService {
    pub fn new(db: Arc<SqlitePool>, registry: Arc<StudyStorageRegistry>) -> Self {
        Self { db, registry }
    }

    /// Register a folder on `drive`.
    ///
    /// The details variant must match the drive's type and point at the same
    /// remote location as `path` (bucket and key for S3, drive id for
    /// OneDrive). The normalized path must not already be registered on the
    /// drive. Registering the same path twice is an error.
    pub async fn register_folder(
        &self,
        draft: StorageDriveFolderDraft,
        drive: &StorageDrive,
    ) -> StorageResult<StorageDriveFolder> {
        let folder = prepare_folder(draft, drive)?;

        let mut tx = self.db.begin_with(BEGIN_WRITE).await?;
        insert_folder(&mut *tx, &folder).await?;
        tx.commit().await?;

        info!(
            "Registered folder `{}` on drive {} ({})",
            folder.path, folder.storage_drive_id, folder.id
        );
        Ok(folder)
    }

    /// Register a folder and attach it to `owner` in one transaction, so a
    /// failed attach leaves no unattached registration behind.
    pub async fn register_and_attach(
        &self,
        draft: StorageDriveFolderDraft,
        drive: &StorageDrive,
        owner: FolderOwner,
        primary: bool,
    ) -> StorageResult<OwnedFolder> {
        let folder = prepare_folder(draft, drive)?;

        let mut tx = self.db.begin_with(BEGIN_WRITE).await?;
        insert_folder(&mut *tx, &folder).await?;
        insert_link(&mut *tx, owner, folder.id, primary).await?;
        tx.commit().await?;

        info!(
            "Registered folder `{}` on drive {} ({}) for {} (primary: {})",
            folder.path, folder.storage_drive_id, folder.id, owner, primary
        );
        Ok(OwnedFolder { primary, folder })
    }

    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<StorageDriveFolder>> {
        let mut conn = self.db.acquire().await?;
        Ok(fetch_folder(&mut *conn, id).await?)
    }

    /// Look up a folder by its path on a drive. The path is normalized the
    /// same way registration normalizes it.
    pub async fn find_by_path(
        &self,
        drive_id: Uuid,
        path: &str,
    ) -> StorageResult<Option<StorageDriveFolder>> {
        let Some(path) = normalize_path(path) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, TypedFolderRow>(&format!(
            "SELECT {} FROM {} WHERE f.storage_drive_id = ? AND f.path = ?",
            FOLDER_COLUMNS, FOLDER_JOIN
        ))
        .bind(drive_id)
        .bind(path.trim_start_matches('/'))
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

    /// Every folder registered on a drive, ordered by path.
    pub async fn find_by_drive(&self, drive_id: Uuid) -> StorageResult<Vec<StorageDriveFolder>> {
        self.fetch_many(
            &format!(
                "SELECT {} FROM {} WHERE f.storage_drive_id = ? ORDER BY f.path ASC",
                FOLDER_COLUMNS, FOLDER_JOIN
            ),
            Some(drive_id),
        )
        .await
    }

    /// Study root folders on active drives.
    pub async fn find_study_root_folders(&self) -> StorageResult<Vec<StorageDriveFolder>> {
        self.fetch_many(
            &format!(
                "SELECT {} FROM {} WHERE f.study_root = 1 AND d.active = 1
                 ORDER BY d.display_name ASC, f.path ASC",
                FOLDER_COLUMNS, FOLDER_JOIN
            ),
            None,
        )
        .await
    }

    /// Browser root folders on active drives.
    pub async fn find_browser_root_folders(&self) -> StorageResult<Vec<StorageDriveFolder>> {
        self.fetch_many(
            &format!(
                "SELECT {} FROM {} WHERE f.browser_root = 1 AND d.active = 1
                 ORDER BY d.display_name ASC, f.path ASC",
                FOLDER_COLUMNS, FOLDER_JOIN
            ),
            None,
        )
        .await
    }

    pub async fn update_folder_options(
        &self,
        id: Uuid,
        options: FolderOptions,
    ) -> StorageResult<StorageDriveFolder> {
        let result = sqlx::query(
            "UPDATE storage_drive_folders
             SET browser_root = ?, study_root = ?, write_enabled = ?, delete_enabled = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(options.browser_root)
        .bind(options.study_root)
        .bind(options.write_enabled)
        .bind(options.delete_enabled)
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::FolderNotFound(id));
        }
        info!("Updated options of folder {}: {:?}", id, options);
        self.find_by_id(id)
            .await?
            .ok_or(StorageError::FolderNotFound(id))
    }

    /// Link a folder to an owner. With `primary` set, the link becomes the
    /// owner's only primary folder.
    pub async fn attach_folder(
        &self,
        owner: FolderOwner,
        folder_id: Uuid,
        primary: bool,
    ) -> StorageResult<OwnedFolder> {
        let mut tx = self.db.begin_with(BEGIN_WRITE).await?;
        let folder = fetch_folder(&mut *tx, folder_id)
            .await?
            .ok_or(StorageError::FolderNotFound(folder_id))?;

        insert_link(&mut *tx, owner, folder_id, primary).await?;
        tx.commit().await?;

        info!("Attached folder {} to {} (primary: {})", folder_id, owner, primary);
        Ok(OwnedFolder { primary, folder })
    }

    pub async fn detach_folder(&self, owner: FolderOwner, folder_id: Uuid) -> StorageResult<()> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE owner_id = ? AND storage_drive_folder_id = ?",
            owner.table()
        ))
        .bind(owner.id())
        .bind(folder_id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::FolderNotAttached { owner, folder_id });
        }
        info!("Detached folder {} from {}", folder_id, owner);
        Ok(())
    }

    /// Folders attached to an owner, primary first.
    pub async fn find_owner_folders(&self, owner: FolderOwner) -> StorageResult<Vec<OwnedFolder>> {
        let rows = sqlx::query_as::<_, OwnedFolderRow>(&format!(
            "SELECT {}, l.is_primary AS is_primary
             FROM {} l
             JOIN storage_drive_folders f ON f.id = l.storage_drive_folder_id
             JOIN storage_drives d ON d.id = f.storage_drive_id
             WHERE l.owner_id = ?
             ORDER BY l.is_primary DESC, l.created_at ASC",
            FOLDER_COLUMNS,
            owner.table()
        ))
        .bind(owner.id())
        .fetch_all(&*self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        let mut folders = Vec::with_capacity(rows.len());
        for row in rows {
            folders.push(OwnedFolder {
                primary: row.is_primary,
                folder: hydrate(&mut *conn, row.typed).await?,
            });
        }
        debug!("{} has {} attached folders", owner, folders.len());
        Ok(folders)
    }

    pub async fn find_primary_folder(
        &self,
        owner: FolderOwner,
    ) -> StorageResult<Option<StorageDriveFolder>> {
        let row: Option<(Uuid,)> = sqlx::query_as(&format!(
            "SELECT storage_drive_folder_id FROM {} WHERE owner_id = ? AND is_primary = 1",
            owner.table()
        ))
        .bind(owner.id())
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some((folder_id,)) => self.find_by_id(folder_id).await,
            None => Ok(None),
        }
    }

    /// Make `folder_id` the owner's primary folder. Sibling flags are
    /// cleared and the new one set in the same transaction.
    pub async fn set_default_folder(
        &self,
        owner: FolderOwner,
        folder_id: Uuid,
    ) -> StorageResult<OwnedFolder> {
        let mut tx = self.db.begin_with(BEGIN_WRITE).await?;

        let linked: Option<(Uuid,)> = sqlx::query_as(&format!(
            "SELECT id FROM {} WHERE owner_id = ? AND storage_drive_folder_id = ?",
            owner.table()
        ))
        .bind(owner.id())
        .bind(folder_id)
        .fetch_optional(&mut *tx)
        .await?;
        if linked.is_none() {
            return Err(StorageError::FolderNotAttached { owner, folder_id });
        }

        mark_primary(&mut *tx, owner, folder_id).await?;
        let folder = fetch_folder(&mut *tx, folder_id)
            .await?
            .ok_or(StorageError::FolderNotFound(folder_id))?;
        tx.commit().await?;

        info!("Folder {} is now the primary folder of {}", folder_id, owner);
        Ok(OwnedFolder {
            primary: true,
            folder,
        })
    }

    /// Resolve the provider service for a folder's details type.
    pub fn lookup_study_storage_service(
        &self,
        folder: &StorageDriveFolder,
    ) -> StorageResult<Arc<dyn StudyStorageService>> {
        self.registry.lookup_study_storage_service(folder)
    }

    async fn fetch_many(
        &self,
        sql: &str,
        drive_id: Option<Uuid>,
    ) -> StorageResult<Vec<StorageDriveFolder>> {
        let mut query = sqlx::query_as::<_, TypedFolderRow>(sql);
        if let Some(drive_id) = drive_id {
            query = query.bind(drive_id);
        }
        let rows = query.fetch_all(&*self.db).await?;

        let mut conn = self.db.acquire().await?;
        let mut folders = Vec::with_capacity(rows.len());
        for row in rows {
            folders.push(hydrate(&mut *conn, row).await?);
        }
        Ok(folders)
    }
}

/// Validate a draft against its drive and build the folder to insert.
fn prepare_folder(
    draft: StorageDriveFolderDraft,
    drive: &StorageDrive,
) -> StorageResult<StorageDriveFolder> {
    let path = normalize_path(&draft.path)
        .ok_or_else(|| StorageError::InvalidPath(draft.path.clone()))?
        .trim_start_matches('/')
        .to_string();
    check_details(drive, &path, &draft.details)?;

    let name = match draft.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            if !is_valid_name(name) {
                return Err(StorageError::InvalidName(name.to_string()));
            }
            name.to_string()
        }
        _ if path.is_empty() => drive.display_name.clone(),
        _ => last_segment(&path).to_string(),
    };

    let now = Utc::now();
    Ok(StorageDriveFolder {
        id: Uuid::new_v4(),
        storage_drive_id: drive.id,
        path,
        name,
        options: draft.options,
        details: draft.details,
        created_at: now,
        updated_at: now,
    })
}

/// Insert a folder row and its details. The drive must exist and the path
/// must be free on it.
async fn insert_folder(
    conn: &mut SqliteConnection,
    folder: &StorageDriveFolder,
) -> StorageResult<()> {
    if fetch_drive(&mut *conn, folder.storage_drive_id).await?.is_none() {
        return Err(StorageError::DriveNotFound(folder.storage_drive_id));
    }

    let existing: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM storage_drive_folders WHERE storage_drive_id = ? AND path = ?",
    )
    .bind(folder.storage_drive_id)
    .bind(&folder.path)
    .fetch_optional(&mut *conn)
    .await?;
    if existing.is_some() {
        return Err(StorageError::FolderPathExists {
            drive_id: folder.storage_drive_id,
            path: folder.path.clone(),
        });
    }

    let inserted = sqlx::query(
        "INSERT INTO storage_drive_folders
            (id, storage_drive_id, path, name, browser_root, study_root,
             write_enabled, delete_enabled, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(folder.id)
    .bind(folder.storage_drive_id)
    .bind(&folder.path)
    .bind(&folder.name)
    .bind(folder.options.browser_root)
    .bind(folder.options.study_root)
    .bind(folder.options.write_enabled)
    .bind(folder.options.delete_enabled)
    .bind(folder.created_at)
    .bind(folder.updated_at)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(StorageError::FolderPathExists {
                drive_id: folder.storage_drive_id,
                path: folder.path.clone(),
            });
        }
        Err(err) => return Err(StorageError::Sqlx(err)),
    }

    insert_folder_details(&mut *conn, folder.id, &folder.details).await?;
    Ok(())
}

/// Insert an owner link, then make it primary when asked.
async fn insert_link(
    conn: &mut SqliteConnection,
    owner: FolderOwner,
    folder_id: Uuid,
    primary: bool,
) -> StorageResult<()> {
    let inserted = sqlx::query(&format!(
        "INSERT INTO {} (id, owner_id, storage_drive_folder_id, is_primary, created_at)
         VALUES (?, ?, ?, 0, ?)",
        owner.table()
    ))
    .bind(Uuid::new_v4())
    .bind(owner.id())
    .bind(folder_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(StorageError::FolderAlreadyAttached { owner, folder_id });
        }
        Err(err) => return Err(StorageError::Sqlx(err)),
    }

    if primary {
        mark_primary(&mut *conn, owner, folder_id).await?;
    }
    Ok(())
}

/// Check a folder payload against the drive it is registered on.
fn check_details(
    drive: &StorageDrive,
    path: &str,
    details: &StorageDriveFolderDetails,
) -> StorageResult<()> {
    match (&drive.details, details) {
        (StorageDriveDetails::Local(_), StorageDriveFolderDetails::Local(_))
        | (StorageDriveDetails::Egnyte(_), StorageDriveFolderDetails::Egnyte(_)) => Ok(()),
        (StorageDriveDetails::S3(bucket), StorageDriveFolderDetails::S3(folder)) => {
            if folder.bucket_name != bucket.bucket_name {
                return Err(inconsistent("bucketName", &bucket.bucket_name, &folder.bucket_name));
            }
            let expected = full_path(drive, path)?;
            let expected = expected.trim_matches('/');
            let key = normalize_path(&folder.key).unwrap_or_else(|| folder.key.clone());
            if key.trim_matches('/') != expected {
                return Err(inconsistent("key", expected, &folder.key));
            }
            Ok(())
        }
        (StorageDriveDetails::OneDrive(onedrive), StorageDriveFolderDetails::OneDrive(folder)) => {
            if folder.drive_id != onedrive.drive_id {
                return Err(inconsistent("driveId", &onedrive.drive_id, &folder.drive_id));
            }
            if let Some(remote_path) = &folder.path {
                let expected = full_path(drive, path)?;
                if remote_path.trim_matches('/') != expected.trim_matches('/') {
                    return Err(inconsistent("path", &expected, remote_path));
                }
            }
            Ok(())
        }
        (drive_details, folder_details) => Err(StorageError::DetailsMismatch {
            expected: drive_details.drive_type(),
            actual: folder_details.drive_type(),
        }),
    }
}

fn inconsistent(field: &'static str, expected: &str, actual: &str) -> StorageError {
    StorageError::DetailsInconsistent {
        field,
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// Clear every primary flag of the owner, then set it on `folder_id`.
/// Clearing first keeps the partial unique index satisfied row by row.
async fn mark_primary(
    conn: &mut SqliteConnection,
    owner: FolderOwner,
    folder_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "UPDATE {} SET is_primary = 0 WHERE owner_id = ? AND is_primary = 1",
        owner.table()
    ))
    .bind(owner.id())
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "UPDATE {} SET is_primary = 1 WHERE owner_id = ? AND storage_drive_folder_id = ?",
        owner.table()
    ))
    .bind(owner.id())
    .bind(folder_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Load a folder with its details on an existing connection.
pub(crate) async fn fetch_folder(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<StorageDriveFolder>, sqlx::Error> {
    let row = sqlx::query_as::<_, TypedFolderRow>(&format!(
        "SELECT {} FROM {} WHERE f.id = ?",
        FOLDER_COLUMNS, FOLDER_JOIN
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
    row: TypedFolderRow,
) -> Result<StorageDriveFolder, sqlx::Error> {
    let details = load_folder_details(conn, row.folder.id, row.drive_type).await?;
    Ok(row.folder.with_details(details))
}
