//! FileStorageLocationService: legacy mount points reached through an
//! integration instance.

use super::{
    BEGIN_WRITE,
    error::{StorageError, StorageResult},
};
use crate::{
    models::{FileStorageLocation, FileStorageLocationDraft},
    paths::{normalize_path, paths_overlap},
    providers::{StudyStorageRegistry, StudyStorageService},
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const LOCATION_COLUMNS: &str = "id, integration_instance_id, drive_type, display_name, name, \
     root_folder_path, reference_id, url, permissions, default_study_location, \
     default_data_location, active, created_at, updated_at";

/// Which of the two default-use flags to move.
#[derive(Clone, Copy, Debug)]
enum DefaultUse {
    Study,
    Data,
}

impl DefaultUse {
    fn column(self) -> &'static str {
        match self {
            DefaultUse::Study => "default_study_location",
            DefaultUse::Data => "default_data_location",
        }
    }
}

#[derive(Clone)]
pub struct FileStorageLocationService {
    pub db: Arc<SqlitePool>,
    registry: Arc<StudyStorageRegistry>,
}

impl FileStorageLocationService {
    pub fn new(db: Arc<SqlitePool>, registry: Arc<StudyStorageRegistry>) -> Self {
        Self { db, registry }
    }

    /// Register a location. Its root folder path must not overlap the root
    /// of any other location on the same provider and integration instance.
    pub async fn register_location(
        &self,
        draft: FileStorageLocationDraft,
    ) -> StorageResult<FileStorageLocation> {
        let display_name = draft.display_name.trim();
        if display_name.is_empty() {
            return Err(StorageError::InvalidName(draft.display_name.clone()));
        }
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(StorageError::InvalidName(draft.name.clone()));
        }
        let root_folder_path = normalize_path(&draft.root_folder_path)
            .ok_or_else(|| StorageError::InvalidPath(draft.root_folder_path.clone()))?;

        let now = Utc::now();
        let location = FileStorageLocation {
            id: Uuid::new_v4(),
            integration_instance_id: draft.integration_instance_id,
            drive_type: draft.drive_type,
            display_name: display_name.to_string(),
            name: name.to_string(),
            root_folder_path,
            reference_id: draft.reference_id,
            url: draft.url,
            permissions: draft.permissions,
            default_study_location: draft.default_study_location,
            default_data_location: draft.default_data_location,
            active: true,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.db.begin_with(BEGIN_WRITE).await?;

        let siblings: Vec<(String, String)> = sqlx::query_as(
            "SELECT display_name, root_folder_path FROM file_storage_locations
             WHERE drive_type = ? AND integration_instance_id IS ?",
        )
        .bind(location.drive_type)
        .bind(location.integration_instance_id)
        .fetch_all(&mut *tx)
        .await?;

        if let Some((existing, _)) = siblings
            .iter()
            .find(|(_, path)| paths_overlap(path, &location.root_folder_path))
        {
            return Err(StorageError::LocationOverlap {
                path: location.root_folder_path,
                existing: existing.clone(),
            });
        }

        if location.default_study_location {
            clear_default(&mut *tx, DefaultUse::Study).await?;
        }
        if location.default_data_location {
            clear_default(&mut *tx, DefaultUse::Data).await?;
        }

        sqlx::query(&format!(
            "INSERT INTO file_storage_locations ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            LOCATION_COLUMNS
        ))
        .bind(location.id)
        .bind(location.integration_instance_id)
        .bind(location.drive_type)
        .bind(&location.display_name)
        .bind(&location.name)
        .bind(&location.root_folder_path)
        .bind(&location.reference_id)
        .bind(&location.url)
        .bind(location.permissions)
        .bind(location.default_study_location)
        .bind(location.default_data_location)
        .bind(location.active)
        .bind(location.created_at)
        .bind(location.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            "Registered {} location `{}` at `{}` ({})",
            location.drive_type, location.display_name, location.root_folder_path, location.id
        );
        Ok(location)
    }

    pub async fn find_location_by_id(&self, id: Uuid) -> StorageResult<Option<FileStorageLocation>> {
        let mut conn = self.db.acquire().await?;
        Ok(fetch_location(&mut *conn, id).await?)
    }

    pub async fn find_all_locations(&self) -> StorageResult<Vec<FileStorageLocation>> {
        let locations = sqlx::query_as::<_, FileStorageLocation>(&format!(
            "SELECT {} FROM file_storage_locations ORDER BY display_name ASC",
            LOCATION_COLUMNS
        ))
        .fetch_all(&*self.db)
        .await?;
        debug!("Loaded {} file storage locations", locations.len());
        Ok(locations)
    }

    pub async fn find_default_study_location(&self) -> StorageResult<Option<FileStorageLocation>> {
        self.find_default(DefaultUse::Study).await
    }

    pub async fn find_default_data_location(&self) -> StorageResult<Option<FileStorageLocation>> {
        self.find_default(DefaultUse::Data).await
    }

    pub async fn set_default_study_location(&self, id: Uuid) -> StorageResult<FileStorageLocation> {
        self.set_default(id, DefaultUse::Study).await
    }

    pub async fn set_default_data_location(&self, id: Uuid) -> StorageResult<FileStorageLocation> {
        self.set_default(id, DefaultUse::Data).await
    }

    pub async fn set_location_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> StorageResult<FileStorageLocation> {
        let result = sqlx::query(
            "UPDATE file_storage_locations SET active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(active)
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::LocationNotFound(id));
        }
        info!(
            "File storage location {} {}",
            id,
            if active { "activated" } else { "deactivated" }
        );
        self.find_location_by_id(id)
            .await?
            .ok_or(StorageError::LocationNotFound(id))
    }

    /// Resolve the provider service for a location's type.
    pub fn lookup_study_storage_service(
        &self,
        location: &FileStorageLocation,
    ) -> StorageResult<Arc<dyn StudyStorageService>> {
        self.registry.lookup_study_storage_service(location)
    }

    async fn find_default(&self, usage: DefaultUse) -> StorageResult<Option<FileStorageLocation>> {
        Ok(sqlx::query_as::<_, FileStorageLocation>(&format!(
            "SELECT {} FROM file_storage_locations WHERE {} = 1",
            LOCATION_COLUMNS,
            usage.column()
        ))
        .fetch_optional(&*self.db)
        .await?)
    }

    async fn set_default(&self, id: Uuid, usage: DefaultUse) -> StorageResult<FileStorageLocation> {
        let mut tx = self.db.begin_with(BEGIN_WRITE).await?;
        if fetch_location(&mut *tx, id).await?.is_none() {
            return Err(StorageError::LocationNotFound(id));
        }

        clear_default(&mut *tx, usage).await?;
        sqlx::query(&format!(
            "UPDATE file_storage_locations SET {} = 1, updated_at = ? WHERE id = ?",
            usage.column()
        ))
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let location = fetch_location(&mut *tx, id)
            .await?
            .ok_or(StorageError::LocationNotFound(id))?;
        tx.commit().await?;

        info!("Location {} is now the {:?} default", id, usage);
        Ok(location)
    }
}

async fn clear_default(conn: &mut SqliteConnection, usage: DefaultUse) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "UPDATE file_storage_locations SET {col} = 0, updated_at = ? WHERE {col} = 1",
        col = usage.column()
    ))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_location(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<FileStorageLocation>, sqlx::Error> {
    sqlx::query_as::<_, FileStorageLocation>(&format!(
        "SELECT {} FROM file_storage_locations WHERE id = ?",
        LOCATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::connect_in_memory,
        models::{DriveType, StoragePermissions},
        providers::LocalStudyStorageService,
    };

    async fn service_with(registry: StudyStorageRegistry) -> FileStorageLocationService {
        let pool = connect_in_memory().await.unwrap();
        FileStorageLocationService::new(Arc::new(pool), Arc::new(registry))
    }

    async fn service() -> FileStorageLocationService {
        service_with(StudyStorageRegistry::new()).await
    }

    fn draft(name: &str, drive_type: DriveType, root: &str) -> FileStorageLocationDraft {
        FileStorageLocationDraft {
            integration_instance_id: None,
            drive_type,
            display_name: name.into(),
            name: name.to_lowercase(),
            root_folder_path: root.into(),
            reference_id: None,
            url: None,
            permissions: StoragePermissions::ReadWrite,
            default_study_location: false,
            default_data_location: false,
        }
    }

    #[tokio::test]
    async fn register_and_find() {
        let service = service().await;
        let location = service
            .register_location(draft("Studies", DriveType::Local, "/data/studies/"))
            .await
            .unwrap();
        assert_eq!(location.root_folder_path, "/data/studies");
        assert!(location.active);

        let found = service.find_location_by_id(location.id).await.unwrap().unwrap();
        assert_eq!(found.id, location.id);
        assert_eq!(found.root_folder_path, location.root_folder_path);
        assert_eq!(found.permissions, StoragePermissions::ReadWrite);
        assert!(service.find_location_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overlapping_roots_are_rejected() {
        let service = service().await;
        service
            .register_location(draft("Studies", DriveType::Local, "/data/studies"))
            .await
            .unwrap();

        let err = service
            .register_location(draft("Nested", DriveType::Local, "/data/studies/ST-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::LocationOverlap { existing, .. } if existing == "Studies"));

        let err = service
            .register_location(draft("Parent", DriveType::Local, "/data"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::LocationOverlap { .. }));

        service
            .register_location(draft("Sibling", DriveType::Local, "/data/studies-archive"))
            .await
            .unwrap();
        service
            .register_location(draft("Other provider", DriveType::S3, "/data/studies"))
            .await
            .unwrap();

        let mut other_instance = draft("Other instance", DriveType::Local, "/data/studies");
        other_instance.integration_instance_id = Some(Uuid::new_v4());
        service.register_location(other_instance).await.unwrap();

        assert_eq!(service.find_all_locations().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn only_one_default_of_each_kind() {
        let service = service().await;
        let mut first = draft("First", DriveType::Local, "/a");
        first.default_study_location = true;
        first.default_data_location = true;
        let first = service.register_location(first).await.unwrap();

        let mut second = draft("Second", DriveType::Local, "/b");
        second.default_study_location = true;
        let second = service.register_location(second).await.unwrap();

        assert_eq!(
            service.find_default_study_location().await.unwrap().unwrap().id,
            second.id
        );
        assert_eq!(
            service.find_default_data_location().await.unwrap().unwrap().id,
            first.id
        );

        service.set_default_data_location(second.id).await.unwrap();
        let all = service.find_all_locations().await.unwrap();
        assert_eq!(all.iter().filter(|l| l.default_data_location).count(), 1);
        assert_eq!(all.iter().filter(|l| l.default_study_location).count(), 1);

        let err = service.set_default_study_location(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StorageError::LocationNotFound(_)));
    }

    #[tokio::test]
    async fn deactivation_keeps_the_row() {
        let service = service().await;
        let location = service
            .register_location(draft("Archive", DriveType::Local, "/archive"))
            .await
            .unwrap();
        let inactive = service.set_location_active(location.id, false).await.unwrap();
        assert!(!inactive.active);
        assert_eq!(inactive.root_folder_path, location.root_folder_path);
        assert!(service.set_location_active(location.id, true).await.unwrap().active);
    }

    #[tokio::test]
    async fn lookup_resolves_by_location_type() {
        let service =
            service_with(StudyStorageRegistry::new().with(Arc::new(LocalStudyStorageService::new())))
                .await;
        let local = service
            .register_location(draft("Local", DriveType::Local, "/l"))
            .await
            .unwrap();
        let onedrive = service
            .register_location(draft("Graph", DriveType::OneDrive, "/Studies"))
            .await
            .unwrap();

        assert_eq!(
            service.lookup_study_storage_service(&local).unwrap().drive_type(),
            DriveType::Local
        );
        assert!(matches!(
            service.lookup_study_storage_service(&onedrive).err().unwrap(),
            StorageError::ProviderNotRegistered(DriveType::OneDrive)
        ));
    }
}
