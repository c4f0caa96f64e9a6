//! Satellite-table persistence for provider detail payloads.
//!
//! Every drive and folder row has exactly one satellite row in the table
//! matching its provider. The generic row's `drive_type` selects which table
//! is read back.

use crate::models::{
    DriveType, StorageDriveDetails, StorageDriveFolderDetails,
    drive::{EgnyteDriveDetails, LocalDriveDetails, OneDriveDriveDetails, S3BucketDetails},
    folder::{
        EgnyteFolderDetails, LocalDriveFolderDetails, OneDriveFolderDetails,
        S3BucketFolderDetails,
    },
};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

pub(crate) async fn insert_drive_details(
    conn: &mut SqliteConnection,
    drive_id: Uuid,
    details: &StorageDriveDetails,
) -> Result<(), sqlx::Error> {
    match details {
        StorageDriveDetails::Local(_) => {
            sqlx::query("INSERT INTO local_drives (storage_drive_id) VALUES (?)")
                .bind(drive_id)
                .execute(&mut *conn)
                .await?;
        }
        StorageDriveDetails::S3(s3) => {
            sqlx::query("INSERT INTO s3_buckets (storage_drive_id, bucket_name, arn) VALUES (?, ?, ?)")
                .bind(drive_id)
                .bind(&s3.bucket_name)
                .bind(&s3.arn)
                .execute(&mut *conn)
                .await?;
        }
        StorageDriveDetails::Egnyte(egnyte) => {
            sqlx::query(
                "INSERT INTO egnyte_drives (storage_drive_id, tenant_name, root_folder_id)
                 VALUES (?, ?, ?)",
            )
            .bind(drive_id)
            .bind(&egnyte.tenant_name)
            .bind(&egnyte.root_folder_id)
            .execute(&mut *conn)
            .await?;
        }
        StorageDriveDetails::OneDrive(onedrive) => {
            sqlx::query(
                "INSERT INTO onedrive_drives (storage_drive_id, drive_id, name, web_url)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(drive_id)
            .bind(&onedrive.drive_id)
            .bind(&onedrive.name)
            .bind(&onedrive.web_url)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

#[derive(FromRow)]
struct S3BucketRow {
    bucket_name: String,
    arn: Option<String>,
}

#[derive(FromRow)]
struct EgnyteDriveRow {
    tenant_name: String,
    root_folder_id: Option<String>,
}

#[derive(FromRow)]
struct OneDriveDriveRow {
    drive_id: String,
    name: Option<String>,
    web_url: Option<String>,
}

pub(crate) async fn load_drive_details(
    conn: &mut SqliteConnection,
    drive_id: Uuid,
    drive_type: DriveType,
) -> Result<StorageDriveDetails, sqlx::Error> {
    let details = match drive_type {
        DriveType::Local => {
            sqlx::query("SELECT storage_drive_id FROM local_drives WHERE storage_drive_id = ?")
                .bind(drive_id)
                .fetch_one(&mut *conn)
                .await?;
            StorageDriveDetails::Local(LocalDriveDetails {})
        }
        DriveType::S3 => {
            let row = sqlx::query_as::<_, S3BucketRow>(
                "SELECT bucket_name, arn FROM s3_buckets WHERE storage_drive_id = ?",
            )
            .bind(drive_id)
            .fetch_one(&mut *conn)
            .await?;
            StorageDriveDetails::S3(S3BucketDetails {
                bucket_name: row.bucket_name,
                arn: row.arn,
            })
        }
        DriveType::Egnyte => {
            let row = sqlx::query_as::<_, EgnyteDriveRow>(
                "SELECT tenant_name, root_folder_id FROM egnyte_drives WHERE storage_drive_id = ?",
            )
            .bind(drive_id)
            .fetch_one(&mut *conn)
            .await?;
            StorageDriveDetails::Egnyte(EgnyteDriveDetails {
                tenant_name: row.tenant_name,
                root_folder_id: row.root_folder_id,
            })
        }
        DriveType::OneDrive => {
            let row = sqlx::query_as::<_, OneDriveDriveRow>(
                "SELECT drive_id, name, web_url FROM onedrive_drives WHERE storage_drive_id = ?",
            )
            .bind(drive_id)
            .fetch_one(&mut *conn)
            .await?;
            StorageDriveDetails::OneDrive(OneDriveDriveDetails {
                drive_id: row.drive_id,
                name: row.name,
                web_url: row.web_url,
            })
        }
    };
    Ok(details)
}

pub(crate) async fn insert_folder_details(
    conn: &mut SqliteConnection,
    folder_id: Uuid,
    details: &StorageDriveFolderDetails,
) -> Result<(), sqlx::Error> {
    match details {
        StorageDriveFolderDetails::Local(_) => {
            sqlx::query("INSERT INTO local_drive_folders (storage_drive_folder_id) VALUES (?)")
                .bind(folder_id)
                .execute(&mut *conn)
                .await?;
        }
        StorageDriveFolderDetails::S3(s3) => {
            sqlx::query(
                "INSERT INTO s3_bucket_folders (storage_drive_folder_id, bucket_name, key, e_tag)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(folder_id)
            .bind(&s3.bucket_name)
            .bind(&s3.key)
            .bind(&s3.e_tag)
            .execute(&mut *conn)
            .await?;
        }
        StorageDriveFolderDetails::Egnyte(egnyte) => {
            sqlx::query(
                "INSERT INTO egnyte_folders (storage_drive_folder_id, folder_id, web_url)
                 VALUES (?, ?, ?)",
            )
            .bind(folder_id)
            .bind(&egnyte.folder_id)
            .bind(&egnyte.web_url)
            .execute(&mut *conn)
            .await?;
        }
        StorageDriveFolderDetails::OneDrive(onedrive) => {
            sqlx::query(
                "INSERT INTO onedrive_folders (storage_drive_folder_id, drive_id, folder_id, web_url, path)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(folder_id)
            .bind(&onedrive.drive_id)
            .bind(&onedrive.folder_id)
            .bind(&onedrive.web_url)
            .bind(&onedrive.path)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

#[derive(FromRow)]
struct S3FolderRow {
    bucket_name: String,
    key: String,
    e_tag: Option<String>,
}

#[derive(FromRow)]
struct EgnyteFolderRow {
    folder_id: String,
    web_url: Option<String>,
}

#[derive(FromRow)]
struct OneDriveFolderRow {
    drive_id: String,
    folder_id: String,
    web_url: Option<String>,
    path: Option<String>,
}

pub(crate) async fn load_folder_details(
    conn: &mut SqliteConnection,
    folder_id: Uuid,
    drive_type: DriveType,
) -> Result<StorageDriveFolderDetails, sqlx::Error> {
    let details = match drive_type {
        DriveType::Local => {
            sqlx::query(
                "SELECT storage_drive_folder_id FROM local_drive_folders
                 WHERE storage_drive_folder_id = ?",
            )
            .bind(folder_id)
            .fetch_one(&mut *conn)
            .await?;
            StorageDriveFolderDetails::Local(LocalDriveFolderDetails {})
        }
        DriveType::S3 => {
            let row = sqlx::query_as::<_, S3FolderRow>(
                "SELECT bucket_name, key, e_tag FROM s3_bucket_folders
                 WHERE storage_drive_folder_id = ?",
            )
            .bind(folder_id)
            .fetch_one(&mut *conn)
            .await?;
            StorageDriveFolderDetails::S3(S3BucketFolderDetails {
                bucket_name: row.bucket_name,
                key: row.key,
                e_tag: row.e_tag,
            })
        }
        DriveType::Egnyte => {
            let row = sqlx::query_as::<_, EgnyteFolderRow>(
                "SELECT folder_id, web_url FROM egnyte_folders WHERE storage_drive_folder_id = ?",
            )
            .bind(folder_id)
            .fetch_one(&mut *conn)
            .await?;
            StorageDriveFolderDetails::Egnyte(EgnyteFolderDetails {
                folder_id: row.folder_id,
                web_url: row.web_url,
            })
        }
        DriveType::OneDrive => {
            let row = sqlx::query_as::<_, OneDriveFolderRow>(
                "SELECT drive_id, folder_id, web_url, path FROM onedrive_folders
                 WHERE storage_drive_folder_id = ?",
            )
            .bind(folder_id)
            .fetch_one(&mut *conn)
            .await?;
            StorageDriveFolderDetails::OneDrive(OneDriveFolderDetails {
                drive_id: row.drive_id,
                folder_id: row.folder_id,
                web_url: row.web_url,
                path: row.path,
            })
        }
    };
    Ok(details)
}
