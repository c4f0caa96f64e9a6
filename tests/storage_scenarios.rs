use bytes::Bytes;
use futures::stream;
use std::sync::Arc;
use storage_drives::{
    db::{self, connect_in_memory},
    models::{
        DriveType, FolderOptions, FolderOwner, StorageDriveDetails, StorageDriveDraft,
        StorageDriveFolderDetails, StorageDriveFolderDraft,
        drive::{LocalDriveDetails, S3BucketDetails},
        folder::{LocalDriveFolderDetails, S3BucketFolderDetails},
    },
    providers::{LocalStudyStorageService, StudyStorageRegistry},
    routes::AppState,
    staging::stage_stream,
};
use tempfile::TempDir;
use uuid::Uuid;

async fn state(staging: &TempDir) -> AppState {
    let pool = Arc::new(connect_in_memory().await.unwrap());
    let registry =
        Arc::new(StudyStorageRegistry::new().with(Arc::new(LocalStudyStorageService::new())));
    AppState::new(pool, registry, staging.path())
}

fn s3_bucket() -> StorageDriveDraft {
    StorageDriveDraft {
        display_name: "Lab bucket".into(),
        root_path: String::new(),
        details: StorageDriveDetails::S3(S3BucketDetails {
            bucket_name: "lab-data".into(),
            arn: None,
        }),
    }
}

fn s3_folder(key: &str) -> StorageDriveFolderDraft {
    StorageDriveFolderDraft {
        path: key.into(),
        name: None,
        options: FolderOptions::default(),
        details: StorageDriveFolderDetails::S3(S3BucketFolderDetails {
            bucket_name: "lab-data".into(),
            key: key.into(),
            e_tag: None,
        }),
    }
}

#[tokio::test]
async fn s3_folder_is_found_by_path_with_its_drive() {
    let staging = TempDir::new().unwrap();
    let state = state(&staging).await;

    let drive = state.drives.register_drive(s3_bucket()).await.unwrap();
    let folder = state
        .folders
        .register_folder(s3_folder("studies/ABC"), &drive)
        .await
        .unwrap();

    let found = state
        .folders
        .find_by_path(drive.id, "studies/ABC")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, folder.id);
    assert_eq!(found.storage_drive_id, drive.id);
    assert_eq!(
        found.details,
        StorageDriveFolderDetails::S3(S3BucketFolderDetails {
            bucket_name: "lab-data".into(),
            key: "studies/ABC".into(),
            e_tag: None,
        })
    );

    // S3 is not registered in this registry
    assert!(state.folders.lookup_study_storage_service(&found).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_primary_requests_leave_one_primary() {
    let staging = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let url = format!("sqlite://{}", data.path().join("drives.db").display());
    let pool = db::connect(&url, 4).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let registry = Arc::new(StudyStorageRegistry::new());
    let state = AppState::new(Arc::new(pool), registry, staging.path());

    let drive = state.drives.register_drive(s3_bucket()).await.unwrap();
    let study = FolderOwner::Study(Uuid::new_v4());

    let mut ids = Vec::new();
    for key in ["studies/A", "studies/B", "studies/C", "studies/D"] {
        let folder = state
            .folders
            .register_folder(s3_folder(key), &drive)
            .await
            .unwrap();
        state
            .folders
            .attach_folder(study, folder.id, key == "studies/D")
            .await
            .unwrap();
        ids.push(folder.id);
    }

    let requests = (0..3).flat_map(|_| ids[..3].iter().copied()).map(|id| {
        let folders = state.folders.clone();
        tokio::spawn(async move { folders.set_default_folder(study, id).await })
    });
    for outcome in futures::future::join_all(requests).await {
        outcome.unwrap().unwrap();
    }

    let owned = state.folders.find_owner_folders(study).await.unwrap();
    let primaries: Vec<_> = owned.iter().filter(|o| o.primary).collect();
    assert_eq!(primaries.len(), 1);
    assert!(ids[..3].contains(&primaries[0].folder.id));
    assert_eq!(
        state
            .folders
            .find_primary_folder(study)
            .await
            .unwrap()
            .map(|f| f.id),
        Some(primaries[0].folder.id)
    );
}

#[tokio::test]
async fn deactivation_round_trip_loses_nothing() {
    let staging = TempDir::new().unwrap();
    let state = state(&staging).await;
    let drive = state.drives.register_drive(s3_bucket()).await.unwrap();
    let mut root = s3_folder("studies");
    root.options.study_root = true;
    state.folders.register_folder(root, &drive).await.unwrap();
    state
        .folders
        .register_folder(s3_folder("studies/ABC"), &drive)
        .await
        .unwrap();

    let before = state.folders.find_by_drive(drive.id).await.unwrap();
    assert_eq!(state.folders.find_study_root_folders().await.unwrap().len(), 1);

    state.drives.set_drive_active(drive.id, false).await.unwrap();
    assert!(state.folders.find_study_root_folders().await.unwrap().is_empty());
    assert_eq!(state.folders.find_by_drive(drive.id).await.unwrap(), before);

    let restored = state.drives.set_drive_active(drive.id, true).await.unwrap();
    assert_eq!(restored.details, drive.details);
    assert_eq!(state.folders.find_by_drive(drive.id).await.unwrap(), before);
    assert_eq!(state.folders.find_study_root_folders().await.unwrap().len(), 1);
}

#[tokio::test]
async fn local_drive_provision_upload_and_list() {
    let staging = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    let state = state(&staging).await;

    let drive = state
        .drives
        .register_drive(StorageDriveDraft {
            display_name: "Lab share".into(),
            root_path: share.path().to_string_lossy().into_owned(),
            details: StorageDriveDetails::Local(LocalDriveDetails {}),
        })
        .await
        .unwrap();
    let root = state
        .folders
        .register_folder(
            StorageDriveFolderDraft {
                path: String::new(),
                name: None,
                options: FolderOptions {
                    study_root: true,
                    ..FolderOptions::default()
                },
                details: StorageDriveFolderDetails::Local(LocalDriveFolderDetails {}),
            },
            &drive,
        )
        .await
        .unwrap();

    let study = FolderOwner::Study(Uuid::new_v4());
    let owned = state
        .provisioner
        .provision_owner_folder(study, root.id, "ST-42", true)
        .await
        .unwrap();
    assert_eq!(owned.folder.details.drive_type(), DriveType::Local);

    let service = state
        .folders
        .lookup_study_storage_service(&owned.folder)
        .unwrap();
    let staged = stage_stream(
        staging.path(),
        "results.csv",
        stream::iter(vec![Ok(Bytes::from_static(b"sample,value\nS1,3.2\n"))]),
    )
    .await
    .unwrap();
    let file = service
        .save_file(&drive, &owned.folder, &staged.path)
        .await
        .unwrap();
    staged.discard().await;
    assert_eq!(file.path, "ST-42/results.csv");
    assert_eq!(file.size, Some(20));

    let listing = service.find_folder(&drive, &owned.folder).await.unwrap();
    assert_eq!(listing.files.len(), 1);
    assert_eq!(listing.files[0].name, "results.csv");

    let roots = service.find_folder(&drive, &root).await.unwrap();
    assert_eq!(roots.sub_folders.len(), 1);
    assert_eq!(roots.sub_folders[0].path, "ST-42");
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}
