//! OneDrive / SharePoint provider over Microsoft Graph v1.0.
//!
//! A drive is one Graph drive (a OneDrive or a SharePoint document library)
//! identified by its drive id. Folder details keep the Graph item id so
//! registered folders are addressed by id rather than by path.

use super::{
    FileStorageError, FileStorageResult, StudyStorageService, check_response,
    ensure_folder_provider, full_path, relative_path, segment_url,
};
use crate::{
    models::{
        DriveType, StorageDrive, StorageDriveDetails, StorageDriveFolder,
        StorageDriveFolderDetails, StorageFile, StorageFolder, folder::OneDriveFolderDetails,
    },
    paths::{is_valid_name, join_path, last_segment},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,
    #[serde(default)]
    web_url: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    last_modified_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    e_tag: Option<String>,
    #[serde(default)]
    folder: Option<serde_json::Value>,
}

impl DriveItem {
    fn is_folder(&self) -> bool {
        self.folder.is_some()
    }
}

#[derive(Deserialize, Debug)]
struct DriveItemPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Clone, Debug)]
pub struct OneDriveStudyStorageService {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl OneDriveStudyStorageService {
    pub fn new(http: reqwest::Client, token: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            http,
            token: token.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
        }
    }

    fn drive_id(drive: &StorageDrive) -> FileStorageResult<&str> {
        match &drive.details {
            StorageDriveDetails::OneDrive(details) => Ok(details.drive_id.as_str()),
            other => Err(FileStorageError::DetailsMismatch {
                provider: DriveType::OneDrive,
                actual: other.drive_type(),
            }),
        }
    }

    fn item_by_path_url(&self, drive_id: &str, full: &str) -> FileStorageResult<Url> {
        if full.trim_matches('/').is_empty() {
            segment_url(&self.base_url, &["drives", drive_id, "root"], "")
        } else {
            segment_url(&self.base_url, &["drives", drive_id, "root:"], full)
        }
    }

    async fn get_item(&self, url: Url, display: &str) -> FileStorageResult<DriveItem> {
        debug!("GET {}", url);
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = check_response(DriveType::OneDrive, response, display).await?;
        Ok(response.json().await?)
    }

    /// Fetch every child of an item, following `@odata.nextLink`.
    async fn list_children(
        &self,
        drive_id: &str,
        item_id: &str,
        display: &str,
    ) -> FileStorageResult<Vec<DriveItem>> {
        let mut next = Some(segment_url(
            &self.base_url,
            &["drives", drive_id, "items", item_id, "children"],
            "",
        )?);
        let mut items = Vec::new();
        while let Some(url) = next.take() {
            debug!("GET {}", url);
            let response = self.http.get(url).bearer_auth(&self.token).send().await?;
            let response = check_response(DriveType::OneDrive, response, display).await?;
            let page: DriveItemPage = response.json().await?;
            items.extend(page.value);
            next = match page.next_link {
                Some(link) => Some(
                    Url::parse(&link).map_err(|e| FileStorageError::remote(DriveType::OneDrive, e.to_string()))?,
                ),
                None => None,
            };
        }
        Ok(items)
    }

    async fn listing(
        &self,
        drive_id: &str,
        item: DriveItem,
        rel: &str,
    ) -> FileStorageResult<StorageFolder> {
        if !item.is_folder() {
            return Err(FileStorageError::NotFound(rel.to_string()));
        }
        let children = self.list_children(drive_id, &item.id, rel).await?;
        let mut folder = StorageFolder {
            name: if rel.is_empty() {
                item.name
            } else {
                last_segment(rel).to_string()
            },
            path: rel.to_string(),
            folder_id: Some(item.id),
            url: item.web_url,
            ..Default::default()
        };
        for child in children {
            let child_path = join_path(rel, &child.name);
            if child.is_folder() {
                folder.sub_folders.push(StorageFolder {
                    name: child.name,
                    path: child_path,
                    folder_id: Some(child.id),
                    url: child.web_url,
                    ..Default::default()
                });
            } else {
                folder.files.push(StorageFile {
                    name: child.name,
                    path: child_path,
                    size: child.size,
                    last_modified: child.last_modified_date_time,
                    url: child.web_url,
                    e_tag: child.e_tag,
                });
            }
        }
        Ok(folder)
    }

    fn folder_item_id(folder: &StorageDriveFolder) -> FileStorageResult<&str> {
        ensure_folder_provider(DriveType::OneDrive, folder)?;
        match &folder.details {
            StorageDriveFolderDetails::OneDrive(details) => Ok(details.folder_id.as_str()),
            other => Err(FileStorageError::DetailsMismatch {
                provider: DriveType::OneDrive,
                actual: other.drive_type(),
            }),
        }
    }
}

#[async_trait]
impl StudyStorageService for OneDriveStudyStorageService {
    fn drive_type(&self) -> DriveType {
        DriveType::OneDrive
    }

    async fn find_folder(
        &self,
        drive: &StorageDrive,
        folder: &StorageDriveFolder,
    ) -> FileStorageResult<StorageFolder> {
        let drive_id = Self::drive_id(drive)?;
        let item_id = Self::folder_item_id(folder)?;
        let url = segment_url(&self.base_url, &["drives", drive_id, "items", item_id], "")?;
        let item = self.get_item(url, &folder.path).await?;
        self.listing(drive_id, item, &folder.path).await
    }

    async fn find_folder_by_path(
        &self,
        drive: &StorageDrive,
        path: &str,
    ) -> FileStorageResult<StorageFolder> {
        let drive_id = Self::drive_id(drive)?;
        let full = full_path(drive, path)?;
        let item = self
            .get_item(self.item_by_path_url(drive_id, &full)?, path)
            .await?;
        self.listing(drive_id, item, &relative_path(drive, &full))
            .await
    }

    async fn create_folder(
        &self,
        drive: &StorageDrive,
        parent_path: &str,
        name: &str,
    ) -> FileStorageResult<StorageFolder> {
        if !is_valid_name(name) {
            return Err(FileStorageError::InvalidPath(name.to_string()));
        }
        let drive_id = Self::drive_id(drive)?;
        let parent_full = full_path(drive, parent_path)?;
        let parent = self
            .get_item(self.item_by_path_url(drive_id, &parent_full)?, parent_path)
            .await?;
        if !parent.is_folder() {
            return Err(FileStorageError::NotFound(parent_path.to_string()));
        }

        let url = segment_url(
            &self.base_url,
            &["drives", drive_id, "items", &parent.id, "children"],
            "",
        )?;
        let target = join_path(&parent_full, name);
        debug!("POST {} ({})", url, name);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({
                "name": name,
                "folder": {},
                "@microsoft.graph.conflictBehavior": "fail"
            }))
            .send()
            .await?;
        let response = check_response(DriveType::OneDrive, response, &target).await?;
        let created: DriveItem = response.json().await?;
        info!("Created OneDrive folder {} ({})", target, created.id);

        Ok(StorageFolder {
            name: created.name,
            path: relative_path(drive, &target),
            folder_id: Some(created.id),
            url: created.web_url,
            ..Default::default()
        })
    }

    async fn save_file(
        &self,
        drive: &StorageDrive,
        folder: &StorageDriveFolder,
        local_file: &Path,
    ) -> FileStorageResult<StorageFile> {
        let drive_id = Self::drive_id(drive)?;
        let item_id = Self::folder_item_id(folder)?;
        let file_name = local_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| is_valid_name(n))
            .ok_or_else(|| FileStorageError::InvalidPath(local_file.display().to_string()))?;

        let url = segment_url(
            &self.base_url,
            &[
                "drives",
                drive_id,
                "items",
                &format!("{}:", item_id),
                &format!("{}:", file_name),
                "content",
            ],
            "",
        )?;
        let bytes = tokio::fs::read(local_file).await?;
        let size = bytes.len() as u64;
        let target = join_path(&folder.path, &file_name);
        debug!("PUT {} ({} bytes)", url, size);

        let response = self
            .http
            .put(url)
            .bearer_auth(&self.token)
            .body(bytes)
            .send()
            .await?;
        let response = check_response(DriveType::OneDrive, response, &target).await?;
        let uploaded: DriveItem = response.json().await?;
        info!("Uploaded {} bytes to OneDrive {}", size, target);

        Ok(StorageFile {
            name: uploaded.name,
            path: target,
            size: uploaded.size.or(Some(size)),
            last_modified: uploaded.last_modified_date_time,
            url: uploaded.web_url,
            e_tag: uploaded.e_tag,
        })
    }

    fn folder_details(
        &self,
        drive: &StorageDrive,
        folder: &StorageFolder,
    ) -> FileStorageResult<StorageDriveFolderDetails> {
        let drive_id = Self::drive_id(drive)?;
        let folder_id = folder
            .folder_id
            .clone()
            .ok_or_else(|| FileStorageError::NotFound(folder.path.clone()))?;
        Ok(StorageDriveFolderDetails::OneDrive(OneDriveFolderDetails {
            drive_id: drive_id.to_string(),
            folder_id,
            web_url: folder.url.clone(),
            path: Some(full_path(drive, &folder.path)?),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::drive::OneDriveDriveDetails,
        providers::test_support::{drive, folder, serve},
    };
    use axum::{
        Json, Router,
        extract::Path as UrlPath,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
    };

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer token")
    }

    /// A Graph stand-in holding folder `01ST` whose children span two pages.
    fn graph(base: String) -> Router {
        let next = format!("{}/pages/2", base);
        Router::new()
            .route(
                "/drives/{drive_id}/items/{item_id}",
                get(|UrlPath((_, item)): UrlPath<(String, String)>, headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return StatusCode::UNAUTHORIZED.into_response();
                    }
                    if item != "01ST" {
                        return StatusCode::NOT_FOUND.into_response();
                    }
                    Json(json!({
                        "id": "01ST",
                        "name": "ST-1",
                        "webUrl": "https://contoso.sharepoint.com/ST-1",
                        "folder": {"childCount": 3}
                    }))
                    .into_response()
                }),
            )
            .route(
                "/drives/{drive_id}/items/{item_id}/children",
                get(move |headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return StatusCode::UNAUTHORIZED.into_response();
                    }
                    Json(json!({
                        "value": [
                            {"id": "02RAW", "name": "raw", "folder": {"childCount": 0}},
                            {"id": "03A", "name": "a.csv", "size": 10}
                        ],
                        "@odata.nextLink": next
                    }))
                    .into_response()
                }),
            )
            .route(
                "/pages/2",
                get(|| async {
                    Json(json!({
                        "value": [{"id": "04B", "name": "b.csv", "size": 20, "eTag": "\"{B},1\""}]
                    }))
                    .into_response()
                }),
            )
    }

    fn registered(drive: &StorageDrive, item_id: &str) -> StorageDriveFolder {
        folder(
            drive,
            "ST-1",
            StorageDriveFolderDetails::OneDrive(OneDriveFolderDetails {
                drive_id: "b!drive".into(),
                folder_id: item_id.into(),
                web_url: None,
                path: Some("Studies/ST-1".into()),
            }),
        )
    }

    #[tokio::test]
    async fn find_folder_follows_next_link() {
        let base = serve(graph).await;
        let service = OneDriveStudyStorageService::new(reqwest::Client::new(), "token", Some(base));
        let drive = onedrive();

        let listing = service
            .find_folder(&drive, &registered(&drive, "01ST"))
            .await
            .unwrap();
        assert_eq!(listing.folder_id.as_deref(), Some("01ST"));
        assert_eq!(listing.sub_folders.len(), 1);
        assert_eq!(listing.sub_folders[0].path, "ST-1/raw");
        let files: Vec<_> = listing.files.iter().map(|f| (f.path.as_str(), f.size)).collect();
        assert_eq!(files, vec![("ST-1/a.csv", Some(10)), ("ST-1/b.csv", Some(20))]);
    }

    #[tokio::test]
    async fn missing_item_and_bad_token_map_to_errors() {
        let base = serve(graph).await;
        let drive = onedrive();

        let service =
            OneDriveStudyStorageService::new(reqwest::Client::new(), "token", Some(base.clone()));
        let err = service
            .find_folder(&drive, &registered(&drive, "01GONE"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileStorageError::NotFound(path) if path == "ST-1"));

        let service = OneDriveStudyStorageService::new(reqwest::Client::new(), "expired", Some(base));
        let err = service
            .find_folder(&drive, &registered(&drive, "01ST"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileStorageError::Unauthorized(DriveType::OneDrive)));
    }

    fn service() -> OneDriveStudyStorageService {
        OneDriveStudyStorageService::new(reqwest::Client::new(), "token", None)
    }

    fn onedrive() -> StorageDrive {
        drive(
            StorageDriveDetails::OneDrive(OneDriveDriveDetails {
                drive_id: "b!drive".into(),
                name: Some("Documents".into()),
                web_url: None,
            }),
            "Studies",
        )
    }

    #[test]
    fn path_urls_use_colon_addressing() {
        let service = service();
        assert_eq!(
            service.item_by_path_url("b!drive", "").unwrap().as_str(),
            "https://graph.microsoft.com/v1.0/drives/b!drive/root"
        );
        assert_eq!(
            service
                .item_by_path_url("b!drive", "Studies/ST 1")
                .unwrap()
                .as_str(),
            "https://graph.microsoft.com/v1.0/drives/b!drive/root:/Studies/ST%201"
        );
    }

    #[test]
    fn drive_item_page_parses_next_link() {
        let page: DriveItemPage = serde_json::from_value(json!({
            "value": [
                {"id": "1", "name": "raw", "folder": {"childCount": 2}},
                {"id": "2", "name": "a.csv", "size": 10, "lastModifiedDateTime": "2024-03-01T10:00:00Z"}
            ],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/drives/x/items/y/children?$skiptoken=abc"
        }))
        .unwrap();
        assert!(page.value[0].is_folder());
        assert!(!page.value[1].is_folder());
        assert!(page.value[1].last_modified_date_time.is_some());
        assert!(page.next_link.is_some());
    }

    #[test]
    fn folder_details_keep_drive_and_item_ids() {
        let remote = StorageFolder {
            name: "ST-1".into(),
            path: "ST-1".into(),
            folder_id: Some("01ABC".into()),
            url: Some("https://contoso.sharepoint.com/ST-1".into()),
            ..Default::default()
        };
        let details = service().folder_details(&onedrive(), &remote).unwrap();
        assert_eq!(
            details,
            StorageDriveFolderDetails::OneDrive(OneDriveFolderDetails {
                drive_id: "b!drive".into(),
                folder_id: "01ABC".into(),
                web_url: Some("https://contoso.sharepoint.com/ST-1".into()),
                path: Some("Studies/ST-1".into()),
            })
        );
    }
}
