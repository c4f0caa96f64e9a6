use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde_json::{Value, json};
use std::sync::Arc;
use storage_drives::{
    db::connect_in_memory,
    providers::{LocalStudyStorageService, StudyStorageRegistry},
    routes::{AppState, routes},
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use uuid::Uuid;

struct TestApp {
    base: String,
    http: Client,
    share: TempDir,
    staging: TempDir,
}

impl TestApp {
    async fn spawn() -> Self {
        let staging = TempDir::new().unwrap();
        let share = TempDir::new().unwrap();
        let pool = Arc::new(connect_in_memory().await.unwrap());
        let registry =
            Arc::new(StudyStorageRegistry::new().with(Arc::new(LocalStudyStorageService::new())));
        let app = routes().with_state(AppState::new(pool, registry, staging.path()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            http: Client::new(),
            share,
            staging,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.http.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .http
            .request(method, self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, body).await
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PUT, path, body).await
    }

    /// Register a local drive on the share directory with a writable root
    /// folder. Returns `(drive_id, folder_id)`.
    async fn local_drive_with_root(&self) -> (String, String) {
        let (status, drive) = self
            .post(
                "/drives",
                json!({
                    "displayName": "Lab share",
                    "rootPath": self.share.path().to_string_lossy(),
                    "details": {"type": "LOCAL"}
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let drive_id = drive["id"].as_str().unwrap().to_string();

        let (status, folder) = self
            .post(
                &format!("/drives/{}/folders", drive_id),
                json!({
                    "path": "",
                    "options": {"studyRoot": true},
                    "details": {"type": "LOCAL"}
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        (drive_id, folder["id"].as_str().unwrap().to_string())
    }
}

#[tokio::test]
async fn health_endpoints_report_ok() {
    let app = TestApp::spawn().await;
    let (status, body) = app.get("/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.get("/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["providers"], json!(["LOCAL"]));
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let app = TestApp::spawn().await;
    let id = Uuid::new_v4();
    for path in [
        format!("/drives/{}", id),
        format!("/drives/{}/folders", id),
        format!("/folders/{}", id),
        format!("/folders/{}/contents", id),
        format!("/locations/{}", id),
    ] {
        let (status, body) = app.get(&path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
        assert_eq!(body["status"], 404);
    }

    let (status, _) = app
        .put(&format!("/locations/{}/default-study", id), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_folder_path_conflicts() {
    let app = TestApp::spawn().await;
    let (drive_id, _) = app.local_drive_with_root().await;

    let (status, body) = app
        .post(
            &format!("/drives/{}/folders", drive_id),
            json!({"path": "/", "details": {"type": "LOCAL"}}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already registered"));
}

#[tokio::test]
async fn inconsistent_folder_details_are_bad_requests() {
    let app = TestApp::spawn().await;
    let (status, drive) = app
        .post(
            "/drives",
            json!({
                "displayName": "Lab bucket",
                "details": {"type": "S3", "bucketName": "lab-data"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let folders = format!("/drives/{}/folders", drive["id"].as_str().unwrap());

    let (status, _) = app
        .post(
            &folders,
            json!({
                "path": "studies/ABC",
                "details": {"type": "S3", "bucketName": "someone-elses-bucket", "key": "studies/ABC"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &folders,
            json!({"path": "studies/ABC", "details": {"type": "LOCAL"}}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, listed) = app.get(&folders).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn inactive_drive_cannot_be_browsed_listed_or_written() {
    let app = TestApp::spawn().await;
    let (drive_id, folder_id) = app.local_drive_with_root().await;

    let (status, _) = app.get(&format!("/folders/{}/contents", folder_id)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, drive) = app
        .put(&format!("/drives/{}/status", drive_id), json!({"active": false}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drive["active"], false);

    let (status, _) = app.get(&format!("/drives/{}/browse?path=", drive_id)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app.get(&format!("/folders/{}/contents", folder_id)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let form = Form::new().part("file", Part::bytes(b"x".to_vec()).file_name("a.csv"));
    let response = app
        .http
        .post(app.url(&format!("/folders/{}/files", folder_id)))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(!app.share.path().join("a.csv").exists());

    // metadata stays readable
    let (status, _) = app.get(&format!("/folders/{}", folder_id)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unregistered_provider_is_a_server_error() {
    let app = TestApp::spawn().await;
    let (_, drive) = app
        .post(
            "/drives",
            json!({
                "displayName": "Team site",
                "details": {"type": "ONEDRIVE", "driveId": "b!team"}
            }),
        )
        .await;
    let drive_id = drive["id"].as_str().unwrap();

    let (status, folder) = app
        .post(
            &format!("/drives/{}/folders", drive_id),
            json!({
                "path": "Studies",
                "details": {"type": "ONEDRIVE", "driveId": "b!team", "folderId": "01ABC"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .get(&format!("/folders/{}/contents", folder["id"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("ONEDRIVE"));

    let (status, _) = app.get(&format!("/drives/{}/browse", drive_id)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn provision_upload_and_list_over_http() {
    let app = TestApp::spawn().await;
    let (_, root_id) = app.local_drive_with_root().await;
    let study = Uuid::new_v4();

    let (status, owned) = app
        .post(
            &format!("/owners/study/{}/folders/provision", study),
            json!({"parentFolderId": root_id, "name": "ST-7", "primary": true}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(owned["primary"], true);
    let folder_id = owned["folder"]["id"].as_str().unwrap().to_string();

    let form = Form::new()
        .text("note", "ignored")
        .part(
            "file",
            Part::bytes(b"sample,value\n".to_vec()).file_name("results.csv"),
        );
    let response = app
        .http
        .post(app.url(&format!("/folders/{}/files", folder_id)))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let saved: Value = response.json().await.unwrap();
    assert_eq!(saved[0]["path"], "ST-7/results.csv");
    assert_eq!(saved[0]["size"], 13);
    assert_eq!(std::fs::read_dir(app.staging.path()).unwrap().count(), 0);

    let (status, listing) = app.get(&format!("/folders/{}/contents", folder_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["files"][0]["name"], "results.csv");

    let (status, listed) = app.get(&format!("/owners/studies/{}/folders", study)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let response = app
        .http
        .delete(app.url(&format!("/owners/study/{}/folders/{}", study, folder_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn upload_without_file_fields_is_rejected() {
    let app = TestApp::spawn().await;
    let (_, folder_id) = app.local_drive_with_root().await;

    let response = app
        .http
        .post(app.url(&format!("/folders/{}/files", folder_id)))
        .multipart(Form::new().text("note", "no file here"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_owner_kind_is_rejected() {
    let app = TestApp::spawn().await;
    let (status, body) = app
        .get(&format!("/owners/department/{}/folders", Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("department"));
}
