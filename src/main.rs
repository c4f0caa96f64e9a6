use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, path::Path, sync::Arc};
use storage_drives::{
    config::AppConfig,
    db,
    providers::{
        EgnyteStudyStorageService, LocalStudyStorageService, OneDriveStudyStorageService,
        S3StudyStorageService, StudyStorageRegistry,
    },
    routes::{AppState, routes},
    services::{FileStorageLocationService, StorageDriveService},
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting storage-drives with config: {:?}", cfg);

    // --- Ensure staging directory exists ---
    if !Path::new(&cfg.staging_dir).exists() {
        std::fs::create_dir_all(&cfg.staging_dir)
            .with_context(|| format!("creating staging directory {}", cfg.staging_dir))?;
        tracing::info!("Created staging directory at {}", cfg.staging_dir);
    }

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url, cfg.max_connections).await?);

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Provider registry ---
    let registry = Arc::new(build_registry(&cfg).await?);
    tracing::info!("Storage providers registered: {:?}", registry.registered_types());

    // Every active drive and location must have a provider before serving.
    let drives = StorageDriveService::new(db.clone(), registry.clone());
    let locations = FileStorageLocationService::new(db.clone(), registry.clone());
    let in_use = drives
        .find_all_drives()
        .await?
        .into_iter()
        .filter(|d| d.active)
        .map(|d| d.drive_type)
        .chain(
            locations
                .find_all_locations()
                .await?
                .into_iter()
                .filter(|l| l.active)
                .map(|l| l.drive_type),
        );
    registry
        .ensure_registered(in_use)
        .context("active drives or locations reference an unconfigured provider")?;

    // --- Build router ---
    let state = AppState::new(db.clone(), registry, cfg.staging_dir.clone());
    let app: Router = routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Local is always available; the remote providers are registered when
/// configured.
async fn build_registry(cfg: &AppConfig) -> Result<StudyStorageRegistry> {
    let mut registry = StudyStorageRegistry::new();
    registry.register(Arc::new(LocalStudyStorageService::new()));

    if cfg.s3_enabled {
        registry.register(Arc::new(
            S3StudyStorageService::from_env(cfg.s3_region.clone()).await,
        ));
    }

    if cfg.egnyte_token.is_some() || cfg.onedrive_token.is_some() {
        let http = reqwest::Client::builder()
            .user_agent(concat!("storage-drives/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;

        if let Some(token) = &cfg.egnyte_token {
            registry.register(Arc::new(EgnyteStudyStorageService::new(
                http.clone(),
                token.clone(),
                cfg.egnyte_base_url.clone(),
            )));
        }
        if let Some(token) = &cfg.onedrive_token {
            registry.register(Arc::new(OneDriveStudyStorageService::new(
                http,
                token.clone(),
                cfg.graph_base_url.clone(),
            )));
        }
    }

    Ok(registry)
}
