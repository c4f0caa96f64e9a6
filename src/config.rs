use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,

    /// Where multipart uploads are written before a provider takes them.
    pub staging_dir: String,

    pub s3_enabled: bool,
    pub s3_region: Option<String>,
    pub egnyte_token: Option<String>,
    pub egnyte_base_url: Option<String>,
    pub onedrive_token: Option<String>,
    pub graph_base_url: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Storage drive registry and provider gateway")]
pub struct Args {
    /// Host to bind to (overrides STORAGE_DRIVES_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides STORAGE_DRIVES_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides STORAGE_DRIVES_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Upload staging directory (overrides STORAGE_DRIVES_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<String>,

    /// Register the S3 provider (overrides STORAGE_DRIVES_S3_ENABLED)
    #[arg(long)]
    pub s3: Option<bool>,

    /// AWS region for S3 (overrides STORAGE_DRIVES_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_sources(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values looked up with `var`.
    pub fn from_sources(args: Args, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_port = match var("STORAGE_DRIVES_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing STORAGE_DRIVES_PORT value `{}`", value))?,
            None => 3000,
        };
        let max_connections = match var("STORAGE_DRIVES_MAX_CONNECTIONS") {
            Some(value) => value.parse::<u32>().with_context(|| {
                format!("parsing STORAGE_DRIVES_MAX_CONNECTIONS value `{}`", value)
            })?,
            None => 5,
        };
        let env_s3 = match var("STORAGE_DRIVES_S3_ENABLED") {
            Some(value) => parse_flag("STORAGE_DRIVES_S3_ENABLED", &value)?,
            None => false,
        };
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: args
                .host
                .or_else(|| var("STORAGE_DRIVES_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            database_url: args
                .database_url
                .or_else(|| var("STORAGE_DRIVES_DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/storage_drives.db".into()),
            max_connections,
            staging_dir: args
                .staging_dir
                .or_else(|| var("STORAGE_DRIVES_STAGING_DIR"))
                .unwrap_or_else(|| "./data/staging".into()),
            s3_enabled: args.s3.unwrap_or(env_s3),
            s3_region: args.s3_region.or_else(|| non_empty("STORAGE_DRIVES_S3_REGION")),
            egnyte_token: non_empty("STORAGE_DRIVES_EGNYTE_TOKEN"),
            egnyte_base_url: non_empty("STORAGE_DRIVES_EGNYTE_BASE_URL"),
            onedrive_token: non_empty("STORAGE_DRIVES_ONEDRIVE_TOKEN"),
            graph_base_url: non_empty("STORAGE_DRIVES_GRAPH_BASE_URL"),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("max_connections", &self.max_connections)
            .field("staging_dir", &self.staging_dir)
            .field("s3_enabled", &self.s3_enabled)
            .field("s3_region", &self.s3_region)
            .field("egnyte_token", &self.egnyte_token.as_ref().map(|_| "<set>"))
            .field("egnyte_base_url", &self.egnyte_base_url)
            .field("onedrive_token", &self.onedrive_token.as_ref().map(|_| "<set>"))
            .field("graph_base_url", &self.graph_base_url)
            .finish()
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("parsing {} value `{}`: expected a boolean", name, other),
    }
}
