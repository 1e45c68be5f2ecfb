//! Application configuration management.

use serde::Deserialize;
use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Token signing configuration.
    pub jwt: JwtSettings,
    /// Artifact storage configuration.
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally visible base URL, used to build download links.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret shared with the identity service.
    pub secret: String,
    /// Access token expiration in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
    /// Download token expiration in seconds.
    #[serde(default = "default_download_token_expiry")]
    pub download_token_expiry_secs: u64,
}

fn default_access_token_expiry() -> u64 {
    900 // 15 minutes
}

fn default_download_token_expiry() -> u64 {
    3600 // 1 hour
}

/// Artifact storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Explicit storage root. Falls back to `artifact_root/subdirectory`.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// General artifact root directory.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: PathBuf,
    /// Subdirectory of `artifact_root` used when `root` is unset.
    #[serde(default = "default_subdirectory")]
    pub subdirectory: String,
    /// File extension of stored content.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Maximum upload size in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Age after which unreferenced files are reclaimed by the sweeper.
    #[serde(default = "default_orphan_grace")]
    pub orphan_grace_secs: u64,
    /// Run the orphan sweeper once at startup.
    #[serde(default = "default_sweep_on_startup")]
    pub sweep_on_startup: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: None,
            artifact_root: default_artifact_root(),
            subdirectory: default_subdirectory(),
            extension: default_extension(),
            max_upload_size: default_max_upload_size(),
            orphan_grace_secs: default_orphan_grace(),
            sweep_on_startup: default_sweep_on_startup(),
        }
    }
}

fn default_artifact_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_subdirectory() -> String {
    "iso".to_string()
}

fn default_extension() -> String {
    "iso".to_string()
}

fn default_max_upload_size() -> u64 {
    10 * 1024 * 1024 * 1024 // 10 GiB
}

fn default_orphan_grace() -> u64 {
    3600
}

fn default_sweep_on_startup() -> bool {
    true
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("BOXVAULT").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
