//! BoxVault API Server
//!
//! Main entry point for the artifact storage and delivery service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boxvault_api::{AppState, create_router};
use boxvault_core::storage::{ContentStore, StorageConfig};
use boxvault_db::connect_with_pool;
use boxvault_shared::{AppConfig, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxvault=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = connect_with_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .context("Failed to connect to database")?;
    info!("Connected to database");

    let jwt_config = JwtConfig {
        secret: config.jwt.secret.clone(),
        access_token_expires_secs: i64::try_from(config.jwt.access_token_expiry_secs)
            .context("access token expiry out of range")?,
        download_token_expires_secs: i64::try_from(config.jwt.download_token_expiry_secs)
            .context("download token expiry out of range")?,
    };
    let jwt_service = Arc::new(JwtService::new(jwt_config));

    let settings = &config.storage;
    let mut storage_config = StorageConfig::new(settings.artifact_root.clone())
        .with_subdirectory(settings.subdirectory.clone())
        .with_extension(settings.extension.clone())
        .with_max_upload_size(settings.max_upload_size)
        .with_orphan_grace(Duration::from_secs(settings.orphan_grace_secs));
    if let Some(root) = &settings.root {
        storage_config = storage_config.with_root(root.clone());
    }

    let content = ContentStore::new(storage_config);
    let storage_root = content
        .ensure_root()
        .await
        .context("Failed to prepare storage root")?;
    info!(
        storage_root = %storage_root.display(),
        max_upload_size = settings.max_upload_size,
        "Artifact storage ready"
    );

    let state = AppState::new(db, jwt_service, Arc::new(content), &config.server.public_url);

    if settings.sweep_on_startup
        && let Err(e) = state.artifacts.sweep_orphans().await
    {
        error!(error = %e, "Orphan sweep failed");
    }

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
