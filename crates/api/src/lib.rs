//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes for artifact upload, download and management
//! - Optional session authentication middleware
//! - JSON error responses

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use boxvault_core::artifact::ArtifactService;
use boxvault_core::storage::ContentStore;
use boxvault_db::{ArtifactRepository, OrganizationRepository};
use boxvault_shared::JwtService;

/// Artifact service wired to the database repositories.
pub type Artifacts = ArtifactService<ArtifactRepository, OrganizationRepository>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// JWT service for token operations.
    pub jwt_service: Arc<JwtService>,
    /// Artifact service.
    pub artifacts: Arc<Artifacts>,
    /// Externally reachable base URL, without trailing slash.
    pub public_url: Arc<str>,
}

impl AppState {
    /// Wire repositories and services around one connection.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        jwt_service: Arc<JwtService>,
        content: Arc<ContentStore>,
        public_url: &str,
    ) -> Self {
        let artifacts = ArtifactService::new(
            content,
            Arc::new(ArtifactRepository::new(db.clone())),
            Arc::new(OrganizationRepository::new(db.clone())),
            Arc::clone(&jwt_service),
        );

        Self {
            db: Arc::new(db),
            jwt_service,
            artifacts: Arc::new(artifacts),
            public_url: Arc::from(public_url.trim_end_matches('/')),
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
