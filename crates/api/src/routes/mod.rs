//! API route definitions.

use axum::{Router, middleware};

use crate::{AppState, middleware::auth_middleware};

pub mod artifacts;
pub mod health;

/// Creates the API router; artifact routes get optional session auth.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    let artifact_routes = artifacts::routes().layer(middleware::from_fn_with_state(
        state.clone(),
        auth_middleware,
    ));

    Router::new()
        .merge(health::routes())
        .merge(artifact_routes)
}
