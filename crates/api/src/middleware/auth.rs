//! Session authentication for artifact routes.
//!
//! Credentials are optional: anonymous callers may still reach public
//! artifacts or present a download token. A bearer token that is present
//! but invalid is always rejected.

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::AppState;
use boxvault_core::artifact::Subject;
use boxvault_shared::{Claims, JwtError};

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

fn unauthorized(error: &str, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": error, "message": message })),
    )
        .into_response()
}

/// Authentication middleware that validates session JWTs when present.
///
/// This middleware:
/// 1. Passes requests without an Authorization header through untouched
/// 2. Validates a Bearer token using the JWT service
/// 3. Stores the claims in request extensions for handlers to access
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return next.run(request).await;
    };

    let Some(token) = header.to_str().ok().and_then(extract_bearer_token) else {
        return unauthorized(
            "UNAUTHORIZED",
            "Authorization header must be a Bearer token",
        );
    };

    match state.jwt_service.validate_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(JwtError::Expired) => unauthorized("TOKEN_EXPIRED", "Token has expired"),
        Err(_) => unauthorized("TOKEN_INVALID", "Invalid or malformed token"),
    }
}

/// Extractor for an authenticated session.
///
/// Rejects with 401 when the request carried no valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    /// Returns the subject ID from the claims.
    #[must_use]
    pub fn user_id(&self) -> uuid::Uuid {
        self.0.subject_id()
    }

    /// Returns the caller as an artifact subject.
    #[must_use]
    pub fn subject(&self) -> Subject {
        Subject {
            id: self.0.subject_id(),
            is_service_account: self.0.is_service_account(),
        }
    }

    /// Returns the inner claims.
    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.0
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| unauthorized("UNAUTHORIZED", "Authentication required"))
    }
}

/// Extractor for an optional session.
#[derive(Debug, Clone, Default)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl MaybeAuthUser {
    /// Returns the caller as an artifact subject, if authenticated.
    #[must_use]
    pub fn subject(&self) -> Option<Subject> {
        self.0.as_ref().map(AuthUser::subject)
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Claims>().cloned().map(AuthUser)))
    }
}
