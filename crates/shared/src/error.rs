//! Application-wide error types.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// No credential was presented.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// A token was presented but failed verification.
    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    /// Access denied.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (e.g., duplicate entry).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upload exceeds the configured size limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Requested byte range lies outside the resource.
    #[error("Range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) | Self::TokenInvalid(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::PayloadTooLarge(_) => 413,
            Self::RangeNotSatisfiable(_) => 416,
            Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::TokenInvalid(_) => "TOKEN_INVALID",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::PayloadTooLarge(_) => "FILE_TOO_LARGE",
            Self::RangeNotSatisfiable(_) => "RANGE_NOT_SATISFIABLE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the message that is safe to show to clients.
    ///
    /// Server-side failures get a generic message; their detail stays in logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Unauthorized(msg)
            | Self::TokenInvalid(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Conflict(msg)
            | Self::PayloadTooLarge(msg)
            | Self::RangeNotSatisfiable(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
