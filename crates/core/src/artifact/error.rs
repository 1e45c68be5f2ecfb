//! Artifact error types.

use boxvault_shared::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::storage::{RangeError, StorageError};

/// Artifact operation errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Invalid input (name, headers, range syntax).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Upload exceeds the configured maximum.
    #[error("file too large: {size} bytes exceeds maximum {max} bytes")]
    SizeLimitExceeded {
        /// Declared or observed size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// Record or organization not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credential present but insufficient.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No credential presented.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Download token failed verification.
    #[error("invalid download token: {0}")]
    TokenInvalid(String),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Io(#[from] StorageError),

    /// A live record references a file that is missing.
    #[error("content missing for artifact {id} at {storage_path}")]
    Integrity {
        /// Record ID.
        id: Uuid,
        /// Expected storage path.
        storage_path: String,
    },

    /// Requested range starts beyond the content.
    #[error("range not satisfiable for size {total}")]
    RangeNotSatisfiable {
        /// Content size in bytes.
        total: u64,
    },

    /// Display name already used in the organization.
    #[error("artifact name already exists: {0}")]
    NameConflict(String),

    /// Repository operation failed.
    #[error("repository error: {0}")]
    Repository(String),

    /// Download token could not be signed.
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl ArtifactError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error for a record ID.
    #[must_use]
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound(format!("artifact {id}"))
    }

    /// Create a not found error for an organization name.
    #[must_use]
    pub fn organization_not_found(name: &str) -> Self {
        Self::NotFound(format!("organization {name}"))
    }

    /// Create a forbidden error.
    #[must_use]
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create an unauthorized error.
    #[must_use]
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a token invalid error.
    #[must_use]
    pub fn token_invalid(msg: impl Into<String>) -> Self {
        Self::TokenInvalid(msg.into())
    }

    /// Create an integrity error.
    #[must_use]
    pub fn integrity(id: Uuid, storage_path: impl Into<String>) -> Self {
        Self::Integrity {
            id,
            storage_path: storage_path.into(),
        }
    }

    /// Create a name conflict error.
    #[must_use]
    pub fn name_conflict(name: impl Into<String>) -> Self {
        Self::NameConflict(name.into())
    }

    /// Create a repository error.
    #[must_use]
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }
}

impl From<RangeError> for ArtifactError {
    fn from(err: RangeError) -> Self {
        match err {
            RangeError::Unsatisfiable { total } => Self::RangeNotSatisfiable { total },
            other => Self::Validation(other.to_string()),
        }
    }
}

/// Lift storage errors that carry client meaning out of `Io`.
pub(crate) fn classify_storage(err: StorageError) -> ArtifactError {
    match err {
        StorageError::FileTooLarge { size, max } => ArtifactError::SizeLimitExceeded { size, max },
        StorageError::PathTraversal(path) => {
            ArtifactError::validation(format!("invalid storage path: {path}"))
        }
        other => ArtifactError::Io(other),
    }
}

impl From<ArtifactError> for AppError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::Validation(msg) => Self::Validation(msg),
            ArtifactError::SizeLimitExceeded { size, max } => Self::PayloadTooLarge(format!(
                "file size {size} bytes exceeds maximum {max} bytes"
            )),
            ArtifactError::NotFound(msg) => Self::NotFound(msg),
            ArtifactError::Integrity { id, .. } => Self::NotFound(format!("artifact {id}")),
            ArtifactError::Forbidden(msg) => Self::Forbidden(msg),
            ArtifactError::Unauthorized(msg) => Self::Unauthorized(msg),
            ArtifactError::TokenInvalid(msg) => Self::TokenInvalid(msg),
            ArtifactError::RangeNotSatisfiable { total } => {
                Self::RangeNotSatisfiable(format!("bytes */{total}"))
            }
            ArtifactError::NameConflict(name) => {
                Self::Conflict(format!("artifact '{name}' already exists"))
            }
            ArtifactError::Repository(msg) => Self::Database(msg),
            ArtifactError::Signing(msg) => Self::Internal(msg),
            ArtifactError::Io(err) => Self::Internal(err.to_string()),
        }
    }
}
