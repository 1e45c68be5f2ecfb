//! Artifact types and data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ArtifactError;
use crate::storage::storage_path_for;

/// Maximum display name length in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Hash algorithm used for content identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumAlgorithm {
    /// SHA-256, hex encoded.
    #[default]
    Sha256,
}

impl ChecksumAlgorithm {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Parse from database string value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// A stored artifact.
///
/// Several records may point at the same `storage_path`; the file is kept
/// until the last of them is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Unique identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Hex digest of the content.
    pub checksum: String,
    /// Digest algorithm.
    pub checksum_algorithm: ChecksumAlgorithm,
    /// Path relative to the storage root, derived from the checksum.
    #[serde(skip_serializing)]
    pub storage_path: String,
    /// Size in bytes.
    pub size: i64,
    /// Visible without credentials.
    pub is_public: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Input for creating an artifact record.
///
/// Built by the upload pipeline from committed content only.
#[derive(Debug, Clone)]
pub struct CreateArtifactInput {
    /// Display name.
    pub name: String,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Hex digest of the content.
    pub checksum: String,
    /// Digest algorithm.
    pub checksum_algorithm: ChecksumAlgorithm,
    storage_path: String,
    /// Size in bytes.
    pub size: i64,
    /// Visibility.
    pub is_public: bool,
}

impl CreateArtifactInput {
    /// Build an input whose storage path is derived from `checksum`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        organization_id: Uuid,
        checksum: impl Into<String>,
        size: i64,
        is_public: bool,
        extension: &str,
    ) -> Self {
        let checksum = checksum.into();
        Self {
            name: name.into(),
            organization_id,
            storage_path: storage_path_for(&checksum, extension),
            checksum,
            checksum_algorithm: ChecksumAlgorithm::Sha256,
            size,
            is_public,
        }
    }

    /// Path relative to the storage root.
    #[must_use]
    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }
}

/// Input for an upload request.
#[derive(Debug, Clone)]
pub struct UploadInput {
    /// Owning organization name.
    pub organization: String,
    /// Untrusted display name.
    pub name: String,
    /// Untrusted `Content-Length`.
    pub declared_size: Option<u64>,
    /// Visibility.
    pub is_public: bool,
}

/// An organization as seen by the artifact service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    /// Unique identifier.
    pub id: Uuid,
    /// Unique name.
    pub name: String,
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    /// User or service account ID.
    pub id: Uuid,
    /// True for service accounts.
    pub is_service_account: bool,
}

impl Subject {
    /// A regular user.
    #[must_use]
    pub const fn user(id: Uuid) -> Self {
        Self {
            id,
            is_service_account: false,
        }
    }

    /// A service account.
    #[must_use]
    pub const fn service_account(id: Uuid) -> Self {
        Self {
            id,
            is_service_account: true,
        }
    }
}

/// A signed, record-scoped download link.
#[derive(Debug, Clone)]
pub struct DownloadLink {
    /// Record the token is bound to.
    pub record_id: Uuid,
    /// Signed token.
    pub token: String,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedArtifact {
    /// Deleted record.
    pub id: Uuid,
    /// True if this was the last reference and the file was unlinked.
    pub content_reclaimed: bool,
}

/// Counts from an orphan sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale temp uploads removed.
    pub uploads_removed: usize,
    /// Unreferenced content files removed.
    pub content_removed: usize,
}

/// Validate and normalize an untrusted display name.
///
/// # Errors
///
/// Returns `ArtifactError::Validation` for empty or oversized names, control
/// characters or path separators.
pub fn validate_name(raw: &str) -> Result<String, ArtifactError> {
    let name = raw.trim();

    if name.is_empty() {
        return Err(ArtifactError::validation("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ArtifactError::validation(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(ArtifactError::validation(
            "name must not contain control characters",
        ));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ArtifactError::validation(
            "name must not contain path separators",
        ));
    }

    Ok(name.to_string())
}
