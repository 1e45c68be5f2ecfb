//! Token claim types for session and download credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audience carried by download tokens.
///
/// Session validation rejects tokens with this audience so a download link
/// can never be replayed as a bearer credential.
pub const DOWNLOAD_AUDIENCE: &str = "artifact-download";

/// JWT claims for session access tokens.
///
/// Session tokens are minted by the identity service; this crate only
/// verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user or service account ID).
    pub sub: Uuid,
    /// Whether the subject is a service account.
    #[serde(default)]
    pub sa: bool,
    /// Audience, if the issuer set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
}

impl Claims {
    /// Creates new session claims for a subject.
    #[must_use]
    pub fn new(subject: Uuid, is_service_account: bool, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: subject,
            sa: is_service_account,
            aud: None,
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    /// Returns the subject ID from claims.
    #[must_use]
    pub const fn subject_id(&self) -> Uuid {
        self.sub
    }

    /// Returns true if the subject is a service account.
    #[must_use]
    pub const fn is_service_account(&self) -> bool {
        self.sa
    }
}

/// JWT claims for a download token bound to a single artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadClaims {
    /// Subject the link was issued to.
    pub sub: Uuid,
    /// Whether the subject is a service account.
    pub sa: bool,
    /// Artifact record the token is bound to.
    pub rid: Uuid,
    /// Name of the organization owning the artifact.
    pub org: String,
    /// Always [`DOWNLOAD_AUDIENCE`].
    pub aud: String,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
}

impl DownloadClaims {
    /// Creates download claims bound to `record_id`.
    #[must_use]
    pub fn new(
        subject: Uuid,
        is_service_account: bool,
        record_id: Uuid,
        organization_name: &str,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: subject,
            sa: is_service_account,
            rid: record_id,
            org: organization_name.to_string(),
            aud: DOWNLOAD_AUDIENCE.to_string(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    /// Returns the artifact ID the token is bound to.
    #[must_use]
    pub const fn record_id(&self) -> Uuid {
        self.rid
    }

    /// Returns the subject ID from claims.
    #[must_use]
    pub const fn subject_id(&self) -> Uuid {
        self.sub
    }

    /// Returns the expiration as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
