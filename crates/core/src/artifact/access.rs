//! Download access evaluation.
//!
//! First match wins:
//!
//! 1. public record
//! 2. verified download token bound to this record
//! 3. any token bound elsewhere is forbidden; a token bound here that fails
//!    verification is invalid
//! 4. session subject with no token, pending a membership lookup
//! 5. unauthorized without credentials

use boxvault_shared::{DownloadClaims, JwtError, JwtService};
use uuid::Uuid;

use super::error::ArtifactError;
use super::types::{ArtifactRecord, Subject};

/// Credentials presented with a request.
#[derive(Debug, Clone, Default)]
pub struct AccessRequest {
    /// Raw `?token=` value.
    pub token: Option<String>,
    /// Authenticated session subject.
    pub subject: Option<Subject>,
}

impl AccessRequest {
    /// No credentials.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Session credentials only.
    #[must_use]
    pub fn session(subject: Subject) -> Self {
        Self {
            token: None,
            subject: Some(subject),
        }
    }

    /// Attach a download token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach an optional session subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Option<Subject>) -> Self {
        self.subject = subject;
        self
    }

    /// True if any credential was presented.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.token.is_some() || self.subject.is_some()
    }
}

/// A download token after verification.
#[derive(Debug, Clone)]
pub enum TokenCredential {
    /// Signature and expiry checked.
    Verified(DownloadClaims),
    /// Failed verification.
    Rejected {
        /// Record ID read from the unverified payload, if readable.
        bound_record_id: Option<Uuid>,
        /// Why verification failed.
        reason: String,
    },
}

impl TokenCredential {
    /// Verify a raw token.
    #[must_use]
    pub fn verify(jwt: &JwtService, raw: &str) -> Self {
        match jwt.validate_download_token(raw) {
            Ok(claims) => Self::Verified(claims),
            Err(err) => Self::Rejected {
                bound_record_id: jwt.peek_bound_record(raw),
                reason: match err {
                    JwtError::Expired => "token expired".to_string(),
                    _ => "token verification failed".to_string(),
                },
            },
        }
    }

    /// Record the token claims to be bound to.
    #[must_use]
    pub fn bound_record_id(&self) -> Option<Uuid> {
        match self {
            Self::Verified(claims) => Some(claims.record_id()),
            Self::Rejected {
                bound_record_id, ..
            } => *bound_record_id,
        }
    }
}

/// Why access was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessGrant {
    /// Public record.
    Public,
    /// Valid download token for this record.
    Token(Subject),
    /// Member or scoped service account of the owning organization.
    Member(Subject),
}

/// Outcome of [`evaluate`].
#[derive(Debug)]
pub enum Decision {
    /// Access granted without further lookups.
    Allow(AccessGrant),
    /// Access refused.
    Deny(ArtifactError),
    /// Grant only if the subject belongs to the record's organization.
    CheckMembership(Subject),
}

/// Evaluate the credential-only steps of the access order.
#[must_use]
pub fn evaluate(
    record: &ArtifactRecord,
    token: Option<&TokenCredential>,
    subject: Option<Subject>,
) -> Decision {
    if record.is_public {
        return Decision::Allow(AccessGrant::Public);
    }

    if let Some(token) = token {
        return match token {
            TokenCredential::Verified(claims) if claims.record_id() == record.id => {
                Decision::Allow(AccessGrant::Token(Subject {
                    id: claims.subject_id(),
                    is_service_account: claims.sa,
                }))
            }
            _ if token.bound_record_id().is_some_and(|rid| rid != record.id) => Decision::Deny(
                ArtifactError::forbidden("download token is scoped to a different artifact"),
            ),
            TokenCredential::Rejected { reason, .. } => {
                Decision::Deny(ArtifactError::token_invalid(reason.clone()))
            }
            TokenCredential::Verified(_) => Decision::Deny(ArtifactError::forbidden(
                "download token is scoped to a different artifact",
            )),
        };
    }

    match subject {
        Some(subject) => Decision::CheckMembership(subject),
        None => Decision::Deny(ArtifactError::unauthorized("authentication required")),
    }
}
