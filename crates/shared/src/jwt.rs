//! JWT token generation and validation.
//!
//! Verifies session tokens issued by the identity service and signs/verifies
//! download tokens scoped to a single artifact.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::{Claims, DOWNLOAD_AUDIENCE, DownloadClaims};

/// JWT configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens.
    pub secret: String,
    /// Access token expiration in seconds.
    pub access_token_expires_secs: i64,
    /// Download token expiration in seconds.
    pub download_token_expires_secs: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production".to_string(),
            access_token_expires_secs: 900,
            download_token_expires_secs: 3600,
        }
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug, Error)]
pub enum JwtError {
    /// Token encoding failed.
    #[error("failed to encode token: {0}")]
    EncodingError(String),

    /// Token decoding failed.
    #[error("failed to decode token: {0}")]
    DecodingError(String),

    /// Token has expired.
    #[error("token has expired")]
    Expired,

    /// Token is invalid.
    #[error("invalid token")]
    Invalid,
}

/// A freshly signed download token.
#[derive(Debug, Clone)]
pub struct SignedDownloadToken {
    /// Compact JWT.
    pub token: String,
    /// When the token stops verifying.
    pub expires_at: DateTime<Utc>,
}

/// JWT service for token operations.
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("access_token_expires_secs", &self.config.access_token_expires_secs)
            .field("download_token_expires_secs", &self.config.download_token_expires_secs)
            .field("secret", &"[hidden]")
            .finish()
    }
}

impl JwtService {
    /// Creates a new JWT service with the given configuration.
    #[must_use]
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Generates a session access token.
    ///
    /// Sessions are normally minted by the identity service; this is used by
    /// tooling and tests sharing the same secret.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::EncodingError` if token generation fails.
    pub fn generate_access_token(
        &self,
        subject: Uuid,
        is_service_account: bool,
    ) -> Result<String, JwtError> {
        let expires_at = Utc::now() + Duration::seconds(self.config.access_token_expires_secs);
        let claims = Claims::new(subject, is_service_account, expires_at);

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))
    }

    /// Validates and decodes a session token.
    ///
    /// Download tokens are rejected here even though they share the secret.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Expired` if the token has expired.
    /// Returns `JwtError::Invalid` if the token is a download token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        validation.validate_aud = false;

        let claims: Claims = self.decode_with(token, &validation)?;
        if claims.aud.as_deref() == Some(DOWNLOAD_AUDIENCE) {
            return Err(JwtError::Invalid);
        }
        Ok(claims)
    }

    /// Signs a download token bound to `record_id`.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::EncodingError` if token generation fails.
    pub fn generate_download_token(
        &self,
        subject: Uuid,
        is_service_account: bool,
        record_id: Uuid,
        organization_name: &str,
    ) -> Result<SignedDownloadToken, JwtError> {
        let expires_at = Utc::now() + Duration::seconds(self.config.download_token_expires_secs);
        let claims = DownloadClaims::new(
            subject,
            is_service_account,
            record_id,
            organization_name,
            expires_at,
        );

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok(SignedDownloadToken { token, expires_at })
    }

    /// Validates and decodes a download token.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Expired` if the token has expired.
    /// Returns `JwtError::DecodingError` for a bad signature, wrong audience
    /// or malformed token.
    pub fn validate_download_token(&self, token: &str) -> Result<DownloadClaims, JwtError> {
        let mut validation = Validation::default();
        validation.set_audience(&[DOWNLOAD_AUDIENCE]);

        self.decode_with(token, &validation)
    }

    /// Reads the record a download token claims to be bound to, without
    /// checking signature or expiry.
    ///
    /// Only for scope checks that must fire regardless of token validity.
    #[must_use]
    pub fn peek_bound_record(&self, token: &str) -> Option<Uuid> {
        jsonwebtoken::dangerous::insecure_decode::<DownloadClaims>(token)
            .ok()
            .map(|data| data.claims.rid)
    }

    /// Returns the access token expiration in seconds.
    #[must_use]
    pub const fn access_token_expires_in(&self) -> i64 {
        self.config.access_token_expires_secs
    }

    /// Returns the download token lifetime in seconds.
    #[must_use]
    pub const fn download_token_expires_in(&self) -> i64 {
        self.config.download_token_expires_secs
    }

    fn decode_with<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<T, JwtError> {
        decode::<T>(token, &self.decoding_key, validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::DecodingError(e.to_string()),
            })
    }
}

#[cfg(test)]
#[path = "jwt_tests.rs"]
mod tests;
