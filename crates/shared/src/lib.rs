//! Shared errors, configuration, and token primitives for BoxVault.
//!
//! This crate provides common pieces used across all other crates:
//! - Application-wide error types
//! - Configuration management
//! - Session and download token claims
//! - JWT signing and verification

pub mod auth;
pub mod config;
pub mod error;
pub mod jwt;

pub use auth::{Claims, DOWNLOAD_AUDIENCE, DownloadClaims};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use jwt::{JwtConfig, JwtError, JwtService, SignedDownloadToken};
