//! Core logic for BoxVault artifact storage.
//!
//! This crate contains the storage engine and artifact rules with ZERO web or
//! database dependencies. Persistence is reached through the repository
//! traits in [`artifact`].
//!
//! # Modules
//!
//! - `storage` - Content-addressable files, path confinement, byte ranges
//! - `artifact` - Upload, access control, download links, deletion

pub mod artifact;
pub mod storage;
