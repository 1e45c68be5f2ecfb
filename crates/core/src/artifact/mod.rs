//! Artifact lifecycle: upload, access control, delivery and deletion.
//!
//! Records are owned by organizations and point at content-addressed files
//! in [`crate::storage`]. Records with identical bytes share one file, which
//! is unlinked when the last of them is deleted.

mod access;
mod error;
mod locks;
mod service;
mod types;

pub use access::{AccessGrant, AccessRequest, Decision, TokenCredential, evaluate};
pub use error::ArtifactError;
pub use locks::{ChecksumGuard, ChecksumLocks};
pub use service::{ArtifactRepository, ArtifactService, OrganizationDirectory};
pub use types::{
    ArtifactRecord, ChecksumAlgorithm, CreateArtifactInput, DeletedArtifact, DownloadLink,
    MAX_NAME_LENGTH, Organization, Subject, SweepReport, UploadInput, validate_name,
};
