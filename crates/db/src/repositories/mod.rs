//! Repository abstractions for data access.
//!
//! Repositories implement the persistence traits of `boxvault-core`,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod artifact;
pub mod organization;

pub use artifact::ArtifactRepository;
pub use organization::OrganizationRepository;
