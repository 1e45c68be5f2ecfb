//! Storage configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Content store configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Explicit storage root; `None` falls back to `artifact_root/subdirectory`.
    pub root: Option<PathBuf>,
    /// General artifact root directory.
    pub artifact_root: PathBuf,
    /// Subdirectory of the artifact root used as fallback storage root.
    pub subdirectory: String,
    /// Extension appended to the checksum to form the storage path.
    pub extension: String,
    /// Maximum upload size in bytes.
    pub max_upload_size: u64,
    /// Minimum age before an unreferenced file may be swept.
    pub orphan_grace: Duration,
}

impl StorageConfig {
    /// Default max upload size: 10 GiB.
    pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024 * 1024;
    /// Default storage subdirectory.
    pub const DEFAULT_SUBDIRECTORY: &'static str = "iso";
    /// Default content extension.
    pub const DEFAULT_EXTENSION: &'static str = "iso";
    /// Default orphan grace period: 1 hour.
    pub const DEFAULT_ORPHAN_GRACE: Duration = Duration::from_secs(3600);

    /// Create a config rooted under `artifact_root` with default settings.
    #[must_use]
    pub fn new(artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            root: None,
            artifact_root: artifact_root.into(),
            subdirectory: Self::DEFAULT_SUBDIRECTORY.to_string(),
            extension: Self::DEFAULT_EXTENSION.to_string(),
            max_upload_size: Self::DEFAULT_MAX_UPLOAD_SIZE,
            orphan_grace: Self::DEFAULT_ORPHAN_GRACE,
        }
    }

    /// Set an explicit storage root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set the fallback subdirectory.
    #[must_use]
    pub fn with_subdirectory(mut self, subdirectory: impl Into<String>) -> Self {
        self.subdirectory = subdirectory.into();
        self
    }

    /// Set the content file extension (without the dot).
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set maximum upload size.
    #[must_use]
    pub fn with_max_upload_size(mut self, size: u64) -> Self {
        self.max_upload_size = size;
        self
    }

    /// Set the orphan grace period.
    #[must_use]
    pub fn with_orphan_grace(mut self, grace: Duration) -> Self {
        self.orphan_grace = grace;
        self
    }

    /// Directory all content lives in.
    #[must_use]
    pub fn storage_root(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| self.artifact_root.join(&self.subdirectory))
    }
}
