//! Storage error types.

use thiserror::Error;

/// Content store errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Upload exceeds the configured maximum.
    #[error("file size {size} bytes exceeds maximum allowed {max} bytes")]
    FileTooLarge {
        /// Size declared or observed so far.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// A path escaped the storage root.
    #[error("path escapes storage root: {0}")]
    PathTraversal(String),

    /// Content file not found.
    #[error("content not found: {0}")]
    NotFound(String),

    /// The request body stream failed (client disconnect, decode error).
    #[error("upload stream failed: {0}")]
    Stream(String),

    /// Filesystem operation failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Create a file too large error.
    #[must_use]
    pub fn file_too_large(size: u64, max: u64) -> Self {
        Self::FileTooLarge { size, max }
    }

    /// Create a path traversal error.
    #[must_use]
    pub fn path_traversal(path: impl Into<String>) -> Self {
        Self::PathTraversal(path.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Create a stream error.
    #[must_use]
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }
}
