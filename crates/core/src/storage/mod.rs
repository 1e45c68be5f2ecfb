//! Content-addressable file storage on the local filesystem.
//!
//! ```text
//! <storage root>/
//! ├── .upload-<uuid>.part   in-flight upload, hashed while written
//! └── <sha256>.<ext>        committed content, one file per distinct body
//! ```
//!
//! All paths are built through [`PathResolver::secure_path`], which refuses
//! anything that resolves outside the storage root.

mod config;
mod content;
mod error;
mod path;
mod range;

pub use config::StorageConfig;
pub use content::{
    ContentReader, ContentStore, OpenContent, StagedUpload, StoredContent, StoredEntry,
    StoredEntryKind, is_checksum, storage_path_for,
};
pub use error::StorageError;
pub use path::PathResolver;
pub use range::{ByteRange, RangeError};
