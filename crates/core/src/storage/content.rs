//! Content-addressable file store.
//!
//! Uploads are streamed into a uniquely named temp file while being hashed,
//! then committed under `<sha256>.<ext>` by atomic rename. Identical content
//! always lands on the same path, so a second upload of the same bytes
//! reuses the existing file.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter, Take};
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::StorageConfig;
use super::error::StorageError;
use super::path::PathResolver;
use super::range::ByteRange;

const TEMP_PREFIX: &str = ".upload-";
const TEMP_SUFFIX: &str = ".part";
const WRITE_BUFFER: usize = 512 * 1024;

/// Build the storage path for a checksum: `<checksum>.<ext>`.
#[must_use]
pub fn storage_path_for(checksum: &str, extension: &str) -> String {
    format!("{checksum}.{extension}")
}

/// True for a lowercase hex SHA-256 digest.
#[must_use]
pub fn is_checksum(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Removes the temp file on drop unless disarmed.
///
/// Drop also runs when the owning future is cancelled, so a client
/// disconnect never leaves a partial upload behind.
#[derive(Debug)]
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    /// Remove the temp file now; failures are logged, never returned.
    async fn discard(mut self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove temp upload"),
        }
        self.disarm();
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed abandoned temp upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove temp upload"),
        }
    }
}

/// A fully written and hashed upload that has not been committed yet.
#[derive(Debug)]
pub struct StagedUpload {
    guard: TempFileGuard,
    checksum: String,
    size: u64,
}

impl StagedUpload {
    /// Hex SHA-256 of the staged bytes.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Number of staged bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }
}

/// Result of committing a staged upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    /// Hex SHA-256 of the content.
    pub checksum: String,
    /// Content size in bytes.
    pub size: u64,
    /// Path relative to the storage root.
    pub storage_path: String,
    /// True if the bytes already existed and the upload was discarded.
    pub deduplicated: bool,
}

/// An opened content file, before a byte window is chosen.
#[derive(Debug)]
pub struct OpenContent {
    file: File,
    total_size: u64,
}

impl OpenContent {
    /// Total file size from the filesystem.
    #[must_use]
    pub const fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Position the file at the window start and limit reads to the window.
    pub async fn into_reader(mut self, range: Option<ByteRange>) -> Result<ContentReader, StorageError> {
        let (start, length) = range.map_or((0, self.total_size), |r| (r.start, r.len()));
        if start > 0 {
            self.file.seek(SeekFrom::Start(start)).await?;
        }

        Ok(ContentReader {
            reader: self.file.take(length),
            total_size: self.total_size,
            range,
        })
    }
}

/// A byte window of a content file ready to be streamed.
#[derive(Debug)]
pub struct ContentReader {
    reader: Take<File>,
    total_size: u64,
    range: Option<ByteRange>,
}

impl ContentReader {
    /// Total file size.
    #[must_use]
    pub const fn total_size(&self) -> u64 {
        self.total_size
    }

    /// The requested window, if any.
    #[must_use]
    pub const fn range(&self) -> Option<ByteRange> {
        self.range
    }

    /// Number of bytes the reader will yield.
    #[must_use]
    pub const fn content_length(&self) -> u64 {
        match self.range {
            Some(range) => range.len(),
            None => self.total_size,
        }
    }

    /// Consume into the underlying limited reader.
    #[must_use]
    pub fn into_inner(self) -> Take<File> {
        self.reader
    }
}

/// Kind of file found in the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredEntryKind {
    /// An in-flight or abandoned temp upload.
    Upload,
    /// Committed content for a checksum.
    Content {
        /// Hex SHA-256 derived from the file name.
        checksum: String,
    },
}

/// A file in the storage root, as seen by [`ContentStore::scan`].
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// File name relative to the root.
    pub file_name: String,
    /// Classification by name.
    pub kind: StoredEntryKind,
    /// Time since last modification.
    pub age: Duration,
}

/// Content-addressable file store rooted at the configured storage root.
#[derive(Debug, Clone)]
pub struct ContentStore {
    resolver: PathResolver,
    config: StorageConfig,
}

impl ContentStore {
    /// Create a store from configuration.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        let resolver = PathResolver::from_config(&config);
        Self { resolver, config }
    }

    /// Create the storage root directory if it is missing.
    pub async fn ensure_root(&self) -> Result<PathBuf, StorageError> {
        self.resolver.ensure_root().await
    }

    /// The path resolver used for every filesystem access.
    #[must_use]
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Storage path for a checksum under this store's extension.
    #[must_use]
    pub fn storage_path_for(&self, checksum: &str) -> String {
        storage_path_for(checksum, &self.config.extension)
    }

    /// Reject a declared length above the limit before any file is created.
    pub fn check_declared_size(&self, declared: Option<u64>) -> Result<(), StorageError> {
        match declared {
            Some(size) if size > self.config.max_upload_size => {
                Err(StorageError::file_too_large(size, self.config.max_upload_size))
            }
            _ => Ok(()),
        }
    }

    /// Stream `body` into a temp file, hashing each chunk as it is written.
    ///
    /// Returns once the input is exhausted and every byte is flushed and
    /// synced. Any error, or dropping the returned future, removes the temp
    /// file.
    pub async fn stage<S, E>(&self, body: S) -> Result<StagedUpload, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let temp_name = format!("{TEMP_PREFIX}{}{TEMP_SUFFIX}", Uuid::new_v4());
        let temp_path = self.resolver.secure_path(&[&temp_name]).await?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;
        let guard = TempFileGuard::new(temp_path);

        let mut writer = BufWriter::with_capacity(WRITE_BUFFER, file);
        let mut hasher = Sha256::new();
        let mut size = 0u64;
        let max = self.config.max_upload_size;

        let mut body = std::pin::pin!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StorageError::stream(e.to_string()))?;
            size += chunk.len() as u64;
            if size > max {
                return Err(StorageError::file_too_large(size, max));
            }
            hasher.update(&chunk);
            writer.write_all(&chunk).await?;
        }

        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        drop(writer);

        Ok(StagedUpload {
            guard,
            checksum: format!("{:x}", hasher.finalize()),
            size,
        })
    }

    /// Move a staged upload to its content-addressed path.
    ///
    /// If the target already exists, or appears while renaming, the staged
    /// file is discarded and the existing content is reused. Callers must
    /// hold the checksum lock.
    pub async fn commit(&self, staged: StagedUpload) -> Result<StoredContent, StorageError> {
        let StagedUpload {
            mut guard,
            checksum,
            size,
        } = staged;
        let storage_path = self.storage_path_for(&checksum);
        let target = self.resolver.secure_path(&[&storage_path]).await?;

        let deduplicated = if fs::try_exists(&target).await? {
            guard.discard().await;
            true
        } else {
            match fs::rename(guard.path(), &target).await {
                Ok(()) => {
                    guard.disarm();
                    false
                }
                Err(e) => {
                    if !fs::try_exists(&target).await.unwrap_or(false) {
                        return Err(e.into());
                    }
                    debug!(checksum = %checksum, error = %e, "Lost rename race, reusing stored content");
                    guard.discard().await;
                    true
                }
            }
        };

        Ok(StoredContent {
            checksum,
            size,
            storage_path,
            deduplicated,
        })
    }

    /// Open a stored file for reading.
    ///
    /// Returns `StorageError::NotFound` when nothing regular exists at the path.
    pub async fn open(&self, storage_path: &str) -> Result<OpenContent, StorageError> {
        let path = self.resolver.secure_path(&[storage_path]).await?;

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::not_found(storage_path));
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::not_found(storage_path));
        }

        Ok(OpenContent {
            file,
            total_size: metadata.len(),
        })
    }

    /// True if a file exists at the storage path.
    pub async fn exists(&self, storage_path: &str) -> Result<bool, StorageError> {
        let path = self.resolver.secure_path(&[storage_path]).await?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Delete a stored file. Returns false if it was already absent.
    pub async fn remove(&self, storage_path: &str) -> Result<bool, StorageError> {
        let path = self.resolver.secure_path(&[storage_path]).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List temp uploads and content files directly under the root.
    ///
    /// Files that match neither naming scheme are skipped.
    pub async fn scan(&self) -> Result<Vec<StoredEntry>, StorageError> {
        let root = self.resolver.canonical_root().await?;
        let mut dir = fs::read_dir(&root).await?;
        let now = SystemTime::now();
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            let Some(kind) = self.classify(&file_name) else {
                continue;
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();

            entries.push(StoredEntry {
                file_name,
                kind,
                age,
            });
        }

        Ok(entries)
    }

    fn classify(&self, file_name: &str) -> Option<StoredEntryKind> {
        if file_name.starts_with(TEMP_PREFIX) && file_name.ends_with(TEMP_SUFFIX) {
            return Some(StoredEntryKind::Upload);
        }
        let checksum = file_name
            .strip_suffix(&self.config.extension)?
            .strip_suffix('.')?;
        is_checksum(checksum).then(|| StoredEntryKind::Content {
            checksum: checksum.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "content_tests.rs"]
mod tests;
