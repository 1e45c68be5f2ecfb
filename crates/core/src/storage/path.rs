//! Storage root resolution and traversal-safe path building.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tokio::fs;

use super::config::StorageConfig;
use super::error::StorageError;

/// Resolves paths under the storage root.
///
/// Every filesystem access in the content store goes through
/// [`PathResolver::secure_path`].
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for an explicit root directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a resolver from storage configuration.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.storage_root())
    }

    /// The configured storage root (not canonicalized).
    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.root
    }

    /// Canonical form of the storage root; fails if it does not exist.
    pub async fn canonical_root(&self) -> Result<PathBuf, StorageError> {
        Ok(fs::canonicalize(&self.root).await?)
    }

    /// Create the storage root if needed and return its canonical form.
    pub async fn ensure_root(&self) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.root).await?;
        Ok(fs::canonicalize(&self.root).await?)
    }

    /// Join `segments` under the root and verify the result stays inside it.
    ///
    /// `..` components are resolved lexically and symlinks are resolved for
    /// the deepest existing ancestor, so neither can be used to escape.
    pub async fn secure_path<S: AsRef<Path>>(&self, segments: &[S]) -> Result<PathBuf, StorageError> {
        let root = self.canonical_root().await?;

        let mut joined = root.clone();
        for segment in segments {
            joined.push(segment.as_ref());
        }

        let resolved = resolve_existing_prefix(&normalize_lexically(&joined)).await?;
        if !resolved.starts_with(&root) {
            let requested = segments
                .iter()
                .map(|s| s.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join("/");
            return Err(StorageError::path_traversal(requested));
        }

        Ok(resolved)
    }
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the rest.
async fn resolve_existing_prefix(path: &Path) -> Result<PathBuf, StorageError> {
    for ancestor in path.ancestors() {
        match fs::canonicalize(ancestor).await {
            Ok(canonical) => {
                let rest = path.strip_prefix(ancestor).unwrap_or_else(|_| Path::new(""));
                return Ok(if rest.as_os_str().is_empty() {
                    canonical
                } else {
                    canonical.join(rest)
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(path.to_path_buf())
}
