//! Per-checksum async locks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes finalize, persist and reclaim for one checksum.
///
/// Entries are created on demand and dropped once no holder or waiter
/// remains.
#[derive(Debug, Default)]
pub struct ChecksumLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChecksumLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock on `checksum`.
    pub async fn lock(&self, checksum: &str) -> ChecksumGuard<'_> {
        let mutex = self.locks.entry(checksum.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;

        ChecksumGuard {
            locks: self,
            key: checksum.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of live lock entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if no lock is held or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held lock for one checksum; releases on drop.
#[derive(Debug)]
pub struct ChecksumGuard<'a> {
    locks: &'a ChecksumLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChecksumGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
