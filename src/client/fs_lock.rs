//! Cross-process indexing lock.
//!
//! An advisory flock() keyed by the normalized store path prevents two
//! processes from mutating the same store at once, regardless of which
//! tree each one is indexing. Acquisition is fail-fast:
//! a held lock is reported to the caller instead of waited on. A crashed
//! holder releases the flock through the OS.

use anyhow::{Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::PathBuf;

fn lock_dir() -> PathBuf {
    crate::paths::PlatformPaths::app_data_dir().join("locks")
}

/// Lock file path for a store key, hashed to a safe filename
fn lock_file_path(store_key: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(store_key.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    lock_dir().join(format!("{}.lock", &hash[..16]))
}

/// Guard holding the exclusive lock; released on drop
pub struct IndexLockGuard {
    _file: File,
}

impl IndexLockGuard {
    /// Try to acquire the lock for a store, without waiting.
    ///
    /// Returns `Ok(None)` when another process holds the lock.
    pub fn try_acquire(store_key: &str) -> Result<Option<Self>> {
        let lock_path = lock_file_path(store_key);

        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }

        let file = File::create(&lock_path).context("Failed to create lock file")?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(
                    "Acquired indexing lock for {} ({})",
                    store_key,
                    lock_path.display()
                );
                Ok(Some(Self { _file: file }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::debug!("Indexing lock already held for {}", store_key);
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to acquire indexing lock"),
        }
    }
}
