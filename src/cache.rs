use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Recorded state for one indexed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// SHA-256 content fingerprint
    pub fingerprint: String,
    /// Last-seen modification time (unix seconds)
    pub mtime: i64,
    /// Detected language tag
    pub language: String,
}

/// Persisted fingerprint cache supporting incremental updates.
///
/// Maps each indexed root to its path -> FileEntry map. The indexing run
/// diffs this against the current walk to classify files as skip, replace
/// or delete.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FingerprintCache {
    /// Map of root path -> (file path -> entry)
    pub roots: HashMap<String, HashMap<String, FileEntry>>,
}

impl FingerprintCache {
    /// Load cache from disk
    pub fn load(cache_path: &Path) -> Result<Self> {
        if !cache_path.exists() {
            tracing::debug!("Fingerprint cache not found, starting empty");
            return Ok(Self::default());
        }

        let content =
            fs::read_to_string(cache_path).context("Failed to read fingerprint cache")?;

        let cache: FingerprintCache =
            serde_json::from_str(&content).context("Failed to parse fingerprint cache")?;

        tracing::info!("Loaded fingerprint cache with {} roots", cache.roots.len());
        Ok(cache)
    }

    /// Save cache to disk
    pub fn save(&self, cache_path: &Path) -> Result<()> {
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize cache")?;

        fs::write(cache_path, content).context("Failed to write fingerprint cache")?;

        tracing::debug!("Saved fingerprint cache to {:?}", cache_path);
        Ok(())
    }

    /// Get recorded entries for a root path
    pub fn get_root(&self, root: &str) -> Option<&HashMap<String, FileEntry>> {
        self.roots.get(root)
    }

    /// Replace recorded entries for a root path
    pub fn update_root(&mut self, root: String, entries: HashMap<String, FileEntry>) {
        self.roots.insert(root, entries);
    }

    /// Forget a root path entirely
    pub fn remove_root(&mut self, root: &str) {
        self.roots.remove(root);
    }

    /// Drop all recorded state
    pub fn clear(&mut self) {
        self.roots.clear();
    }
}
