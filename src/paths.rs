/// Centralized platform-specific path computation
///
/// Uses the platform conventions exposed by the `dirs` crate (XDG on Linux,
/// Library folders on macOS, AppData on Windows) with a "." fallback.
use std::path::{Path, PathBuf};

const APP_DIR: &str = "code-memory";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Get the appropriate data directory for the current platform
    pub fn data_dir() -> PathBuf {
        dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the appropriate cache directory for the current platform
    pub fn cache_dir() -> PathBuf {
        dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the appropriate config directory for the current platform
    pub fn config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get app-specific data directory: {data_dir}/code-memory
    pub fn app_data_dir() -> PathBuf {
        Self::data_dir().join(APP_DIR)
    }

    /// Get app-specific cache directory: {cache_dir}/code-memory
    pub fn app_cache_dir() -> PathBuf {
        Self::cache_dir().join(APP_DIR)
    }

    /// Get default store path: {data_dir}/code-memory/store
    pub fn default_store_path() -> PathBuf {
        Self::app_data_dir().join("store")
    }

    /// Get default fingerprint state path: {cache_dir}/code-memory/fingerprints.json
    pub fn default_fingerprint_path() -> PathBuf {
        Self::app_cache_dir().join("fingerprints.json")
    }

    /// Get default config file path: {config_dir}/code-memory/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::config_dir().join(APP_DIR).join("config.toml")
    }
}

/// Normalize a path to a stable canonical string used as a store key.
///
/// Canonicalizes when the path exists so that `./src`, `src/` and an
/// absolute path to the same directory all map to the same key; falls back
/// to the path as given when canonicalization fails (deleted files still
/// need a stable key for cascade deletes).
pub fn normalize_path(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}
