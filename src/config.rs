/// Configuration system for code-memory
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{CodeMemoryError, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Persistent store configuration
    pub storage: StorageConfig,

    /// Embedding model configuration
    pub embedding: EmbeddingConfig,

    /// Indexing configuration
    pub indexing: IndexingConfig,

    /// Search configuration
    pub search: SearchConfig,

    /// Documentation corpus configuration
    pub docs: DocsConfig,
}

/// Persistent store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store directory (LanceDB tables, lexical indexes, metadata, run lock)
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Fingerprint state file for incremental change detection
    #[serde(default = "default_fingerprint_path")]
    pub fingerprint_path: PathBuf,
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Batch size for embedding generation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout in seconds for one embedding batch
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Input-length ceiling per chunk in characters; oversized chunks are split
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Maximum file size to index (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Include patterns (globs); empty means all supported files
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Exclude patterns applied on top of gitignore rules
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default result limit
    #[serde(default = "default_result_limit")]
    pub limit: usize,

    /// Candidate pool fetched from each channel before fusion
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,

    /// Maximum snippet length in characters
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
}

/// Documentation corpus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    /// File extensions treated as documentation
    #[serde(default = "default_doc_extensions")]
    pub extensions: Vec<String>,

    /// Maximum section size in characters before splitting
    #[serde(default = "default_max_section_chars")]
    pub max_section_chars: usize,

    /// Sections smaller than this are merged into their neighbor
    #[serde(default = "default_min_section_chars")]
    pub min_section_chars: usize,
}

// Default value functions
fn default_store_path() -> PathBuf {
    crate::paths::PlatformPaths::default_store_path()
}

fn default_fingerprint_path() -> PathBuf {
    crate::paths::PlatformPaths::default_fingerprint_path()
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_max_input_chars() -> usize {
    2000
}

fn default_max_file_size() -> usize {
    1_048_576 // 1 MB
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "target".to_string(),
        "node_modules".to_string(),
        ".git".to_string(),
        "dist".to_string(),
        "build".to_string(),
        "__pycache__".to_string(),
        ".venv".to_string(),
    ]
}

fn default_result_limit() -> usize {
    10
}

fn default_candidate_pool() -> usize {
    50
}

fn default_snippet_max_chars() -> usize {
    300
}

fn default_doc_extensions() -> Vec<String> {
    vec!["md".to_string(), "markdown".to_string()]
}

fn default_max_section_chars() -> usize {
    1000
}

fn default_min_section_chars() -> usize {
    50
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            fingerprint_path: default_fingerprint_path(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            include_patterns: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_result_limit(),
            candidate_pool: default_candidate_pool(),
            snippet_max_chars: default_snippet_max_chars(),
        }
    }
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            extensions: default_doc_extensions(),
            max_section_chars: default_max_section_chars(),
            min_section_chars: default_min_section_chars(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, CodeMemoryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("{}: {}", path.display(), e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location or fall back to defaults
    pub fn load_or_default() -> Result<Self, CodeMemoryError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), CodeMemoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), CodeMemoryError> {
        if self.embedding.model_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "embedding.model_name".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        if self.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.batch_size".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.embedding.max_input_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.max_input_chars".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.indexing.max_file_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "indexing.max_file_size".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.search.limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "search.limit".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.search.candidate_pool < self.search.limit {
            return Err(ConfigError::InvalidValue {
                key: "search.candidate_pool".to_string(),
                reason: format!(
                    "must be at least search.limit ({}), got {}",
                    self.search.limit, self.search.candidate_pool
                ),
            }
            .into());
        }

        if self.docs.max_section_chars <= self.docs.min_section_chars {
            return Err(ConfigError::InvalidValue {
                key: "docs.max_section_chars".to_string(),
                reason: "must be greater than docs.min_section_chars".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CODE_MEMORY_STORE_PATH") {
            self.storage.store_path = PathBuf::from(path);
        }

        if let Ok(model) = std::env::var("CODE_MEMORY_MODEL") {
            self.embedding.model_name = model;
        }

        if let Ok(batch_size) = std::env::var("CODE_MEMORY_BATCH_SIZE")
            && let Ok(size) = batch_size.parse()
        {
            self.embedding.batch_size = size;
        }

        if let Ok(limit) = std::env::var("CODE_MEMORY_RESULT_LIMIT")
            && let Ok(limit) = limit.parse()
        {
            self.search.limit = limit;
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, CodeMemoryError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.embedding.model_name, "all-MiniLM-L6-v2");
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.search.limit, 10);
        assert_eq!(config.search.candidate_pool, 50);
        assert_eq!(config.docs.max_section_chars, 1000);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_batch_size() {
        let mut config = Config::default();
        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_pool_smaller_than_limit() {
        let mut config = Config::default();
        config.search.candidate_pool = 5;
        config.search.limit = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_doc_section_bounds() {
        let mut config = Config::default();
        config.docs.max_section_chars = 40;
        config.docs.min_section_chars = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.embedding.batch_size = 64;
        config.search.limit = 20;

        config.save(path).unwrap();
        let loaded = Config::from_file(path).unwrap();

        assert_eq!(loaded.embedding.batch_size, 64);
        assert_eq!(loaded.search.limit, 20);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::from_file(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "invalid toml {{{ content").unwrap();

        let result = Config::from_file(temp_file.path());
        assert!(matches!(
            result.unwrap_err(),
            CodeMemoryError::Config(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn test_from_file_partial_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let partial_config = r#"
[embedding]
model_name = "custom-model"
        "#;
        std::fs::write(temp_file.path(), partial_config).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.embedding.model_name, "custom-model");
        // Missing fields fall back to defaults
        assert_eq!(config.search.limit, 10);
        assert_eq!(config.embedding.batch_size, 32);
    }

    #[test]
    fn test_apply_env_overrides() {
        // Safety: tests in this module do not race on these variables
        unsafe {
            std::env::set_var("CODE_MEMORY_MODEL", "bge-small-en-v1.5");
            std::env::set_var("CODE_MEMORY_BATCH_SIZE", "64");
        }

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.embedding.model_name, "bge-small-en-v1.5");
        assert_eq!(config.embedding.batch_size, 64);

        unsafe {
            std::env::remove_var("CODE_MEMORY_MODEL");
            std::env::remove_var("CODE_MEMORY_BATCH_SIZE");
        }
    }

    #[test]
    fn test_apply_env_overrides_with_invalid_values() {
        unsafe {
            std::env::set_var("CODE_MEMORY_BATCH_SIZE", "not_a_number");
        }

        let mut config = Config::default();
        let original_batch = config.embedding.batch_size;
        config.apply_env_overrides();

        // Unparseable values are ignored, keeping defaults
        assert_eq!(config.embedding.batch_size, original_batch);

        unsafe {
            std::env::remove_var("CODE_MEMORY_BATCH_SIZE");
        }
    }

    #[test]
    fn test_default_exclude_patterns() {
        let config = Config::default();
        assert!(
            config
                .indexing
                .exclude_patterns
                .contains(&"target".to_string())
        );
        assert!(
            config
                .indexing
                .exclude_patterns
                .contains(&"node_modules".to_string())
        );
    }

    #[test]
    fn test_save_creates_parent_directory() {
        use tempfile::TempDir;
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir
            .path()
            .join("nested")
            .join("path")
            .join("config.toml");

        let config = Config::default();
        config.save(&nested_path).unwrap();
        assert!(nested_path.exists());
    }

    #[test]
    fn test_from_file_validates_loaded_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let invalid_config = r#"
[embedding]
model_name = ""
        "#;
        std::fs::write(temp_file.path(), invalid_config).unwrap();

        let result = Config::from_file(temp_file.path());
        assert!(matches!(
            result.unwrap_err(),
            CodeMemoryError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_boundary_values() {
        let mut config = Config::default();

        config.embedding.batch_size = 1;
        assert!(config.validate().is_ok());

        config.search.candidate_pool = config.search.limit;
        assert!(config.validate().is_ok());
    }
}
