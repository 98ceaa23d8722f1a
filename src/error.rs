/// Centralized error types for code-memory using thiserror
///
/// Provides domain-specific error types for better error handling and user-facing messages.
use thiserror::Error;

/// Main error type for the code-memory system
#[derive(Error, Debug)]
pub enum CodeMemoryError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors from structural parsing and chunk extraction
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to parse '{file}': {reason}")]
    ParseFailure { file: String, reason: String },

    #[error("Grammar failed to load for language '{0}'")]
    GrammarUnavailable(String),

    #[error("No chunks generated from file: {0}")]
    NoChunksGenerated(String),
}

/// Errors related to embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    InitializationFailed(String),

    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),

    #[error("Embedding batch is empty")]
    EmptyBatch,

    #[error("Embedding generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Model lock was poisoned: {0}")]
    LockPoisoned(String),
}

/// Errors from the persistent chunk store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(
        "Store was indexed with model '{recorded_model}' ({recorded_dimension}d) but the active model is '{active_model}' ({active_dimension}d); run index_codebase to rebuild the index before querying"
    )]
    SchemaMismatch {
        recorded_model: String,
        recorded_dimension: usize,
        active_model: String,
        active_dimension: usize,
    },

    #[error(
        "Store schema version {found} is not supported (expected {expected}); run index_codebase to rebuild the index"
    )]
    SchemaVersionMismatch { found: u32, expected: u32 },

    #[error("Failed to initialize store: {0}")]
    InitializationFailed(String),

    #[error("Store table '{0}' not found")]
    TableNotFound(String),

    #[error("Failed to upsert chunks for '{file}': {reason}; previous indexed state was left unchanged")]
    UpsertFailed { file: String, reason: String },

    #[error("Failed to delete stored data for '{file}': {reason}")]
    DeleteFailed { file: String, reason: String },

    #[error("Vector search failed: {0}")]
    VectorSearchFailed(String),

    #[error("Lexical search failed: {0}")]
    LexicalSearchFailed(String),

    #[error("Failed to read statistics: {0}")]
    StatisticsFailed(String),

    #[error("Failed to clear store: {0}")]
    ClearFailed(String),

    #[error("Store IO failure: {0}")]
    Io(String),
}

/// Errors related to an indexing run
#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Failed to walk directory: {0}")]
    WalkFailed(String),

    #[error("Failed to read file '{file}': {reason}")]
    FileReadFailed { file: String, reason: String },

    #[error("Another indexing run already holds the lock for this store; no changes were made")]
    AlreadyIndexing,

    #[error("Indexing was cancelled; files committed before cancellation remain indexed")]
    Cancelled,
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid search type '{0}': expected one of definition, references, file_structure")]
    InvalidSearchType(String),

    #[error("Empty {0}")]
    Empty(String),

    #[error("{field} must be {constraint}, got {actual}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        actual: String,
    },
}

/// Errors from the persisted fingerprint/metadata state files
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to load state from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save state to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },

    #[error("State file is corrupted: {0}")]
    Corrupted(String),
}

// Conversion from anyhow::Error to CodeMemoryError
impl From<anyhow::Error> for CodeMemoryError {
    fn from(err: anyhow::Error) -> Self {
        CodeMemoryError::Other(format!("{:#}", err))
    }
}

// Helper methods for CodeMemoryError
impl CodeMemoryError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        CodeMemoryError::Other(msg.into())
    }

    /// Convert to a user-facing error string suitable for MCP responses
    pub fn to_user_string(&self) -> String {
        format!("{}", self)
    }

    /// Check if this is a user error (validation, not found) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CodeMemoryError::Validation(_)
                | CodeMemoryError::Config(ConfigError::InvalidValue { .. })
                | CodeMemoryError::Indexing(IndexingError::DirectoryNotFound(_))
                | CodeMemoryError::Indexing(IndexingError::NotADirectory(_))
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CodeMemoryError::Embedding(EmbeddingError::Timeout(_))
                | CodeMemoryError::Indexing(IndexingError::AlreadyIndexing)
                | CodeMemoryError::Io(_)
        )
    }
}
