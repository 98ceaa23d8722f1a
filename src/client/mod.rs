//! High-level client facade.
//!
//! Owns the embedding provider, the chunk store and the search engine, and
//! exposes the operations the MCP server and the CLI share: indexing a
//! tree, the three code search modes, documentation search, status and
//! clearing.

mod fs_lock;
mod indexing;

pub use fs_lock::IndexLockGuard;
pub use indexing::{IndexReport, Indexer};

use crate::cache::FingerprintCache;
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, FastEmbedProvider};
use crate::error::{CodeMemoryError, ValidationError};
use crate::search::{OutlineEntry, SearchEngine, SearchHit, SearchMode};
use crate::store::{ChunkStore, StoreStats};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct CodeMemory {
    store: Arc<ChunkStore>,
    provider: Arc<dyn EmbeddingProvider>,
    engine: SearchEngine,
    config: Config,
}

impl CodeMemory {
    /// Initialize with the configured FastEmbed model.
    ///
    /// Model initialization may download weights on first use, so it runs on
    /// the blocking pool.
    pub async fn new(config: Config) -> Result<Self, CodeMemoryError> {
        let model_name = config.embedding.model_name.clone();
        let provider = tokio::task::spawn_blocking(move || FastEmbedProvider::from_name(&model_name))
            .await
            .map_err(|e| CodeMemoryError::other(format!("Model init task failed: {}", e)))??;
        Self::with_provider(config, Arc::new(provider)).await
    }

    /// Initialize with an explicit provider
    pub async fn with_provider(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, CodeMemoryError> {
        let store = Arc::new(
            ChunkStore::open(
                &config.storage.store_path,
                provider.model_id(),
                provider.dimension(),
            )
            .await?,
        );
        let engine = SearchEngine::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            config.search.clone(),
        );
        Ok(Self {
            store,
            provider,
            engine,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index a directory tree incrementally
    pub async fn index_codebase(
        &self,
        directory: &str,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, CodeMemoryError> {
        let path = Path::new(directory);
        if !path.exists() {
            return Err(ValidationError::PathNotFound(directory.to_string()).into());
        }

        let indexer = Indexer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
            self.config.clone(),
        );
        indexer.index_directory(path, cancel).await
    }

    /// Ranked code search in the requested mode. `file_structure` queries
    /// take a file path instead of free text and return source-ordered
    /// outlines through [`Self::file_structure`].
    pub async fn search_code(
        &self,
        query: &str,
        mode: SearchMode,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchHit>, CodeMemoryError> {
        match mode {
            SearchMode::Definition => self.engine.definition(query, top_k).await,
            SearchMode::References => self.engine.references(query, top_k).await,
            SearchMode::FileStructure => Err(ValidationError::InvalidPath(
                "file_structure takes a file path; use the file_structure operation".to_string(),
            )
            .into()),
        }
    }

    /// Source-ordered outline of one indexed file
    pub async fn file_structure(&self, path: &str) -> Result<Vec<OutlineEntry>, CodeMemoryError> {
        self.engine.file_structure(path).await
    }

    /// Ranked search over the documentation corpus
    pub async fn search_docs(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchHit>, CodeMemoryError> {
        self.engine.docs(query, top_k).await
    }

    /// Current index contents and recorded model identity
    pub async fn status(&self) -> Result<StoreStats, CodeMemoryError> {
        Ok(self.store.stats().await?)
    }

    /// Whether queries would currently be refused for model mismatch
    pub fn model_matches(&self) -> bool {
        self.store.model_matches()
    }

    /// Drop all indexed data and forget fingerprint state
    pub async fn clear_index(&self) -> Result<(), CodeMemoryError> {
        self.store.clear().await?;

        let mut cache = FingerprintCache::load(&self.config.storage.fingerprint_path)?;
        cache.clear();
        cache.save(&self.config.storage.fingerprint_path)?;

        tracing::info!("Cleared index and fingerprint state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::TempDir;

    const DIM: usize = 4;

    struct StubProvider;

    impl EmbeddingProvider for StubProvider {
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let sum: u32 = t.bytes().map(u32::from).sum();
                    vec![(sum % 97) as f32, (sum % 89) as f32, t.len() as f32, 1.0]
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn model_id(&self) -> &str {
            "stub-model"
        }
    }

    async fn client(dirs: &TempDir) -> CodeMemory {
        let mut config = Config::default();
        config.storage.store_path = dirs.path().join("store");
        config.storage.fingerprint_path = dirs.path().join("fingerprints.json");
        CodeMemory::with_provider(config, Arc::new(StubProvider))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_index_then_search_roundtrip() {
        let dirs = TempDir::new().unwrap();
        let tree = dirs.path().join("tree");
        fs::create_dir(&tree).unwrap();
        fs::write(
            tree.join("lib.rs"),
            "fn compute_checksum(data: &[u8]) -> u64 { data.len() as u64 }",
        )
        .unwrap();

        let client = client(&dirs).await;
        let report = client
            .index_codebase(&tree.to_string_lossy(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 1);

        let hits = client
            .search_code("compute_checksum", SearchMode::Definition, None)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].name.as_deref(), Some("compute_checksum"));

        let outline = client.file_structure("lib.rs").await.unwrap();
        assert_eq!(outline.len(), 1);
    }

    #[tokio::test]
    async fn test_index_missing_path_is_user_error() {
        let dirs = TempDir::new().unwrap();
        let client = client(&dirs).await;

        let err = client
            .index_codebase("/no/such/tree", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn test_file_structure_not_served_through_search_code() {
        let dirs = TempDir::new().unwrap();
        let client = client(&dirs).await;

        let err = client
            .search_code("src/lib.rs", SearchMode::FileStructure, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CodeMemoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_clear_resets_status() {
        let dirs = TempDir::new().unwrap();
        let tree = dirs.path().join("tree");
        fs::create_dir(&tree).unwrap();
        fs::write(tree.join("a.rs"), "fn alpha() {}").unwrap();

        let client = client(&dirs).await;
        client
            .index_codebase(&tree.to_string_lossy(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(client.status().await.unwrap().code_chunks > 0);

        client.clear_index().await.unwrap();
        let status = client.status().await.unwrap();
        assert_eq!(status.code_chunks, 0);
        assert!(status.last_run.is_none());

        // After a clear, a rerun indexes from scratch instead of skipping
        let report = client
            .index_codebase(&tree.to_string_lossy(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 1);
    }
}
