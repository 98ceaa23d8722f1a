//! Persistent chunk store.
//!
//! One store directory holds both retrieval channels and their shared
//! metadata: LanceDB tables for vectors, Tantivy indexes for BM25 postings,
//! and a JSON metadata file recording the schema version and the embedding
//! model identity the vectors were produced with. Code and documentation
//! chunks live in separate corpora with identical layouts.

mod lance;
mod lexical;

pub use lance::{ChunkRecord, ChunkTable};
pub use lexical::{LexicalHit, LexicalIndex};

use crate::error::StoreError;
use crate::parser::Chunk;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub const SCHEMA_VERSION: u32 = 1;

/// Which chunk corpus an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corpus {
    Code,
    Docs,
}

impl Corpus {
    fn table_name(self) -> &'static str {
        match self {
            Corpus::Code => "code_chunks",
            Corpus::Docs => "doc_chunks",
        }
    }

    fn lexical_dir(self) -> &'static str {
        match self {
            Corpus::Code => "lexical_code",
            Corpus::Docs => "lexical_docs",
        }
    }
}

/// Persisted store identity, checked on open and before every query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub schema_version: u32,
    pub model_id: String,
    pub dimension: usize,
    pub last_run: Option<String>,
}

/// Aggregate counts for status reporting
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub code_chunks: usize,
    pub doc_chunks: usize,
    pub indexed_files: usize,
    pub language_breakdown: Vec<(String, usize)>,
    pub model_id: String,
    pub dimension: usize,
    pub last_run: Option<String>,
}

/// Facade over both retrieval channels of both corpora.
///
/// Writes hold the exclusive side of an internal RwLock and always touch
/// the vector table and the lexical index together, so a file is replaced
/// or removed in both channels as one step. Queries hold the shared side
/// for their duration and therefore never interleave with a per-file
/// write; they also check the recorded model identity first and refuse to
/// serve results embedded by a different model.
pub struct ChunkStore {
    root: PathBuf,
    code_table: ChunkTable,
    docs_table: ChunkTable,
    code_lexical: LexicalIndex,
    docs_lexical: LexicalIndex,
    metadata: std::sync::RwLock<IndexMetadata>,
    metadata_path: PathBuf,
    channel_lock: RwLock<()>,
    active_model: String,
    active_dimension: usize,
}

impl ChunkStore {
    /// Open or create a store rooted at `store_path` for the active model.
    ///
    /// A metadata file recorded by an unsupported schema version is refused.
    /// A recorded model different from the active one does not block opening;
    /// queries will fail until an indexing run rebuilds the store.
    pub async fn open(
        store_path: &Path,
        active_model: &str,
        active_dimension: usize,
    ) -> Result<Self, StoreError> {
        std::fs::create_dir_all(store_path)
            .map_err(|e| StoreError::Io(format!("{}: {}", store_path.display(), e)))?;

        let metadata_path = store_path.join("metadata.json");
        let metadata = match load_metadata(&metadata_path)? {
            Some(existing) => {
                if existing.schema_version != SCHEMA_VERSION {
                    return Err(StoreError::SchemaVersionMismatch {
                        found: existing.schema_version,
                        expected: SCHEMA_VERSION,
                    });
                }
                existing
            }
            None => {
                let fresh = IndexMetadata {
                    schema_version: SCHEMA_VERSION,
                    model_id: active_model.to_string(),
                    dimension: active_dimension,
                    last_run: None,
                };
                save_metadata(&metadata_path, &fresh)?;
                fresh
            }
        };

        let lance_path = store_path.join("lancedb");
        let connection = lancedb::connect(&lance_path.to_string_lossy())
            .execute()
            .await
            .map_err(|e| StoreError::InitializationFailed(format!("{:#}", e)))?;

        let code_table =
            ChunkTable::open(connection.clone(), Corpus::Code.table_name(), active_dimension)
                .await
                .map_err(|e| StoreError::InitializationFailed(format!("{:#}", e)))?;
        let docs_table = ChunkTable::open(connection, Corpus::Docs.table_name(), active_dimension)
            .await
            .map_err(|e| StoreError::InitializationFailed(format!("{:#}", e)))?;

        let code_lexical = LexicalIndex::open(store_path.join(Corpus::Code.lexical_dir()))
            .map_err(|e| StoreError::InitializationFailed(format!("{:#}", e)))?;
        let docs_lexical = LexicalIndex::open(store_path.join(Corpus::Docs.lexical_dir()))
            .map_err(|e| StoreError::InitializationFailed(format!("{:#}", e)))?;

        tracing::debug!(
            "Opened store at {} (recorded model {}, active model {})",
            store_path.display(),
            metadata.model_id,
            active_model
        );

        Ok(Self {
            root: store_path.to_path_buf(),
            code_table,
            docs_table,
            code_lexical,
            docs_lexical,
            metadata: std::sync::RwLock::new(metadata),
            metadata_path,
            channel_lock: RwLock::new(()),
            active_model: active_model.to_string(),
            active_dimension,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table(&self, corpus: Corpus) -> &ChunkTable {
        match corpus {
            Corpus::Code => &self.code_table,
            Corpus::Docs => &self.docs_table,
        }
    }

    fn lexical(&self, corpus: Corpus) -> &LexicalIndex {
        match corpus {
            Corpus::Code => &self.code_lexical,
            Corpus::Docs => &self.docs_lexical,
        }
    }

    pub fn metadata(&self) -> IndexMetadata {
        self.metadata
            .read()
            .map(|m| m.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Whether the recorded model identity matches the active provider
    pub fn model_matches(&self) -> bool {
        let meta = self.metadata();
        meta.model_id == self.active_model && meta.dimension == self.active_dimension
    }

    fn ensure_model_match(&self) -> Result<(), StoreError> {
        let meta = self.metadata();
        if meta.model_id != self.active_model || meta.dimension != self.active_dimension {
            return Err(StoreError::SchemaMismatch {
                recorded_model: meta.model_id,
                recorded_dimension: meta.dimension,
                active_model: self.active_model.clone(),
                active_dimension: self.active_dimension,
            });
        }
        Ok(())
    }

    fn persist_metadata(&self, update: impl FnOnce(&mut IndexMetadata)) -> Result<(), StoreError> {
        let mut guard = self
            .metadata
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = guard.clone();
        update(&mut next);
        save_metadata(&self.metadata_path, &next)?;
        *guard = next;
        Ok(())
    }

    /// Drop everything indexed under the old model and adopt the active one.
    ///
    /// Tables are recreated so a dimension change takes effect. Called by the
    /// indexer when it detects a recorded model different from the active one.
    pub async fn rebuild_for_active_model(&self) -> Result<(), StoreError> {
        let _guard = self.channel_lock.write().await;

        tracing::info!(
            "Rebuilding store for model change to '{}' ({}d)",
            self.active_model,
            self.active_dimension
        );

        // Tables were opened with the active dimension, so drop and recreate
        // takes a dimension change along with it
        self.code_table
            .clear()
            .await
            .map_err(|e| StoreError::ClearFailed(format!("{:#}", e)))?;
        self.docs_table
            .clear()
            .await
            .map_err(|e| StoreError::ClearFailed(format!("{:#}", e)))?;
        self.code_lexical
            .clear()
            .map_err(|e| StoreError::ClearFailed(format!("{:#}", e)))?;
        self.docs_lexical
            .clear()
            .map_err(|e| StoreError::ClearFailed(format!("{:#}", e)))?;

        let (model, dimension) = (self.active_model.clone(), self.active_dimension);
        self.persist_metadata(|m| {
            m.model_id = model;
            m.dimension = dimension;
            m.last_run = None;
        })
    }

    /// Replace all stored data for one file in both channels.
    ///
    /// The exclusive lock is held across delete and add, so no query can
    /// observe the file half-replaced. A failed upsert leaves the file
    /// absent from both channels rather than present in only one.
    pub async fn upsert_file_chunks(
        &self,
        corpus: Corpus,
        path: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        let _guard = self.channel_lock.write().await;

        let fail = |reason: String| StoreError::UpsertFailed {
            file: path.to_string(),
            reason,
        };

        self.table(corpus)
            .delete_by_path(path)
            .await
            .map_err(|e| fail(format!("{:#}", e)))?;
        self.lexical(corpus)
            .delete_by_path(path)
            .map_err(|e| fail(format!("{:#}", e)))?;

        self.table(corpus)
            .add_chunks(chunks, embeddings, &self.active_model)
            .await
            .map_err(|e| fail(format!("{:#}", e)))?;
        if let Err(e) = self.lexical(corpus).add_chunks(chunks) {
            // Drop the vector rows that just landed so the file is absent
            // from both channels instead of present in one
            if let Err(cleanup) = self.table(corpus).delete_by_path(path).await {
                tracing::error!(
                    "Failed to roll back vector rows for {} after lexical add failure: {:#}",
                    path,
                    cleanup
                );
            }
            return Err(fail(format!("{:#}", e)));
        }

        Ok(())
    }

    /// Remove all stored data for one file from both channels
    pub async fn delete_file(&self, corpus: Corpus, path: &str) -> Result<(), StoreError> {
        let _guard = self.channel_lock.write().await;

        let fail = |reason: String| StoreError::DeleteFailed {
            file: path.to_string(),
            reason,
        };

        self.table(corpus)
            .delete_by_path(path)
            .await
            .map_err(|e| fail(format!("{:#}", e)))?;
        self.lexical(corpus)
            .delete_by_path(path)
            .map_err(|e| fail(format!("{:#}", e)))?;
        Ok(())
    }

    /// BM25 ranking over one corpus
    pub async fn lexical_search(
        &self,
        corpus: Corpus,
        query: &str,
        limit: usize,
    ) -> Result<Vec<LexicalHit>, StoreError> {
        let _guard = self.channel_lock.read().await;
        self.ensure_model_match()?;
        self.lexical(corpus)
            .search(query, limit)
            .map_err(|e| StoreError::LexicalSearchFailed(format!("{:#}", e)))
    }

    /// Nearest-neighbor ranking over one corpus, restricted to the active model
    pub async fn vector_search(
        &self,
        corpus: Corpus,
        query_vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, StoreError> {
        let _guard = self.channel_lock.read().await;
        self.ensure_model_match()?;
        self.table(corpus)
            .vector_search(query_vector, limit, &self.active_model)
            .await
            .map_err(|e| StoreError::VectorSearchFailed(format!("{:#}", e)))
    }

    /// Fetch chunk rows by id, for hydrating lexical-only candidates
    pub async fn get_chunks_by_ids(
        &self,
        corpus: Corpus,
        ids: &[u64],
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let _guard = self.channel_lock.read().await;
        self.table(corpus)
            .get_by_ids(ids)
            .await
            .map_err(|e| StoreError::VectorSearchFailed(format!("{:#}", e)))
    }

    /// All chunks of one code file, ordered by start line
    pub async fn file_chunks(&self, path: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let _guard = self.channel_lock.read().await;
        self.ensure_model_match()?;
        let mut records = self
            .code_table
            .chunks_for_path(path)
            .await
            .map_err(|e| StoreError::VectorSearchFailed(format!("{:#}", e)))?;
        records.sort_by_key(|r| r.start_line);
        Ok(records)
    }

    /// Distinct file paths present in a corpus
    pub async fn indexed_paths(&self, corpus: Corpus) -> Result<Vec<String>, StoreError> {
        self.table(corpus)
            .indexed_paths()
            .await
            .map_err(|e| StoreError::StatisticsFailed(format!("{:#}", e)))
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let fail = |e: anyhow::Error| StoreError::StatisticsFailed(format!("{:#}", e));

        let code_chunks = self.code_table.count().await.map_err(fail)?;
        let doc_chunks = self.docs_table.count().await.map_err(fail)?;
        let code_paths = self.code_table.indexed_paths().await.map_err(fail)?;
        let doc_paths = self.docs_table.indexed_paths().await.map_err(fail)?;
        let language_breakdown = self.code_table.language_counts().await.map_err(fail)?;

        let meta = self.metadata();
        Ok(StoreStats {
            code_chunks,
            doc_chunks,
            indexed_files: code_paths.len() + doc_paths.len(),
            language_breakdown,
            model_id: meta.model_id,
            dimension: meta.dimension,
            last_run: meta.last_run,
        })
    }

    /// Record a completed indexing run in metadata
    pub fn mark_run_complete(&self) -> Result<(), StoreError> {
        let (model, dimension) = (self.active_model.clone(), self.active_dimension);
        self.persist_metadata(|m| {
            m.model_id = model;
            m.dimension = dimension;
            m.last_run = Some(chrono::Utc::now().to_rfc3339());
        })
    }

    /// Delete everything from both corpora and reset run metadata
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.channel_lock.write().await;

        let fail = |e: anyhow::Error| StoreError::ClearFailed(format!("{:#}", e));
        self.code_table.clear().await.map_err(fail)?;
        self.docs_table.clear().await.map_err(fail)?;
        self.code_lexical.clear().map_err(fail)?;
        self.docs_lexical.clear().map_err(fail)?;

        self.persist_metadata(|m| {
            m.last_run = None;
        })
    }
}

fn load_metadata(path: &Path) -> Result<Option<IndexMetadata>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
    let metadata = serde_json::from_str(&content)
        .map_err(|e| StoreError::InitializationFailed(format!("corrupt metadata file: {}", e)))?;
    Ok(Some(metadata))
}

fn save_metadata(path: &Path, metadata: &IndexMetadata) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(metadata)
        .map_err(|e| StoreError::Io(e.to_string()))?;
    std::fs::write(path, content)
        .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ChunkKind;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn chunk(path: &str, name: &str, start_line: u32) -> Chunk {
        Chunk {
            path: path.to_string(),
            language: "rust".to_string(),
            kind: ChunkKind::Function,
            name: Some(name.to_string()),
            start_line,
            end_line: start_line + 5,
            start_byte: start_line as usize * 80,
            end_byte: start_line as usize * 80 + 40,
            text: format!("fn {}() {{ body of {} }}", name, name),
            doc: None,
        }
    }

    async fn open_store(dir: &TempDir, model: &str) -> ChunkStore {
        ChunkStore::open(&dir.path().join("store"), model, DIM)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_writes_metadata() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, "model-a").await;
        let meta = store.metadata();
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert_eq!(meta.model_id, "model-a");
        assert_eq!(meta.dimension, DIM);
        assert!(meta.last_run.is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_both_channels() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, "model-a").await;

        store
            .upsert_file_chunks(
                Corpus::Code,
                "a.rs",
                &[chunk("a.rs", "original_name", 1)],
                &[vec![0.1; DIM]],
            )
            .await
            .unwrap();
        store
            .upsert_file_chunks(
                Corpus::Code,
                "a.rs",
                &[chunk("a.rs", "replacement_name", 1)],
                &[vec![0.2; DIM]],
            )
            .await
            .unwrap();

        let records = store.file_chunks("a.rs").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("replacement_name"));

        // Old chunk is gone from the lexical channel too
        let hits = store
            .lexical_search(Corpus::Code, "original_name", 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
        let hits = store
            .lexical_search(Corpus::Code, "replacement_name", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_search_never_observes_partial_upsert() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, "model-a").await;
        store
            .upsert_file_chunks(
                Corpus::Code,
                "a.rs",
                &[chunk("a.rs", "steady_name", 1)],
                &[vec![0.1; DIM]],
            )
            .await
            .unwrap();

        // A query racing a replace of the same file must see the file
        // either before or after the replace, never mid-replace
        for round in 0..25u32 {
            let value = 0.1 + round as f32 / 100.0;
            let upsert = store.upsert_file_chunks(
                Corpus::Code,
                "a.rs",
                &[chunk("a.rs", "steady_name", 1)],
                &[vec![value; DIM]],
            );
            let search = store.lexical_search(Corpus::Code, "steady_name", 10);
            let (written, hits) = tokio::join!(upsert, search);
            written.unwrap();
            assert_eq!(hits.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_delete_file_cascades() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, "model-a").await;

        store
            .upsert_file_chunks(
                Corpus::Code,
                "a.rs",
                &[chunk("a.rs", "alpha", 1)],
                &[vec![0.1; DIM]],
            )
            .await
            .unwrap();
        store.delete_file(Corpus::Code, "a.rs").await.unwrap();

        assert!(store.file_chunks("a.rs").await.unwrap().is_empty());
        assert!(
            store
                .lexical_search(Corpus::Code, "alpha", 10)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.stats().await.unwrap().code_chunks, 0);
    }

    #[tokio::test]
    async fn test_queries_refused_after_model_change() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir, "model-a").await;
            store
                .upsert_file_chunks(
                    Corpus::Code,
                    "a.rs",
                    &[chunk("a.rs", "alpha", 1)],
                    &[vec![0.1; DIM]],
                )
                .await
                .unwrap();
        }

        let store = open_store(&dir, "model-b").await;
        assert!(!store.model_matches());

        let err = store
            .lexical_search(Corpus::Code, "alpha", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
        let msg = err.to_string();
        assert!(msg.contains("model-a"));
        assert!(msg.contains("model-b"));

        let err = store
            .vector_search(Corpus::Code, vec![0.1; DIM], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn test_rebuild_for_active_model() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir, "model-a").await;
            store
                .upsert_file_chunks(
                    Corpus::Code,
                    "a.rs",
                    &[chunk("a.rs", "alpha", 1)],
                    &[vec![0.1; DIM]],
                )
                .await
                .unwrap();
            store.mark_run_complete().unwrap();
        }

        let store = open_store(&dir, "model-b").await;
        store.rebuild_for_active_model().await.unwrap();

        assert!(store.model_matches());
        let meta = store.metadata();
        assert_eq!(meta.model_id, "model-b");
        assert!(meta.last_run.is_none());
        assert!(store.file_chunks("a.rs").await.unwrap().is_empty());
        assert!(
            store
                .lexical_search(Corpus::Code, "alpha", 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_corpora_are_separate() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, "model-a").await;

        let mut doc = chunk("README.md", "Install", 1);
        doc.kind = ChunkKind::DocSection;
        doc.language = "markdown".to_string();
        doc.text = "Install with the package manager".to_string();

        store
            .upsert_file_chunks(
                Corpus::Code,
                "a.rs",
                &[chunk("a.rs", "install", 1)],
                &[vec![0.1; DIM]],
            )
            .await
            .unwrap();
        store
            .upsert_file_chunks(Corpus::Docs, "README.md", &[doc], &[vec![0.2; DIM]])
            .await
            .unwrap();

        let code_hits = store
            .lexical_search(Corpus::Code, "install", 10)
            .await
            .unwrap();
        assert_eq!(code_hits.len(), 1);
        assert_eq!(code_hits[0].path, "a.rs");

        let doc_hits = store
            .lexical_search(Corpus::Docs, "Install", 10)
            .await
            .unwrap();
        assert_eq!(doc_hits.len(), 1);
        assert_eq!(doc_hits[0].path, "README.md");

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.code_chunks, 1);
        assert_eq!(stats.doc_chunks, 1);
        assert_eq!(stats.indexed_files, 2);
    }

    #[tokio::test]
    async fn test_file_chunks_ordered_by_start_line() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, "model-a").await;

        store
            .upsert_file_chunks(
                Corpus::Code,
                "a.rs",
                &[
                    chunk("a.rs", "third", 30),
                    chunk("a.rs", "first", 1),
                    chunk("a.rs", "second", 15),
                ],
                &[vec![0.1; DIM], vec![0.2; DIM], vec![0.3; DIM]],
            )
            .await
            .unwrap();

        let records = store.file_chunks("a.rs").await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_deref()).collect();
        assert_eq!(names, vec![Some("first"), Some("second"), Some("third")]);
    }

    #[tokio::test]
    async fn test_clear_resets_counts_and_last_run() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, "model-a").await;

        store
            .upsert_file_chunks(
                Corpus::Code,
                "a.rs",
                &[chunk("a.rs", "alpha", 1)],
                &[vec![0.1; DIM]],
            )
            .await
            .unwrap();
        store.mark_run_complete().unwrap();
        assert!(store.metadata().last_run.is_some());

        store.clear().await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.code_chunks, 0);
        assert_eq!(stats.indexed_files, 0);
        assert!(stats.last_run.is_none());
    }

    #[tokio::test]
    async fn test_mark_run_complete_persists() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir, "model-a").await;
            store.mark_run_complete().unwrap();
        }
        let store = open_store(&dir, "model-a").await;
        assert!(store.metadata().last_run.is_some());
    }
}
