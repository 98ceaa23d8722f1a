//! Incremental indexing runs.
//!
//! A run walks the tree, diffs it against the fingerprint cache to classify
//! each file as skip, replace or delete, then chunks and embeds only the
//! replaced files. Chunking runs on the rayon pool; embedding happens
//! outside any store write section; each file's store update is one
//! serialized replace. A file that fails is logged and skipped, never
//! aborting the run.

use super::fs_lock::IndexLockGuard;
use crate::cache::{FileEntry, FingerprintCache};
use crate::config::Config;
use crate::docs::chunk_markdown;
use crate::embedding::{EmbeddingProvider, embed_resilient};
use crate::error::{CodeMemoryError, IndexingError};
use crate::indexer::{FileInfo, FileWalker};
use crate::parser::{Chunk, chunk_file};
use crate::store::{ChunkStore, Corpus};
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Outcome counts for one indexing run
#[derive(Debug, Default, Clone)]
pub struct IndexReport {
    pub files_seen: usize,
    pub files_skipped: usize,
    pub files_indexed: usize,
    pub files_deleted: usize,
    pub files_failed: usize,
    pub chunks_indexed: usize,
    pub full_rebuild: bool,
    pub duration_ms: u128,
}

/// How the change detector classified a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileAction {
    Skip,
    Replace,
}

fn classify(previous: Option<&FileEntry>, current: &FileInfo) -> FileAction {
    match previous {
        Some(entry) if entry.fingerprint == current.fingerprint => FileAction::Skip,
        _ => FileAction::Replace,
    }
}

fn corpus_for(language: &str) -> Corpus {
    if language == "markdown" {
        Corpus::Docs
    } else {
        Corpus::Code
    }
}

pub struct Indexer {
    store: Arc<ChunkStore>,
    provider: Arc<dyn EmbeddingProvider>,
    config: Config,
}

impl Indexer {
    pub fn new(
        store: Arc<ChunkStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: Config,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Index a directory tree incrementally.
    ///
    /// Holds the cross-process lock for the whole run and fails immediately
    /// if another run owns it. Cancellation is honored between files; work
    /// committed before the cancellation point stays indexed.
    pub async fn index_directory(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, CodeMemoryError> {
        let started = Instant::now();

        if !root.exists() {
            return Err(IndexingError::DirectoryNotFound(root.display().to_string()).into());
        }
        if !root.is_dir() {
            return Err(IndexingError::NotADirectory(root.display().to_string()).into());
        }
        let normalized_root = crate::paths::normalize_path(root);

        // One run per store: two roots sharing a store must not interleave
        let store_key = crate::paths::normalize_path(self.store.root());
        let _lock =
            IndexLockGuard::try_acquire(&store_key)?.ok_or(IndexingError::AlreadyIndexing)?;

        let mut report = IndexReport::default();

        let mut cache = FingerprintCache::load(&self.config.storage.fingerprint_path)?;

        // A model change invalidates every stored vector; rebuild from zero
        if !self.store.model_matches() {
            tracing::info!("Embedding model changed, discarding indexed state");
            self.store.rebuild_for_active_model().await?;
            cache.clear();
            report.full_rebuild = true;
        }

        let files = self.walk(root).await?;
        report.files_seen = files.len();

        let previous = cache
            .get_root(&normalized_root)
            .cloned()
            .unwrap_or_default();

        let mut to_replace: Vec<FileInfo> = Vec::new();
        let mut entries: HashMap<String, FileEntry> = HashMap::new();
        for file in files {
            match classify(previous.get(&file.relative_path), &file) {
                FileAction::Skip => {
                    report.files_skipped += 1;
                    entries.insert(
                        file.relative_path.clone(),
                        previous[&file.relative_path].clone(),
                    );
                }
                FileAction::Replace => to_replace.push(file),
            }
        }

        // Files recorded previously but absent from this walk
        let mut pending_deletes: VecDeque<(String, FileEntry)> = previous
            .iter()
            .filter(|(path, _)| !entries.contains_key(*path)
                && !to_replace.iter().any(|f| &f.relative_path == *path))
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect();

        tracing::info!(
            "Classified {} files: {} skipped, {} to index, {} to delete",
            report.files_seen,
            report.files_skipped,
            to_replace.len(),
            pending_deletes.len()
        );

        let chunked = self.chunk_files(to_replace).await?;

        for (file, chunks) in chunked {
            if cancel.is_cancelled() {
                // Keep the previous cache rows for paths still awaiting
                // deletion so the next run classifies them as deletions again
                for (path, entry) in pending_deletes {
                    entries.insert(path, entry);
                }
                self.finish_cache(&mut cache, &normalized_root, entries)?;
                return Err(IndexingError::Cancelled.into());
            }

            match self.index_one_file(&file, chunks).await {
                Ok(chunk_count) => {
                    report.files_indexed += 1;
                    report.chunks_indexed += chunk_count;
                    entries.insert(
                        file.relative_path.clone(),
                        FileEntry {
                            fingerprint: file.fingerprint.clone(),
                            mtime: file.mtime,
                            language: file.language.clone(),
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!("Failed to index {}: {}", file.relative_path, e);
                    report.files_failed += 1;
                }
            }
        }

        // A path leaves the saved cache only after its delete commits
        while let Some((path, entry)) = pending_deletes.pop_front() {
            if cancel.is_cancelled() {
                entries.insert(path, entry);
                for (p, e) in pending_deletes {
                    entries.insert(p, e);
                }
                self.finish_cache(&mut cache, &normalized_root, entries)?;
                return Err(IndexingError::Cancelled.into());
            }
            self.store
                .delete_file(corpus_for(&entry.language), &path)
                .await?;
            report.files_deleted += 1;
        }

        self.finish_cache(&mut cache, &normalized_root, entries)?;
        self.store.mark_run_complete()?;

        report.duration_ms = started.elapsed().as_millis();
        tracing::info!(
            "Indexing finished: {} indexed, {} skipped, {} deleted, {} failed in {}ms",
            report.files_indexed,
            report.files_skipped,
            report.files_deleted,
            report.files_failed,
            report.duration_ms
        );
        Ok(report)
    }

    async fn walk(&self, root: &Path) -> Result<Vec<FileInfo>, CodeMemoryError> {
        let walker = FileWalker::new(root, self.config.indexing.max_file_size).with_patterns(
            &self.config.indexing.include_patterns,
            &self.config.indexing.exclude_patterns,
        )?;
        tokio::task::spawn_blocking(move || walker.walk())
            .await
            .map_err(|e| CodeMemoryError::other(format!("Walk task failed: {}", e)))?
            .map_err(|e| IndexingError::WalkFailed(format!("{:#}", e)).into())
    }

    /// Chunk replaced files in parallel on the rayon pool
    async fn chunk_files(
        &self,
        files: Vec<FileInfo>,
    ) -> Result<Vec<(FileInfo, Vec<Chunk>)>, CodeMemoryError> {
        let max_chars = self.config.embedding.max_input_chars;
        let doc_max = self.config.docs.max_section_chars;
        let doc_min = self.config.docs.min_section_chars;

        tokio::task::spawn_blocking(move || {
            files
                .into_par_iter()
                .map(|file| {
                    let chunks = if corpus_for(&file.language) == Corpus::Docs {
                        chunk_markdown(&file.relative_path, &file.content, doc_max, doc_min)
                    } else {
                        chunk_file(&file.relative_path, &file.language, &file.content, max_chars)
                    };
                    (file, chunks)
                })
                .collect()
        })
        .await
        .map_err(|e| CodeMemoryError::other(format!("Chunking task failed: {}", e)))
    }

    /// Embed one file's chunks and commit them as a single replace.
    ///
    /// Embedding runs before the store is touched, so the store's write
    /// section stays short. Chunks whose embedding failed are dropped from
    /// both channels; a file with no surviving chunks is still committed so
    /// stale data for it disappears.
    async fn index_one_file(
        &self,
        file: &FileInfo,
        chunks: Vec<Chunk>,
    ) -> Result<usize, CodeMemoryError> {
        let corpus = corpus_for(&file.language);

        let embeddings = self.embed_chunks(&chunks).await?;

        let mut kept_chunks = Vec::with_capacity(chunks.len());
        let mut kept_vectors = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            match embedding {
                Some(vector) => {
                    kept_chunks.push(chunk);
                    kept_vectors.push(vector);
                }
                None => tracing::warn!(
                    "Dropping chunk {} of {} after embedding failure",
                    chunk.display_name(),
                    file.relative_path
                ),
            }
        }

        let count = kept_chunks.len();
        self.store
            .upsert_file_chunks(corpus, &file.relative_path, &kept_chunks, &kept_vectors)
            .await?;
        Ok(count)
    }

    /// Embed chunk texts in configured batch sizes with a per-batch timeout
    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
    ) -> Result<Vec<Option<Vec<f32>>>, CodeMemoryError> {
        let max_chars = self.config.embedding.max_input_chars;
        let texts: Vec<String> = chunks.iter().map(|c| c.embedding_text(max_chars)).collect();

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.embedding.batch_size.max(1)) {
            let provider = Arc::clone(&self.provider);
            let batch_texts = batch.to_vec();
            let task =
                tokio::task::spawn_blocking(move || embed_resilient(&*provider, &batch_texts));

            let timeout = Duration::from_secs(self.config.embedding.timeout_secs);
            match tokio::time::timeout(timeout, task).await {
                Ok(joined) => results.extend(joined.map_err(|e| {
                    CodeMemoryError::other(format!("Embedding task failed: {}", e))
                })?),
                Err(_) => {
                    return Err(crate::error::EmbeddingError::Timeout(
                        self.config.embedding.timeout_secs,
                    )
                    .into());
                }
            }
        }
        Ok(results)
    }

    fn finish_cache(
        &self,
        cache: &mut FingerprintCache,
        root: &str,
        entries: HashMap<String, FileEntry>,
    ) -> Result<(), CodeMemoryError> {
        cache.update_root(root.to_string(), entries);
        cache.save(&self.config.storage.fingerprint_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const DIM: usize = 4;

    struct CountingProvider {
        calls: AtomicUsize,
        texts_embedded: AtomicUsize,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                texts_embedded: AtomicUsize::new(0),
            }
        }
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
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
            "counting-model"
        }
    }

    struct Fixture {
        _dirs: TempDir,
        tree: std::path::PathBuf,
        store: Arc<ChunkStore>,
        provider: Arc<CountingProvider>,
        config: Config,
    }

    async fn fixture(model: &str) -> Fixture {
        let dirs = TempDir::new().unwrap();
        let tree = dirs.path().join("tree");
        fs::create_dir(&tree).unwrap();

        let mut config = Config::default();
        config.storage.store_path = dirs.path().join("store");
        config.storage.fingerprint_path = dirs.path().join("fingerprints.json");

        let store = Arc::new(
            ChunkStore::open(&config.storage.store_path, model, DIM)
                .await
                .unwrap(),
        );
        Fixture {
            _dirs: dirs,
            tree,
            store,
            provider: Arc::new(CountingProvider::new()),
            config,
        }
    }

    fn indexer(f: &Fixture) -> Indexer {
        Indexer::new(
            Arc::clone(&f.store),
            f.provider.clone() as Arc<dyn EmbeddingProvider>,
            f.config.clone(),
        )
    }

    #[test]
    fn test_classify() {
        let file = FileInfo {
            path: "/r/a.rs".into(),
            relative_path: "a.rs".to_string(),
            root_path: "/r".to_string(),
            language: "rust".to_string(),
            content: "fn a() {}".to_string(),
            fingerprint: "abc".to_string(),
            mtime: 100,
        };

        assert_eq!(classify(None, &file), FileAction::Replace);

        let same = FileEntry {
            fingerprint: "abc".to_string(),
            mtime: 100,
            language: "rust".to_string(),
        };
        assert_eq!(classify(Some(&same), &file), FileAction::Skip);

        let changed = FileEntry {
            fingerprint: "other".to_string(),
            mtime: 50,
            language: "rust".to_string(),
        };
        assert_eq!(classify(Some(&changed), &file), FileAction::Replace);
    }

    #[test]
    fn test_corpus_routing() {
        assert_eq!(corpus_for("markdown"), Corpus::Docs);
        assert_eq!(corpus_for("rust"), Corpus::Code);
        assert_eq!(corpus_for("unknown"), Corpus::Code);
    }

    #[tokio::test]
    async fn test_fresh_run_indexes_everything() {
        let f = fixture("counting-model").await;
        fs::write(f.tree.join("a.rs"), "fn alpha() { 1 }").unwrap();
        fs::write(f.tree.join("b.rs"), "fn beta() { 2 }").unwrap();
        fs::write(f.tree.join("README.md"), "# Title\n\nBody text here.\n").unwrap();

        let report = indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.files_seen, 3);
        assert_eq!(report.files_indexed, 3);
        assert_eq!(report.files_skipped, 0);
        assert_eq!(report.files_failed, 0);
        assert!(report.chunks_indexed >= 3);

        let stats = f.store.stats().await.unwrap();
        assert!(stats.code_chunks >= 2);
        assert!(stats.doc_chunks >= 1);
        assert!(stats.last_run.is_some());
    }

    #[tokio::test]
    async fn test_unchanged_rerun_skips_all_work() {
        let f = fixture("counting-model").await;
        fs::write(f.tree.join("a.rs"), "fn alpha() { 1 }").unwrap();

        indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();
        let calls_after_first = f.provider.calls.load(Ordering::SeqCst);

        let report = indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.files_indexed, 0);
        assert_eq!(report.files_skipped, 1);
        // No embedding happened for the unchanged file
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_modified_file_is_replaced() {
        let f = fixture("counting-model").await;
        fs::write(f.tree.join("a.rs"), "fn original_name() { 1 }").unwrap();
        indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();

        fs::write(f.tree.join("a.rs"), "fn renamed_fn() { 2 }").unwrap();
        let report = indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 1);

        let hits = f
            .store
            .lexical_search(Corpus::Code, "renamed_fn", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        let stale = f
            .store
            .lexical_search(Corpus::Code, "original_name", 10)
            .await
            .unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn test_removed_file_is_deleted_from_store() {
        let f = fixture("counting-model").await;
        fs::write(f.tree.join("a.rs"), "fn keep_me() { 1 }").unwrap();
        fs::write(f.tree.join("b.rs"), "fn drop_me() { 2 }").unwrap();
        indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();

        fs::remove_file(f.tree.join("b.rs")).unwrap();
        let report = indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.files_deleted, 1);
        assert!(f
            .store
            .lexical_search(Corpus::Code, "drop_me", 10)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(f.store.stats().await.unwrap().code_chunks, 1);
    }

    #[tokio::test]
    async fn test_model_change_triggers_full_rebuild() {
        let f = fixture("counting-model").await;
        fs::write(f.tree.join("a.rs"), "fn alpha() { 1 }").unwrap();
        indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();

        // Reopen the same store under a different model identity
        let store = Arc::new(
            ChunkStore::open(&f.config.storage.store_path, "other-model", DIM)
                .await
                .unwrap(),
        );
        struct OtherProvider(CountingProvider);
        impl EmbeddingProvider for OtherProvider {
            fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                self.0.embed_batch(texts)
            }
            fn dimension(&self) -> usize {
                DIM
            }
            fn model_id(&self) -> &str {
                "other-model"
            }
        }
        let other = Indexer::new(
            Arc::clone(&store),
            Arc::new(OtherProvider(CountingProvider::new())),
            f.config.clone(),
        );

        let report = other
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.full_rebuild);
        // The unchanged file was re-embedded, not skipped
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.files_skipped, 0);
        assert!(store.model_matches());
    }

    #[tokio::test]
    async fn test_second_run_refused_while_lock_held() {
        let f = fixture("counting-model").await;
        fs::write(f.tree.join("a.rs"), "fn alpha() { 1 }").unwrap();

        let store_key = crate::paths::normalize_path(f.store.root());
        let _held = IndexLockGuard::try_acquire(&store_key).unwrap().unwrap();

        let err = indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodeMemoryError::Indexing(IndexingError::AlreadyIndexing)
        ));
    }

    #[tokio::test]
    async fn test_lock_guards_store_across_roots() {
        let f = fixture("counting-model").await;
        fs::write(f.tree.join("a.rs"), "fn alpha() { 1 }").unwrap();
        let other_tree = f._dirs.path().join("other_tree");
        fs::create_dir(&other_tree).unwrap();
        fs::write(other_tree.join("b.rs"), "fn beta() { 2 }").unwrap();

        // A run over a different root still targets the same store
        let store_key = crate::paths::normalize_path(f.store.root());
        let _held = IndexLockGuard::try_acquire(&store_key).unwrap().unwrap();

        let err = indexer(&f)
            .index_directory(&other_tree, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodeMemoryError::Indexing(IndexingError::AlreadyIndexing)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_commits_nothing() {
        let f = fixture("counting-model").await;
        fs::write(f.tree.join("a.rs"), "fn alpha() { 1 }").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = indexer(&f)
            .index_directory(&f.tree, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodeMemoryError::Indexing(IndexingError::Cancelled)
        ));
        assert_eq!(f.store.stats().await.unwrap().code_chunks, 0);
    }

    #[tokio::test]
    async fn test_pending_deletion_survives_cancelled_run() {
        let f = fixture("counting-model").await;
        fs::write(f.tree.join("a.rs"), "fn keep_me() { 1 }").unwrap();
        fs::write(f.tree.join("b.rs"), "fn drop_me() { 2 }").unwrap();
        indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();

        fs::remove_file(f.tree.join("b.rs")).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = indexer(&f)
            .index_directory(&f.tree, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodeMemoryError::Indexing(IndexingError::Cancelled)
        ));

        // The interrupted run must not forget the pending deletion
        let report = indexer(&f)
            .index_directory(&f.tree, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_deleted, 1);
        assert!(f
            .store
            .lexical_search(Corpus::Code, "drop_me", 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_rejected() {
        let f = fixture("counting-model").await;
        let err = indexer(&f)
            .index_directory(Path::new("/definitely/not/here"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodeMemoryError::Indexing(IndexingError::DirectoryNotFound(_))
        ));
    }
}
