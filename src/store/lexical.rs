use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{Index, IndexWriter, ReloadPolicy, TantivyDocument, doc};

use crate::parser::Chunk;

/// BM25 lexical index over chunk text and names, backed by Tantivy.
///
/// Postings are maintained in lockstep with chunk lifecycle: callers add and
/// delete whole files at a time, mirroring the vector table.
pub struct LexicalIndex {
    index: Index,
    id_field: Field,
    name_field: Field,
    content_field: Field,
    path_field: Field,
    start_line_field: Field,
    // Only one IndexWriter may exist at a time
    writer_lock: Mutex<()>,
}

/// One ranked hit from the lexical channel
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub id: u64,
    pub path: String,
    pub start_line: u32,
    pub score: f32,
}

impl LexicalIndex {
    /// Create or open a lexical index at the given directory
    pub fn open<P: AsRef<Path>>(index_path: P) -> Result<Self> {
        let index_path = index_path.as_ref();

        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_u64_field("id", STORED | INDEXED);
        let name_field = schema_builder.add_text_field("name", TEXT);
        let content_field = schema_builder.add_text_field("content", TEXT);
        let path_field = schema_builder.add_text_field("path", STRING | STORED);
        let start_line_field = schema_builder.add_u64_field("start_line", STORED);
        let schema = schema_builder.build();

        std::fs::create_dir_all(index_path).context("Failed to create lexical index directory")?;

        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(index_path).context("Failed to open existing lexical index")?
        } else {
            Index::create_in_dir(index_path, schema.clone())
                .context("Failed to create lexical index")?
        };

        Ok(Self {
            index,
            id_field,
            name_field,
            content_field,
            path_field,
            start_line_field,
            writer_lock: Mutex::new(()),
        })
    }

    fn writer(&self) -> Result<IndexWriter<TantivyDocument>> {
        self.index
            .writer(50_000_000)
            .context("Failed to create lexical index writer")
    }

    /// Add postings for a batch of chunks, committed as one batch
    pub fn add_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let _guard = self
            .writer_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("Lexical writer lock poisoned: {}", e))?;

        let mut writer = self.writer()?;
        for chunk in chunks {
            writer
                .add_document(doc!(
                    self.id_field => chunk.id(),
                    self.name_field => chunk.display_name(),
                    self.content_field => chunk.text.clone(),
                    self.path_field => chunk.path.clone(),
                    self.start_line_field => chunk.start_line as u64,
                ))
                .context("Failed to add lexical document")?;
        }
        writer.commit().context("Failed to commit lexical batch")?;
        Ok(())
    }

    /// Delete all postings for a file path
    pub fn delete_by_path(&self, path: &str) -> Result<()> {
        let _guard = self
            .writer_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("Lexical writer lock poisoned: {}", e))?;

        let mut writer = self.writer()?;
        writer.delete_term(Term::from_field_text(self.path_field, path));
        writer
            .commit()
            .context("Failed to commit lexical deletion")?;
        Ok(())
    }

    /// Rank chunks for a query with BM25 over content and names
    pub fn search(&self, query_text: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create lexical reader")?;

        let searcher = reader.searcher();

        // Lenient parsing tolerates code punctuation like :: in queries
        let query_parser =
            QueryParser::for_index(&self.index, vec![self.name_field, self.content_field]);
        let (query, _errors) = query_parser.parse_query_lenient(query_text);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .context("Failed to execute lexical search")?;

        let mut results = Vec::new();
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve lexical document")?;

            let id = retrieved
                .get_first(self.id_field)
                .and_then(|v| v.as_u64());
            let path = retrieved
                .get_first(self.path_field)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            let start_line = retrieved
                .get_first(self.start_line_field)
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;

            if let (Some(id), Some(path)) = (id, path) {
                results.push(LexicalHit {
                    id,
                    path,
                    start_line,
                    score,
                });
            }
        }

        Ok(results)
    }

    /// Delete every posting
    pub fn clear(&self) -> Result<()> {
        let _guard = self
            .writer_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("Lexical writer lock poisoned: {}", e))?;

        let mut writer = self.writer()?;
        writer
            .delete_all_documents()
            .context("Failed to delete lexical documents")?;
        writer.commit().context("Failed to commit lexical clear")?;
        Ok(())
    }

    /// Number of indexed postings
    pub fn num_docs(&self) -> Result<usize> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create lexical reader")?;
        Ok(reader.searcher().num_docs() as usize)
    }
}
