//! Query-side retrieval.
//!
//! All ranked modes share one hybrid pipeline: embed the query, rank a
//! candidate pool in each channel, fuse by reciprocal rank, then hydrate
//! fused candidates into full chunk records. Structure lookups bypass
//! ranking entirely and read the stored chunks of one file.

mod fusion;

pub use fusion::{FusedHit, MatchSource, RankedCandidate, RRF_K, reciprocal_rank_fusion};

use crate::config::SearchConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{CodeMemoryError, ValidationError};
use crate::parser::ChunkKind;
use crate::store::{ChunkRecord, ChunkStore, Corpus};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Requested code search behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Definition,
    References,
    FileStructure,
}

impl SearchMode {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "definition" => Ok(SearchMode::Definition),
            "references" => Ok(SearchMode::References),
            "file_structure" => Ok(SearchMode::FileStructure),
            other => Err(ValidationError::InvalidSearchType(other.to_string())),
        }
    }
}

/// One ranked result with a citation and a bounded snippet
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub kind: String,
    pub name: Option<String>,
    pub language: String,
    pub snippet: String,
    pub signature: Option<String>,
    pub doc: Option<String>,
    pub score: f32,
    pub match_reason: String,
}

/// One entry of a file outline, in source order
#[derive(Debug, Clone)]
pub struct OutlineEntry {
    pub kind: String,
    pub name: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: Option<String>,
}

pub struct SearchEngine {
    store: Arc<ChunkStore>,
    provider: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        store: Arc<ChunkStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Look up named declarations.
    ///
    /// The whole fused candidate pool is reordered before the result list
    /// is cut: chunks whose name equals the query rank first, declaration
    /// kinds win score ties, and everything else keeps its fused rank, so
    /// partial and semantic matches still surface below exact ones.
    pub async fn definition(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchHit>, CodeMemoryError> {
        require_nonempty(query, "query")?;
        let limit = top_k.unwrap_or(self.config.limit);
        let candidates = self.hybrid(Corpus::Code, query, limit).await?;
        Ok(rank_definitions(query, candidates, limit)
            .into_iter()
            .map(|c| self.hit_from_record(&c.record, c.score, c.source))
            .collect())
    }

    /// Find chunks that mention an identifier.
    ///
    /// Matching is textual over the full stored chunk text, not the
    /// truncated snippet; chunks containing the identifier verbatim rank
    /// ahead of fuzzier fused candidates, but both kinds are returned in
    /// one list.
    pub async fn references(
        &self,
        identifier: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchHit>, CodeMemoryError> {
        require_nonempty(identifier, "identifier")?;
        let limit = top_k.unwrap_or(self.config.limit);
        let candidates = self.hybrid(Corpus::Code, identifier, limit).await?;
        Ok(rank_references(identifier, candidates, limit)
            .into_iter()
            .map(|c| self.hit_from_record(&c.record, c.score, c.source))
            .collect())
    }

    /// Outline of one indexed file, in source order. No ranking involved.
    pub async fn file_structure(&self, path: &str) -> Result<Vec<OutlineEntry>, CodeMemoryError> {
        require_nonempty(path, "path")?;
        let records = self.store.file_chunks(path).await?;
        Ok(records
            .into_iter()
            .map(|record| OutlineEntry {
                kind: record.kind,
                name: record.name,
                start_line: record.start_line,
                end_line: record.end_line,
                signature: first_line(&record.content),
            })
            .collect())
    }

    /// Hybrid search over the documentation corpus
    pub async fn docs(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchHit>, CodeMemoryError> {
        require_nonempty(query, "query")?;
        let limit = top_k.unwrap_or(self.config.limit);
        let mut candidates = self.hybrid(Corpus::Docs, query, limit).await?;
        candidates.truncate(limit);
        Ok(candidates
            .into_iter()
            .map(|c| self.hit_from_record(&c.record, c.score, c.source))
            .collect())
    }

    /// Fuse both channels over the full candidate pool.
    ///
    /// Callers re-rank and truncate; returning the whole pool keeps
    /// promotion visible to chunks fused just past the requested limit.
    async fn hybrid(
        &self,
        corpus: Corpus,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RankedChunk>, CodeMemoryError> {
        let pool = self.config.candidate_pool.max(limit);

        let query_vector = self.embed_query(query).await?;
        let vector_results = self.store.vector_search(corpus, query_vector, pool).await?;
        let lexical_results = self.store.lexical_search(corpus, query, pool).await?;

        let lexical_candidates: Vec<RankedCandidate> = lexical_results
            .iter()
            .map(|hit| RankedCandidate {
                id: hit.id,
                path: hit.path.clone(),
                start_line: hit.start_line,
            })
            .collect();
        let vector_candidates: Vec<RankedCandidate> = vector_results
            .iter()
            .map(|(record, _)| RankedCandidate {
                id: record.id,
                path: record.path.clone(),
                start_line: record.start_line,
            })
            .collect();

        let fused = reciprocal_rank_fusion(&lexical_candidates, &vector_candidates, pool);

        // Vector results already carry full records; lexical-only candidates
        // need one store lookup
        let mut records: HashMap<u64, ChunkRecord> = vector_results
            .into_iter()
            .map(|(record, _)| (record.id, record))
            .collect();
        let missing: Vec<u64> = fused
            .iter()
            .filter(|hit| !records.contains_key(&hit.id))
            .map(|hit| hit.id)
            .collect();
        for record in self.store.get_chunks_by_ids(corpus, &missing).await? {
            records.insert(record.id, record);
        }

        let mut candidates = Vec::with_capacity(fused.len());
        for fused_hit in fused {
            let Some(record) = records.remove(&fused_hit.id) else {
                tracing::warn!("Fused candidate {} has no stored record", fused_hit.id);
                continue;
            };
            candidates.push(RankedChunk {
                record,
                score: fused_hit.score,
                source: fused_hit.source,
            });
        }
        Ok(candidates)
    }

    fn hit_from_record(&self, record: &ChunkRecord, score: f32, source: MatchSource) -> SearchHit {
        SearchHit {
            path: record.path.clone(),
            start_line: record.start_line,
            end_line: record.end_line,
            kind: record.kind.clone(),
            name: record.name.clone(),
            language: record.language.clone(),
            snippet: truncate_chars(&record.content, self.config.snippet_max_chars),
            signature: first_line(&record.content),
            doc: record.doc.clone(),
            score,
            match_reason: source.as_str().to_string(),
        }
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CodeMemoryError> {
        let provider = Arc::clone(&self.provider);
        let text = query.to_string();
        let mut vectors = tokio::task::spawn_blocking(move || provider.embed_batch(&[text]))
            .await
            .map_err(|e| CodeMemoryError::other(format!("Embedding task failed: {}", e)))??;
        vectors
            .pop()
            .ok_or_else(|| crate::error::EmbeddingError::EmptyBatch.into())
    }
}

/// One fused candidate carrying its full stored record
struct RankedChunk {
    record: ChunkRecord,
    score: f32,
    source: MatchSource,
}

fn rank_definitions(
    query: &str,
    mut candidates: Vec<RankedChunk>,
    limit: usize,
) -> Vec<RankedChunk> {
    candidates.sort_by(|a, b| definition_order(query, a, b));
    candidates.truncate(limit);
    candidates
}

fn rank_references(
    identifier: &str,
    mut candidates: Vec<RankedChunk>,
    limit: usize,
) -> Vec<RankedChunk> {
    candidates.sort_by(|a, b| references_order(identifier, a, b));
    candidates.truncate(limit);
    candidates
}

/// Exact name match first, then score; declaration kinds win score ties
fn definition_order(query: &str, a: &RankedChunk, b: &RankedChunk) -> Ordering {
    let exact = |c: &RankedChunk| c.record.name.as_deref() == Some(query);
    let declares =
        |c: &RankedChunk| ChunkKind::parse(&c.record.kind).is_some_and(|k| k.is_declaration());
    exact(b)
        .cmp(&exact(a))
        .then_with(|| score_desc(a, b))
        .then_with(|| declares(b).cmp(&declares(a)))
        .then_with(|| a.record.path.cmp(&b.record.path))
        .then_with(|| a.record.start_line.cmp(&b.record.start_line))
}

/// Verbatim occurrence in the full chunk text or name first, then score
fn references_order(identifier: &str, a: &RankedChunk, b: &RankedChunk) -> Ordering {
    let occurs = |c: &RankedChunk| {
        c.record.content.contains(identifier) || c.record.name.as_deref() == Some(identifier)
    };
    occurs(b)
        .cmp(&occurs(a))
        .then_with(|| score_desc(a, b))
        .then_with(|| a.record.path.cmp(&b.record.path))
        .then_with(|| a.record.start_line.cmp(&b.record.start_line))
}

fn score_desc(a: &RankedChunk, b: &RankedChunk) -> Ordering {
    b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
}

fn require_nonempty(value: &str, what: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(what.to_string()));
    }
    Ok(())
}

fn first_line(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.to_string())
}

fn truncate_chars(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    content.chars().take(max_chars).collect()
}
