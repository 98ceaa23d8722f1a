use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::client::IndexReport;
use crate::search::{OutlineEntry, SearchHit, SearchMode};
use crate::store::StoreStats;

/// Request to index a directory tree
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexCodebaseRequest {
    /// Path to the directory to index
    pub directory: String,
}

impl IndexCodebaseRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.directory.trim().is_empty() {
            return Err("directory must not be empty".to_string());
        }
        Ok(())
    }
}

/// Response from an indexing run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexCodebaseResponse {
    /// Number of eligible files discovered
    pub files_seen: usize,
    /// Files chunked, embedded and stored this run
    pub files_indexed: usize,
    /// Unchanged files reused from the previous run
    pub files_skipped: usize,
    /// Files removed from the index because they vanished from disk
    pub files_deleted: usize,
    /// Files that failed and were left out of this run
    pub files_failed: usize,
    /// Chunks written across both corpora
    pub chunks_indexed: usize,
    /// Whether a model change forced a rebuild from scratch
    pub full_rebuild: bool,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl From<IndexReport> for IndexCodebaseResponse {
    fn from(report: IndexReport) -> Self {
        Self {
            files_seen: report.files_seen,
            files_indexed: report.files_indexed,
            files_skipped: report.files_skipped,
            files_deleted: report.files_deleted,
            files_failed: report.files_failed,
            chunks_indexed: report.chunks_indexed,
            full_rebuild: report.full_rebuild,
            duration_ms: report.duration_ms as u64,
        }
    }
}

/// Request to search indexed code
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchCodeRequest {
    /// Query text; for file_structure this is a file path
    pub query: String,
    /// One of "definition", "references", "file_structure"
    #[serde(default = "default_search_type")]
    pub search_type: String,
    /// Maximum number of results; the configured limit when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

fn default_search_type() -> String {
    "definition".to_string()
}

impl SearchCodeRequest {
    pub fn validate(&self) -> Result<SearchMode, String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        if self.top_k == Some(0) {
            return Err("top_k must be greater than 0".to_string());
        }
        SearchMode::parse(&self.search_type).map_err(|e| e.to_string())
    }
}

/// One ranked search result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResultItem {
    /// File path relative to the indexed root
    pub path: String,
    /// First line of the chunk (1-based)
    pub start_line: u32,
    /// Last line of the chunk (1-based, inclusive)
    pub end_line: u32,
    /// Chunk kind ("function", "method", "class", ...)
    pub kind: String,
    /// Declared name, if the chunk has one
    pub name: Option<String>,
    pub language: String,
    /// Bounded excerpt of the chunk text
    pub snippet: String,
    /// First non-empty line, usually the declaration itself
    pub signature: Option<String>,
    /// Adjacent documentation comment, if any
    pub doc: Option<String>,
    /// Fused relevance score; comparable only within one response
    pub score: f32,
    /// "hybrid", "keyword" or "semantic"
    pub match_reason: String,
}

impl From<SearchHit> for SearchResultItem {
    fn from(hit: SearchHit) -> Self {
        Self {
            path: hit.path,
            start_line: hit.start_line,
            end_line: hit.end_line,
            kind: hit.kind,
            name: hit.name,
            language: hit.language,
            snippet: hit.snippet,
            signature: hit.signature,
            doc: hit.doc,
            score: hit.score,
            match_reason: hit.match_reason,
        }
    }
}

/// One entry of a file outline
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OutlineItem {
    pub kind: String,
    pub name: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: Option<String>,
}

impl From<OutlineEntry> for OutlineItem {
    fn from(entry: OutlineEntry) -> Self {
        Self {
            kind: entry.kind,
            name: entry.name,
            start_line: entry.start_line,
            end_line: entry.end_line,
            signature: entry.signature,
        }
    }
}

/// Response from a code search
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchCodeResponse {
    pub search_type: String,
    /// Ranked results for definition and references searches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<SearchResultItem>,
    /// Source-ordered outline for file_structure searches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub structure: Vec<OutlineItem>,
}

/// Request to search indexed documentation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchDocsRequest {
    /// Query text
    pub query: String,
    /// Maximum number of results; the configured limit when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl SearchDocsRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        if self.top_k == Some(0) {
            return Err("top_k must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Response from a documentation search
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchDocsResponse {
    pub results: Vec<SearchResultItem>,
}

/// Request for index status
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LanguageStats {
    pub language: String,
    pub chunk_count: usize,
}

/// Current index contents and model identity
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusResponse {
    pub code_chunks: usize,
    pub doc_chunks: usize,
    pub indexed_files: usize,
    pub language_breakdown: Vec<LanguageStats>,
    /// Model identity recorded in store metadata
    pub model_id: String,
    pub dimension: usize,
    /// Completion time of the last indexing run (RFC 3339)
    pub last_run: Option<String>,
    /// False when the recorded model differs from the active one and
    /// queries would be refused until a reindex
    pub ready: bool,
    /// Guidance shown when the index is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl StatusResponse {
    pub fn from_stats(stats: StoreStats, ready: bool) -> Self {
        let hint = if stats.indexed_files == 0 {
            Some("Nothing indexed yet; run index_codebase on a directory first".to_string())
        } else {
            None
        };
        Self {
            code_chunks: stats.code_chunks,
            doc_chunks: stats.doc_chunks,
            indexed_files: stats.indexed_files,
            language_breakdown: stats
                .language_breakdown
                .into_iter()
                .map(|(language, chunk_count)| LanguageStats {
                    language,
                    chunk_count,
                })
                .collect(),
            model_id: stats.model_id,
            dimension: stats.dimension,
            last_run: stats.last_run,
            ready,
            hint,
        }
    }
}

/// Request to clear the index
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClearRequest {}

/// Response from a clear operation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
}
