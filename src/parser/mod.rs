//! Structural parsing and chunk extraction.
//!
//! Turns (path, language tag, raw text) into an ordered sequence of chunks:
//! one per named program unit for languages with a tree-sitter grammar, or a
//! single whole-file fallback chunk otherwise. Extraction is stateless per
//! file, so files can be chunked in parallel.

pub mod extractor;
pub mod registry;

pub use extractor::chunk_file;
pub use registry::{ChunkStrategy, strategy_for};

use sha2::{Digest, Sha256};

/// Kind of program unit a chunk represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    Function,
    Method,
    Class,
    Module,
    FallbackFile,
    DocSection,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
            ChunkKind::Class => "class",
            ChunkKind::Module => "module",
            ChunkKind::FallbackFile => "fallback-file",
            ChunkKind::DocSection => "doc-section",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(ChunkKind::Function),
            "method" => Some(ChunkKind::Method),
            "class" => Some(ChunkKind::Class),
            "module" => Some(ChunkKind::Module),
            "fallback-file" => Some(ChunkKind::FallbackFile),
            "doc-section" => Some(ChunkKind::DocSection),
            _ => None,
        }
    }

    /// Declaration kinds are surfaced first among fusion ties in definition search
    pub fn is_declaration(&self) -> bool {
        matches!(self, ChunkKind::Class | ChunkKind::Module)
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored fragment of source text: a program unit or whole-file fallback.
///
/// The text is the verbatim source slice, never reformatted, so line numbers
/// stay valid for citation. Chunks are replaced wholesale with their file and
/// never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub path: String,
    pub language: String,
    pub kind: ChunkKind,
    pub name: Option<String>,
    /// 1-based, inclusive
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: usize,
    pub end_byte: usize,
    /// Verbatim source slice
    pub text: String,
    /// Leading documentation text, when present
    pub doc: Option<String>,
}

impl Chunk {
    /// Stable identifier derived from path, byte range and kind.
    ///
    /// Used as the join key between the vector table and the lexical index;
    /// identical chunks always hash to the same id, which keeps repeated runs
    /// on an unchanged tree byte-identical.
    pub fn id(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.path.as_bytes());
        hasher.update([0]);
        hasher.update(self.start_byte.to_le_bytes());
        hasher.update(self.end_byte.to_le_bytes());
        hasher.update(self.kind.as_str().as_bytes());
        let digest = hasher.finalize();
        u64::from_le_bytes(digest[..8].try_into().unwrap_or([0; 8]))
    }

    /// Name for display, with an anonymous placeholder when extraction failed
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("<anonymous@{}>", self.start_line))
    }

    /// Text handed to the embedding model: kind and name prefix plus a
    /// bounded slice of the source
    pub fn embedding_text(&self, max_chars: usize) -> String {
        let body: String = self.text.chars().take(max_chars).collect();
        match &self.name {
            Some(name) => format!("{} {}: {}", self.kind, name, body),
            None => format!("{}: {}", self.kind, body),
        }
    }
}
