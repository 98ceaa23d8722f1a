//! # Code Memory - Local Code Search Index
//!
//! A Model Context Protocol (MCP) server that maintains a local, incremental
//! search index over a codebase and answers structural and semantic queries
//! about it.
//!
//! ## Overview
//!
//! Code Memory chunks source files along syntactic boundaries with
//! tree-sitter, embeds the chunks locally with FastEmbed, and indexes them in
//! two channels: a LanceDB vector table and a Tantivy BM25 index. Queries
//! rank both channels and fuse them by reciprocal rank, so exact identifier
//! matches and semantically similar code both surface. Indexing is
//! incremental: unchanged files are skipped by content fingerprint, and a
//! change of embedding model invalidates and rebuilds the whole index.
//!
//! ## Key Features
//!
//! - **Structural Chunking**: Tree-sitter parsing for 12 languages, with a
//!   whole-file fallback for everything else
//! - **Hybrid Retrieval**: BM25 and vector rankings fused by reciprocal rank
//! - **Incremental Indexing**: Per-file fingerprints skip unchanged work
//! - **Model Invalidation**: Embeddings are tied to the model that produced
//!   them and never mixed across models
//! - **Documentation Corpus**: Markdown sections indexed separately from code
//! - **MCP Protocol**: 5 tools and 5 slash commands over stdio
//!
//! ## Modules
//!
//! - [`mcp_server`]: MCP protocol server with tools and prompts
//! - [`client`]: High-level facade (indexing runs, searches, status)
//! - [`parser`]: Tree-sitter chunk extraction and the language registry
//! - [`docs`]: Markdown section chunking for the documentation corpus
//! - [`embedding`]: Embedding provider abstraction and FastEmbed backend
//! - [`store`]: LanceDB vector tables, Tantivy lexical indexes, metadata
//! - [`search`]: Rank fusion and the query-side search modes
//! - [`indexer`]: Gitignore-aware file discovery
//! - [`cache`]: Persistent fingerprint state for incremental updates
//! - [`config`]: Configuration with file and environment sources
//! - [`types`]: MCP request/response types with JSON schema
//! - [`error`]: Error taxonomy
//! - [`paths`]: Platform data/cache paths and path normalization
//!
//! ## Usage Example
//!
//! ```no_run
//! use code_memory::config::Config;
//! use code_memory::mcp_server::CodeMemoryServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new()?;
//!     CodeMemoryServer::serve_stdio(config).await?;
//!     Ok(())
//! }
//! ```

/// Persistent fingerprint state for incremental indexing
pub mod cache;

/// High-level client facade shared by the MCP server and the CLI
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Markdown section chunking for the documentation corpus
pub mod docs;

/// Embedding provider abstraction and the FastEmbed backend
pub mod embedding;

/// Error types and utilities
pub mod error;

/// Gitignore-aware file discovery
pub mod indexer;

/// MCP server implementation with tools and prompts
pub mod mcp_server;

/// Tree-sitter chunk extraction and the language registry
pub mod parser;

/// Platform paths and path normalization
pub mod paths;

/// Rank fusion and query-side search modes
pub mod search;

/// Chunk store: vector tables, lexical indexes and index metadata
pub mod store;

/// MCP request/response types with JSON schema definitions
pub mod types;
