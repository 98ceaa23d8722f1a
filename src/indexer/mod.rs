//! File discovery for indexing runs.
//!
//! Walks a source tree with gitignore-aware filtering and produces the
//! eligible (path, language tag, content, fingerprint) set that the change
//! detector classifies.

mod file_walker;

pub use file_walker::{FileInfo, FileWalker, fingerprint, language_tag};
