use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Information about a discovered file
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub relative_path: String,
    pub root_path: String,
    /// Language tag consumed by the parser registry ("rust", "python", ...)
    pub language: String,
    pub content: String,
    /// SHA-256 content fingerprint
    pub fingerprint: String,
    /// Modification time in unix seconds
    pub mtime: i64,
}

pub struct FileWalker {
    root: PathBuf,
    max_file_size: usize,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl FileWalker {
    pub fn new(root: impl AsRef<Path>, max_file_size: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_file_size,
            include: None,
            exclude: None,
        }
    }

    pub fn with_patterns(
        mut self,
        include_patterns: &[String],
        exclude_patterns: &[String],
    ) -> Result<Self> {
        self.include = build_globset(include_patterns)?;
        self.exclude = build_globset(exclude_patterns)?;
        Ok(self)
    }

    /// Walk the directory and collect all eligible files
    pub fn walk(&self) -> Result<Vec<FileInfo>> {
        if !self.root.exists() {
            anyhow::bail!("Root directory does not exist: {:?}", self.root);
        }
        if !self.root.is_dir() {
            anyhow::bail!("Root path is not a directory: {:?}", self.root);
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(true) // Respect .gitignore, .ignore, etc.
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .git_global(true)
            .require_git(false)
            .build();

        for entry in walker {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_dir() {
                continue;
            }

            if path.components().any(|c| c.as_os_str() == ".git") {
                continue;
            }

            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if !self.matches_patterns(relative) {
                continue;
            }

            let metadata = match fs::metadata(path) {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!("Skipping unreadable file {:?}: {}", path, e);
                    continue;
                }
            };
            if metadata.len() > self.max_file_size as u64 {
                tracing::debug!("Skipping large file: {:?}", path);
                continue;
            }

            if !self.is_text_file(path)? {
                tracing::debug!("Skipping binary file: {:?}", path);
                continue;
            }

            let content = match fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!("Skipping non-UTF-8 file {:?}: {}", path, e);
                    continue;
                }
            };

            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();

            files.push(FileInfo {
                path: path.to_path_buf(),
                relative_path: relative.to_string_lossy().to_string(),
                root_path: self.root.to_string_lossy().to_string(),
                language: language_tag(extension).to_string(),
                fingerprint: fingerprint(&content),
                mtime,
                content,
            });
        }

        // Stable ordering keeps repeated runs deterministic
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        tracing::info!("Found {} eligible files under {:?}", files.len(), self.root);
        Ok(files)
    }

    /// Check if a file is likely text (not binary)
    fn is_text_file(&self, path: &Path) -> Result<bool> {
        let content = fs::read(path).context("Failed to read file")?;
        if content.is_empty() {
            return Ok(true);
        }

        // Heuristic: more than 30% non-printable bytes means binary
        let non_printable = content
            .iter()
            .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
            .count();

        Ok((non_printable as f64 / content.len() as f64) < 0.3)
    }

    fn matches_patterns(&self, relative: &Path) -> bool {
        if let Some(include) = &self.include
            && !include.is_match(relative)
        {
            return false;
        }
        if let Some(exclude) = &self.exclude
            && exclude.is_match(relative)
        {
            return false;
        }
        true
    }
}

/// Compile user patterns into a glob set. Bare names (no glob metacharacters)
/// match both the name itself and anything beneath a directory of that name.
fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if pattern.contains(['*', '?', '[']) {
            builder.add(Glob::new(pattern).context("Invalid glob pattern")?);
            builder.add(
                Glob::new(&format!("**/{}", pattern)).context("Invalid glob pattern")?,
            );
        } else {
            builder.add(
                Glob::new(&format!("**/*{}*", pattern)).context("Invalid pattern")?,
            );
            builder.add(Glob::new(&format!("{}/**", pattern)).context("Invalid pattern")?);
        }
    }
    Ok(Some(builder.build().context("Failed to build glob set")?))
}

/// Compute the SHA-256 content fingerprint used for change detection
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Map a file extension to the parser registry's language tag.
///
/// Tags without a structural grammar resolve to the whole-file fallback
/// strategy in the registry.
pub fn language_tag(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "mts" => "typescript",
        "tsx" => "tsx",
        "go" => "go",
        "java" => "java",
        "swift" => "swift",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "md" | "markdown" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" => "css",
        "txt" => "text",
        _ => "unknown",
    }
}
