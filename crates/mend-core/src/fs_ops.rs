//! Workspace-confined filesystem operations
//!
//! [`Workspace`] executes [`FsOp`]s relative to a root directory and refuses
//! any path that resolves outside it. Writes and edits invalidate the graph
//! cache entry for the root so the next FAST analysis sees the change.

use crate::error::FsError;
use globset::{Glob, GlobMatcher};
use mend_graph::GraphCache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::{DirEntry, WalkDir};

/// Largest file [`FsOp::Read`] will return
pub const MAX_READ_BYTES: u64 = 100_000;

/// Directory names skipped by glob and grep
pub const SEARCH_EXCLUDED_DIRS: [&str; 3] = ["__pycache__", "node_modules", ".venv"];

/// Default context lines for grep
pub const DEFAULT_CONTEXT_LINES: usize = 2;

/// A filesystem operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FsOp {
    /// Directory listing
    List {
        /// Workspace-relative directory
        path: String,
    },
    /// File contents, optionally capped at `max_lines`
    Read {
        /// Workspace-relative file
        path: String,
        /// Leading lines to keep
        max_lines: Option<usize>,
    },
    /// Files matching a glob
    Glob {
        /// Glob over workspace-relative paths
        pattern: String,
    },
    /// Regex search over files matching `glob` (all files when `None`)
    Grep {
        /// Regex matched per line
        pattern: String,
        /// File filter
        glob: Option<String>,
        /// Lines shown on each side of a hit
        context_lines: usize,
    },
    /// Replace `search` with `replace`; every occurrence when `occurrence` is
    /// `None`, otherwise only the n-th (1-based)
    Edit {
        /// Workspace-relative file
        path: String,
        /// Literal text to find
        search: String,
        /// Replacement text
        replace: String,
        /// 1-based occurrence to replace
        occurrence: Option<usize>,
    },
    /// Write or append `content`
    Write {
        /// Workspace-relative file; parents are created
        path: String,
        /// Text to write
        content: String,
        /// Append instead of truncating
        append: bool,
    },
}

impl FsOp {
    /// Whether the operation changes files
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Edit { .. } | Self::Write { .. })
    }
}

/// One grep hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// Workspace-relative path
    pub file: String,
    /// 1-based line number
    pub line: usize,
    /// Matching line
    pub text: String,
    /// Surrounding lines including the match
    pub context: String,
}

/// Result of an [`FsOp`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FsOutput {
    /// From [`FsOp::List`]
    Listing {
        /// Sorted, as `dir/` or `file (n KB)`
        entries: Vec<String>,
    },
    /// From [`FsOp::Read`]
    Content {
        /// File text
        text: String,
    },
    /// From [`FsOp::Glob`]
    Paths {
        /// Sorted workspace-relative paths
        paths: Vec<String>,
    },
    /// From [`FsOp::Grep`]
    Matches {
        /// Hits in file then line order
        matches: Vec<GrepMatch>,
    },
    /// From [`FsOp::Edit`]
    Edited {
        /// Workspace-relative file
        path: String,
        /// Occurrences replaced
        replacements: usize,
    },
    /// From [`FsOp::Write`]
    Written {
        /// Workspace-relative file
        path: String,
        /// Bytes written
        bytes: usize,
    },
}

impl FsOutput {
    /// One-line description for reports
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Listing { entries } => format!("{} entries", entries.len()),
            Self::Content { text } => format!("{} lines", text.lines().count()),
            Self::Paths { paths } => format!("{} files", paths.len()),
            Self::Matches { matches } => format!("{} matches", matches.len()),
            Self::Edited { path, replacements } => {
                format!("Replaced {replacements} occurrence(s) in {path}")
            }
            Self::Written { path, bytes } => format!("Wrote {bytes} bytes to {path}"),
        }
    }
}

/// Filesystem access rooted at one directory
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    graph_cache: Option<Arc<GraphCache>>,
}

impl Workspace {
    /// Workspace rooted at `root`, which must be an existing directory
    ///
    /// # Errors
    /// [`FsError::NotFound`] or [`FsError::NotADirectory`].
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FsError> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| FsError::io(root, e))?;
        if !root.is_dir() {
            return Err(FsError::NotADirectory(root));
        }
        Ok(Self {
            root,
            graph_cache: None,
        })
    }

    /// Invalidate `cache` after every write or edit
    #[inline]
    #[must_use]
    pub fn with_graph_cache(mut self, cache: Arc<GraphCache>) -> Self {
        self.graph_cache = Some(cache);
        self
    }

    /// Canonical root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execute `op`
    ///
    /// # Errors
    /// See [`FsError`].
    pub fn execute(&self, op: &FsOp) -> Result<FsOutput, FsError> {
        tracing::debug!("Filesystem op: {:?}", op);
        let output = match op {
            FsOp::List { path } => self.list(path)?,
            FsOp::Read { path, max_lines } => self.read(path, *max_lines)?,
            FsOp::Glob { pattern } => FsOutput::Paths {
                paths: self.glob(pattern)?,
            },
            FsOp::Grep {
                pattern,
                glob,
                context_lines,
            } => self.grep(pattern, glob.as_deref(), *context_lines)?,
            FsOp::Edit {
                path,
                search,
                replace,
                occurrence,
            } => self.edit(path, search, replace, *occurrence)?,
            FsOp::Write {
                path,
                content,
                append,
            } => self.write(path, content, *append)?,
        };
        if op.is_mutation() {
            self.invalidate_graph();
        }
        Ok(output)
    }

    /// Resolve `path` inside the workspace
    ///
    /// # Errors
    /// [`FsError::OutsideWorkspace`] when it escapes the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(FsError::OutsideWorkspace(candidate.to_path_buf()));
                    }
                }
                other => normalized.push(other),
            }
        }
        if !normalized.starts_with(&self.root) {
            return Err(FsError::OutsideWorkspace(candidate.to_path_buf()));
        }
        if let Ok(real) = normalized.canonicalize() {
            if !real.starts_with(&self.root) {
                return Err(FsError::OutsideWorkspace(candidate.to_path_buf()));
            }
        }
        Ok(normalized)
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn invalidate_graph(&self) {
        if let Some(cache) = &self.graph_cache {
            if cache.invalidate(&self.root) {
                tracing::debug!("Invalidated cached graph for {}", self.root.display());
            }
        }
    }

    fn list(&self, path: &str) -> Result<FsOutput, FsError> {
        let dir = self.resolve(path)?;
        let read = std::fs::read_dir(&dir).map_err(|e| {
            if dir.is_file() {
                FsError::NotADirectory(dir.clone())
            } else {
                FsError::io(&dir, e)
            }
        })?;

        let mut entries = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| FsError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().map_err(|e| FsError::io(entry.path(), e))?;
            if meta.is_dir() {
                entries.push(format!("{name}/"));
            } else {
                #[allow(clippy::cast_precision_loss)]
                let kb = meta.len() as f64 / 1024.0;
                entries.push(format!("{name} ({kb:.1} KB)"));
            }
        }
        entries.sort();
        Ok(FsOutput::Listing { entries })
    }

    fn read(&self, path: &str, max_lines: Option<usize>) -> Result<FsOutput, FsError> {
        let file = self.resolve(path)?;
        let meta = std::fs::metadata(&file).map_err(|e| FsError::io(&file, e))?;
        if !meta.is_file() {
            return Err(FsError::NotAFile(file));
        }
        if meta.len() > MAX_READ_BYTES {
            return Err(FsError::TooLarge {
                path: file,
                size: meta.len(),
                limit: MAX_READ_BYTES,
            });
        }
        let content = std::fs::read_to_string(&file).map_err(|e| FsError::io(&file, e))?;

        let text = match max_lines {
            Some(limit) => {
                let lines: Vec<&str> = content.lines().collect();
                if lines.len() > limit {
                    format!(
                        "{}\n\n... (truncated, {} more lines)",
                        lines[..limit].join("\n"),
                        lines.len() - limit
                    )
                } else {
                    content
                }
            }
            None => content,
        };
        Ok(FsOutput::Content { text })
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>, FsError> {
        let matcher = compile_glob(pattern)?;
        let mut paths: Vec<String> = self
            .searchable_files()
            .filter_map(|path| {
                let rel = self.relative(&path);
                matcher.is_match(&rel).then_some(rel)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn grep(
        &self,
        pattern: &str,
        glob: Option<&str>,
        context_lines: usize,
    ) -> Result<FsOutput, FsError> {
        let regex = Regex::new(pattern).map_err(|e| FsError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let files = self.glob(glob.unwrap_or("**/*"))?;

        let mut matches = Vec::new();
        for rel in files {
            let Ok(content) = std::fs::read_to_string(self.root.join(&rel)) else {
                tracing::debug!("Skipping unreadable file {}", rel);
                continue;
            };
            let lines: Vec<&str> = content.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                let start = i.saturating_sub(context_lines);
                let end = (i + context_lines + 1).min(lines.len());
                matches.push(GrepMatch {
                    file: rel.clone(),
                    line: i + 1,
                    text: (*line).to_string(),
                    context: lines[start..end].join("\n"),
                });
            }
        }
        Ok(FsOutput::Matches { matches })
    }

    fn edit(
        &self,
        path: &str,
        search: &str,
        replace: &str,
        occurrence: Option<usize>,
    ) -> Result<FsOutput, FsError> {
        let file = self.resolve(path)?;
        let content = std::fs::read_to_string(&file).map_err(|e| FsError::io(&file, e))?;
        let found = if search.is_empty() {
            0
        } else {
            content.matches(search).count()
        };
        if found == 0 {
            return Err(FsError::SearchNotFound(file));
        }

        let (updated, replacements) = match occurrence {
            None => (content.replace(search, replace), found),
            Some(n) => {
                let (offset, _) = n
                    .checked_sub(1)
                    .and_then(|idx| content.match_indices(search).nth(idx))
                    .ok_or(FsError::OccurrenceNotFound { occurrence: n, found })?;
                let mut updated = String::with_capacity(content.len());
                updated.push_str(&content[..offset]);
                updated.push_str(replace);
                updated.push_str(&content[offset + search.len()..]);
                (updated, 1)
            }
        };

        std::fs::write(&file, updated).map_err(|e| FsError::io(&file, e))?;
        let rel = self.relative(&file);
        tracing::info!("Replaced {} occurrence(s) in {}", replacements, rel);
        Ok(FsOutput::Edited {
            path: rel,
            replacements,
        })
    }

    fn write(&self, path: &str, content: &str, append: bool) -> Result<FsOutput, FsError> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FsError::io(parent, e))?;
        }
        if append {
            let mut handle = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file)
                .map_err(|e| FsError::io(&file, e))?;
            handle
                .write_all(content.as_bytes())
                .map_err(|e| FsError::io(&file, e))?;
        } else {
            std::fs::write(&file, content).map_err(|e| FsError::io(&file, e))?;
        }
        let rel = self.relative(&file);
        tracing::info!("Wrote {} bytes to {}", content.len(), rel);
        Ok(FsOutput::Written {
            path: rel,
            bytes: content.len(),
        })
    }

    fn searchable_files(&self) -> impl Iterator<Item = PathBuf> {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_excluded(e))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(DirEntry::into_path)
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SEARCH_EXCLUDED_DIRS.contains(&name.as_ref())
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher, FsError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| FsError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}
