//! Error types for graph construction

use std::path::PathBuf;

/// Errors that abort a graph build
///
/// Individual files that fail to read or parse never produce a `GraphError`;
/// they are recorded as [`SkippedFile`](crate::SkippedFile) entries instead.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Workspace root does not exist
    #[error("workspace root not found: {0}")]
    RootNotFound(PathBuf),

    /// Workspace root exists but is not a directory
    #[error("workspace root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// IO error while inspecting the root
    #[error("io error reading {path}: {source}")]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl GraphError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reasons a single file could not contribute imports
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// File could not be read
    #[error("read failed: {0}")]
    Read(String),

    /// Grammar could not be loaded into the parser
    #[error("grammar unavailable: {0}")]
    Grammar(String),

    /// Parser returned no tree
    #[error("parser produced no syntax tree")]
    NoTree,
}
