//! mend-graph: file-level import graph for change impact analysis
//!
//! - Scan a workspace for Python / JavaScript / TypeScript sources
//! - Extract imports (tree-sitter for Python, text scan for ECMAScript)
//! - Resolve imports to workspace files and build a directed graph
//! - Answer "which files transitively depend on this one?"
//! - Cache built graphs per workspace root

pub mod cache;
pub mod error;
pub mod graph;
pub mod imports;
pub mod path;
pub mod resolve;
pub mod scan;

pub use cache::GraphCache;
pub use error::{ExtractError, GraphError};
pub use graph::{BuildStats, DependencyGraph, GraphOptions, SkippedFile};
pub use imports::{ImportExtractor, ImportSpec, Language};
pub use path::normalize_file_id;
pub use resolve::ImportResolver;
pub use scan::{scan_workspace, SourceFile, WorkspaceFingerprint};
