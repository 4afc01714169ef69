//! Graph cache keyed by workspace root
//!
//! A cached graph is reused only while the workspace fingerprint (file set,
//! sizes, mtimes) and the build options are unchanged. Every lookup rescans
//! the tree, which is far cheaper than re-parsing it.

use crate::error::GraphError;
use crate::graph::{DependencyGraph, GraphOptions};
use crate::scan::{check_root, scan_workspace, WorkspaceFingerprint};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
struct CacheEntry {
    fingerprint: WorkspaceFingerprint,
    options: GraphOptions,
    graph: Arc<DependencyGraph>,
}

/// Thread-safe cache of built graphs
#[derive(Debug, Default)]
pub struct GraphCache {
    entries: RwLock<HashMap<PathBuf, CacheEntry>>,
}

impl GraphCache {
    /// Create empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached graph for `root`, rebuilding it if the workspace changed
    ///
    /// # Errors
    /// Propagates [`GraphError`] when `root` is unusable.
    pub fn get_or_build(
        &self,
        root: &Path,
        options: &GraphOptions,
    ) -> Result<Arc<DependencyGraph>, GraphError> {
        check_root(root)?;
        let key = canonical(root);
        let files = scan_workspace(root)?;
        let fingerprint = WorkspaceFingerprint::of(&files);

        if let Some(entry) = self.entries.read().get(&key) {
            if entry.fingerprint == fingerprint && entry.options == *options {
                tracing::debug!("Graph cache hit for {}", key.display());
                return Ok(Arc::clone(&entry.graph));
            }
        }

        tracing::debug!(
            "Graph cache miss for {} (fingerprint {})",
            key.display(),
            fingerprint.to_hex()
        );
        let graph = Arc::new(DependencyGraph::build_from_scan(root, &files, options));
        self.entries.write().insert(
            key,
            CacheEntry {
                fingerprint,
                options: options.clone(),
                graph: Arc::clone(&graph),
            },
        );
        Ok(graph)
    }

    /// Drop the cached graph for `root`; returns whether one existed
    pub fn invalidate(&self, root: &Path) -> bool {
        let removed = self.entries.write().remove(&canonical(root)).is_some();
        if removed {
            tracing::debug!("Invalidated graph cache for {}", root.display());
        }
        removed
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached workspaces
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn canonical(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}
