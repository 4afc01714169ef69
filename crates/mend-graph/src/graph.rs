//! File-level dependency graph
//!
//! Nodes are file ids; an edge `a -> b` means *b imports a*, so the
//! descendants of a file are exactly the files that (transitively) depend on
//! it. Cycles are allowed and traversal visits each node once.

use crate::error::{ExtractError, GraphError};
use crate::imports::Extractors;
use crate::resolve::ImportResolver;
use crate::scan::{scan_workspace, SourceFile};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Options controlling import resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphOptions {
    /// Directories (relative to the root) searched for absolute Python
    /// modules. `""` is the root itself.
    pub source_roots: Vec<String>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            source_roots: vec![String::new(), "src".to_string()],
        }
    }
}

impl GraphOptions {
    /// Replace source roots
    #[inline]
    #[must_use]
    pub fn with_source_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_roots = roots.into_iter().map(Into::into).collect();
        self
    }
}

/// A file that contributed no edges because it could not be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    /// File id
    pub id: String,
    /// Why it was skipped
    pub reason: ExtractError,
}

/// Statistics from a graph build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Source files scanned
    pub files: usize,
    /// Distinct edges added
    pub edges: usize,
    /// Files whose imports could not be extracted
    pub skipped: Vec<SkippedFile>,
}

/// Directed import graph over a workspace
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    root: PathBuf,
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    stats: BuildStats,
}

impl DependencyGraph {
    /// Scan `root` and build its import graph
    ///
    /// # Errors
    /// Fails only when `root` is missing or not a directory; per-file
    /// problems land in [`BuildStats::skipped`].
    pub fn build(root: &Path, options: &GraphOptions) -> Result<Self, GraphError> {
        let files = scan_workspace(root)?;
        Ok(Self::build_from_scan(root, &files, options))
    }

    /// Build from an existing scan
    #[must_use]
    pub fn build_from_scan(root: &Path, files: &[SourceFile], options: &GraphOptions) -> Self {
        let mut graph = Self::empty(root);
        for file in files {
            graph.add_file(&file.id);
        }

        let known: HashSet<String> = files.iter().map(|f| f.id.clone()).collect();
        let resolver = ImportResolver::new(&known, &options.source_roots);

        let per_file: Vec<(String, Result<Vec<String>, ExtractError>)> = files
            .par_iter()
            .map_init(Extractors::new, |extractors, file| {
                let targets = std::fs::read_to_string(&file.path)
                    .map_err(|e| ExtractError::Read(e.to_string()))
                    .and_then(|source| extractors.extract(file.language, &source))
                    .map(|specs| {
                        specs
                            .iter()
                            .flat_map(|spec| resolver.resolve(&file.id, spec))
                            .collect::<Vec<String>>()
                    });
                (file.id.clone(), targets)
            })
            .collect();

        for (importer, result) in per_file {
            match result {
                Ok(targets) => {
                    for imported in targets {
                        graph.add_edge(&imported, &importer);
                    }
                }
                Err(reason) => {
                    tracing::warn!("Skipping imports of {}: {}", importer, reason);
                    graph.stats.skipped.push(SkippedFile {
                        id: importer,
                        reason,
                    });
                }
            }
        }

        graph.stats.files = files.len();
        tracing::info!(
            "Built dependency graph for {}: {} files, {} edges, {} skipped",
            root.display(),
            graph.node_count(),
            graph.edge_count(),
            graph.stats.skipped.len()
        );
        graph
    }

    /// Build directly from `(imported, importer)` pairs
    #[must_use]
    pub fn from_edges<'a, I>(root: &Path, edges: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut graph = Self::empty(root);
        for (imported, importer) in edges {
            graph.add_edge(imported, importer);
        }
        graph.stats.files = graph.node_count();
        graph
    }

    fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            graph: DiGraph::new(),
            index: HashMap::new(),
            stats: BuildStats::default(),
        }
    }

    /// Add a file node (no-op if present)
    pub fn add_file(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    /// Record that `importer` imports `imported`
    ///
    /// Self-edges are ignored; repeated edges are stored once.
    pub fn add_edge(&mut self, imported: &str, importer: &str) {
        if imported == importer {
            return;
        }
        let from = self.add_file(imported);
        let to = self.add_file(importer);
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
            self.stats.edges += 1;
        }
    }

    /// Workspace root this graph was built for
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `id` is a node
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Number of files
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of import edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Build statistics
    #[must_use]
    pub fn build_stats(&self) -> &BuildStats {
        &self.stats
    }

    /// All file ids, sorted
    #[must_use]
    pub fn files(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.index.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Every file that transitively imports `id`, excluding `id` itself
    ///
    /// An unknown `id` yields an empty set (and a warning).
    #[must_use]
    pub fn descendants(&self, id: &str) -> BTreeSet<String> {
        let Some(&start) = self.index.get(id) else {
            tracing::warn!("File {} not found in dependency graph", id);
            return BTreeSet::new();
        };
        let mut bfs = Bfs::new(&self.graph, start);
        let mut out = BTreeSet::new();
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                out.insert(self.graph[node].clone());
            }
        }
        out
    }

    /// Files `id` imports directly, sorted
    #[must_use]
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Files that import `id` directly, sorted
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<String> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}
