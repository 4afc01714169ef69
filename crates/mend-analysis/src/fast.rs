//! Import-graph impact analysis

use crate::analyzer::ImpactAnalyzer;
use crate::result::{ImpactResult, Strategy};
use mend_graph::{normalize_file_id, DependencyGraph, GraphCache, GraphError, GraphOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Rebuilds (or fetches) the workspace import graph and reports every
/// transitive importer of the changed file
#[derive(Debug, Clone)]
pub struct FastAnalyzer {
    root: PathBuf,
    options: GraphOptions,
    cache: Option<Arc<GraphCache>>,
}

impl FastAnalyzer {
    /// Analyzer for workspace `root`, rebuilding the graph on every call
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            options: GraphOptions::default(),
            cache: None,
        }
    }

    /// Use custom graph options
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: GraphOptions) -> Self {
        self.options = options;
        self
    }

    /// Reuse graphs through `cache`
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<GraphCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Workspace root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_graph(&self) -> Result<Arc<DependencyGraph>, GraphError> {
        match &self.cache {
            Some(cache) => cache.get_or_build(&self.root, &self.options),
            None => DependencyGraph::build(&self.root, &self.options).map(Arc::new),
        }
    }
}

#[async_trait::async_trait]
impl ImpactAnalyzer for FastAnalyzer {
    fn strategy(&self) -> Strategy {
        Strategy::Fast
    }

    async fn analyze(&self, changed_file: &str, _changed_symbol: Option<&str>) -> ImpactResult {
        let start = Instant::now();
        let changed = normalize_file_id(&self.root, changed_file);

        let this = self.clone();
        let built = tokio::task::spawn_blocking(move || this.load_graph()).await;

        let graph = match built {
            Ok(Ok(graph)) => graph,
            Ok(Err(e)) => {
                tracing::warn!("Fast analysis failed for {}: {}", changed, e);
                return ImpactResult::failed(Strategy::Fast, e.to_string(), start.elapsed());
            }
            Err(e) => {
                tracing::warn!("Graph build task failed for {}: {}", changed, e);
                return ImpactResult::failed(
                    Strategy::Fast,
                    format!("graph build task failed: {e}"),
                    start.elapsed(),
                );
            }
        };

        if !graph.contains(&changed) {
            tracing::warn!("File {} not found in dependency graph", changed);
            return ImpactResult::success(Strategy::Fast, &changed, Vec::<String>::new(), start.elapsed())
                .with_warning(format!("File {changed} not found in dependency graph"));
        }

        let dependents = graph.descendants(&changed);
        let result = ImpactResult::success(Strategy::Fast, &changed, dependents, start.elapsed());
        tracing::info!(
            "Fast analysis of {}: {} impacted files in {:?}",
            changed,
            result.impacted_files().len(),
            result.elapsed()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[tokio::test]
    async fn missing_root_reports_error_without_files() {
        let analyzer = FastAnalyzer::new("/no/such/workspace");
        let result = analyzer.analyze("a.py", None).await;
        assert!(result.is_error());
        assert!(result.impacted_files().is_empty());
        assert!(!result.should_fallback());
    }

    #[tokio::test]
    async fn normalizes_changed_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/a.py"), "").unwrap();
        fs::write(dir.path().join("b.py"), "import pkg.a\n").unwrap();

        let analyzer = FastAnalyzer::new(dir.path());
        let result = analyzer.analyze("./pkg\\a.py", None).await;
        assert_eq!(result.impacted_files(), ["pkg/a.py", "b.py"]);
    }
}
