//! Reference-index impact analysis
//!
//! Precise results come from a language-server style [`ReferenceIndex`].
//! Without an index the analyzer degrades to `[changed]` plus a warning; an
//! index that fails marks the result for fallback to the fast strategy.

use crate::analyzer::ImpactAnalyzer;
use crate::error::ReferenceError;
use crate::result::{ImpactResult, Strategy};
use mend_graph::normalize_file_id;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Warning attached when no reference index is configured
pub const NO_INDEX_WARNING: &str =
    "No reference index configured; precise analysis limited to the changed file";

/// Source of true symbol references
#[async_trait::async_trait]
pub trait ReferenceIndex: Send + Sync {
    /// Files referencing `file` (or `symbol` within it)
    ///
    /// # Errors
    /// Returns [`ReferenceError`] when the index is unavailable or the query fails.
    async fn references(
        &self,
        file: &str,
        symbol: Option<&str>,
    ) -> Result<Vec<String>, ReferenceError>;
}

/// Precise strategy over an optional [`ReferenceIndex`]
#[derive(Clone)]
pub struct PreciseAnalyzer {
    root: PathBuf,
    index: Option<Arc<dyn ReferenceIndex>>,
}

impl PreciseAnalyzer {
    /// Analyzer with no index attached
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: None,
        }
    }

    /// Attach a reference index
    #[inline]
    #[must_use]
    pub fn with_index(mut self, index: Arc<dyn ReferenceIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Whether an index is attached
    #[must_use]
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }
}

impl std::fmt::Debug for PreciseAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreciseAnalyzer")
            .field("root", &self.root)
            .field("has_index", &self.has_index())
            .finish()
    }
}

#[async_trait::async_trait]
impl ImpactAnalyzer for PreciseAnalyzer {
    fn strategy(&self) -> Strategy {
        Strategy::Precise
    }

    async fn analyze(&self, changed_file: &str, changed_symbol: Option<&str>) -> ImpactResult {
        let start = Instant::now();
        let changed = normalize_file_id(&self.root, changed_file);

        let Some(index) = &self.index else {
            tracing::warn!("{}", NO_INDEX_WARNING);
            return ImpactResult::success(Strategy::Precise, &changed, Vec::<String>::new(), start.elapsed())
                .with_warning(NO_INDEX_WARNING);
        };

        match index.references(&changed, changed_symbol).await {
            Ok(files) => {
                let normalized = files
                    .iter()
                    .map(|f| normalize_file_id(&self.root, f))
                    .collect::<Vec<_>>();
                let result =
                    ImpactResult::success(Strategy::Precise, &changed, normalized, start.elapsed());
                tracing::info!(
                    "Precise analysis of {}: {} impacted files",
                    changed,
                    result.impacted_files().len()
                );
                result
            }
            Err(e) => {
                tracing::warn!("Precise analysis failed for {}: {}", changed, e);
                ImpactResult::fallback(e.to_string(), start.elapsed())
            }
        }
    }
}
