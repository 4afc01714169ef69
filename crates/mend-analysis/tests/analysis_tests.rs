use mend_analysis::{
    ordered_impact, FastAnalyzer, ImpactAnalyzer, PreciseAnalyzer, ReferenceError, ReferenceIndex,
    Strategy,
};
use mend_graph::{GraphCache, GraphOptions};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn workspace_abc(root: &Path) {
    fs::write(root.join("a.py"), "def f():\n    return 1\n").unwrap();
    fs::write(root.join("b.py"), "import a\n").unwrap();
    fs::write(root.join("c.py"), "import b\n").unwrap();
}

#[tokio::test]
async fn test_chain_change_impacts_importers_in_order() {
    let dir = tempfile::tempdir().unwrap();
    workspace_abc(dir.path());

    let result = FastAnalyzer::new(dir.path()).analyze("a.py", None).await;
    assert_eq!(result.impacted_files(), ["a.py", "b.py", "c.py"]);
    assert_eq!(result.strategy_used(), Strategy::Fast);
    assert!(result.warnings().is_empty());
}

#[tokio::test]
async fn test_unseen_file_yields_singleton_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    workspace_abc(dir.path());

    let result = FastAnalyzer::new(dir.path()).analyze("new_module.py", None).await;
    assert_eq!(result.impacted_files(), ["new_module.py"]);
    assert_eq!(result.warnings().len(), 1);
    assert!(result.warnings()[0].contains("new_module.py"));
    assert!(!result.is_error());
}

#[tokio::test]
async fn test_repeated_analysis_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    workspace_abc(dir.path());
    fs::write(dir.path().join("d.py"), "from a import f\n").unwrap();

    let analyzer = FastAnalyzer::new(dir.path());
    let first = analyzer.analyze("a.py", None).await;
    let second = analyzer.analyze("a.py", None).await;
    assert_eq!(first.impacted_files(), second.impacted_files());
    assert_eq!(first.impacted_files(), ["a.py", "b.py", "c.py", "d.py"]);
}

#[tokio::test]
async fn test_cached_analyzer_matches_uncached() {
    let dir = tempfile::tempdir().unwrap();
    workspace_abc(dir.path());

    let cache = Arc::new(GraphCache::new());
    let cached = FastAnalyzer::new(dir.path())
        .with_options(GraphOptions::default())
        .with_cache(Arc::clone(&cache));
    let plain = FastAnalyzer::new(dir.path());

    let a = cached.analyze("b.py", None).await;
    let b = plain.analyze("b.py", None).await;
    assert_eq!(a.impacted_files(), b.impacted_files());
    assert_eq!(cache.len(), 1);
}

struct DownIndex;

#[async_trait::async_trait]
impl ReferenceIndex for DownIndex {
    async fn references(
        &self,
        _file: &str,
        _symbol: Option<&str>,
    ) -> Result<Vec<String>, ReferenceError> {
        Err(ReferenceError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn test_precise_failure_always_signals_fallback() {
    let analyzer = PreciseAnalyzer::new("/ws").with_index(Arc::new(DownIndex));
    for file in ["a.py", "pkg/b.py", "./c.py"] {
        let result = analyzer.analyze(file, Some("symbol")).await;
        assert!(result.should_fallback());
        assert!(result.is_error());
        assert_eq!(result.strategy_used(), Strategy::Precise);
    }
}

proptest! {
    #[test]
    fn prop_ordered_impact_changed_first_no_duplicates(
        changed in "[a-e]\\.py",
        deps in proptest::collection::vec("[a-e]\\.py", 0..12),
    ) {
        let out = ordered_impact(&changed, deps.clone());
        prop_assert_eq!(&out[0], &changed);
        let rest = &out[1..];
        prop_assert!(rest.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(!rest.contains(&changed));
        for d in deps.iter().filter(|d| **d != changed) {
            prop_assert!(rest.contains(d));
        }
    }
}
