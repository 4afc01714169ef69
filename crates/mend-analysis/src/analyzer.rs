//! The analyzer interface and mode-based selection

use crate::result::{ImpactResult, Strategy};
use std::sync::Arc;

/// Computes which files a change affects
///
/// Implementations never fail past this boundary: every problem is reported
/// inside the returned [`ImpactResult`].
#[async_trait::async_trait]
pub trait ImpactAnalyzer: Send + Sync {
    /// Strategy implemented
    fn strategy(&self) -> Strategy;

    /// Analyze a change to `changed_file` (optionally narrowed to a symbol)
    async fn analyze(&self, changed_file: &str, changed_symbol: Option<&str>) -> ImpactResult;
}

/// One analyzer per strategy
#[derive(Clone)]
pub struct AnalyzerSet {
    fast: Arc<dyn ImpactAnalyzer>,
    precise: Arc<dyn ImpactAnalyzer>,
}

impl AnalyzerSet {
    /// Create from both strategies
    #[must_use]
    pub fn new(fast: Arc<dyn ImpactAnalyzer>, precise: Arc<dyn ImpactAnalyzer>) -> Self {
        Self { fast, precise }
    }

    /// Analyzer for `strategy`
    #[must_use]
    pub fn get(&self, strategy: Strategy) -> &Arc<dyn ImpactAnalyzer> {
        match strategy {
            Strategy::Fast => &self.fast,
            Strategy::Precise => &self.precise,
        }
    }
}

impl std::fmt::Debug for AnalyzerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerSet")
            .field("fast", &self.fast.strategy())
            .field("precise", &self.precise.strategy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Fixed(Strategy);

    #[async_trait::async_trait]
    impl ImpactAnalyzer for Fixed {
        fn strategy(&self) -> Strategy {
            self.0
        }

        async fn analyze(&self, changed_file: &str, _symbol: Option<&str>) -> ImpactResult {
            ImpactResult::success(self.0, changed_file, Vec::<String>::new(), Duration::ZERO)
        }
    }

    #[tokio::test]
    async fn selects_by_strategy() {
        let set = AnalyzerSet::new(Arc::new(Fixed(Strategy::Fast)), Arc::new(Fixed(Strategy::Precise)));
        let result = set.get(Strategy::Precise).analyze("a.py", None).await;
        assert_eq!(result.strategy_used(), Strategy::Precise);
        assert_eq!(set.get(Strategy::Fast).strategy(), Strategy::Fast);
    }
}
