//! Analysis strategy and result types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Impact analysis strategy (also the requested workflow mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Import-graph reachability
    #[default]
    Fast,
    /// Reference-index lookup
    Precise,
}

impl Strategy {
    /// Lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Precise => "precise",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown strategy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown analysis strategy: {0} (expected fast or precise)")]
pub struct ParseStrategyError(pub String);

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "precise" => Ok(Self::Precise),
            other => Err(ParseStrategyError(other.to_string())),
        }
    }
}

/// Outcome of one analysis call
///
/// Fields are read-only; use the constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactResult {
    impacted_files: Vec<String>,
    strategy_used: Strategy,
    elapsed: Duration,
    error_message: Option<String>,
    warnings: Vec<String>,
    should_fallback: bool,
}

impl ImpactResult {
    /// Successful analysis: `changed` first, then `dependents` sorted and deduplicated
    #[must_use]
    pub fn success<I, S>(strategy: Strategy, changed: &str, dependents: I, elapsed: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            impacted_files: ordered_impact(changed, dependents),
            strategy_used: strategy,
            elapsed,
            error_message: None,
            warnings: Vec::new(),
            should_fallback: false,
        }
    }

    /// Failed analysis with no impacted files
    #[must_use]
    pub fn failed(strategy: Strategy, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            impacted_files: Vec::new(),
            strategy_used: strategy,
            elapsed,
            error_message: Some(message.into()),
            warnings: Vec::new(),
            should_fallback: false,
        }
    }

    /// Failed precise analysis that the caller should replace with a fast one
    #[must_use]
    pub fn fallback(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            should_fallback: true,
            ..Self::failed(Strategy::Precise, message, elapsed)
        }
    }

    /// Attach a warning
    #[inline]
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Changed file first, then dependents
    #[must_use]
    pub fn impacted_files(&self) -> &[String] {
        &self.impacted_files
    }

    /// Strategy that produced this result
    #[must_use]
    pub fn strategy_used(&self) -> Strategy {
        self.strategy_used
    }

    /// Wall time spent
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Error message, if the analysis failed
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Non-fatal warnings
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether the workflow should re-run the fast strategy instead
    #[must_use]
    pub fn should_fallback(&self) -> bool {
        self.should_fallback
    }

    /// Whether an error was recorded
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// `[changed] + sorted(dependents \ {changed})`, no duplicates
#[must_use]
pub fn ordered_impact<I, S>(changed: &str, dependents: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut rest: Vec<String> = dependents
        .into_iter()
        .map(Into::into)
        .filter(|f| f != changed)
        .collect();
    rest.sort();
    rest.dedup();

    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(changed.to_string());
    out.extend(rest);
    out
}
