//! Engine configuration
//!
//! Loaded from TOML, then optionally overridden from `MEND_*` environment
//! variables. Every section and field has a default, so an empty file is a
//! valid configuration.

use crate::error::ConfigError;
use mend_analysis::Strategy;
use mend_graph::GraphOptions;
use mend_healing::{process, HealingPolicy, ProcessSandbox};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bound on stage executions per run
pub const DEFAULT_MAX_STEPS: usize = 64;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MendConfig {
    /// Routing and step bound
    pub workflow: WorkflowConfig,
    /// Workspace and graph settings
    pub analysis: AnalysisConfig,
    /// Retry and timeout limits
    pub healing: HealingConfig,
    /// Test command
    pub sandbox: SandboxConfig,
}

/// `[workflow]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Default analysis strategy for new runs
    pub mode: Strategy,
    /// Stage executions per run; raised to fit the retry budget
    pub max_steps: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            mode: Strategy::Fast,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// `[analysis]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Directory scanned by FAST analysis
    pub workspace_root: PathBuf,
    /// Directories Python absolute imports resolve against
    pub source_roots: Vec<String>,
    /// Reuse graphs across requests until the workspace changes
    pub cache_graphs: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            source_roots: GraphOptions::default().source_roots,
            cache_graphs: false,
        }
    }
}

/// `[healing]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Negative values clamp to 0
    pub max_retries: i64,
    /// Per test run
    pub sandbox_timeout_secs: u64,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            sandbox_timeout_secs: 30,
        }
    }
}

/// `[sandbox]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Program and arguments run inside the sandbox directory
    pub command: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command: process::default_command(),
        }
    }
}

impl MendConfig {
    /// Read and validate a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Io`] if unreadable, otherwise as [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::InvalidValue`]
    /// for out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MEND_*` overrides from the process environment
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] when a variable does not parse.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`
    ///
    /// Recognized keys: `MEND_MODE`, `MEND_MAX_RETRIES`,
    /// `MEND_SANDBOX_TIMEOUT_SECS`, `MEND_WORKSPACE_ROOT`.
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] when a value does not parse.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("MEND_MODE") {
            self.workflow.mode = value
                .parse()
                .map_err(|e: mend_analysis::ParseStrategyError| {
                    ConfigError::invalid("MEND_MODE", &value, e.to_string())
                })?;
        }
        if let Some(value) = lookup("MEND_MAX_RETRIES") {
            self.healing.max_retries = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("MEND_MAX_RETRIES", &value, "expected an integer"))?;
        }
        if let Some(value) = lookup("MEND_SANDBOX_TIMEOUT_SECS") {
            self.healing.sandbox_timeout_secs = value.trim().parse().map_err(|_| {
                ConfigError::invalid("MEND_SANDBOX_TIMEOUT_SECS", &value, "expected seconds")
            })?;
        }
        if let Some(value) = lookup("MEND_WORKSPACE_ROOT") {
            self.analysis.workspace_root = PathBuf::from(value);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow.max_steps == 0 {
            return Err(ConfigError::invalid("workflow.max_steps", 0, "must be at least 1"));
        }
        if self.healing.sandbox_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "healing.sandbox_timeout_secs",
                0,
                "must be at least 1",
            ));
        }
        if self.sandbox.command.is_empty() {
            return Err(ConfigError::invalid("sandbox.command", "[]", "must not be empty"));
        }
        Ok(())
    }

    /// Set analysis mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: Strategy) -> Self {
        self.workflow.mode = mode;
        self
    }

    /// Set step bound
    #[inline]
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.workflow.max_steps = max_steps;
        self
    }

    /// Set workspace root
    #[inline]
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.analysis.workspace_root = root.into();
        self
    }

    /// Enable or disable graph caching
    #[inline]
    #[must_use]
    pub fn with_cache_graphs(mut self, enabled: bool) -> Self {
        self.analysis.cache_graphs = enabled;
        self
    }

    /// Set retry ceiling (negatives clamp to 0 when used)
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: i64) -> Self {
        self.healing.max_retries = max_retries;
        self
    }

    /// Set sandbox time limit in seconds
    #[inline]
    #[must_use]
    pub fn with_sandbox_timeout_secs(mut self, secs: u64) -> Self {
        self.healing.sandbox_timeout_secs = secs;
        self
    }

    /// Healing limits derived from `[healing]`
    #[must_use]
    pub fn healing_policy(&self) -> HealingPolicy {
        HealingPolicy::default()
            .with_max_retries(self.healing.max_retries)
            .with_sandbox_timeout(Duration::from_secs(self.healing.sandbox_timeout_secs))
    }

    /// Graph options derived from `[analysis]`
    #[must_use]
    pub fn graph_options(&self) -> GraphOptions {
        GraphOptions::default().with_source_roots(self.analysis.source_roots.iter().cloned())
    }

    /// Subprocess sandbox running `[sandbox].command`
    #[must_use]
    pub fn process_sandbox(&self) -> ProcessSandbox {
        ProcessSandbox::new(self.sandbox.command.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(MendConfig::from_toml_str("").unwrap(), MendConfig::default());
    }

    #[test]
    fn full_document_parses() {
        let config = MendConfig::from_toml_str(
            r#"
            [workflow]
            mode = "precise"
            max_steps = 10

            [analysis]
            workspace_root = "/srv/app"
            source_roots = ["lib"]
            cache_graphs = true

            [healing]
            max_retries = -2
            sandbox_timeout_secs = 5

            [sandbox]
            command = ["pytest", "-x"]
            "#,
        )
        .unwrap();

        assert_eq!(config.workflow.mode, Strategy::Precise);
        assert_eq!(config.workflow.max_steps, 10);
        assert_eq!(config.analysis.source_roots, vec!["lib".to_string()]);
        assert!(config.analysis.cache_graphs);
        assert_eq!(config.healing_policy().max_retries.ceiling(), 0);
        assert_eq!(config.healing_policy().sandbox_timeout, Duration::from_secs(5));
        assert_eq!(config.process_sandbox().command(), ["pytest", "-x"]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            MendConfig::from_toml_str("[workflow]\nmax_steps = 0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            MendConfig::from_toml_str("[workflow]\nmode = \"slow\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            MendConfig::from_toml_str("[sandbox]\ncommand = []"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("MEND_MODE", "PRECISE"),
            ("MEND_MAX_RETRIES", "5"),
            ("MEND_SANDBOX_TIMEOUT_SECS", "12"),
            ("MEND_WORKSPACE_ROOT", "/tmp/ws"),
        ]
        .into_iter()
        .collect();
        let config = MendConfig::default()
            .apply_env_from(|k| env.get(k).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.workflow.mode, Strategy::Precise);
        assert_eq!(config.healing.max_retries, 5);
        assert_eq!(config.healing.sandbox_timeout_secs, 12);
        assert_eq!(config.analysis.workspace_root, PathBuf::from("/tmp/ws"));
    }

    #[test]
    fn bad_environment_value_is_an_error() {
        let err = MendConfig::default()
            .apply_env_from(|k| (k == "MEND_MAX_RETRIES").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("MEND_MAX_RETRIES"));
    }
}
