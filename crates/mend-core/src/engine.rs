//! Workflow engine
//!
//! Drives a [`WorkflowState`] from a start stage to `Terminal`:
//! - executes the current stage and merges its [`StateUpdate`]
//! - picks the successor through the transition table
//! - validates every hop, halting on integrity violations
//! - bounds the loop with `max_steps`

use crate::capability::{CapabilityKind, CapabilityRegistry};
use crate::config::MendConfig;
use crate::docs::{DocProposer, DocstringProposer};
use crate::error::{ConfigError, IntegrityViolation, StageError, WorkflowError};
use crate::stage::{longest_run, validate_transition, Stage};
use crate::state::{StateUpdate, WorkflowState};
use mend_analysis::{AnalyzerSet, FastAnalyzer, ImpactAnalyzer, PreciseAnalyzer, ReferenceIndex, Strategy};
use mend_graph::GraphCache;
use mend_healing::{RetryBudget, Sandbox, SelfHealer, TextGenerator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;

/// Runs workflow requests; shareable across concurrent runs
pub struct WorkflowEngine {
    pub(crate) root: PathBuf,
    pub(crate) analyzers: AnalyzerSet,
    pub(crate) generator: Arc<dyn TextGenerator>,
    pub(crate) healer: SelfHealer,
    pub(crate) docs: Arc<dyn DocProposer>,
    pub(crate) max_steps: usize,
    pub(crate) default_mode: Strategy,
    pub(crate) graph_cache: Option<Arc<GraphCache>>,
}

impl WorkflowEngine {
    /// Start building an engine
    #[must_use]
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::default()
    }

    /// Engine wired from `registry` and `config`
    ///
    /// # Errors
    /// [`ConfigError::MissingCapability`] without a generator or sandbox, or
    /// any validation error from `config`.
    pub fn from_registry(
        registry: &CapabilityRegistry,
        config: MendConfig,
    ) -> Result<Self, ConfigError> {
        Self::builder()
            .with_registry(registry.clone())
            .with_config(config)
            .build()
    }

    /// Workspace root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Retry ceiling for healing
    #[must_use]
    pub fn retry_budget(&self) -> RetryBudget {
        self.healer.policy().max_retries
    }

    /// Bound on stage executions per run
    ///
    /// Never below [`longest_run`] for the retry budget, so the step limit
    /// cannot cut healing short.
    #[must_use]
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Shared graph cache, when caching is enabled
    #[must_use]
    pub fn graph_cache(&self) -> Option<&Arc<GraphCache>> {
        self.graph_cache.as_ref()
    }

    /// Fresh state using the configured mode
    #[must_use]
    pub fn new_state(&self, changed_file: impl Into<String>, request: impl Into<String>) -> WorkflowState {
        WorkflowState::new(changed_file, request).with_mode(self.default_mode)
    }

    /// Run from `Entry` to `Terminal`
    ///
    /// # Errors
    /// See [`WorkflowError`]; the error carries the state at the halt.
    pub async fn run(&self, state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        self.resume(Stage::Entry, state).await
    }

    /// Run starting at `start`
    ///
    /// # Errors
    /// See [`WorkflowError`].
    pub async fn resume(
        &self,
        start: Stage,
        mut state: WorkflowState,
    ) -> Result<WorkflowState, WorkflowError> {
        let span = tracing::info_span!("workflow", run_id = %state.run_id);
        async move {
            tracing::info!(
                "Workflow starting at {} for {} (mode {})",
                start,
                state.changed_file,
                state.mode
            );
            let budget = self.retry_budget();
            let mut stage = start;
            let mut steps = 0usize;

            loop {
                if stage.is_executable() {
                    if steps >= self.max_steps {
                        tracing::warn!("Step limit {} reached at {}", self.max_steps, stage);
                        return Err(WorkflowError::StepLimitExceeded {
                            limit: self.max_steps,
                            stage,
                            state: Box::new(state),
                        });
                    }
                    steps += 1;

                    let result = self
                        .execute_stage(stage, &state)
                        .instrument(tracing::info_span!("stage", stage = %stage))
                        .await;
                    match result {
                        Ok(update) => state.apply(update),
                        Err(StageError::Integrity(violation)) => {
                            return Err(integrity_failure(stage, violation, state));
                        }
                        Err(StageError::Collaborator(source)) => {
                            tracing::error!("{} failed: {}", stage, source);
                            state.error_log.push(format!("{stage} failed: {source}"));
                            return Err(WorkflowError::Collaborator {
                                stage,
                                source,
                                state: Box::new(state),
                            });
                        }
                    }
                }

                let Some(next) = stage.next(&state, budget) else {
                    tracing::info!("Workflow complete after {} stages", steps);
                    return Ok(state);
                };
                if let Err(violation) = validate_transition(stage, next) {
                    return Err(integrity_failure(stage, violation, state));
                }
                tracing::debug!("Transition {} -> {}", stage, next);
                stage = next;
            }
        }
        .instrument(span)
        .await
    }

    /// Execute one stage against `state` without merging
    ///
    /// # Errors
    /// [`StageError::Integrity`] for unmet prerequisites,
    /// [`StageError::Collaborator`] for generator failures.
    pub async fn execute_stage(
        &self,
        stage: Stage,
        state: &WorkflowState,
    ) -> Result<StateUpdate, StageError> {
        stage.check_prerequisites(state, self.retry_budget())?;
        tracing::info!("Entering {}", stage);
        let update = match stage {
            Stage::FastAnalysis => self.fast_analysis(state).await?,
            Stage::PreciseAnalysis => self.precise_analysis(state).await?,
            Stage::CodeGeneration => self.code_generation(state).await?,
            Stage::TestGeneration => self.test_generation(state).await?,
            Stage::ExecuteTests => self.execute_tests(state).await?,
            Stage::SelfHealing => self.self_healing(state).await?,
            Stage::DocSync => self.doc_sync(state).await?,
            Stage::Entry | Stage::Terminal => {
                return Err(IntegrityViolation::NotExecutable(stage).into());
            }
        };
        tracing::info!("Leaving {}", stage);
        Ok(update)
    }
}

fn integrity_failure(
    stage: Stage,
    violation: IntegrityViolation,
    mut state: WorkflowState,
) -> WorkflowError {
    tracing::error!("Workflow integrity violation in {}: {}", stage, violation);
    state
        .error_log
        .push(format!("Integrity violation in {stage}: {violation}"));

    #[cfg(feature = "strict-integrity")]
    panic!("Workflow integrity violation in {stage}: {violation}");

    WorkflowError::Integrity {
        stage,
        violation,
        state: Box::new(state),
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("root", &self.root)
            .field("analyzers", &self.analyzers)
            .field("policy", self.healer.policy())
            .field("max_steps", &self.max_steps)
            .field("default_mode", &self.default_mode)
            .field("graph_cache", &self.graph_cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`WorkflowEngine`]
#[derive(Default)]
pub struct WorkflowEngineBuilder {
    config: MendConfig,
    registry: CapabilityRegistry,
    fast: Option<Arc<dyn ImpactAnalyzer>>,
    precise: Option<Arc<dyn ImpactAnalyzer>>,
    graph_cache: Option<Arc<GraphCache>>,
}

impl WorkflowEngineBuilder {
    /// Use `config` for limits, mode and workspace
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: MendConfig) -> Self {
        self.config = config;
        self
    }

    /// Take every collaborator from `registry`
    #[inline]
    #[must_use]
    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register the generator
    #[inline]
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.registry.register_generator(generator);
        self
    }

    /// Register the sandbox
    #[inline]
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.registry.register_sandbox(sandbox);
        self
    }

    /// Register a documentation proposer
    #[inline]
    #[must_use]
    pub fn with_doc_proposer(mut self, proposer: Arc<dyn DocProposer>) -> Self {
        self.registry.register_doc_proposer(proposer);
        self
    }

    /// Register a reference index for PRECISE analysis
    #[inline]
    #[must_use]
    pub fn with_reference_index(mut self, index: Arc<dyn ReferenceIndex>) -> Self {
        self.registry.register_reference_index(index);
        self
    }

    /// Replace the FAST analyzer
    #[inline]
    #[must_use]
    pub fn with_fast_analyzer(mut self, analyzer: Arc<dyn ImpactAnalyzer>) -> Self {
        self.fast = Some(analyzer);
        self
    }

    /// Replace the PRECISE analyzer
    #[inline]
    #[must_use]
    pub fn with_precise_analyzer(mut self, analyzer: Arc<dyn ImpactAnalyzer>) -> Self {
        self.precise = Some(analyzer);
        self
    }

    /// Share an existing graph cache (implies caching)
    #[inline]
    #[must_use]
    pub fn with_graph_cache(mut self, cache: Arc<GraphCache>) -> Self {
        self.graph_cache = Some(cache);
        self
    }

    /// Assemble the engine
    ///
    /// # Errors
    /// [`ConfigError::MissingCapability`] without a generator or sandbox;
    /// validation errors from the config.
    pub fn build(self) -> Result<WorkflowEngine, ConfigError> {
        let Self {
            config,
            registry,
            fast,
            precise,
            graph_cache,
        } = self;
        config.validate()?;

        let required = [CapabilityKind::TextGenerator, CapabilityKind::Sandbox];
        if let Some(kind) = registry.missing(&required).into_iter().next() {
            return Err(ConfigError::MissingCapability(kind));
        }
        let (Some(generator), Some(sandbox)) = (registry.generator(), registry.sandbox()) else {
            return Err(ConfigError::MissingCapability(CapabilityKind::TextGenerator));
        };

        let policy = config.healing_policy();
        let max_steps = config.workflow.max_steps.max(longest_run(policy.max_retries));
        if max_steps > config.workflow.max_steps {
            tracing::debug!(
                "Raising step bound from {} to {} for {} retries",
                config.workflow.max_steps,
                max_steps,
                policy.max_retries.ceiling()
            );
        }

        let root = config.analysis.workspace_root.clone();
        let graph_cache = graph_cache.or_else(|| {
            config
                .analysis
                .cache_graphs
                .then(|| Arc::new(GraphCache::new()))
        });

        let fast = fast.unwrap_or_else(|| {
            let analyzer = FastAnalyzer::new(&root).with_options(config.graph_options());
            let analyzer = match &graph_cache {
                Some(cache) => analyzer.with_cache(Arc::clone(cache)),
                None => analyzer,
            };
            Arc::new(analyzer)
        });
        let precise = precise.unwrap_or_else(|| {
            let analyzer = PreciseAnalyzer::new(&root);
            let analyzer = match registry.reference_index() {
                Some(index) => analyzer.with_index(index),
                None => analyzer,
            };
            Arc::new(analyzer)
        });

        let docs = registry
            .doc_proposer()
            .unwrap_or_else(|| Arc::new(DocstringProposer::new(Arc::clone(&generator))));

        let engine = WorkflowEngine {
            root,
            analyzers: AnalyzerSet::new(fast, precise),
            healer: SelfHealer::new(Arc::clone(&generator), sandbox).with_policy(policy),
            generator,
            docs,
            max_steps,
            default_mode: config.workflow.mode,
            graph_cache,
        };
        tracing::debug!("Built {:?}", engine);
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_test_utils::{ScriptedGenerator, ScriptedSandbox, WorkspaceFixture};

    fn engine_for(fixture: &WorkspaceFixture, config: MendConfig) -> WorkflowEngine {
        WorkflowEngine::builder()
            .with_config(config.with_workspace_root(fixture.path()))
            .with_generator(Arc::new(ScriptedGenerator::revisions()))
            .with_sandbox(Arc::new(ScriptedSandbox::passing()))
            .build()
            .unwrap()
    }

    #[test]
    fn step_bound_covers_the_retry_budget() {
        let fixture = WorkspaceFixture::chain();
        assert_eq!(engine_for(&fixture, MendConfig::default()).max_steps(), 64);
        assert_eq!(
            engine_for(&fixture, MendConfig::default().with_max_steps(3)).max_steps(),
            12
        );
        assert_eq!(
            engine_for(&fixture, MendConfig::default().with_max_retries(40)).max_steps(),
            86
        );
    }

    #[tokio::test]
    async fn step_guard_halts_the_run() {
        let fixture = WorkspaceFixture::chain();
        let mut engine = engine_for(&fixture, MendConfig::default());
        engine.max_steps = 3;

        let err = engine
            .run(engine.new_state("a.py", "Anything"))
            .await
            .unwrap_err();

        let (limit, stage, state) = match err {
            WorkflowError::StepLimitExceeded { limit, stage, state } => (limit, stage, state),
            other => panic!("expected step limit, got {other:?}"),
        };
        assert_eq!(limit, 3);
        assert_eq!(stage, Stage::ExecuteTests);
        assert!(state.generated_tests.is_some());
        assert!(state.attempt_history.is_empty());
    }
}
