//! Stages, the transition table and routing
//!
//! Routing functions are pure: they read the state and return the next
//! stage. [`allowed_transitions`] is the authority the engine checks every
//! hop against.

use crate::error::IntegrityViolation;
use crate::state::WorkflowState;
use mend_analysis::Strategy;
use mend_healing::RetryBudget;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Virtual start; routes by mode
    Entry,
    /// Import-graph impact analysis
    FastAnalysis,
    /// Reference-index impact analysis
    PreciseAnalysis,
    /// Generate code for the impacted files
    CodeGeneration,
    /// Generate tests for the code
    TestGeneration,
    /// Run the tests in the sandbox
    ExecuteTests,
    /// Ask for a fix after a failed run
    SelfHealing,
    /// Propose documentation updates
    DocSync,
    /// Run complete
    Terminal,
}

impl Stage {
    /// Every stage
    pub const ALL: [Stage; 9] = [
        Stage::Entry,
        Stage::FastAnalysis,
        Stage::PreciseAnalysis,
        Stage::CodeGeneration,
        Stage::TestGeneration,
        Stage::ExecuteTests,
        Stage::SelfHealing,
        Stage::DocSync,
        Stage::Terminal,
    ];

    /// How this stage picks its successor
    #[must_use]
    pub fn transition(&self) -> Transition {
        use Stage::*;
        match self {
            Entry => Transition::Route(Router::ByMode),
            PreciseAnalysis => Transition::Route(Router::CheckFallback),
            ExecuteTests => Transition::Route(Router::CheckTestResult),
            FastAnalysis => Transition::Direct(CodeGeneration),
            CodeGeneration => Transition::Direct(TestGeneration),
            TestGeneration => Transition::Direct(ExecuteTests),
            SelfHealing => Transition::Direct(ExecuteTests),
            DocSync => Transition::Direct(Terminal),
            Terminal => Transition::End,
        }
    }

    /// Successor given the current state
    #[must_use]
    pub fn next(&self, state: &WorkflowState, budget: RetryBudget) -> Option<Stage> {
        match self.transition() {
            Transition::Direct(stage) => Some(stage),
            Transition::Route(router) => Some(router.route(state, budget)),
            Transition::End => None,
        }
    }

    /// Whether the stage does work when executed
    #[must_use]
    pub fn is_executable(&self) -> bool {
        !matches!(self, Stage::Entry | Stage::Terminal)
    }

    /// Check the stage's input prerequisites
    ///
    /// # Errors
    /// Returns the first unmet prerequisite.
    pub fn check_prerequisites(
        &self,
        state: &WorkflowState,
        budget: RetryBudget,
    ) -> Result<(), IntegrityViolation> {
        match self {
            Stage::Entry | Stage::Terminal => Err(IntegrityViolation::NotExecutable(*self)),
            Stage::FastAnalysis | Stage::PreciseAnalysis => {
                if state.changed_file.trim().is_empty() {
                    Err(IntegrityViolation::MissingChangedFile)
                } else {
                    Ok(())
                }
            }
            Stage::CodeGeneration => {
                if state.impacted_files.is_empty() {
                    Err(IntegrityViolation::NoImpactedFiles)
                } else if state.user_request().is_none() {
                    Err(IntegrityViolation::MissingUserRequest)
                } else {
                    Ok(())
                }
            }
            Stage::TestGeneration | Stage::DocSync => require_code(state),
            Stage::ExecuteTests => {
                require_code(state)?;
                if state.generated_tests.is_none() {
                    return Err(IntegrityViolation::MissingGeneratedTests);
                }
                Ok(())
            }
            Stage::SelfHealing => {
                let outcome = state
                    .last_test_result
                    .as_ref()
                    .ok_or(IntegrityViolation::MissingTestResult)?;
                if outcome.success {
                    return Err(IntegrityViolation::TestsAlreadyPassed);
                }
                if !budget.allows(state.retry_count) {
                    return Err(IntegrityViolation::RetryCeilingReached {
                        retry_count: state.retry_count,
                        ceiling: budget.ceiling(),
                    });
                }
                require_code(state)?;
                if state.generated_tests.is_none() {
                    return Err(IntegrityViolation::MissingGeneratedTests);
                }
                Ok(())
            }
        }
    }
}

fn require_code(state: &WorkflowState) -> Result<(), IntegrityViolation> {
    if state.generated_code.is_none() {
        Err(IntegrityViolation::MissingGeneratedCode)
    } else {
        Ok(())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Outgoing edge kind of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Unconditional successor
    Direct(Stage),
    /// Successor chosen by a routing function
    Route(Router),
    /// No successor
    End,
}

/// Conditional routing functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Router {
    /// [`route_by_mode`]
    ByMode,
    /// [`check_fallback`]
    CheckFallback,
    /// [`check_test_result`]
    CheckTestResult,
}

impl Router {
    /// Apply the routing function
    #[must_use]
    pub fn route(&self, state: &WorkflowState, budget: RetryBudget) -> Stage {
        match self {
            Router::ByMode => route_by_mode(state),
            Router::CheckFallback => check_fallback(state),
            Router::CheckTestResult => check_test_result(state, budget),
        }
    }
}

/// PRECISE mode goes to `PreciseAnalysis`, anything else to `FastAnalysis`
#[must_use]
pub fn route_by_mode(state: &WorkflowState) -> Stage {
    match state.mode {
        Strategy::Precise => Stage::PreciseAnalysis,
        Strategy::Fast => Stage::FastAnalysis,
    }
}

/// Fallback to FAST on a failed PRECISE analysis
#[must_use]
pub fn check_fallback(state: &WorkflowState) -> Stage {
    let failed = state.analysis.as_ref().is_some_and(|a| a.should_fallback());
    if failed {
        tracing::debug!("Routing to FastAnalysis after PRECISE failure");
        Stage::FastAnalysis
    } else if state.impacted_files.is_empty() {
        tracing::debug!("No impacted files; ending run");
        Stage::Terminal
    } else {
        Stage::CodeGeneration
    }
}

/// Passing tests or an exhausted budget go to `DocSync`, otherwise heal
#[must_use]
pub fn check_test_result(state: &WorkflowState, budget: RetryBudget) -> Stage {
    if state.tests_passed() {
        Stage::DocSync
    } else if !budget.allows(state.retry_count) {
        tracing::debug!(
            "Retry ceiling {} reached; moving on to DocSync",
            budget.ceiling()
        );
        Stage::DocSync
    } else {
        Stage::SelfHealing
    }
}

/// Every legal successor of `from`
#[must_use]
pub fn allowed_transitions(from: Stage) -> Vec<Stage> {
    use Stage::*;
    match from {
        Entry => vec![FastAnalysis, PreciseAnalysis],
        PreciseAnalysis => vec![FastAnalysis, CodeGeneration, Terminal],
        FastAnalysis => vec![CodeGeneration],
        CodeGeneration => vec![TestGeneration],
        TestGeneration => vec![ExecuteTests],
        ExecuteTests => vec![SelfHealing, DocSync],
        SelfHealing => vec![ExecuteTests],
        DocSync => vec![Terminal],
        Terminal => vec![],
    }
}

/// Stage executions on the longest path from `Entry` to `Terminal`
///
/// A failed PRECISE analysis and its FAST replacement, code and test
/// generation, the first test run, one heal and re-test pair per retry, then
/// `DocSync`.
#[must_use]
pub fn longest_run(budget: RetryBudget) -> usize {
    let retries = usize::try_from(budget.ceiling()).unwrap_or(usize::MAX);
    retries.saturating_mul(2).saturating_add(6)
}

/// Check a hop against the transition table
///
/// With the `strict-integrity` feature an illegal hop panics.
///
/// # Errors
/// [`IntegrityViolation::IllegalTransition`] for a hop not in the table.
pub fn validate_transition(from: Stage, to: Stage) -> Result<(), IntegrityViolation> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-integrity")]
        panic!("Illegal stage transition attempted: {from:?} -> {to:?}");

        Err(IntegrityViolation::IllegalTransition { from, to })
    }
}
