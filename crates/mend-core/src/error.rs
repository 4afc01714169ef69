//! Error types for the workflow engine and its surrounding services

use crate::capability::CapabilityKind;
use crate::stage::Stage;
use crate::state::WorkflowState;
use mend_healing::{GenerationError, HealingError};
use std::path::PathBuf;
use thiserror::Error;

/// A stage was entered without its prerequisites, or an illegal hop was attempted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    /// No changed file was given
    #[error("changed_file is empty")]
    MissingChangedFile,

    /// Nothing to generate code for
    #[error("impacted_files is empty")]
    NoImpactedFiles,

    /// No user message describing the change
    #[error("no user request message")]
    MissingUserRequest,

    /// Code generation has not run
    #[error("generated_code is missing")]
    MissingGeneratedCode,

    /// Test generation has not run
    #[error("generated_tests is missing")]
    MissingGeneratedTests,

    /// Tests have not been executed
    #[error("no test result to heal")]
    MissingTestResult,

    /// Healing requested for passing code
    #[error("last test run already passed")]
    TestsAlreadyPassed,

    /// Healing requested past the budget
    #[error("retry ceiling reached ({retry_count}/{ceiling})")]
    RetryCeilingReached {
        /// Retries already spent
        retry_count: u32,
        /// Budget
        ceiling: u32,
    },

    /// Hop not in the transition table
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Current stage
        from: Stage,
        /// Rejected successor
        to: Stage,
    },

    /// `Entry` and `Terminal` have no work
    #[error("{0} is not an executable stage")]
    NotExecutable(Stage),
}

/// Failure of a single stage
#[derive(Debug, Error)]
pub enum StageError {
    /// Prerequisite missing
    #[error("workflow integrity violation: {0}")]
    Integrity(#[from] IntegrityViolation),

    /// Generator failed
    #[error("collaborator failed: {0}")]
    Collaborator(#[from] GenerationError),
}

impl StageError {
    /// Whether this is a workflow-integrity problem
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

/// A run that halted before reaching `Terminal`
///
/// Every variant carries the state as it was when the run halted.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Engine defect; the run cannot continue
    #[error("integrity violation in {stage}: {violation}")]
    Integrity {
        /// Stage being entered or left
        stage: Stage,
        /// What was wrong
        violation: IntegrityViolation,
        /// State at the halt
        state: Box<WorkflowState>,
    },

    /// Generator failed mid-run
    #[error("collaborator failed in {stage}: {source}")]
    Collaborator {
        /// Stage that called the generator
        stage: Stage,
        /// Generator failure
        #[source]
        source: GenerationError,
        /// State at the halt
        state: Box<WorkflowState>,
    },

    /// Loop bound hit
    #[error("step limit of {limit} exceeded at {stage}")]
    StepLimitExceeded {
        /// Effective step bound
        limit: usize,
        /// Stage that would have run next
        stage: Stage,
        /// State at the halt
        state: Box<WorkflowState>,
    },
}

impl WorkflowError {
    /// Stage the run halted in
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Integrity { stage, .. }
            | Self::Collaborator { stage, .. }
            | Self::StepLimitExceeded { stage, .. } => *stage,
        }
    }

    /// State at the point of failure
    #[must_use]
    pub fn state(&self) -> &WorkflowState {
        match self {
            Self::Integrity { state, .. }
            | Self::Collaborator { state, .. }
            | Self::StepLimitExceeded { state, .. } => state,
        }
    }

    /// Take the state out of the error
    #[must_use]
    pub fn into_state(self) -> WorkflowState {
        match self {
            Self::Integrity { state, .. }
            | Self::Collaborator { state, .. }
            | Self::StepLimitExceeded { state, .. } => *state,
        }
    }

    /// Whether the failure is an engine defect rather than a collaborator problem
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }

    /// Whether resuming the run could succeed
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Integrity { .. } | Self::StepLimitExceeded { .. } => false,
            Self::Collaborator { source, .. } => source.is_retryable(),
        }
    }
}

/// Invalid or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range or unparseable
    #[error("invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        /// Dotted key or variable name
        key: String,
        /// Offending value
        value: String,
        /// Expected range or format
        reason: String,
    },

    /// Registry lacks a required collaborator
    #[error("required capability not registered: {0}")]
    MissingCapability(CapabilityKind),
}

impl ConfigError {
    pub(crate) fn invalid(
        key: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Documentation proposal failure
#[derive(Debug, Error)]
pub enum DocError {
    /// Generator failed
    #[error("documentation generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Parser setup failed
    #[error("failed to load grammar: {0}")]
    Grammar(String),

    /// Parser produced no tree
    #[error("failed to parse source")]
    Parse,
}

/// Filesystem operation failure
#[derive(Debug, Error)]
pub enum FsError {
    /// Path resolves outside the root
    #[error("path escapes the workspace: {}", .0.display())]
    OutsideWorkspace(PathBuf),

    /// Missing path
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Expected a directory
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Expected a file
    #[error("not a file: {}", .0.display())]
    NotAFile(PathBuf),

    /// File exceeds the read limit
    #[error("{} is {size} bytes, limit is {limit}", path.display())]
    TooLarge {
        /// File involved
        path: PathBuf,
        /// Actual size
        size: u64,
        /// Read limit
        limit: u64,
    },

    /// Bad glob or regex
    #[error("invalid pattern {pattern}: {reason}")]
    InvalidPattern {
        /// Pattern as given
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// Edit target text absent
    #[error("search text not found in {}", .0.display())]
    SearchNotFound(PathBuf),

    /// Edit occurrence out of range
    #[error("occurrence {occurrence} requested but only {found} found")]
    OccurrenceNotFound {
        /// Requested, 1-based
        occurrence: usize,
        /// Occurrences present
        found: usize,
    },

    /// Other I/O failure
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}

/// Task dispatch failure
#[derive(Debug, Error)]
pub enum TaskError {
    /// Filesystem operation failed
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Healing loop failed
    #[error(transparent)]
    Healing(#[from] HealingError),

    /// Generator failed
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Documentation proposer failed
    #[error(transparent)]
    Docs(#[from] DocError),

    /// Analyzer reported an error
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// Task lacks data it needs
    #[error("task {id} has no input: {reason}")]
    MissingInput {
        /// Task id
        id: u32,
        /// What is missing
        reason: String,
    },

    /// Blocking worker panicked or was cancelled
    #[error("background task failed: {0}")]
    Join(String),
}

impl TaskError {
    /// Whether the same task might succeed on another attempt
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Generation(e) => e.is_retryable(),
            Self::Healing(e) => e.generation_error().is_retryable(),
            Self::Docs(DocError::Generation(e)) => e.is_retryable(),
            Self::Fs(FsError::Io { .. }) | Self::Analysis(_) | Self::Join(_) => true,
            _ => false,
        }
    }
}

/// Tracing setup failure
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_io_maps_to_not_found() {
        let err = FsError::io("a.py", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[test]
    fn stage_error_predicates() {
        assert!(StageError::from(IntegrityViolation::NoImpactedFiles).is_integrity());
        assert!(!StageError::from(GenerationError::EmptyResponse).is_integrity());
    }

    #[test]
    fn violation_messages_name_stages() {
        let v = IntegrityViolation::IllegalTransition {
            from: Stage::FastAnalysis,
            to: Stage::DocSync,
        };
        assert_eq!(v.to_string(), "illegal transition FastAnalysis -> DocSync");
    }
}
