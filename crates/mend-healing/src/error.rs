//! Error types for generation, sandboxing and healing
//!
//! Test failures are not errors: they are ordinary [`TestOutcome`](crate::TestOutcome)
//! values. Only collaborator breakdowns show up here.

use std::time::Duration;

/// Text generation backend failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Backend is not configured or not reachable
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    /// Backend returned an error
    #[error("generation failed: {0}")]
    Backend(String),

    /// Backend returned nothing usable
    #[error("generator returned an empty response")]
    EmptyResponse,
}

impl GenerationError {
    /// Whether the same prompt might succeed later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Sandbox infrastructure failures
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Configured command is empty
    #[error("sandbox command is empty")]
    EmptyCommand,

    /// Command could not be started
    #[error("failed to spawn sandbox command {command}: {source}")]
    Spawn {
        /// Program name
        command: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Run exceeded its time limit
    #[error("sandbox execution timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// IO error preparing the sandbox
    #[error("sandbox io error: {0}")]
    Io(#[from] std::io::Error),

    /// Sandbox is not available at all
    #[error("sandbox unavailable: {0}")]
    Unavailable(String),
}

/// Errors that abort a healing session
#[derive(Debug, thiserror::Error)]
pub enum HealingError {
    /// Generator failed while producing a fix
    #[error("fix generation failed on attempt {attempt}: {source}")]
    Generation {
        /// Retry number being attempted
        attempt: u32,
        /// Underlying error
        #[source]
        source: GenerationError,
    },
}

impl HealingError {
    /// Underlying generator error
    #[must_use]
    pub fn generation_error(&self) -> &GenerationError {
        match self {
            Self::Generation { source, .. } => source,
        }
    }
}
