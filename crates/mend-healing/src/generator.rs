//! Text generation collaborator

use crate::error::GenerationError;

/// Produces text (code, tests, docstrings) from a prompt
///
/// Implementations must not retry internally; failures surface to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`
    ///
    /// # Errors
    /// Returns [`GenerationError`] when the backend fails.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
