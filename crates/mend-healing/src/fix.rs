//! Fix requests sent to the generator

use crate::classify::{join_labels, FailureCategory};
use std::fmt::Write as _;

/// Everything the generator gets when asked to repair code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixRequest {
    /// The user's original request
    pub original_request: String,
    /// Code that failed
    pub code: String,
    /// Tests it failed against (never modified)
    pub tests: String,
    /// Raw failure output
    pub failure_text: String,
    /// Advisory failure categories
    pub categories: Vec<FailureCategory>,
    /// Retry number (1-based)
    pub attempt: u32,
    /// Retry ceiling
    pub max_retries: u32,
}

impl FixRequest {
    /// Render as a generator prompt
    #[must_use]
    pub fn render(&self) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "Fix the following Python code so that the tests pass.");
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Original request: {}", self.original_request);
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Current code:\n```python\n{}\n```", self.code);
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Tests (do not change them):\n```python\n{}\n```", self.tests);
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Failure categories: {}", join_labels(&self.categories));
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Failure output:\n```\n{}\n```", self.failure_text.trim_end());
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Attempt: {}/{}", self.attempt, self.max_retries);
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Fix the root cause, keep working parts unchanged, and");
        let _ = writeln!(prompt, "return only the complete fixed code in a ```python block.");
        prompt
    }
}
