//! Bounded self-healing loop
//!
//! Attempt 0 runs the original code and does not count against the budget.
//! Each retry classifies the failure, asks the generator for a fix, and
//! re-runs the *same* tests. The log is an owned value threaded through the
//! loop; it is only ever appended to.

use crate::classify::{categorize, join_labels};
use crate::error::{GenerationError, HealingError};
use crate::extract::extract_code;
use crate::fix::FixRequest;
use crate::generator::TextGenerator;
use crate::sandbox::{execute_tests, Sandbox, TestOutcome, DEFAULT_SANDBOX_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Hard ceiling on healing retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryBudget(u32);

impl RetryBudget {
    /// Default ceiling
    pub const DEFAULT: Self = Self(3);

    /// Budget from a possibly invalid requested value; negatives become 0
    #[must_use]
    pub fn from_requested(requested: i64) -> Self {
        Self(u32::try_from(requested.max(0)).unwrap_or(u32::MAX))
    }

    /// Maximum number of retries
    #[inline]
    #[must_use]
    pub fn ceiling(&self) -> u32 {
        self.0
    }

    /// Whether another retry is allowed after `retry_count` retries
    #[inline]
    #[must_use]
    pub fn allows(&self, retry_count: u32) -> bool {
        retry_count < self.0
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Healing limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingPolicy {
    /// Retry ceiling
    pub max_retries: RetryBudget,
    /// Per-run sandbox time limit
    pub sandbox_timeout: Duration,
}

impl Default for HealingPolicy {
    fn default() -> Self {
        Self {
            max_retries: RetryBudget::DEFAULT,
            sandbox_timeout: DEFAULT_SANDBOX_TIMEOUT,
        }
    }
}

impl HealingPolicy {
    /// Set retry ceiling (negatives clamp to 0)
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, requested: i64) -> Self {
        self.max_retries = RetryBudget::from_requested(requested);
        self
    }

    /// Set sandbox time limit
    #[inline]
    #[must_use]
    pub fn with_sandbox_timeout(mut self, timeout: Duration) -> Self {
        self.sandbox_timeout = timeout;
        self
    }
}

/// One code version and how it fared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 0 for the original code, then the retry number
    pub attempt_index: u32,
    /// Code that was tested
    pub code: String,
    /// Failure summary that prompted this version
    pub failure_reason: Option<String>,
    /// Sandbox result
    pub test_result: Option<TestOutcome>,
}

impl AttemptRecord {
    /// Record for a tested code version
    #[must_use]
    pub fn new(attempt_index: u32, code: impl Into<String>, test_result: TestOutcome) -> Self {
        Self {
            attempt_index,
            code: code.into(),
            failure_reason: None,
            test_result: Some(test_result),
        }
    }

    /// Attach the failure summary that led to this attempt
    #[inline]
    #[must_use]
    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    /// Whether the attempt's tests passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.test_result.as_ref().is_some_and(|t| t.success)
    }
}

/// Append-only record of a healing session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealingLog {
    attempts: Vec<AttemptRecord>,
    errors: Vec<String>,
}

impl HealingLog {
    /// Empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attempt
    #[must_use]
    pub fn record(mut self, attempt: AttemptRecord) -> Self {
        self.attempts.push(attempt);
        self
    }

    /// Append an error summary line
    #[must_use]
    pub fn note(mut self, line: impl Into<String>) -> Self {
        self.errors.push(line.into());
        self
    }

    /// Attempts so far
    #[must_use]
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Error lines so far
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Consume into `(attempts, errors)`
    #[must_use]
    pub fn into_parts(self) -> (Vec<AttemptRecord>, Vec<String>) {
        (self.attempts, self.errors)
    }
}

/// Outcome of [`SelfHealer::heal`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingResult {
    /// Whether the final code passed
    pub success: bool,
    /// Last code tested (never reverted to attempt 0 after retries)
    pub final_code: String,
    /// Tests used throughout
    pub final_tests: String,
    /// Retries performed
    pub retry_count: u32,
    /// Every attempt including attempt 0
    pub attempt_history: Vec<AttemptRecord>,
    /// `"Attempt n: categories"` lines
    pub error_log: Vec<String>,
}

/// `"Attempt n: syntax, type"`
#[must_use]
pub fn attempt_summary(attempt: u32, outcome: &TestOutcome) -> String {
    format!("Attempt {attempt}: {}", join_labels(&categorize(outcome.failure_text())))
}

/// Drives generate, test, repair
#[derive(Clone)]
pub struct SelfHealer {
    generator: Arc<dyn TextGenerator>,
    sandbox: Arc<dyn Sandbox>,
    policy: HealingPolicy,
}

impl SelfHealer {
    /// Healer with the default policy
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            generator,
            sandbox,
            policy: HealingPolicy::default(),
        }
    }

    /// Replace policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: HealingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Active policy
    #[must_use]
    pub fn policy(&self) -> &HealingPolicy {
        &self.policy
    }

    /// Run tests under the policy's time limit
    pub async fn run_tests(&self, code: &str, tests: &str) -> TestOutcome {
        execute_tests(self.sandbox.as_ref(), code, tests, self.policy.sandbox_timeout).await
    }

    /// Ask the generator for a fix and extract the code from its answer
    ///
    /// # Errors
    /// Propagates generator failures; an empty answer is
    /// [`GenerationError::EmptyResponse`].
    pub async fn request_fix(&self, request: &FixRequest) -> Result<String, GenerationError> {
        let response = self.generator.generate(&request.render()).await?;
        let code = extract_code(&response);
        if code.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(code)
    }

    /// Heal `code` against `tests`
    ///
    /// # Errors
    /// Returns [`HealingError::Generation`] if the generator fails mid-loop.
    /// Test failures are never errors.
    pub async fn heal(
        &self,
        code: &str,
        tests: &str,
        original_request: &str,
    ) -> Result<HealingResult, HealingError> {
        let budget = self.policy.max_retries;
        tracing::info!("Starting self-healing (max {} retries)", budget.ceiling());

        let mut current = code.to_string();
        let mut outcome = self.run_tests(&current, tests).await;
        let mut log = HealingLog::new().record(AttemptRecord::new(0, current.clone(), outcome.clone()));
        let mut retry_count = 0;

        while !outcome.success && budget.allows(retry_count) {
            retry_count += 1;
            let categories = categorize(outcome.failure_text());
            let summary = format!("Attempt {retry_count}: {}", join_labels(&categories));
            tracing::info!("Retry {}/{}: {}", retry_count, budget.ceiling(), summary);
            log = log.note(summary.clone());

            let request = FixRequest {
                original_request: original_request.to_string(),
                code: current.clone(),
                tests: tests.to_string(),
                failure_text: outcome.failure_text().to_string(),
                categories,
                attempt: retry_count,
                max_retries: budget.ceiling(),
            };
            current = self
                .request_fix(&request)
                .await
                .map_err(|source| HealingError::Generation {
                    attempt: retry_count,
                    source,
                })?;

            outcome = self.run_tests(&current, tests).await;
            log = log.record(
                AttemptRecord::new(retry_count, current.clone(), outcome.clone())
                    .with_failure_reason(summary),
            );
        }

        if outcome.success {
            tracing::info!("Healing converged after {} retries", retry_count);
        } else {
            tracing::warn!("Healing did not converge after {} retries", retry_count);
        }

        let (attempt_history, error_log) = log.into_parts();
        Ok(HealingResult {
            success: outcome.success,
            final_code: current,
            final_tests: tests.to_string(),
            retry_count,
            attempt_history,
            error_log,
        })
    }
}

impl std::fmt::Debug for SelfHealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfHealer").field("policy", &self.policy).finish_non_exhaustive()
    }
}
