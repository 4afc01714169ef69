//! Sandbox collaborator and timeout-guarded test execution

use crate::error::SandboxError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default sandbox time limit
pub const DEFAULT_SANDBOX_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of running tests against code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Whether the tests passed
    pub success: bool,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Process exit code (-1 when there was no process result)
    pub exit_code: i32,
    /// Whether the run was cut off by the time limit
    pub timed_out: bool,
    /// Wall time
    pub duration: Duration,
}

impl TestOutcome {
    /// Passing run
    #[must_use]
    pub fn passed(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            timed_out: false,
            duration: Duration::ZERO,
        }
    }

    /// Failing run
    #[must_use]
    pub fn failed(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            timed_out: false,
            duration: Duration::ZERO,
        }
    }

    /// Run cut off after `limit`
    #[must_use]
    pub fn timed_out(limit: Duration) -> Self {
        Self {
            timed_out: true,
            duration: limit,
            ..Self::failed(
                format!("Sandbox execution timeout after {} seconds", limit.as_secs()),
                -1,
            )
        }
    }

    /// Set captured stdout
    #[inline]
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Set wall time
    #[inline]
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Text describing the failure: stderr, or stdout when stderr is empty
    #[must_use]
    pub fn failure_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Runs tests against code in isolation
#[async_trait::async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `tests` against `code`, giving up after `timeout`
    ///
    /// # Errors
    /// Returns [`SandboxError`] when the sandbox itself breaks down. Failing
    /// tests are a normal `Ok` outcome.
    async fn run(&self, code: &str, tests: &str, timeout: Duration)
        -> Result<TestOutcome, SandboxError>;
}

/// Run the sandbox under a hard timeout; never fails
///
/// Sandbox errors and timeouts become failed outcomes with exit code -1.
pub async fn execute_tests(
    sandbox: &dyn Sandbox,
    code: &str,
    tests: &str,
    timeout: Duration,
) -> TestOutcome {
    let start = Instant::now();
    match tokio::time::timeout(timeout, sandbox.run(code, tests, timeout)).await {
        Ok(Ok(outcome)) => {
            tracing::debug!(
                "Sandbox finished: success={} exit={}",
                outcome.success,
                outcome.exit_code
            );
            outcome
        }
        Ok(Err(SandboxError::Timeout(limit))) => {
            tracing::warn!("Sandbox reported timeout after {:?}", limit);
            TestOutcome::timed_out(limit)
        }
        Ok(Err(e)) => {
            tracing::warn!("Sandbox error treated as test failure: {}", e);
            TestOutcome::failed(e.to_string(), -1).with_duration(start.elapsed())
        }
        Err(_) => {
            tracing::warn!("Sandbox timed out after {:?}", timeout);
            TestOutcome::timed_out(timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy;

    #[async_trait::async_trait]
    impl Sandbox for Sleepy {
        async fn run(
            &self,
            _code: &str,
            _tests: &str,
            _timeout: Duration,
        ) -> Result<TestOutcome, SandboxError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(TestOutcome::passed("late"))
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl Sandbox for Broken {
        async fn run(
            &self,
            _code: &str,
            _tests: &str,
            _timeout: Duration,
        ) -> Result<TestOutcome, SandboxError> {
            Err(SandboxError::Unavailable("no runtime".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_failed_outcome() {
        let outcome = execute_tests(&Sleepy, "", "", Duration::from_secs(2)).await;
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.stderr.contains("2 seconds"));
    }

    #[tokio::test]
    async fn sandbox_error_becomes_failed_outcome() {
        let outcome = execute_tests(&Broken, "", "", Duration::from_secs(2)).await;
        assert!(!outcome.success);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.failure_text().contains("no runtime"));
    }

    #[test]
    fn failure_text_prefers_stderr() {
        let outcome = TestOutcome::failed("", 1).with_stdout("FAILED test_x");
        assert_eq!(outcome.failure_text(), "FAILED test_x");
        assert_eq!(TestOutcome::failed("boom", 1).failure_text(), "boom");
    }
}
