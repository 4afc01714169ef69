//! Subprocess sandbox
//!
//! Writes the code and tests into a fresh temporary directory and runs a test
//! command there with a cleared environment. Stronger isolation (network,
//! memory) belongs in the command itself, e.g. a container runtime wrapper.

use crate::error::SandboxError;
use crate::sandbox::{Sandbox, TestOutcome};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// File the generated code is written to
pub const CODE_FILE: &str = "generated_code.py";
/// File the generated tests are written to
pub const TEST_FILE: &str = "test_generated.py";

/// Default test command
#[must_use]
pub fn default_command() -> Vec<String> {
    ["python", "-m", "pytest", TEST_FILE, "-q", "--tb=short"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Runs tests as a child process in a throwaway directory
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    command: Vec<String>,
    keep_env: Vec<String>,
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new(default_command())
    }
}

impl ProcessSandbox {
    /// Sandbox running `command` (program then arguments)
    #[must_use]
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            keep_env: vec!["PATH".to_string()],
        }
    }

    /// Pass through an additional environment variable from the parent
    #[inline]
    #[must_use]
    pub fn with_env_passthrough(mut self, name: impl Into<String>) -> Self {
        self.keep_env.push(name.into());
        self
    }

    /// Configured command
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }
}

#[async_trait::async_trait]
impl Sandbox for ProcessSandbox {
    async fn run(
        &self,
        code: &str,
        tests: &str,
        timeout: Duration,
    ) -> Result<TestOutcome, SandboxError> {
        let (program, args) = self.command.split_first().ok_or(SandboxError::EmptyCommand)?;

        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join(CODE_FILE), code).await?;
        tokio::fs::write(dir.path().join(TEST_FILE), tests).await?;
        tracing::debug!("Sandbox directory: {}", dir.path().display());

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(dir.path())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for name in &self.keep_env {
            if let Some(value) = std::env::var_os(name) {
                cmd.env(name, value);
            }
        }

        let start = Instant::now();
        let child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            command: program.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!("Sandbox command exceeded {:?}; killed", timeout);
                return Ok(TestOutcome::timed_out(timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);
        let outcome = if output.status.success() {
            TestOutcome::passed(stdout)
        } else {
            let failure = if stderr.trim().is_empty() { stdout.clone() } else { stderr };
            TestOutcome::failed(failure, exit_code).with_stdout(stdout)
        };
        Ok(outcome.with_duration(start.elapsed()))
    }
}
