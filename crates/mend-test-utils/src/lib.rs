//! Testing utilities for the mend workspace
//!
//! Scripted collaborators and temporary workspace fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use mend_analysis::{ReferenceError, ReferenceIndex};
use mend_healing::{GenerationError, Sandbox, SandboxError, TestOutcome, TextGenerator};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Wrap `code` in a python fence, as a generator would
pub fn fenced(code: &str) -> String {
    format!("```python\n{code}\n```")
}

#[derive(Debug, Clone)]
enum GeneratorFallback {
    /// `revision = n` for the n-th call
    Revisions,
    Text(String),
    Error(GenerationError),
}

/// Text generator that replays a script, then falls back
#[derive(Debug)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: GeneratorFallback,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn with_fallback(fallback: GeneratorFallback) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers call n with a fenced `revision = n`
    pub fn revisions() -> Self {
        Self::with_fallback(GeneratorFallback::Revisions)
    }

    /// Always answers `text`
    pub fn always(text: impl Into<String>) -> Self {
        Self::with_fallback(GeneratorFallback::Text(text.into()))
    }

    /// Always fails with `error`
    pub fn failing(error: GenerationError) -> Self {
        Self::with_fallback(GeneratorFallback::Error(error))
    }

    /// Responses returned, in order, before the fallback applies
    #[must_use]
    pub fn with_script<I>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = Result<String, GenerationError>>,
    {
        self.script.lock().extend(responses);
        self
    }

    /// Number of `generate` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().push(prompt.to_string());
        if let Some(next) = self.script.lock().pop_front() {
            return next;
        }
        match &self.fallback {
            GeneratorFallback::Revisions => Ok(fenced(&format!("revision = {n}"))),
            GeneratorFallback::Text(text) => Ok(text.clone()),
            GeneratorFallback::Error(e) => Err(e.clone()),
        }
    }
}

/// Sandbox that passes from a given run onwards
#[derive(Debug)]
pub struct ScriptedSandbox {
    /// 1-based run that first passes; `None` never passes
    pass_from: Option<usize>,
    failure: String,
    delay: Option<Duration>,
    runs: Mutex<Vec<(String, String)>>,
}

impl ScriptedSandbox {
    /// Every run passes
    pub fn passing() -> Self {
        Self::pass_on(1)
    }

    /// Every run fails with `stderr`
    pub fn failing(stderr: impl Into<String>) -> Self {
        Self {
            pass_from: None,
            failure: stderr.into(),
            delay: None,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Runs before `run` fail with an assertion error
    pub fn pass_on(run: usize) -> Self {
        Self {
            pass_from: Some(run),
            ..Self::failing("FAILED test_generated.py::test_it\nAssertionError: assert 1 == 2")
        }
    }

    /// Sleep before answering
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(code, tests)` of every run
    pub fn runs(&self) -> Vec<(String, String)> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn run(
        &self,
        code: &str,
        tests: &str,
        _timeout: Duration,
    ) -> Result<TestOutcome, SandboxError> {
        let run = {
            let mut runs = self.runs.lock();
            runs.push((code.to_string(), tests.to_string()));
            runs.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.pass_from {
            Some(first) if run >= first => Ok(TestOutcome::passed("1 passed")),
            _ => Ok(TestOutcome::failed(self.failure.clone(), 1)),
        }
    }
}

/// Reference index that always fails
#[derive(Debug, Clone)]
pub struct FailingReferenceIndex {
    error: ReferenceError,
    calls: std::sync::Arc<AtomicUsize>,
}

impl FailingReferenceIndex {
    pub fn new(error: ReferenceError) -> Self {
        Self {
            error,
            calls: std::sync::Arc::default(),
        }
    }

    /// Index reporting itself unavailable
    pub fn unavailable() -> Self {
        Self::new(ReferenceError::Unavailable("language server not running".into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReferenceIndex for FailingReferenceIndex {
    async fn references(
        &self,
        _file: &str,
        _symbol: Option<&str>,
    ) -> Result<Vec<String>, ReferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Reference index with fixed answers
#[derive(Debug, Clone, Default)]
pub struct StaticReferenceIndex {
    references: Vec<String>,
}

impl StaticReferenceIndex {
    pub fn new<I, S>(references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            references: references.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ReferenceIndex for StaticReferenceIndex {
    async fn references(
        &self,
        _file: &str,
        _symbol: Option<&str>,
    ) -> Result<Vec<String>, ReferenceError> {
        Ok(self.references.clone())
    }
}

/// Temporary workspace directory populated with source files
#[derive(Debug)]
pub struct WorkspaceFixture {
    dir: TempDir,
}

impl WorkspaceFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// `a.py`; `b.py` imports `a`; `c.py` imports `b`
    pub fn chain() -> Self {
        Self::new()
            .with_file("a.py", "def helper():\n    return 1\n")
            .with_file("b.py", "import a\n\ndef middle():\n    return a.helper()\n")
            .with_file("c.py", "from b import middle\n\nprint(middle())\n")
    }

    /// Add a file, creating parent directories
    #[must_use]
    pub fn with_file(self, rel: &str, content: &str) -> Self {
        self.write(rel, content);
        self
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(rel)).unwrap()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for WorkspaceFixture {
    fn default() -> Self {
        Self::new()
    }
}
