//! Workflow state threaded through every stage
//!
//! - [`WorkflowState`] is the single mutable record of a run
//! - Stages return a partial [`StateUpdate`]; [`WorkflowState::apply`] merges it
//!   (optional fields overwrite, sequences append)

use crate::docs::DocSyncReport;
use chrono::{DateTime, Utc};
use mend_analysis::{ImpactResult, Strategy};
use mend_healing::{AttemptRecord, TestOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Fresh identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The requester
    User,
    /// Generated output
    Assistant,
    /// Engine notes
    System,
}

/// Conversation message carried by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Text
    pub content: String,
    /// When the message was added
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Message from `role` stamped now
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// User message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Final word on the healing loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingOutcome {
    /// Whether the last tested code passed
    pub converged: bool,
    /// Retries spent
    pub retry_count: u32,
    /// Last code tested
    pub final_code: String,
}

/// State of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Identifier used in log spans
    pub run_id: RunId,
    /// Conversation so far, oldest first
    pub pending_messages: Vec<Message>,
    /// Requested analysis strategy; never changed by fallback
    pub mode: Strategy,
    /// File the change starts from, relative to the workspace root
    pub changed_file: String,
    /// Symbol narrowing PRECISE analysis
    pub changed_symbol: Option<String>,
    /// Changed file first, then every file that may be affected
    pub impacted_files: Vec<String>,
    /// Most recent analysis result
    pub analysis: Option<ImpactResult>,
    /// Whether FAST replaced a failed PRECISE analysis
    pub fell_back: bool,
    /// Healing retries spent
    pub retry_count: u32,
    /// Append-only
    pub error_log: Vec<String>,
    /// Latest candidate code
    pub generated_code: Option<String>,
    /// Tests generated once for the candidate code
    pub generated_tests: Option<String>,
    /// Outcome of the latest test run
    pub last_test_result: Option<TestOutcome>,
    /// Append-only
    pub attempt_history: Vec<AttemptRecord>,
    /// Categorized failure that prompted the fix awaiting a test run
    pub pending_failure_reason: Option<String>,
    /// Set once tests pass or the retry ceiling is reached
    pub healing_outcome: Option<HealingOutcome>,
    /// Documentation proposals from `DocSync`
    pub doc_proposals: Option<DocSyncReport>,
    /// When the state was created
    pub started_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Fresh state for a change to `changed_file` described by `request`
    #[must_use]
    pub fn new(changed_file: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            pending_messages: vec![Message::user(request)],
            mode: Strategy::default(),
            changed_file: changed_file.into(),
            changed_symbol: None,
            impacted_files: Vec::new(),
            analysis: None,
            fell_back: false,
            retry_count: 0,
            error_log: Vec::new(),
            generated_code: None,
            generated_tests: None,
            last_test_result: None,
            attempt_history: Vec::new(),
            pending_failure_reason: None,
            healing_outcome: None,
            doc_proposals: None,
            started_at: Utc::now(),
        }
    }

    /// Set requested strategy
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: Strategy) -> Self {
        self.mode = mode;
        self
    }

    /// Set changed symbol
    #[inline]
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.changed_symbol = Some(symbol.into());
        self
    }

    /// Most recent user message
    #[must_use]
    pub fn user_request(&self) -> Option<&str> {
        self.pending_messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User && !m.content.trim().is_empty())
            .map(|m| m.content.as_str())
    }

    /// Whether the last test run passed
    #[must_use]
    pub fn tests_passed(&self) -> bool {
        self.last_test_result.as_ref().is_some_and(|t| t.success)
    }

    /// Merge a stage's update
    pub fn apply(&mut self, update: StateUpdate) {
        let StateUpdate {
            pending_messages,
            impacted_files,
            analysis,
            fell_back,
            retry_count,
            error_log,
            generated_code,
            generated_tests,
            last_test_result,
            attempt_history,
            pending_failure_reason,
            healing_outcome,
            doc_proposals,
        } = update;

        self.pending_messages.extend(pending_messages);
        self.error_log.extend(error_log);
        self.attempt_history.extend(attempt_history);

        if let Some(v) = impacted_files {
            self.impacted_files = v;
        }
        if let Some(v) = analysis {
            self.analysis = Some(v);
        }
        if let Some(v) = fell_back {
            self.fell_back = v;
        }
        if let Some(v) = retry_count {
            self.retry_count = v;
        }
        if let Some(v) = generated_code {
            self.generated_code = Some(v);
        }
        if let Some(v) = generated_tests {
            self.generated_tests = Some(v);
        }
        if let Some(v) = last_test_result {
            self.last_test_result = Some(v);
        }
        if let Some(v) = pending_failure_reason {
            self.pending_failure_reason = Some(v);
        }
        if let Some(v) = healing_outcome {
            self.healing_outcome = Some(v);
        }
        if let Some(v) = doc_proposals {
            self.doc_proposals = Some(v);
        }
    }
}

/// Partial state produced by one stage
///
/// `Option` fields overwrite when set; `Vec` fields append.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    /// Messages to append
    pub pending_messages: Vec<Message>,
    /// Replacement impacted set
    pub impacted_files: Option<Vec<String>>,
    /// Replacement analysis result
    pub analysis: Option<ImpactResult>,
    /// New fallback flag
    pub fell_back: Option<bool>,
    /// New retry count
    pub retry_count: Option<u32>,
    /// Lines to append to the error log
    pub error_log: Vec<String>,
    /// Replacement candidate code
    pub generated_code: Option<String>,
    /// Replacement tests
    pub generated_tests: Option<String>,
    /// Latest test outcome
    pub last_test_result: Option<TestOutcome>,
    /// Attempts to append
    pub attempt_history: Vec<AttemptRecord>,
    /// Reason recorded against the next attempt
    pub pending_failure_reason: Option<String>,
    /// Final healing verdict
    pub healing_outcome: Option<HealingOutcome>,
    /// Documentation proposals
    pub doc_proposals: Option<DocSyncReport>,
}

impl StateUpdate {
    /// Empty update
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error log line
    #[inline]
    #[must_use]
    pub fn log(mut self, line: impl Into<String>) -> Self {
        self.error_log.push(line.into());
        self
    }

    /// Whether merging this would change nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_messages.is_empty()
            && self.impacted_files.is_none()
            && self.analysis.is_none()
            && self.fell_back.is_none()
            && self.retry_count.is_none()
            && self.error_log.is_empty()
            && self.generated_code.is_none()
            && self.generated_tests.is_none()
            && self.last_test_result.is_none()
            && self.attempt_history.is_empty()
            && self.pending_failure_reason.is_none()
            && self.healing_outcome.is_none()
            && self.doc_proposals.is_none()
    }
}
