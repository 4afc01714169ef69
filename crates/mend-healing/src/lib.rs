//! mend-healing: bounded generate/test/repair loop
//!
//! - [`TextGenerator`] and [`Sandbox`] collaborator interfaces
//! - Timeout-guarded test execution ([`execute_tests`])
//! - Failure classification and fix requests
//! - [`SelfHealer`] with a hard [`RetryBudget`]
//! - [`ProcessSandbox`], a subprocess-based sandbox

pub mod classify;
pub mod error;
pub mod extract;
pub mod fix;
pub mod generator;
pub mod healer;
pub mod process;
pub mod sandbox;

pub use classify::{categorize, classify, join_labels, split_failures, FailureCategory};
pub use error::{GenerationError, HealingError, SandboxError};
pub use extract::extract_code;
pub use fix::FixRequest;
pub use generator::TextGenerator;
pub use healer::{
    attempt_summary, AttemptRecord, HealingLog, HealingPolicy, HealingResult, RetryBudget,
    SelfHealer,
};
pub use process::ProcessSandbox;
pub use sandbox::{execute_tests, Sandbox, TestOutcome, DEFAULT_SANDBOX_TIMEOUT};
