//! mend-core: impact-driven change workflow engine
//!
//! A run moves one [`WorkflowState`] through the stages
//! `Entry → analysis → code generation → test generation → execute tests →
//! (self-healing ⟲ execute tests)* → doc sync → Terminal`:
//!
//! - [`stage`]: transition table, pure routing functions, prerequisites
//! - [`engine`]: [`WorkflowEngine`] with validation and a step bound
//! - [`capability`]: typed collaborator registry
//! - [`tasks`]: plan parsing and role-based task dispatch
//! - [`fs_ops`]: workspace-confined file operations
//! - [`docs`]: documentation proposals
//! - [`config`] and [`telemetry`]: ambient setup

pub mod capability;
pub mod config;
pub mod docs;
pub mod engine;
pub mod error;
pub mod fs_ops;
pub mod prompts;
pub mod stage;
mod stages;
pub mod state;
pub mod tasks;
pub mod telemetry;

pub use capability::{CapabilityKind, CapabilityRegistry};
pub use config::MendConfig;
pub use docs::{DocChangeKind, DocProposal, DocProposer, DocSyncReport, DocstringProposer};
pub use engine::{WorkflowEngine, WorkflowEngineBuilder};
pub use error::{
    ConfigError, DocError, FsError, IntegrityViolation, StageError, TaskError, TelemetryError,
    WorkflowError,
};
pub use fs_ops::{FsOp, FsOutput, GrepMatch, Workspace};
pub use stage::{allowed_transitions, longest_run, validate_transition, Router, Stage, Transition};
pub use state::{HealingOutcome, Message, Role, RunId, StateUpdate, WorkflowState};
pub use tasks::{
    parse_plan, run_todo_list, PlanDefaults, Task, TaskDispatcher, TaskHandler, TaskKind,
    TaskOutput, TaskReport, TaskRole, TaskStatus, TodoList,
};

/// Common imports for embedding the engine
pub mod prelude {
    pub use crate::{
        CapabilityRegistry, MendConfig, Stage, WorkflowEngine, WorkflowError, WorkflowState,
    };
    pub use mend_analysis::{ImpactAnalyzer, ImpactResult, ReferenceIndex, Strategy};
    pub use mend_healing::{Sandbox, TestOutcome, TextGenerator};
}
