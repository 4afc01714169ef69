//! Task planning and dispatch
//!
//! - [`parse_plan`] turns `TASK n: [type] description | subagent:role` lines
//!   into typed [`Task`]s
//! - [`TaskDispatcher`] routes each task to the handler for its [`TaskRole`]
//! - [`run_todo_list`] works through a [`TodoList`] in order, threading
//!   results forward and queueing follow-up documentation work

use crate::docs::{DocProposer, DocSyncReport};
use crate::engine::WorkflowEngine;
use crate::error::TaskError;
use crate::fs_ops::{FsOp, FsOutput, Workspace};
use crate::prompts;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mend_analysis::{AnalyzerSet, ImpactResult, Strategy};
use mend_healing::{extract_code, GenerationError, HealingResult, SelfHealer, TextGenerator};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Description of the documentation task queued after a wide analysis
pub const DOC_FOLLOWUP_DESCRIPTION: &str = "Update documentation for analyzed files";

const FOLLOWUP_ID_BASE: u32 = 100;

static TASK_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"TASK\s+(\d+):\s*\[(\w+)\]\s*(.+?)\s*\|\s*subagent:\s*(\w+)")
        .expect("task line regex is valid")
});

static PATH_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\w./-]+\.(?:py|ts|tsx|js|jsx|mjs|cjs)\b").expect("path token regex is valid")
});

/// Which handler a task goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskRole {
    /// Impact analysis
    Analysis,
    /// Generate, test and heal
    Coding,
    /// Docstring proposals
    Documentation,
    /// Workspace file operations
    Filesystem,
}

impl TaskRole {
    /// Every role, in dispatch-table order
    pub const ALL: [TaskRole; 4] = [
        TaskRole::Analysis,
        TaskRole::Coding,
        TaskRole::Documentation,
        TaskRole::Filesystem,
    ];

    fn index(self) -> usize {
        match self {
            Self::Analysis => 0,
            Self::Coding => 1,
            Self::Documentation => 2,
            Self::Filesystem => 3,
        }
    }
}

impl fmt::Display for TaskRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Analysis => "analysis",
            Self::Coding => "coding",
            Self::Documentation => "documentation",
            Self::Filesystem => "filesystem",
        };
        f.write_str(name)
    }
}

/// What a task does, with its inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Analyze the impact of a change
    Analysis {
        /// File the change starts from
        changed_file: String,
        /// Symbol narrowing PRECISE analysis
        changed_symbol: Option<String>,
        /// Requested strategy
        mode: Strategy,
    },
    /// Empty `impacted_files` are filled from an earlier analysis
    Coding {
        /// Change description
        request: String,
        /// Files listed in the generation prompt
        impacted_files: Vec<String>,
    },
    /// Empty `code` is filled from earlier coding output, or read from
    /// `changed_files`
    Documentation {
        /// Python source to document
        code: String,
        /// Files the code belongs to
        changed_files: Vec<String>,
    },
    /// Run a workspace file operation
    Filesystem(FsOp),
}

impl TaskKind {
    /// Handler role
    #[must_use]
    pub fn role(&self) -> TaskRole {
        match self {
            Self::Analysis { .. } => TaskRole::Analysis,
            Self::Coding { .. } => TaskRole::Coding,
            Self::Documentation { .. } => TaskRole::Documentation,
            Self::Filesystem(_) => TaskRole::Filesystem,
        }
    }
}

/// A unit of planned work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// Plan-assigned id; follow-ups start at 100
    pub id: u32,
    /// Free text from the plan
    pub description: String,
    /// Work and inputs
    pub kind: TaskKind,
}

impl Task {
    /// Task with the given id
    #[must_use]
    pub fn new(id: u32, description: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id,
            description: description.into(),
            kind,
        }
    }
}

/// Handler result payload
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum TaskOutput {
    /// Impact analysis result
    Analysis(ImpactResult),
    /// Healing loop result
    Coding(HealingResult),
    /// Documentation proposals
    Documentation(DocSyncReport),
    /// File operation result
    Filesystem(FsOutput),
}

impl TaskOutput {
    /// One-line description
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Analysis(r) => format!(
                "{} impacted files ({})",
                r.impacted_files().len(),
                r.strategy_used()
            ),
            Self::Coding(h) if h.success => {
                format!("Tests passed after {} retries", h.retry_count)
            }
            Self::Coding(h) => format!("Tests still failing after {} retries", h.retry_count),
            Self::Documentation(d) => format!("{} documentation proposals", d.proposals.len()),
            Self::Filesystem(out) => out.summary(),
        }
    }
}

/// Final status of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Handler returned output
    Completed,
    /// Handler returned an error
    Failed,
}

/// In-memory record of an executed task
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// Id of the executed task
    pub task_id: u32,
    /// Handler that ran it
    pub role: TaskRole,
    /// Task description
    pub description: String,
    /// Outcome
    pub status: TaskStatus,
    /// Output summary or error message
    pub summary: String,
    /// Present when completed
    pub output: Option<TaskOutput>,
    /// Completion time
    pub finished_at: DateTime<Utc>,
}

impl TaskReport {
    fn completed(task: &Task, output: TaskOutput) -> Self {
        Self {
            task_id: task.id,
            role: task.kind.role(),
            description: task.description.clone(),
            status: TaskStatus::Completed,
            summary: output.summary(),
            output: Some(output),
            finished_at: Utc::now(),
        }
    }

    fn failed(task: &Task, error: &TaskError) -> Self {
        Self {
            task_id: task.id,
            role: task.kind.role(),
            description: task.description.clone(),
            status: TaskStatus::Failed,
            summary: error.to_string(),
            output: None,
            finished_at: Utc::now(),
        }
    }
}

/// Executes tasks of one role
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Role served
    fn role(&self) -> TaskRole;

    /// Execute `task`
    ///
    /// # Errors
    /// Returns [`TaskError`] when the task cannot be completed.
    async fn handle(&self, task: &Task) -> Result<TaskOutput, TaskError>;
}

/// Fixed role-indexed handler table
#[derive(Clone)]
pub struct TaskDispatcher {
    handlers: [Arc<dyn TaskHandler>; 4],
}

impl TaskDispatcher {
    /// Dispatcher over one handler per role
    #[must_use]
    pub fn new(
        analysis: Arc<dyn TaskHandler>,
        coding: Arc<dyn TaskHandler>,
        documentation: Arc<dyn TaskHandler>,
        filesystem: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            handlers: [analysis, coding, documentation, filesystem],
        }
    }

    /// Built-in handlers sharing the engine's collaborators and graph cache
    #[must_use]
    pub fn from_engine(engine: &WorkflowEngine, workspace: Workspace) -> Self {
        let workspace = match engine.graph_cache() {
            Some(cache) => workspace.with_graph_cache(Arc::clone(cache)),
            None => workspace,
        };
        Self::new(
            Arc::new(AnalysisHandler::new(engine.analyzers.clone())),
            Arc::new(CodingHandler::new(
                Arc::clone(&engine.generator),
                engine.healer.clone(),
            )),
            Arc::new(
                DocumentationHandler::new(Arc::clone(&engine.docs))
                    .with_workspace(workspace.clone()),
            ),
            Arc::new(FilesystemHandler::new(workspace)),
        )
    }

    /// Replace the handler for its role
    #[inline]
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        let slot = handler.role().index();
        self.handlers[slot] = handler;
        self
    }

    /// Handler for `role`
    #[must_use]
    pub fn handler(&self, role: TaskRole) -> &Arc<dyn TaskHandler> {
        &self.handlers[role.index()]
    }

    /// Execute `task`, recording failure in the report
    pub async fn dispatch(&self, task: &Task) -> TaskReport {
        let role = task.kind.role();
        tracing::info!("Task {} [{}]: {}", task.id, role, task.description);
        match self.handler(role).handle(task).await {
            Ok(output) => {
                let report = TaskReport::completed(task, output);
                tracing::info!("Task {} done: {}", task.id, report.summary);
                report
            }
            Err(e) => {
                tracing::warn!("Task {} failed: {}", task.id, e);
                TaskReport::failed(task, &e)
            }
        }
    }
}

impl fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roles: Vec<TaskRole> = self.handlers.iter().map(|h| h.role()).collect();
        f.debug_struct("TaskDispatcher").field("roles", &roles).finish()
    }
}

/// Defaults applied to parsed plan tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanDefaults {
    /// Used when an analysis task names no file
    pub changed_file: String,
    /// Strategy for analysis tasks
    pub mode: Strategy,
}

/// Parse `TASK n: [type] description | subagent:role` lines
///
/// `subagent:none` tasks become filesystem operations for the `explore` and
/// `search` types; unknown roles and types are skipped with a warning.
#[must_use]
pub fn parse_plan(text: &str, defaults: &PlanDefaults) -> Vec<Task> {
    let mut tasks = Vec::new();
    for caps in TASK_LINE.captures_iter(text) {
        let Ok(id) = caps[1].parse::<u32>() else {
            tracing::warn!("Skipping task with unparseable id: {}", &caps[1]);
            continue;
        };
        let task_type = caps[2].to_ascii_lowercase();
        let description = caps[3].trim().to_string();
        let role = caps[4].to_ascii_lowercase();

        let kind = match (role.as_str(), task_type.as_str()) {
            ("analysis", _) => TaskKind::Analysis {
                changed_file: PATH_TOKEN
                    .find(&description)
                    .map_or_else(|| defaults.changed_file.clone(), |m| m.as_str().to_string()),
                changed_symbol: None,
                mode: defaults.mode,
            },
            ("coding", _) => TaskKind::Coding {
                request: description.clone(),
                impacted_files: Vec::new(),
            },
            ("documentation", _) => TaskKind::Documentation {
                code: String::new(),
                changed_files: Vec::new(),
            },
            ("none", "explore") => TaskKind::Filesystem(FsOp::List { path: ".".into() }),
            ("none", "search") => TaskKind::Filesystem(FsOp::Grep {
                pattern: "def ".into(),
                glob: Some("**/*.py".into()),
                context_lines: 0,
            }),
            _ => {
                tracing::warn!(
                    "Skipping task {} with type {} and role {}",
                    id,
                    task_type,
                    role
                );
                continue;
            }
        };
        tasks.push(Task::new(id, description, kind));
    }
    tracing::debug!("Parsed {} tasks from plan", tasks.len());
    tasks
}

/// Ordered queue of tasks plus completed reports
#[derive(Debug, Clone, Default)]
pub struct TodoList {
    pending: VecDeque<Task>,
    completed: Vec<TaskReport>,
    followups: u32,
}

impl TodoList {
    /// Empty list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// List over `tasks` in order
    #[must_use]
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            pending: tasks.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Append a task
    pub fn push(&mut self, task: Task) {
        self.pending.push_back(task);
    }

    /// Append a follow-up task with a generated id; returns the id
    pub fn push_followup(&mut self, description: impl Into<String>, kind: TaskKind) -> u32 {
        let id = FOLLOWUP_ID_BASE + self.followups;
        self.followups += 1;
        self.push(Task::new(id, description, kind));
        id
    }

    /// Take the next task
    pub fn pop_next(&mut self) -> Option<Task> {
        self.pending.pop_front()
    }

    /// Record a finished task
    pub fn complete(&mut self, report: TaskReport) {
        self.completed.push(report);
    }

    /// Reports so far, in execution order
    #[must_use]
    pub fn completed(&self) -> &[TaskReport] {
        &self.completed
    }

    /// Tasks still queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Consume into the completed reports
    #[must_use]
    pub fn into_reports(self) -> Vec<TaskReport> {
        self.completed
    }
}

#[derive(Debug, Default)]
struct TaskContext {
    impacted_files: Vec<String>,
    last_code: Option<String>,
}

impl TaskContext {
    fn fill(&self, task: &mut Task) {
        match &mut task.kind {
            TaskKind::Coding { impacted_files, .. } if impacted_files.is_empty() => {
                impacted_files.clone_from(&self.impacted_files);
            }
            TaskKind::Documentation {
                code,
                changed_files,
            } => {
                if code.is_empty() {
                    if let Some(last) = &self.last_code {
                        code.clone_from(last);
                    }
                }
                if changed_files.is_empty() {
                    changed_files.clone_from(&self.impacted_files);
                }
            }
            _ => {}
        }
    }

    fn absorb(&mut self, output: &TaskOutput) {
        match output {
            TaskOutput::Analysis(result) if !result.impacted_files().is_empty() => {
                self.impacted_files = result.impacted_files().to_vec();
            }
            TaskOutput::Coding(healing) => self.last_code = Some(healing.final_code.clone()),
            _ => {}
        }
    }
}

/// Execute every task in order, returning the reports
///
/// An analysis that impacts more than one file queues a documentation task.
pub async fn run_todo_list(dispatcher: &TaskDispatcher, mut todo: TodoList) -> Vec<TaskReport> {
    let mut context = TaskContext::default();
    while let Some(mut task) = todo.pop_next() {
        context.fill(&mut task);
        let report = dispatcher.dispatch(&task).await;
        if let Some(output) = &report.output {
            context.absorb(output);
            if let TaskOutput::Analysis(result) = output {
                if result.impacted_files().len() > 1 {
                    let id = todo.push_followup(
                        DOC_FOLLOWUP_DESCRIPTION,
                        TaskKind::Documentation {
                            code: String::new(),
                            changed_files: Vec::new(),
                        },
                    );
                    tracing::info!(
                        "Analysis touched {} files; queued documentation task {}",
                        result.impacted_files().len(),
                        id
                    );
                }
            }
        }
        todo.complete(report);
    }
    todo.into_reports()
}

/// Runs impact analysis, falling back to FAST when PRECISE fails
#[derive(Debug, Clone)]
pub struct AnalysisHandler {
    analyzers: AnalyzerSet,
}

impl AnalysisHandler {
    /// Handler over both strategies
    #[must_use]
    pub fn new(analyzers: AnalyzerSet) -> Self {
        Self { analyzers }
    }
}

#[async_trait]
impl TaskHandler for AnalysisHandler {
    fn role(&self) -> TaskRole {
        TaskRole::Analysis
    }

    async fn handle(&self, task: &Task) -> Result<TaskOutput, TaskError> {
        let TaskKind::Analysis {
            changed_file,
            changed_symbol,
            mode,
        } = &task.kind
        else {
            return Err(wrong_kind(task, TaskRole::Analysis));
        };

        let symbol = changed_symbol.as_deref();
        let mut result = self.analyzers.get(*mode).analyze(changed_file, symbol).await;
        if result.should_fallback() {
            tracing::warn!(
                "PRECISE analysis failed for task {}, falling back to FAST",
                task.id
            );
            result = self
                .analyzers
                .get(Strategy::Fast)
                .analyze(changed_file, symbol)
                .await;
        }
        if result.impacted_files().is_empty() {
            if let Some(message) = result.error_message() {
                return Err(TaskError::Analysis(message.to_string()));
            }
        }
        Ok(TaskOutput::Analysis(result))
    }
}

/// Generates code and tests, then heals
#[derive(Clone)]
pub struct CodingHandler {
    generator: Arc<dyn TextGenerator>,
    healer: SelfHealer,
}

impl CodingHandler {
    /// Handler generating with `generator` and healing with `healer`
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>, healer: SelfHealer) -> Self {
        Self { generator, healer }
    }

    async fn generate_code(&self, prompt: &str) -> Result<String, GenerationError> {
        let code = extract_code(&self.generator.generate(prompt).await?);
        if code.is_empty() {
            Err(GenerationError::EmptyResponse)
        } else {
            Ok(code)
        }
    }
}

#[async_trait]
impl TaskHandler for CodingHandler {
    fn role(&self) -> TaskRole {
        TaskRole::Coding
    }

    async fn handle(&self, task: &Task) -> Result<TaskOutput, TaskError> {
        let TaskKind::Coding {
            request,
            impacted_files,
        } = &task.kind
        else {
            return Err(wrong_kind(task, TaskRole::Coding));
        };

        let code = self
            .generate_code(&prompts::code_generation(request, impacted_files))
            .await?;
        let tests = self
            .generate_code(&prompts::test_generation(&code, Some(request)))
            .await?;
        let result = self.healer.heal(&code, &tests, request).await?;
        Ok(TaskOutput::Coding(result))
    }
}

/// Proposes documentation updates
#[derive(Clone)]
pub struct DocumentationHandler {
    proposer: Arc<dyn DocProposer>,
    workspace: Option<Workspace>,
}

impl DocumentationHandler {
    /// Handler without workspace access
    #[must_use]
    pub fn new(proposer: Arc<dyn DocProposer>) -> Self {
        Self {
            proposer,
            workspace: None,
        }
    }

    /// Read changed files from `workspace` when a task carries no code
    #[inline]
    #[must_use]
    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = Some(workspace);
        self
    }

    async fn propose_for_files(
        &self,
        task: &Task,
        files: &[String],
    ) -> Result<DocSyncReport, TaskError> {
        let Some(workspace) = &self.workspace else {
            return Err(TaskError::MissingInput {
                id: task.id,
                reason: "no code and no workspace to read from".into(),
            });
        };

        let mut proposals = Vec::new();
        for file in files.iter().filter(|f| f.ends_with(".py")) {
            let op = FsOp::Read {
                path: file.clone(),
                max_lines: None,
            };
            let content = match read_blocking(workspace, op).await? {
                FsOutput::Content { text } => text,
                _ => continue,
            };
            let report = self
                .proposer
                .propose_changes(&content, std::slice::from_ref(file))
                .await?;
            proposals.extend(report.proposals);
        }
        Ok(DocSyncReport::from_proposals(proposals))
    }
}

#[async_trait]
impl TaskHandler for DocumentationHandler {
    fn role(&self) -> TaskRole {
        TaskRole::Documentation
    }

    async fn handle(&self, task: &Task) -> Result<TaskOutput, TaskError> {
        let TaskKind::Documentation {
            code,
            changed_files,
        } = &task.kind
        else {
            return Err(wrong_kind(task, TaskRole::Documentation));
        };

        let report = if !code.trim().is_empty() {
            self.proposer.propose_changes(code, changed_files).await?
        } else if !changed_files.is_empty() {
            self.propose_for_files(task, changed_files).await?
        } else {
            return Err(TaskError::MissingInput {
                id: task.id,
                reason: "no code or files to document".into(),
            });
        };
        Ok(TaskOutput::Documentation(report))
    }
}

/// Executes filesystem operations off the async runtime
#[derive(Debug, Clone)]
pub struct FilesystemHandler {
    workspace: Workspace,
}

impl FilesystemHandler {
    /// Handler over `workspace`
    #[must_use]
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl TaskHandler for FilesystemHandler {
    fn role(&self) -> TaskRole {
        TaskRole::Filesystem
    }

    async fn handle(&self, task: &Task) -> Result<TaskOutput, TaskError> {
        let TaskKind::Filesystem(op) = &task.kind else {
            return Err(wrong_kind(task, TaskRole::Filesystem));
        };
        let output = read_blocking(&self.workspace, op.clone()).await?;
        Ok(TaskOutput::Filesystem(output))
    }
}

async fn read_blocking(workspace: &Workspace, op: FsOp) -> Result<FsOutput, TaskError> {
    let workspace = workspace.clone();
    let output = tokio::task::spawn_blocking(move || workspace.execute(&op))
        .await
        .map_err(|e| TaskError::Join(e.to_string()))??;
    Ok(output)
}

fn wrong_kind(task: &Task, expected: TaskRole) -> TaskError {
    TaskError::MissingInput {
        id: task.id,
        reason: format!("{} task sent to {expected} handler", task.kind.role()),
    }
}
