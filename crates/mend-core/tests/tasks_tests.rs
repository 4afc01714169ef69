//! Plan parsing, task dispatch and workspace file operations.

use mend_analysis::{AnalyzerSet, FastAnalyzer, PreciseAnalyzer, Strategy};
use mend_core::config::MendConfig;
use mend_core::docs::DocstringProposer;
use mend_core::fs_ops::{FsOp, FsOutput, Workspace};
use mend_core::tasks::{
    parse_plan, run_todo_list, AnalysisHandler, DocumentationHandler, PlanDefaults, Task,
    TaskDispatcher, TaskHandler, TaskKind, TaskOutput, TaskRole, TaskStatus, TodoList,
    DOC_FOLLOWUP_DESCRIPTION,
};
use mend_core::WorkflowEngine;
use mend_graph::{GraphCache, GraphOptions};
use mend_test_utils::{FailingReferenceIndex, ScriptedGenerator, ScriptedSandbox, WorkspaceFixture};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const PLAN: &str = "\
TASK 1: [analyze] Analyze dependencies of a.py | subagent:analysis
TASK 2: [code] Make helper return 2 | subagent:coding
TASK 3: [doc] Refresh docstrings | subagent:documentation
";

fn dispatcher(fixture: &WorkspaceFixture) -> TaskDispatcher {
    let engine = WorkflowEngine::builder()
        .with_config(MendConfig::default().with_workspace_root(fixture.path()))
        .with_generator(Arc::new(ScriptedGenerator::revisions()))
        .with_sandbox(Arc::new(ScriptedSandbox::passing()))
        .build()
        .unwrap();
    TaskDispatcher::from_engine(&engine, Workspace::new(fixture.path()).unwrap())
}

#[tokio::test]
async fn plan_runs_in_order_with_documentation_followup() {
    let fixture = WorkspaceFixture::chain();
    let defaults = PlanDefaults {
        changed_file: "main.py".into(),
        mode: Strategy::Fast,
    };
    let todo = TodoList::from_tasks(parse_plan(PLAN, &defaults));

    let reports = run_todo_list(&dispatcher(&fixture), todo).await;

    let ids: Vec<u32> = reports.iter().map(|r| r.task_id).collect();
    assert_eq!(ids, [1, 2, 3, 100]);
    assert!(reports.iter().all(|r| r.status == TaskStatus::Completed));
    assert_eq!(reports[3].description, DOC_FOLLOWUP_DESCRIPTION);
    assert_eq!(reports[3].role, TaskRole::Documentation);

    let Some(TaskOutput::Analysis(analysis)) = &reports[0].output else {
        panic!("expected analysis output");
    };
    assert_eq!(analysis.impacted_files(), ["a.py", "b.py", "c.py"]);

    let Some(TaskOutput::Coding(healing)) = &reports[1].output else {
        panic!("expected coding output");
    };
    assert!(healing.success);
    assert_eq!(healing.final_code, "revision = 1");
    assert_eq!(reports[1].summary, "Tests passed after 0 retries");
}

#[tokio::test]
async fn failed_task_is_recorded_and_the_list_continues() {
    let fixture = WorkspaceFixture::chain();
    let todo = TodoList::from_tasks([
        Task::new(
            1,
            "Read outside",
            TaskKind::Filesystem(FsOp::Read {
                path: "../../etc/passwd".into(),
                max_lines: None,
            }),
        ),
        Task::new(
            2,
            "Explore",
            TaskKind::Filesystem(FsOp::List { path: ".".into() }),
        ),
    ]);

    let reports = run_todo_list(&dispatcher(&fixture), todo).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].status, TaskStatus::Failed);
    assert!(reports[0].output.is_none());
    assert!(reports[0].summary.contains("escapes the workspace"));
    assert_eq!(reports[1].status, TaskStatus::Completed);
    assert_eq!(reports[1].summary, "3 entries");
}

#[tokio::test]
async fn analysis_task_falls_back_when_precise_fails() {
    let fixture = WorkspaceFixture::chain();
    let analyzers = AnalyzerSet::new(
        Arc::new(FastAnalyzer::new(fixture.path())),
        Arc::new(
            PreciseAnalyzer::new(fixture.path())
                .with_index(Arc::new(FailingReferenceIndex::unavailable())),
        ),
    );
    let handler = AnalysisHandler::new(analyzers);
    let task = Task::new(
        7,
        "Analyze b.py",
        TaskKind::Analysis {
            changed_file: "b.py".into(),
            changed_symbol: None,
            mode: Strategy::Precise,
        },
    );

    let TaskOutput::Analysis(result) = handler.handle(&task).await.unwrap() else {
        panic!("expected analysis output");
    };
    assert_eq!(result.strategy_used(), Strategy::Fast);
    assert_eq!(result.impacted_files(), ["b.py", "c.py"]);
}

#[tokio::test]
async fn documentation_task_reads_files_when_no_code_is_given() {
    let fixture = WorkspaceFixture::chain();
    let generator = Arc::new(ScriptedGenerator::always("\"\"\"Return the constant one.\"\"\""));
    let handler = DocumentationHandler::new(Arc::new(DocstringProposer::new(
        Arc::clone(&generator) as _,
    )))
    .with_workspace(Workspace::new(fixture.path()).unwrap());
    let task = Task::new(
        3,
        "Document helpers",
        TaskKind::Documentation {
            code: String::new(),
            changed_files: vec!["a.py".into(), "README.md".into()],
        },
    );

    let TaskOutput::Documentation(report) = handler.handle(&task).await.unwrap() else {
        panic!("expected documentation output");
    };
    assert_eq!(report.proposals.len(), 1);
    assert_eq!(report.proposals[0].file, "a.py");
    assert_eq!(report.proposals[0].location, "Line 1: helper");
    assert_eq!(report.proposals[0].proposed_text, "Return the constant one.");
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn wrong_handler_reports_missing_input() {
    let fixture = WorkspaceFixture::chain();
    let dispatcher = dispatcher(&fixture);
    let task = Task::new(
        9,
        "Nothing to document",
        TaskKind::Documentation {
            code: String::new(),
            changed_files: Vec::new(),
        },
    );

    let report = dispatcher.dispatch(&task).await;
    assert_eq!(report.status, TaskStatus::Failed);
    assert!(report.summary.contains("no code or files"));
}

#[test]
fn workspace_write_invalidates_cached_graph() {
    let fixture = WorkspaceFixture::chain();
    let cache = Arc::new(GraphCache::new());
    cache
        .get_or_build(fixture.path(), &GraphOptions::default())
        .unwrap();
    assert_eq!(cache.len(), 1);

    let workspace = Workspace::new(fixture.path())
        .unwrap()
        .with_graph_cache(Arc::clone(&cache));
    let read = workspace
        .execute(&FsOp::Read {
            path: "a.py".into(),
            max_lines: None,
        })
        .unwrap();
    assert!(matches!(read, FsOutput::Content { .. }));
    assert_eq!(cache.len(), 1);

    let written = workspace
        .execute(&FsOp::Write {
            path: "d.py".into(),
            content: "import c\n".into(),
            append: false,
        })
        .unwrap();
    assert_eq!(
        written,
        FsOutput::Written {
            path: "d.py".into(),
            bytes: 9
        }
    );
    assert!(cache.is_empty());
    assert_eq!(fixture.read("d.py"), "import c\n");
}

#[test]
fn edit_replaces_only_the_requested_occurrence() {
    let fixture = WorkspaceFixture::new().with_file("m.py", "x = 1\nx = 1\nx = 1\n");
    let workspace = Workspace::new(fixture.path()).unwrap();

    let edited = workspace
        .execute(&FsOp::Edit {
            path: "m.py".into(),
            search: "x = 1".into(),
            replace: "x = 2".into(),
            occurrence: Some(2),
        })
        .unwrap();

    assert_eq!(
        edited,
        FsOutput::Edited {
            path: "m.py".into(),
            replacements: 1
        }
    );
    assert_eq!(fixture.read("m.py"), "x = 1\nx = 2\nx = 1\n");
}

#[test]
fn grep_skips_excluded_directories() {
    let fixture = WorkspaceFixture::chain()
        .with_file("node_modules/pkg/index.py", "def vendored():\n    pass\n")
        .with_file(".venv/lib/site.py", "def hidden():\n    pass\n");
    let workspace = Workspace::new(fixture.path()).unwrap();

    let FsOutput::Matches { matches } = workspace
        .execute(&FsOp::Grep {
            pattern: "def ".into(),
            glob: Some("**/*.py".into()),
            context_lines: 0,
        })
        .unwrap()
    else {
        panic!("expected matches");
    };

    let files: Vec<&str> = matches.iter().map(|m| m.file.as_str()).collect();
    assert_eq!(files, ["a.py", "b.py"]);
}
