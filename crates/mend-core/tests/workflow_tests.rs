//! End-to-end workflow runs against scripted collaborators.
//!
//! Every run uses a real temporary workspace for FAST analysis, a scripted
//! generator and a scripted sandbox, so routing, healing and fallback can be
//! checked without a model or a Python toolchain.

use async_trait::async_trait;
use mend_analysis::Strategy;
use mend_core::capability::CapabilityRegistry;
use mend_core::config::MendConfig;
use mend_core::docs::{DocProposer, DocSyncReport};
use mend_core::error::{ConfigError, DocError, IntegrityViolation, WorkflowError};
use mend_core::{CapabilityKind, Stage, WorkflowEngine, WorkflowState};
use mend_healing::GenerationError;
use mend_test_utils::{
    fenced, FailingReferenceIndex, ScriptedGenerator, ScriptedSandbox, StaticReferenceIndex,
    WorkspaceFixture,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn config_for(fixture: &WorkspaceFixture) -> MendConfig {
    MendConfig::default().with_workspace_root(fixture.path())
}

fn engine(
    fixture: &WorkspaceFixture,
    generator: Arc<ScriptedGenerator>,
    sandbox: Arc<ScriptedSandbox>,
) -> WorkflowEngine {
    WorkflowEngine::builder()
        .with_config(config_for(fixture))
        .with_generator(generator)
        .with_sandbox(sandbox)
        .build()
        .unwrap()
}

struct BrokenDocs;

#[async_trait]
impl DocProposer for BrokenDocs {
    async fn propose_changes(
        &self,
        _code: &str,
        _changed_files: &[String],
    ) -> Result<DocSyncReport, DocError> {
        Err(DocError::Grammar("parser unavailable".into()))
    }
}

/// A change to the root of an import chain impacts every importer, in order,
/// and a first-time pass needs no healing.
#[tokio::test]
async fn fast_run_on_import_chain_converges_without_retries() {
    let fixture = WorkspaceFixture::chain();
    let generator = Arc::new(ScriptedGenerator::revisions());
    let sandbox = Arc::new(ScriptedSandbox::passing());
    let engine = engine(&fixture, Arc::clone(&generator), Arc::clone(&sandbox));

    let state = engine
        .run(engine.new_state("a.py", "Make helper return 2"))
        .await
        .unwrap();

    assert_eq!(state.impacted_files, ["a.py", "b.py", "c.py"]);
    assert_eq!(state.mode, Strategy::Fast);
    assert!(!state.fell_back);
    assert!(state.tests_passed());
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.attempt_history.len(), 1);
    assert_eq!(state.attempt_history[0].attempt_index, 0);

    let outcome = state.healing_outcome.as_ref().unwrap();
    assert!(outcome.converged);
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(outcome.final_code, "revision = 1");

    assert_eq!(state.generated_tests.as_deref(), Some("revision = 2"));
    assert_eq!(generator.calls(), 2);
    assert_eq!(sandbox.runs().len(), 1);

    let docs = state.doc_proposals.as_ref().unwrap();
    assert!(!docs.changes_detected);
    assert_eq!(docs.summary, "No documentation updates needed.");
}

#[tokio::test]
async fn code_prompt_lists_impacted_files() {
    let fixture = WorkspaceFixture::chain();
    let generator = Arc::new(ScriptedGenerator::revisions());
    let engine = engine(
        &fixture,
        Arc::clone(&generator),
        Arc::new(ScriptedSandbox::passing()),
    );

    engine
        .run(engine.new_state("a.py", "Make helper return 2"))
        .await
        .unwrap();

    let prompts = generator.prompts();
    assert!(prompts[0].contains("Make helper return 2"));
    for file in ["a.py", "b.py", "c.py"] {
        assert!(prompts[0].contains(file), "missing {file} in code prompt");
    }
    assert!(prompts[1].contains("revision = 1"));
}

/// Healing stops at the retry ceiling and the run still finishes.
#[tokio::test]
async fn always_failing_tests_stop_at_retry_ceiling() {
    let fixture = WorkspaceFixture::chain();
    let generator = Arc::new(ScriptedGenerator::revisions());
    let sandbox = Arc::new(ScriptedSandbox::failing(
        "FAILED test_generated.py::test_add\nAssertionError: assert 3 == 4",
    ));
    let engine = engine(&fixture, Arc::clone(&generator), Arc::clone(&sandbox));

    let state = engine
        .run(engine.new_state("a.py", "Add two numbers"))
        .await
        .unwrap();

    assert_eq!(state.retry_count, 3);
    assert_eq!(state.attempt_history.len(), 4);
    let indices: Vec<u32> = state.attempt_history.iter().map(|a| a.attempt_index).collect();
    assert_eq!(indices, [0, 1, 2, 3]);
    assert!(state.attempt_history[0].failure_reason.is_none());
    for attempt in &state.attempt_history[1..] {
        let reason = attempt.failure_reason.as_deref().unwrap();
        assert!(reason.starts_with(&format!("Attempt {}:", attempt.attempt_index)));
    }

    let outcome = state.healing_outcome.as_ref().unwrap();
    assert!(!outcome.converged);
    assert_eq!(outcome.retry_count, 3);
    // Last revision, never reverted to the original.
    assert_eq!(outcome.final_code, "revision = 5");
    assert_eq!(state.generated_code.as_deref(), Some("revision = 5"));

    assert_eq!(sandbox.runs().len(), 4);
    assert_eq!(generator.calls(), 5);
    assert!(state.doc_proposals.is_some());
}

#[tokio::test]
async fn healing_converges_on_second_retry() {
    let fixture = WorkspaceFixture::chain();
    let sandbox = Arc::new(ScriptedSandbox::pass_on(3));
    let engine = engine(
        &fixture,
        Arc::new(ScriptedGenerator::revisions()),
        Arc::clone(&sandbox),
    );

    let state = engine.run(engine.new_state("a.py", "Fix it")).await.unwrap();

    assert_eq!(state.retry_count, 2);
    assert_eq!(state.attempt_history.len(), 3);
    assert!(state.attempt_history[2].passed());
    let outcome = state.healing_outcome.unwrap();
    assert!(outcome.converged);
    assert_eq!(outcome.final_code, "revision = 4");
}

#[tokio::test]
async fn zero_retry_budget_runs_tests_once() {
    let fixture = WorkspaceFixture::chain();
    let sandbox = Arc::new(ScriptedSandbox::failing("boom"));
    let engine = WorkflowEngine::builder()
        .with_config(config_for(&fixture).with_max_retries(-2))
        .with_generator(Arc::new(ScriptedGenerator::revisions()))
        .with_sandbox(Arc::<ScriptedSandbox>::clone(&sandbox))
        .build()
        .unwrap();

    let state = engine.run(engine.new_state("a.py", "Fix it")).await.unwrap();
    assert_eq!(engine.retry_budget().ceiling(), 0);
    assert_eq!(state.retry_count, 0);
    assert_eq!(sandbox.runs().len(), 1);
    assert!(!state.healing_outcome.unwrap().converged);
}

/// A broken reference index sends PRECISE runs through FAST without
/// touching the requested mode or the retry counter.
#[tokio::test]
async fn precise_failure_falls_back_to_fast() {
    let fixture = WorkspaceFixture::chain();
    let index = FailingReferenceIndex::unavailable();
    let engine = WorkflowEngine::builder()
        .with_config(config_for(&fixture).with_mode(Strategy::Precise))
        .with_generator(Arc::new(ScriptedGenerator::revisions()))
        .with_sandbox(Arc::new(ScriptedSandbox::passing()))
        .with_reference_index(Arc::new(index.clone()))
        .build()
        .unwrap();

    let state = engine
        .run(engine.new_state("a.py", "Rename helper"))
        .await
        .unwrap();

    assert_eq!(index.calls(), 1);
    assert_eq!(state.mode, Strategy::Precise);
    assert!(state.fell_back);
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.analysis.as_ref().unwrap().strategy_used(), Strategy::Fast);
    assert_eq!(state.impacted_files, ["a.py", "b.py", "c.py"]);
    assert!(state
        .error_log
        .iter()
        .any(|line| line.starts_with("PRECISE analysis failed")));
}

#[tokio::test]
async fn precise_index_results_skip_fast_analysis() {
    let fixture = WorkspaceFixture::chain();
    let engine = WorkflowEngine::builder()
        .with_config(config_for(&fixture).with_mode(Strategy::Precise))
        .with_generator(Arc::new(ScriptedGenerator::revisions()))
        .with_sandbox(Arc::new(ScriptedSandbox::passing()))
        .with_reference_index(Arc::new(StaticReferenceIndex::new(["c.py"])))
        .build()
        .unwrap();

    let state = engine
        .run(engine.new_state("a.py", "Rename helper"))
        .await
        .unwrap();

    assert!(!state.fell_back);
    assert_eq!(state.analysis.as_ref().unwrap().strategy_used(), Strategy::Precise);
    assert_eq!(state.impacted_files, ["a.py", "c.py"]);
}

/// A file the graph has never seen still yields a usable impact set.
#[tokio::test]
async fn unseen_changed_file_is_analyzed_alone() {
    let fixture = WorkspaceFixture::chain();
    let engine = engine(
        &fixture,
        Arc::new(ScriptedGenerator::revisions()),
        Arc::new(ScriptedSandbox::passing()),
    );

    let state = engine
        .run(engine.new_state("brand_new.py", "Create a module"))
        .await
        .unwrap();

    assert_eq!(state.impacted_files, ["brand_new.py"]);
    assert!(state
        .error_log
        .iter()
        .any(|line| line.starts_with("FAST analysis warning") && line.contains("brand_new.py")));
    assert!(state.tests_passed());
}

#[tokio::test]
async fn missing_workspace_degrades_to_changed_file() {
    let fixture = WorkspaceFixture::new();
    let engine = WorkflowEngine::builder()
        .with_config(MendConfig::default().with_workspace_root(fixture.path().join("gone")))
        .with_generator(Arc::new(ScriptedGenerator::revisions()))
        .with_sandbox(Arc::new(ScriptedSandbox::passing()))
        .build()
        .unwrap();

    let state = engine.run(engine.new_state("a.py", "Anything")).await.unwrap();

    assert_eq!(state.impacted_files, ["a.py"]);
    assert!(state
        .error_log
        .iter()
        .any(|line| line.starts_with("FAST analysis failed")));
}

#[cfg(not(feature = "strict-integrity"))]
#[tokio::test]
async fn resuming_without_impacted_files_is_an_integrity_violation() {
    let fixture = WorkspaceFixture::chain();
    let generator = Arc::new(ScriptedGenerator::revisions());
    let engine = engine(
        &fixture,
        Arc::clone(&generator),
        Arc::new(ScriptedSandbox::passing()),
    );

    let err = engine
        .resume(Stage::CodeGeneration, WorkflowState::new("a.py", "Anything"))
        .await
        .unwrap_err();

    assert!(err.is_integrity());
    assert_eq!(err.stage(), Stage::CodeGeneration);
    assert!(matches!(
        err,
        WorkflowError::Integrity {
            violation: IntegrityViolation::NoImpactedFiles,
            ..
        }
    ));
    assert!(err
        .state()
        .error_log
        .iter()
        .any(|line| line.starts_with("Integrity violation in CodeGeneration")));
    assert_eq!(generator.calls(), 0);
}

/// A retry budget far above the configured step bound still runs every
/// retry and ends normally.
#[tokio::test]
async fn large_retry_budget_reaches_terminal() {
    let fixture = WorkspaceFixture::chain();
    let sandbox = Arc::new(ScriptedSandbox::failing("SyntaxError: invalid syntax"));
    let engine = WorkflowEngine::builder()
        .with_config(config_for(&fixture).with_max_retries(40))
        .with_generator(Arc::new(ScriptedGenerator::revisions()))
        .with_sandbox(Arc::clone(&sandbox) as _)
        .build()
        .unwrap();

    let state = engine
        .run(engine.new_state("a.py", "Anything"))
        .await
        .unwrap();

    assert_eq!(state.retry_count, 40);
    assert_eq!(state.attempt_history.len(), 41);
    assert_eq!(sandbox.runs().len(), 41);
    let outcome = state.healing_outcome.as_ref().unwrap();
    assert!(!outcome.converged);
    assert_eq!(outcome.retry_count, 40);
    assert!(state.doc_proposals.is_some());
}

#[tokio::test]
async fn attempt_reason_comes_from_the_healing_stage_not_the_log() {
    let fixture = WorkspaceFixture::chain();
    let engine = engine(
        &fixture,
        Arc::new(ScriptedGenerator::revisions()),
        Arc::new(ScriptedSandbox::passing()),
    );
    let mut state = WorkflowState::new("a.py", "Anything");
    state.impacted_files = vec!["a.py".into()];
    state.generated_code = Some("x = 2".into());
    state.generated_tests = Some("def test_x(): pass".into());
    state.retry_count = 1;
    state.pending_failure_reason = Some("Attempt 1: logic".into());
    state.error_log.push("Attempt 1: unrelated note".into());

    let state = engine.resume(Stage::ExecuteTests, state).await.unwrap();

    assert_eq!(
        state.attempt_history[0].failure_reason.as_deref(),
        Some("Attempt 1: logic")
    );

    let mut state = WorkflowState::new("a.py", "Anything");
    state.impacted_files = vec!["a.py".into()];
    state.generated_code = Some("x = 2".into());
    state.generated_tests = Some("def test_x(): pass".into());
    state.retry_count = 1;
    state.error_log.push("Attempt 1: syntax".into());

    let state = engine.resume(Stage::ExecuteTests, state).await.unwrap();

    assert!(state.attempt_history[0].failure_reason.is_none());
}

#[tokio::test]
async fn doc_proposer_failure_does_not_fail_the_run() {
    let fixture = WorkspaceFixture::chain();
    let engine = WorkflowEngine::builder()
        .with_config(config_for(&fixture))
        .with_generator(Arc::new(ScriptedGenerator::revisions()))
        .with_sandbox(Arc::new(ScriptedSandbox::passing()))
        .with_doc_proposer(Arc::new(BrokenDocs))
        .build()
        .unwrap();

    let state = engine.run(engine.new_state("a.py", "Anything")).await.unwrap();

    assert!(state.doc_proposals.is_none());
    assert!(state
        .error_log
        .iter()
        .any(|line| line.starts_with("Documentation sync failed")));
    assert!(state.healing_outcome.unwrap().converged);
}

#[tokio::test]
async fn undocumented_generated_code_gets_docstring_proposals() {
    let fixture = WorkspaceFixture::chain();
    let generator = ScriptedGenerator::always("\"\"\"Add two integers and return the sum.\"\"\"")
        .with_script([
            Ok(fenced("def add(a, b):\n    return a + b")),
            Ok(fenced("from generated_code import add\n\ndef test_add():\n    assert add(1, 2) == 3")),
        ]);
    let engine = engine(
        &fixture,
        Arc::new(generator),
        Arc::new(ScriptedSandbox::passing()),
    );

    let state = engine
        .run(engine.new_state("a.py", "Add an add function"))
        .await
        .unwrap();

    let docs = state.doc_proposals.unwrap();
    assert!(docs.changes_detected);
    assert_eq!(docs.proposals.len(), 1);
    let proposal = &docs.proposals[0];
    assert_eq!(proposal.file, "a.py");
    assert_eq!(proposal.location, "Line 1: add");
    assert_eq!(proposal.reason, "Missing docstring");
    assert_eq!(proposal.proposed_text, "Add two integers and return the sum.");
    assert!(docs.summary.starts_with("Found 1 documentation updates:"));
}

#[tokio::test]
async fn generator_failure_halts_with_collaborator_error() {
    let fixture = WorkspaceFixture::chain();
    let engine = engine(
        &fixture,
        Arc::new(ScriptedGenerator::failing(GenerationError::Backend(
            "rate limited".into(),
        ))),
        Arc::new(ScriptedSandbox::passing()),
    );

    let err = engine
        .run(engine.new_state("a.py", "Anything"))
        .await
        .unwrap_err();

    assert!(!err.is_integrity());
    assert_eq!(err.stage(), Stage::CodeGeneration);
    let state = err.into_state();
    assert_eq!(state.impacted_files, ["a.py", "b.py", "c.py"]);
    assert!(state
        .error_log
        .iter()
        .any(|line| line.starts_with("CodeGeneration failed")));
}

#[tokio::test]
async fn empty_generation_is_a_collaborator_error() {
    let fixture = WorkspaceFixture::chain();
    let engine = engine(
        &fixture,
        Arc::new(ScriptedGenerator::always("   ")),
        Arc::new(ScriptedSandbox::passing()),
    );

    let err = engine
        .run(engine.new_state("a.py", "Anything"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Collaborator {
            source: GenerationError::EmptyResponse,
            ..
        }
    ));
}

#[test]
fn registry_without_sandbox_is_rejected() {
    let registry =
        CapabilityRegistry::new().with_generator(Arc::new(ScriptedGenerator::revisions()));

    let err = WorkflowEngine::from_registry(&registry, MendConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingCapability(CapabilityKind::Sandbox)
    ));
}

#[tokio::test]
async fn registry_wires_reference_index_into_precise_analysis() {
    let fixture = WorkspaceFixture::chain();
    let registry = CapabilityRegistry::new()
        .with_generator(Arc::new(ScriptedGenerator::revisions()))
        .with_sandbox(Arc::new(ScriptedSandbox::passing()))
        .with_reference_index(Arc::new(StaticReferenceIndex::new(["b.py"])));
    let engine = WorkflowEngine::from_registry(
        &registry,
        config_for(&fixture).with_mode(Strategy::Precise),
    )
    .unwrap();

    let state = engine.run(engine.new_state("a.py", "Anything")).await.unwrap();
    assert_eq!(state.impacted_files, ["a.py", "b.py"]);
}

#[tokio::test]
async fn concurrent_runs_share_one_engine() {
    let fixture = WorkspaceFixture::chain();
    let engine = Arc::new(
        WorkflowEngine::builder()
            .with_config(config_for(&fixture).with_cache_graphs(true))
            .with_generator(Arc::new(ScriptedGenerator::revisions()))
            .with_sandbox(Arc::new(ScriptedSandbox::passing()))
            .build()
            .unwrap(),
    );

    let runs = ["a.py", "b.py", "c.py"].map(|file| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(engine.new_state(file, "Anything")).await })
    });
    let mut ids = Vec::new();
    for run in runs {
        let state = run.await.unwrap().unwrap();
        assert!(state.tests_passed());
        ids.push(state.run_id);
    }
    assert_eq!(engine.graph_cache().unwrap().len(), 1);
    ids.sort_by_key(|id| id.0);
    ids.dedup();
    assert_eq!(ids.len(), 3);
}
