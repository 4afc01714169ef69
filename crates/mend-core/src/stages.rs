//! Stage bodies
//!
//! Each stage reads the state, talks to at most one collaborator and returns
//! a partial update. Prerequisites have already been checked by the engine.

use crate::engine::WorkflowEngine;
use crate::error::{IntegrityViolation, StageError};
use crate::prompts;
use crate::state::{HealingOutcome, Message, StateUpdate, WorkflowState};
use mend_analysis::{ImpactResult, Strategy};
use mend_graph::normalize_file_id;
use mend_healing::{
    attempt_summary, categorize, extract_code, AttemptRecord, FixRequest, GenerationError,
};

impl WorkflowEngine {
    pub(crate) async fn fast_analysis(
        &self,
        state: &WorkflowState,
    ) -> Result<StateUpdate, StageError> {
        let result = self
            .analyzers
            .get(Strategy::Fast)
            .analyze(&state.changed_file, state.changed_symbol.as_deref())
            .await;
        let replacing_precise = state.analysis.as_ref().is_some_and(ImpactResult::should_fallback);

        let mut update = StateUpdate::new();
        for warning in result.warnings() {
            update.error_log.push(format!("FAST analysis warning: {warning}"));
        }

        let impacted = if result.impacted_files().is_empty() {
            let reason = result.error_message().unwrap_or("no files reported");
            tracing::warn!(
                "FAST analysis produced no files ({}); using the changed file only",
                reason
            );
            update.error_log.push(format!("FAST analysis failed: {reason}"));
            vec![normalize_file_id(&self.root, &state.changed_file)]
        } else {
            result.impacted_files().to_vec()
        };

        tracing::info!(
            "FAST analysis complete: {} impacted files in {:?}",
            impacted.len(),
            result.elapsed()
        );
        if replacing_precise {
            tracing::info!("FAST analysis replaced a failed PRECISE analysis");
            update.fell_back = Some(true);
        }
        update.impacted_files = Some(impacted);
        update.analysis = Some(result);
        Ok(update)
    }

    pub(crate) async fn precise_analysis(
        &self,
        state: &WorkflowState,
    ) -> Result<StateUpdate, StageError> {
        let result = self
            .analyzers
            .get(Strategy::Precise)
            .analyze(&state.changed_file, state.changed_symbol.as_deref())
            .await;

        let mut update = StateUpdate::new();
        for warning in result.warnings() {
            update.error_log.push(format!("PRECISE analysis warning: {warning}"));
        }
        if result.should_fallback() {
            let message = result.error_message().unwrap_or("unknown error");
            tracing::warn!("PRECISE analysis failed, falling back to FAST: {}", message);
            update.error_log.push(format!("PRECISE analysis failed: {message}"));
        } else {
            tracing::info!(
                "PRECISE analysis complete: {} impacted files in {:?}",
                result.impacted_files().len(),
                result.elapsed()
            );
        }
        update.impacted_files = Some(result.impacted_files().to_vec());
        update.analysis = Some(result);
        Ok(update)
    }

    pub(crate) async fn code_generation(
        &self,
        state: &WorkflowState,
    ) -> Result<StateUpdate, StageError> {
        let request = state
            .user_request()
            .ok_or(IntegrityViolation::MissingUserRequest)?;
        let prompt = prompts::code_generation(request, &state.impacted_files);
        let response = self.generator.generate(&prompt).await?;
        let code = extract_code(&response);
        if code.is_empty() {
            return Err(GenerationError::EmptyResponse.into());
        }
        tracing::info!("Generated {} lines of code", code.lines().count());

        let mut update = StateUpdate::new();
        update.pending_messages.push(Message::assistant(response));
        update.generated_code = Some(code);
        Ok(update)
    }

    pub(crate) async fn test_generation(
        &self,
        state: &WorkflowState,
    ) -> Result<StateUpdate, StageError> {
        let code = state
            .generated_code
            .as_deref()
            .ok_or(IntegrityViolation::MissingGeneratedCode)?;
        let prompt = prompts::test_generation(code, state.user_request());
        let response = self.generator.generate(&prompt).await?;
        let tests = extract_code(&response);
        if tests.is_empty() {
            return Err(GenerationError::EmptyResponse.into());
        }
        tracing::info!("Generated {} lines of tests", tests.lines().count());

        let mut update = StateUpdate::new();
        update.generated_tests = Some(tests);
        Ok(update)
    }

    pub(crate) async fn execute_tests(
        &self,
        state: &WorkflowState,
    ) -> Result<StateUpdate, StageError> {
        let code = state
            .generated_code
            .as_deref()
            .ok_or(IntegrityViolation::MissingGeneratedCode)?;
        let tests = state
            .generated_tests
            .as_deref()
            .ok_or(IntegrityViolation::MissingGeneratedTests)?;

        let outcome = self.healer.run_tests(code, tests).await;
        let mut record = AttemptRecord::new(state.retry_count, code, outcome.clone());
        if state.retry_count > 0 {
            if let Some(reason) = &state.pending_failure_reason {
                record = record.with_failure_reason(reason.clone());
            }
        }

        let mut update = StateUpdate::new();
        let budget = self.retry_budget();
        if outcome.success {
            tracing::info!("Tests passed after {} retries", state.retry_count);
        } else if budget.allows(state.retry_count) {
            tracing::info!("Tests failed with exit code {}", outcome.exit_code);
        } else {
            tracing::warn!(
                "Healing did not converge after {} retries",
                state.retry_count
            );
        }
        if outcome.success || !budget.allows(state.retry_count) {
            update.healing_outcome = Some(HealingOutcome {
                converged: outcome.success,
                retry_count: state.retry_count,
                final_code: code.to_string(),
            });
        }
        update.attempt_history.push(record);
        update.last_test_result = Some(outcome);
        Ok(update)
    }

    pub(crate) async fn self_healing(
        &self,
        state: &WorkflowState,
    ) -> Result<StateUpdate, StageError> {
        let outcome = state
            .last_test_result
            .as_ref()
            .ok_or(IntegrityViolation::MissingTestResult)?;
        let code = state
            .generated_code
            .as_deref()
            .ok_or(IntegrityViolation::MissingGeneratedCode)?;
        let tests = state
            .generated_tests
            .as_deref()
            .ok_or(IntegrityViolation::MissingGeneratedTests)?;

        let attempt = state.retry_count + 1;
        let summary = attempt_summary(attempt, outcome);
        tracing::info!(
            "Self-healing {}/{}: {}",
            attempt,
            self.retry_budget().ceiling(),
            summary
        );

        let request = FixRequest {
            original_request: state.user_request().unwrap_or_default().to_string(),
            code: code.to_string(),
            tests: tests.to_string(),
            failure_text: outcome.failure_text().to_string(),
            categories: categorize(outcome.failure_text()),
            attempt,
            max_retries: self.retry_budget().ceiling(),
        };
        let fixed = self.healer.request_fix(&request).await?;

        let mut update = StateUpdate::new().log(summary.clone());
        update.pending_failure_reason = Some(summary);
        update.retry_count = Some(attempt);
        update.generated_code = Some(fixed);
        Ok(update)
    }

    pub(crate) async fn doc_sync(&self, state: &WorkflowState) -> Result<StateUpdate, StageError> {
        let code = state
            .generated_code
            .as_deref()
            .ok_or(IntegrityViolation::MissingGeneratedCode)?;

        let mut update = StateUpdate::new();
        match self.docs.propose_changes(code, &state.impacted_files).await {
            Ok(report) => {
                tracing::info!(
                    "Documentation sync proposed {} updates",
                    report.proposals.len()
                );
                update.doc_proposals = Some(report);
            }
            Err(e) => {
                tracing::warn!("Documentation sync failed: {}", e);
                update.error_log.push(format!("Documentation sync failed: {e}"));
            }
        }
        Ok(update)
    }
}
