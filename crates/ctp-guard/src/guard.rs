// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layer 4: runtime boundary guard.
//!
//! Wraps the Layer 1 validator into a stateful gate around phase
//! execution. Enforcement modes:
//!
//! - **strict**: blocking failures surface as [`BoundaryViolation`];
//! - **permissive**: blocking failures are logged, execution continues;
//! - **audit**: everything is logged and emitted, nothing blocks.
//!
//! The violation is a typed error returned from the guard's API, so callers
//! in strict mode cannot swallow it silently, and callers in the other
//! modes never see one.

use ctp_contract::ContextContract;
use ctp_core::{EnforcementMode, PropagationStatus};
use ctp_telemetry::{EventRecord, EventSink};
use ctp_validate::{BoundaryValidator, Direction, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A blocking boundary violation surfaced in strict mode.
#[derive(Debug, Clone, thiserror::Error)]
#[error("boundary violation in phase '{phase}' ({direction}): blocking fields: {blocking_fields:?}")]
pub struct BoundaryViolation {
    /// Phase whose boundary failed.
    pub phase: String,
    /// Which boundary.
    pub direction: Direction,
    /// Blocking fields that were missing.
    pub blocking_fields: Vec<String>,
}

/// All boundary results collected for a single phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseExecutionRecord {
    /// Phase name.
    pub phase: String,
    /// Entry validation result, when entry ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_result: Option<ValidationResult>,
    /// Exit validation result, when exit ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_result: Option<ValidationResult>,
    /// Enrichment validation result, when entry ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_result: Option<ValidationResult>,
}

impl PhaseExecutionRecord {
    fn new(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
            entry_result: None,
            exit_result: None,
            enrichment_result: None,
        }
    }

    fn results(&self) -> impl Iterator<Item = &ValidationResult> {
        [
            self.entry_result.as_ref(),
            self.exit_result.as_ref(),
            self.enrichment_result.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    /// `true` when no boundary had blocking failures.
    pub fn passed(&self) -> bool {
        self.results().all(|r| r.passed)
    }

    /// Worst propagation status across the boundaries.
    pub fn propagation_status(&self) -> PropagationStatus {
        self.results()
            .map(|r| r.propagation_status)
            .max()
            .unwrap_or(PropagationStatus::Propagated)
    }
}

/// Aggregated summary of all phase boundary checks in a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunSummary {
    /// Enforcement mode the run used.
    pub mode: EnforcementMode,
    /// Per-phase records, in execution order.
    pub phases: Vec<PhaseExecutionRecord>,
    /// Number of phases recorded.
    pub total_phases: usize,
    /// Phases with no blocking failures.
    pub passed_phases: usize,
    /// Phases with at least one blocking failure.
    pub failed_phases: usize,
    /// Fields checked across every boundary.
    pub total_fields_checked: usize,
    /// Blocking failures across every boundary.
    pub total_blocking_failures: usize,
    /// Warnings across every boundary.
    pub total_warnings: usize,
    /// Fields covered by declared defaults.
    pub total_defaults_applied: usize,
    /// `true` when every phase passed.
    pub overall_passed: bool,
    /// Worst propagation status across all phases.
    pub overall_status: PropagationStatus,
}

/// Validates context at phase boundaries with enforcement semantics and
/// run-scoped result collection.
pub struct RuntimeGuard {
    contract: ContextContract,
    mode: EnforcementMode,
    validator: BoundaryValidator,
    sink: Option<Arc<dyn EventSink>>,
    records: Vec<PhaseExecutionRecord>,
    current: Option<PhaseExecutionRecord>,
}

impl RuntimeGuard {
    /// Create a guard over a loaded contract.
    pub fn new(contract: ContextContract, mode: EnforcementMode) -> Self {
        Self {
            contract,
            mode,
            validator: BoundaryValidator::new(),
            sink: None,
            records: Vec::new(),
            current: None,
        }
    }

    /// Attach an event sink; audit mode emits one event per boundary.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The enforcement mode.
    pub fn mode(&self) -> EnforcementMode {
        self.mode
    }

    /// Records collected so far (completed phases only).
    pub fn records(&self) -> &[PhaseExecutionRecord] {
        &self.records
    }

    /// Validate entry requirements and enrichment for a phase.
    ///
    /// In strict mode a blocking entry failure returns the violation;
    /// permissive and audit always return the entry result.
    pub fn enter_phase(
        &mut self,
        phase: &str,
        context: &Value,
    ) -> Result<ValidationResult, BoundaryViolation> {
        let mut record = PhaseExecutionRecord::new(phase);

        let entry = self.validator.validate_entry(phase, context, &self.contract);
        record.entry_result = Some(entry.clone());

        let enrichment = self
            .validator
            .validate_enrichment(phase, context, &self.contract);
        // Enrichment is never blocking, but it is still recorded.
        self.observe(phase, Direction::Enrichment, &enrichment);
        record.enrichment_result = Some(enrichment);

        self.current = Some(record);
        self.enforce(phase, Direction::Entry, &entry)?;
        Ok(entry)
    }

    /// Validate exit requirements for a phase and close its record.
    ///
    /// Calling `exit_phase` without a matching `enter_phase` creates a
    /// record carrying only the exit result.
    pub fn exit_phase(
        &mut self,
        phase: &str,
        context: &Value,
    ) -> Result<ValidationResult, BoundaryViolation> {
        let exit = self.validator.validate_exit(phase, context, &self.contract);

        match self.current.take() {
            Some(mut record) if record.phase == phase => {
                record.exit_result = Some(exit.clone());
                self.records.push(record);
            }
            other => {
                // Restore an unrelated in-flight record before appending
                // a synthetic one for this phase.
                self.current = other;
                let mut record = PhaseExecutionRecord::new(phase);
                record.exit_result = Some(exit.clone());
                self.records.push(record);
            }
        }

        self.enforce(phase, Direction::Exit, &exit)?;
        Ok(exit)
    }

    /// Run a phase body with entry validation before and exit validation
    /// after, on success *and* error paths alike.
    ///
    /// The outer `Result` carries strict-mode violations; the inner one
    /// is the body's own outcome. A strict exit violation takes
    /// precedence over the body's result.
    pub fn run_phase<T, E>(
        &mut self,
        phase: &str,
        context: &mut Value,
        body: impl FnOnce(&mut Value) -> Result<T, E>,
    ) -> Result<Result<T, E>, BoundaryViolation> {
        self.enter_phase(phase, context)?;
        let outcome = body(context);
        self.exit_phase(phase, context)?;
        Ok(outcome)
    }

    /// Aggregate all completed phase records.
    pub fn summarize(&self) -> WorkflowRunSummary {
        let mut total_fields = 0;
        let mut total_blocking = 0;
        let mut total_warnings = 0;
        let mut total_defaults = 0;

        for record in &self.records {
            for result in record.results() {
                total_fields += result.field_results.len();
                total_blocking += result.blocking_failures.len();
                total_warnings += result.warnings.len();
                total_defaults += result.defaults_applied();
            }
        }

        let passed_phases = self.records.iter().filter(|r| r.passed()).count();
        let failed_phases = self.records.len() - passed_phases;
        let overall_status = self
            .records
            .iter()
            .map(PhaseExecutionRecord::propagation_status)
            .max()
            .unwrap_or(PropagationStatus::Propagated);

        WorkflowRunSummary {
            mode: self.mode,
            phases: self.records.clone(),
            total_phases: self.records.len(),
            passed_phases,
            failed_phases,
            total_fields_checked: total_fields,
            total_blocking_failures: total_blocking,
            total_warnings: total_warnings,
            total_defaults_applied: total_defaults,
            overall_passed: failed_phases == 0,
            overall_status,
        }
    }

    /// Clear all collected records for a fresh run.
    pub fn reset(&mut self) {
        self.records.clear();
        self.current = None;
    }

    // -- internals -----------------------------------------------------------

    fn enforce(
        &self,
        phase: &str,
        direction: Direction,
        result: &ValidationResult,
    ) -> Result<(), BoundaryViolation> {
        self.observe(phase, direction, result);
        if !result.passed && self.mode == EnforcementMode::Strict {
            return Err(BoundaryViolation {
                phase: phase.to_string(),
                direction,
                blocking_fields: result.blocking_failures.clone(),
            });
        }
        Ok(())
    }

    fn observe(&self, phase: &str, direction: Direction, result: &ValidationResult) {
        if !result.passed {
            warn!(
                mode = %self.mode,
                phase,
                direction = %direction,
                blocking = ?result.blocking_failures,
                "runtime boundary failed"
            );
        } else if !result.warnings.is_empty() {
            info!(
                mode = %self.mode,
                phase,
                direction = %direction,
                warnings = result.warnings.len(),
                "runtime boundary passed with warnings"
            );
        } else {
            debug!(mode = %self.mode, phase, direction = %direction, "runtime boundary passed");
        }

        if self.mode == EnforcementMode::Audit {
            if let Some(sink) = &self.sink {
                let record = EventRecord::new(
                    "contract.boundary_checked",
                    "context-plane",
                    self.contract.pipeline_id.clone(),
                    phase,
                )
                .field("direction", json!(direction.to_string()))
                .field("passed", json!(result.passed))
                .field("blocking_failures", json!(result.blocking_failures))
                .field("warnings", json!(result.warnings.len()));
                sink.emit(&record);
            }
        }
    }
}

impl std::fmt::Debug for RuntimeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeGuard")
            .field("pipeline", &self.contract.pipeline_id)
            .field("mode", &self.mode)
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ctp_telemetry::MemorySink;
    use serde_json::json;

    fn contract() -> ContextContract {
        ContextContract::from_yaml_str(
            r#"
pipeline_id: test
phases:
  implement:
    entry:
      required:
        - name: design.target
      enrichment:
        - name: design.notes
    exit:
      required:
        - name: implement.artifact
"#,
        )
        .unwrap()
    }

    #[test]
    fn strict_mode_raises_on_blocking_entry_failure() {
        let mut guard = RuntimeGuard::new(contract(), EnforcementMode::Strict);
        let err = guard.enter_phase("implement", &json!({})).unwrap_err();
        assert_eq!(err.phase, "implement");
        assert_eq!(err.direction, Direction::Entry);
        assert_eq!(err.blocking_fields, vec!["design.target"]);
    }

    #[test]
    fn permissive_mode_logs_and_continues() {
        let mut guard = RuntimeGuard::new(contract(), EnforcementMode::Permissive);
        let entry = guard.enter_phase("implement", &json!({})).unwrap();
        assert!(!entry.passed);
        let exit = guard.exit_phase("implement", &json!({})).unwrap();
        assert!(!exit.passed);

        let summary = guard.summarize();
        assert_eq!(summary.total_phases, 1);
        assert_eq!(summary.failed_phases, 1);
        assert!(!summary.overall_passed);
        assert_eq!(summary.total_blocking_failures, 2);
    }

    #[test]
    fn audit_mode_emits_boundary_events() {
        let sink = MemorySink::new();
        let mut guard =
            RuntimeGuard::new(contract(), EnforcementMode::Audit).with_sink(Arc::new(sink.clone()));
        let ctx = json!({"design": {"target": "svc"}, "implement": {"artifact": "bin"}});
        guard.enter_phase("implement", &ctx).unwrap();
        guard.exit_phase("implement", &ctx).unwrap();

        let names = sink.event_names();
        // enrichment + entry + exit
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n == "contract.boundary_checked"));
    }

    #[test]
    fn run_phase_validates_exit_even_when_body_errors() {
        let mut guard = RuntimeGuard::new(contract(), EnforcementMode::Permissive);
        let mut ctx = json!({"design": {"target": "svc"}});

        let outcome: Result<Result<(), &str>, _> =
            guard.run_phase("implement", &mut ctx, |_ctx| Err("body failed"));
        assert_eq!(outcome.unwrap(), Err("body failed"));

        // The exit result was still recorded.
        let summary = guard.summarize();
        assert_eq!(summary.total_phases, 1);
        assert!(summary.phases[0].exit_result.is_some());
    }

    #[test]
    fn run_phase_mutations_are_visible_to_exit_validation() {
        let mut guard = RuntimeGuard::new(contract(), EnforcementMode::Strict);
        let mut ctx = json!({"design": {"target": "svc"}});

        let outcome: Result<Result<(), ()>, _> = guard.run_phase("implement", &mut ctx, |ctx| {
            ctx["implement"] = json!({"artifact": "bin"});
            Ok(())
        });
        assert!(outcome.is_ok());
        assert!(guard.summarize().overall_passed);
    }

    #[test]
    fn exit_without_enter_creates_synthetic_record() {
        let mut guard = RuntimeGuard::new(contract(), EnforcementMode::Permissive);
        guard
            .exit_phase("implement", &json!({"implement": {"artifact": "bin"}}))
            .unwrap();
        let summary = guard.summarize();
        assert_eq!(summary.total_phases, 1);
        assert!(summary.phases[0].entry_result.is_none());
        assert!(summary.overall_passed);
    }

    #[test]
    fn worst_status_rollup() {
        let mut guard = RuntimeGuard::new(contract(), EnforcementMode::Permissive);
        let good = json!({"design": {"target": "svc"}, "implement": {"artifact": "bin"}});
        guard.enter_phase("implement", &good).unwrap();
        guard.exit_phase("implement", &good).unwrap();
        // Missing enrichment field makes this partial, not failed.
        assert_eq!(
            guard.summarize().overall_status,
            PropagationStatus::Partial
        );
    }

    #[test]
    fn reset_clears_state() {
        let mut guard = RuntimeGuard::new(contract(), EnforcementMode::Permissive);
        guard.exit_phase("implement", &json!({})).unwrap();
        guard.reset();
        assert_eq!(guard.summarize().total_phases, 0);
    }
}
