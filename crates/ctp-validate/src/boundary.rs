// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layer 1: boundary validation of context propagation.
//!
//! Given a phase name, a context map, and a loaded [`ContextContract`],
//! produces one [`FieldResult`] per checked field and an aggregate
//! [`ValidationResult`]. Validation is read-only: declared defaults are
//! reported as `defaulted` but never written into the context.

use ctp_contract::{ContextContract, FieldRequirement};
use ctp_core::{resolve_path, ConstraintSeverity, PropagationStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Which boundary of the phase was validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Entry requirements.
    Entry,
    /// Exit requirements.
    Exit,
    /// Entry enrichment fields (never blocking).
    Enrichment,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Enrichment => "enrichment",
        };
        f.write_str(s)
    }
}

/// Outcome for a single checked field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    /// Dot-path of the field.
    pub field: String,
    /// Whether the field resolved in the context.
    pub present: bool,
    /// Whether a declared default covered its absence.
    pub default_applied: bool,
    /// Effective severity of the finding.
    pub severity: ConstraintSeverity,
    /// Propagation status for this field.
    pub status: PropagationStatus,
    /// Human-readable detail.
    pub message: String,
}

/// Aggregate result of validating one boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Phase that was validated.
    pub phase: String,
    /// Which boundary.
    pub direction: Direction,
    /// `true` iff no blocking field failed.
    pub passed: bool,
    /// Per-field outcomes.
    pub field_results: Vec<FieldResult>,
    /// Names of blocking fields that failed.
    pub blocking_failures: Vec<String>,
    /// Names of warning-level findings.
    pub warnings: Vec<String>,
    /// Worst propagation status across the fields.
    pub propagation_status: PropagationStatus,
    /// Aggregate note (e.g. "phase not declared").
    pub message: String,
}

impl ValidationResult {
    /// Number of fields where a declared default covered absence.
    pub fn defaults_applied(&self) -> usize {
        self.field_results.iter().filter(|f| f.default_applied).count()
    }
}

/// Layer 1 validator. Stateless; share one instance freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryValidator;

impl BoundaryValidator {
    /// Create a validator.
    pub fn new() -> Self {
        Self
    }

    /// Validate a phase's entry requirements.
    pub fn validate_entry(
        &self,
        phase: &str,
        context: &Value,
        contract: &ContextContract,
    ) -> ValidationResult {
        match contract.phase(phase) {
            Some(spec) => self.check_fields(phase, Direction::Entry, &spec.entry.required, context, None),
            None => undeclared_phase(phase, Direction::Entry),
        }
    }

    /// Validate a phase's enrichment fields. Findings are capped at
    /// warning severity, enrichment never blocks.
    pub fn validate_enrichment(
        &self,
        phase: &str,
        context: &Value,
        contract: &ContextContract,
    ) -> ValidationResult {
        match contract.phase(phase) {
            Some(spec) => self.check_fields(
                phase,
                Direction::Enrichment,
                &spec.entry.enrichment,
                context,
                Some(ConstraintSeverity::Warning),
            ),
            None => undeclared_phase(phase, Direction::Enrichment),
        }
    }

    /// Validate a phase's exit requirements. Optional exit fields are
    /// recorded but never fail.
    pub fn validate_exit(
        &self,
        phase: &str,
        context: &Value,
        contract: &ContextContract,
    ) -> ValidationResult {
        let Some(spec) = contract.phase(phase) else {
            return undeclared_phase(phase, Direction::Exit);
        };
        let mut result =
            self.check_fields(phase, Direction::Exit, &spec.exit.required, context, None);

        for optional in &spec.exit.optional {
            let present = resolve_path(context, &optional.name).is_some();
            result.field_results.push(FieldResult {
                field: optional.name.clone(),
                present,
                default_applied: false,
                severity: ConstraintSeverity::Advisory,
                status: if present {
                    PropagationStatus::Propagated
                } else {
                    PropagationStatus::Partial
                },
                message: if present {
                    String::new()
                } else {
                    format!("optional field '{}' not produced", optional.name)
                },
            });
        }
        result
    }

    fn check_fields(
        &self,
        phase: &str,
        direction: Direction,
        fields: &[FieldRequirement],
        context: &Value,
        severity_cap: Option<ConstraintSeverity>,
    ) -> ValidationResult {
        let mut field_results = Vec::with_capacity(fields.len());
        let mut blocking_failures = Vec::new();
        let mut warnings = Vec::new();

        for requirement in fields {
            let severity = match severity_cap {
                Some(cap) => requirement.severity.min(cap),
                None => requirement.severity,
            };
            let present = resolve_path(context, &requirement.name).is_some();

            let result = if present {
                FieldResult {
                    field: requirement.name.clone(),
                    present: true,
                    default_applied: false,
                    severity,
                    status: PropagationStatus::Propagated,
                    message: String::new(),
                }
            } else if requirement.default.is_some() {
                FieldResult {
                    field: requirement.name.clone(),
                    present: false,
                    default_applied: true,
                    severity,
                    status: PropagationStatus::Defaulted,
                    message: format!("field '{}' absent, declared default applies", requirement.name),
                }
            } else {
                match severity {
                    ConstraintSeverity::Blocking => {
                        blocking_failures.push(requirement.name.clone());
                        FieldResult {
                            field: requirement.name.clone(),
                            present: false,
                            default_applied: false,
                            severity,
                            status: PropagationStatus::Failed,
                            message: format!(
                                "required field '{}' missing at {phase}/{direction}",
                                requirement.name
                            ),
                        }
                    }
                    ConstraintSeverity::Warning => {
                        warnings.push(requirement.name.clone());
                        FieldResult {
                            field: requirement.name.clone(),
                            present: false,
                            default_applied: false,
                            severity,
                            status: PropagationStatus::Partial,
                            message: format!(
                                "field '{}' missing at {phase}/{direction}",
                                requirement.name
                            ),
                        }
                    }
                    ConstraintSeverity::Advisory => FieldResult {
                        field: requirement.name.clone(),
                        present: false,
                        default_applied: false,
                        severity,
                        status: PropagationStatus::Partial,
                        message: format!(
                            "advisory field '{}' missing at {phase}/{direction}",
                            requirement.name
                        ),
                    },
                }
            };
            field_results.push(result);
        }

        let propagation_status = field_results
            .iter()
            .map(|f| f.status)
            .max()
            .unwrap_or(PropagationStatus::Propagated);
        let passed = blocking_failures.is_empty();

        if !passed {
            warn!(
                phase,
                direction = %direction,
                blocking = ?blocking_failures,
                "boundary validation failed"
            );
        } else {
            debug!(phase, direction = %direction, checked = field_results.len(), "boundary validated");
        }

        ValidationResult {
            phase: phase.to_string(),
            direction,
            passed,
            field_results,
            blocking_failures,
            warnings,
            propagation_status,
            message: String::new(),
        }
    }
}

fn undeclared_phase(phase: &str, direction: Direction) -> ValidationResult {
    debug!(phase, direction = %direction, "phase not declared in contract, nothing to validate");
    ValidationResult {
        phase: phase.to_string(),
        direction,
        passed: true,
        field_results: Vec::new(),
        blocking_failures: Vec::new(),
        warnings: Vec::new(),
        propagation_status: PropagationStatus::Propagated,
        message: format!("phase '{phase}' not declared in contract"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ctp_contract::ContextContract;
    use serde_json::json;

    fn contract() -> ContextContract {
        ContextContract::from_yaml_str(
            r#"
pipeline_id: test
phases:
  design:
    entry:
      required:
        - name: plan.domain
        - name: plan.notes
          severity: warning
        - name: plan.region
          severity: blocking
          default: "us-east"
      enrichment:
        - name: plan.constraints
          severity: blocking
    exit:
      required:
        - name: design.target
      optional:
        - name: design.sketch
"#,
        )
        .unwrap()
    }

    #[test]
    fn passed_iff_no_blocking_failures() {
        let validator = BoundaryValidator::new();
        let ctx = json!({"plan": {"domain": "web"}});
        let result = validator.validate_entry("design", &ctx, &contract());

        assert!(result.passed);
        assert!(result.blocking_failures.is_empty());
        assert_eq!(result.warnings, vec!["plan.notes"]);
        assert_eq!(result.propagation_status, PropagationStatus::Partial);
    }

    #[test]
    fn missing_blocking_field_fails() {
        let validator = BoundaryValidator::new();
        let result = validator.validate_entry("design", &json!({}), &contract());

        assert!(!result.passed);
        assert_eq!(result.blocking_failures, vec!["plan.domain"]);
        assert_eq!(result.propagation_status, PropagationStatus::Failed);
    }

    #[test]
    fn declared_default_reports_defaulted_not_failed() {
        let validator = BoundaryValidator::new();
        let ctx = json!({"plan": {"domain": "web", "notes": "x"}});
        let result = validator.validate_entry("design", &ctx, &contract());

        let region = result
            .field_results
            .iter()
            .find(|f| f.field == "plan.region")
            .unwrap();
        assert!(region.default_applied);
        assert_eq!(region.status, PropagationStatus::Defaulted);
        assert!(result.passed);
        // Validation is read-only: nothing was written into the context.
        assert!(ctx.get("plan").unwrap().get("region").is_none());
    }

    #[test]
    fn enrichment_is_never_blocking() {
        let validator = BoundaryValidator::new();
        let result = validator.validate_enrichment("design", &json!({}), &contract());
        // Declared blocking in the contract, but capped at warning here.
        assert!(result.passed);
        assert_eq!(result.warnings, vec!["plan.constraints"]);
    }

    #[test]
    fn exit_checks_required_and_records_optional() {
        let validator = BoundaryValidator::new();
        let result = validator.validate_exit("design", &json!({}), &contract());
        assert!(!result.passed);
        assert_eq!(result.blocking_failures, vec!["design.target"]);

        let sketch = result
            .field_results
            .iter()
            .find(|f| f.field == "design.sketch")
            .unwrap();
        assert_eq!(sketch.severity, ConstraintSeverity::Advisory);
    }

    #[test]
    fn undeclared_phase_passes_with_note() {
        let validator = BoundaryValidator::new();
        let result = validator.validate_entry("ship", &json!({}), &contract());
        assert!(result.passed);
        assert!(result.message.contains("not declared"));
    }
}
