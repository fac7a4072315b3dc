// SPDX-License-Identifier: MIT OR Apache-2.0
//! Contract drift detection.
//!
//! Compares two versions of a [`ContextContract`] and classifies every
//! change as breaking or non-breaking:
//!
//! - removed phases break downstream dependents;
//! - fields added at blocking severity to entry/enrichment break callers;
//! - fields removed from exit break downstream phases;
//! - severity escalation to blocking breaks callers;
//! - removed chains lose end-to-end verification.

use ctp_contract::{ContextContract, FieldRequirement};
use ctp_core::ConstraintSeverity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Kind of detected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// A phase was added.
    PhaseAdded,
    /// A phase was removed.
    PhaseRemoved,
    /// A field requirement was added.
    FieldAdded,
    /// A field requirement was removed.
    FieldRemoved,
    /// A field's severity changed.
    SeverityChanged,
    /// A propagation chain was added.
    ChainAdded,
    /// A propagation chain was removed.
    ChainRemoved,
}

/// Which requirement list a field change occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDirection {
    /// Entry required list.
    Entry,
    /// Entry enrichment list.
    Enrichment,
    /// Exit required list.
    Exit,
    /// Exit optional list.
    ExitOptional,
    /// Propagation chain declarations.
    Chain,
}

/// A single detected change between two contract versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftChange {
    /// What changed.
    pub kind: DriftKind,
    /// Phase involved (empty for chain changes).
    pub phase: String,
    /// Field or chain id involved (empty for phase changes).
    pub field: String,
    /// Which list the change occurred in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<FieldDirection>,
    /// Whether the change can break propagation.
    pub breaking: bool,
    /// Human-readable description.
    pub description: String,
    /// Previous value (severity), when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    /// New value (severity), when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

/// Aggregated drift report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// All detected changes, deterministic order.
    pub changes: Vec<DriftChange>,
    /// Total change count.
    pub total_changes: usize,
    /// Breaking change count.
    pub breaking_count: usize,
    /// Non-breaking change count.
    pub non_breaking_count: usize,
    /// Pipeline id of the baseline contract.
    pub old_pipeline_id: String,
    /// Pipeline id of the updated contract.
    pub new_pipeline_id: String,
}

impl DriftReport {
    /// `true` when any change is breaking.
    pub fn has_breaking_changes(&self) -> bool {
        self.breaking_count > 0
    }

    /// The breaking changes only.
    pub fn breaking_changes(&self) -> Vec<&DriftChange> {
        self.changes.iter().filter(|c| c.breaking).collect()
    }
}

/// Compares two contract versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriftDetector;

impl DriftDetector {
    /// Create a detector.
    pub fn new() -> Self {
        Self
    }

    /// Compare `old` (baseline) against `new` and report every change.
    pub fn compare(&self, old: &ContextContract, new: &ContextContract) -> DriftReport {
        let mut changes = Vec::new();
        changes.extend(phase_changes(old, new));
        changes.extend(field_changes(old, new));
        changes.extend(chain_changes(old, new));

        let breaking_count = changes.iter().filter(|c| c.breaking).count();
        if breaking_count > 0 {
            warn!(
                total = changes.len(),
                breaking = breaking_count,
                old = %old.pipeline_id,
                new = %new.pipeline_id,
                "breaking contract drift detected"
            );
        } else if !changes.is_empty() {
            info!(
                total = changes.len(),
                old = %old.pipeline_id,
                new = %new.pipeline_id,
                "non-breaking contract drift"
            );
        }

        DriftReport {
            total_changes: changes.len(),
            breaking_count,
            non_breaking_count: changes.len() - breaking_count,
            old_pipeline_id: old.pipeline_id.clone(),
            new_pipeline_id: new.pipeline_id.clone(),
            changes,
        }
    }
}

fn phase_changes(old: &ContextContract, new: &ContextContract) -> Vec<DriftChange> {
    let old_phases: BTreeSet<&String> = old.phases.keys().collect();
    let new_phases: BTreeSet<&String> = new.phases.keys().collect();
    let mut changes = Vec::new();

    for phase in new_phases.difference(&old_phases) {
        changes.push(DriftChange {
            kind: DriftKind::PhaseAdded,
            phase: (*phase).clone(),
            field: String::new(),
            direction: None,
            breaking: false,
            description: format!("Phase '{phase}' added"),
            old_value: None,
            new_value: None,
        });
    }
    for phase in old_phases.difference(&new_phases) {
        changes.push(DriftChange {
            kind: DriftKind::PhaseRemoved,
            phase: (*phase).clone(),
            field: String::new(),
            direction: None,
            breaking: true,
            description: format!("Phase '{phase}' removed — may break downstream dependencies"),
            old_value: None,
            new_value: None,
        });
    }
    changes
}

fn field_changes(old: &ContextContract, new: &ContextContract) -> Vec<DriftChange> {
    let mut changes = Vec::new();
    for (phase_name, old_phase) in &old.phases {
        let Some(new_phase) = new.phases.get(phase_name) else {
            continue;
        };
        let lists: [(FieldDirection, &[FieldRequirement], &[FieldRequirement]); 4] = [
            (
                FieldDirection::Entry,
                &old_phase.entry.required,
                &new_phase.entry.required,
            ),
            (
                FieldDirection::Enrichment,
                &old_phase.entry.enrichment,
                &new_phase.entry.enrichment,
            ),
            (
                FieldDirection::Exit,
                &old_phase.exit.required,
                &new_phase.exit.required,
            ),
            (
                FieldDirection::ExitOptional,
                &old_phase.exit.optional,
                &new_phase.exit.optional,
            ),
        ];
        for (direction, old_fields, new_fields) in lists {
            changes.extend(compare_field_lists(phase_name, direction, old_fields, new_fields));
        }
    }
    changes
}

fn compare_field_lists(
    phase: &str,
    direction: FieldDirection,
    old_fields: &[FieldRequirement],
    new_fields: &[FieldRequirement],
) -> Vec<DriftChange> {
    let old_map: BTreeMap<&str, &FieldRequirement> =
        old_fields.iter().map(|f| (f.name.as_str(), f)).collect();
    let new_map: BTreeMap<&str, &FieldRequirement> =
        new_fields.iter().map(|f| (f.name.as_str(), f)).collect();
    let mut changes = Vec::new();

    let entry_side = matches!(direction, FieldDirection::Entry | FieldDirection::Enrichment);
    let exit_side = matches!(direction, FieldDirection::Exit | FieldDirection::ExitOptional);

    for (name, field) in &new_map {
        if old_map.contains_key(name) {
            continue;
        }
        let breaking = entry_side && field.severity == ConstraintSeverity::Blocking;
        changes.push(DriftChange {
            kind: DriftKind::FieldAdded,
            phase: phase.to_string(),
            field: (*name).to_string(),
            direction: Some(direction),
            breaking,
            description: if breaking {
                format!("Field '{name}' added to {phase} (BLOCKING — may break existing callers)")
            } else {
                format!("Field '{name}' added to {phase}")
            },
            old_value: None,
            new_value: Some(field.severity.to_string()),
        });
    }

    for (name, field) in &old_map {
        if new_map.contains_key(name) {
            continue;
        }
        changes.push(DriftChange {
            kind: DriftKind::FieldRemoved,
            phase: phase.to_string(),
            field: (*name).to_string(),
            direction: Some(direction),
            breaking: exit_side,
            description: if exit_side {
                format!("Field '{name}' removed from {phase} (may break downstream phases)")
            } else {
                format!("Field '{name}' removed from {phase}")
            },
            old_value: Some(field.severity.to_string()),
            new_value: None,
        });
    }

    for (name, old_field) in &old_map {
        let Some(new_field) = new_map.get(name) else {
            continue;
        };
        if old_field.severity == new_field.severity {
            continue;
        }
        let breaking = new_field.severity == ConstraintSeverity::Blocking;
        changes.push(DriftChange {
            kind: DriftKind::SeverityChanged,
            phase: phase.to_string(),
            field: (*name).to_string(),
            direction: Some(direction),
            breaking,
            description: if breaking {
                format!(
                    "Field '{name}' in {phase}: severity {} → {} (ESCALATED to blocking)",
                    old_field.severity, new_field.severity
                )
            } else {
                format!(
                    "Field '{name}' in {phase}: severity {} → {}",
                    old_field.severity, new_field.severity
                )
            },
            old_value: Some(old_field.severity.to_string()),
            new_value: Some(new_field.severity.to_string()),
        });
    }

    changes
}

fn chain_changes(old: &ContextContract, new: &ContextContract) -> Vec<DriftChange> {
    let old_chains: BTreeSet<&str> = old
        .propagation_chains
        .iter()
        .map(|c| c.chain_id.as_str())
        .collect();
    let new_chains: BTreeSet<&str> = new
        .propagation_chains
        .iter()
        .map(|c| c.chain_id.as_str())
        .collect();
    let mut changes = Vec::new();

    for chain_id in new_chains.difference(&old_chains) {
        changes.push(DriftChange {
            kind: DriftKind::ChainAdded,
            phase: String::new(),
            field: (*chain_id).to_string(),
            direction: Some(FieldDirection::Chain),
            breaking: false,
            description: format!("Propagation chain '{chain_id}' added"),
            old_value: None,
            new_value: None,
        });
    }
    for chain_id in old_chains.difference(&new_chains) {
        changes.push(DriftChange {
            kind: DriftKind::ChainRemoved,
            phase: String::new(),
            field: (*chain_id).to_string(),
            direction: Some(FieldDirection::Chain),
            breaking: true,
            description: format!(
                "Propagation chain '{chain_id}' removed — end-to-end verification lost"
            ),
            old_value: None,
            new_value: None,
        });
    }
    changes
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ctp_contract::ContextContract;

    fn baseline() -> ContextContract {
        ContextContract::from_yaml_str(
            r#"
pipeline_id: pipe-v1
phases:
  plan:
    exit:
      required:
        - name: plan.domain
  design:
    entry:
      required:
        - name: plan.domain
      enrichment:
        - name: plan.notes
          severity: warning
propagation_chains:
  - chain_id: c1
    source: {phase: plan, field: plan.domain}
    destination: {phase: design, field: design.target}
"#,
        )
        .unwrap()
    }

    #[test]
    fn identical_contracts_have_no_drift() {
        let report = DriftDetector::new().compare(&baseline(), &baseline());
        assert_eq!(report.total_changes, 0);
        assert!(!report.has_breaking_changes());
    }

    #[test]
    fn phase_removal_is_breaking() {
        let new = ContextContract::from_yaml_str(
            r#"
pipeline_id: pipe-v2
phases:
  plan:
    exit:
      required:
        - name: plan.domain
"#,
        )
        .unwrap();
        let report = DriftDetector::new().compare(&baseline(), &new);
        assert!(report.has_breaking_changes());
        assert!(report
            .changes
            .iter()
            .any(|c| c.kind == DriftKind::PhaseRemoved && c.phase == "design" && c.breaking));
        // The chain also disappeared.
        assert!(report
            .changes
            .iter()
            .any(|c| c.kind == DriftKind::ChainRemoved && c.breaking));
    }

    #[test]
    fn blocking_entry_field_addition_is_breaking() {
        let new = ContextContract::from_yaml_str(
            &baseline_yaml_with_extra_entry_field("blocking"),
        )
        .unwrap();
        let report = DriftDetector::new().compare(&baseline(), &new);
        let added = report
            .changes
            .iter()
            .find(|c| c.kind == DriftKind::FieldAdded)
            .unwrap();
        assert!(added.breaking);

        let new = ContextContract::from_yaml_str(
            &baseline_yaml_with_extra_entry_field("warning"),
        )
        .unwrap();
        let report = DriftDetector::new().compare(&baseline(), &new);
        let added = report
            .changes
            .iter()
            .find(|c| c.kind == DriftKind::FieldAdded)
            .unwrap();
        assert!(!added.breaking);
    }

    fn baseline_yaml_with_extra_entry_field(severity: &str) -> String {
        format!(
            r#"
pipeline_id: pipe-v2
phases:
  plan:
    exit:
      required:
        - name: plan.domain
  design:
    entry:
      required:
        - name: plan.domain
        - name: plan.budget
          severity: {severity}
      enrichment:
        - name: plan.notes
          severity: warning
propagation_chains:
  - chain_id: c1
    source: {{phase: plan, field: plan.domain}}
    destination: {{phase: design, field: design.target}}
"#
        )
    }

    #[test]
    fn exit_field_removal_is_breaking() {
        let new = ContextContract::from_yaml_str(
            r#"
pipeline_id: pipe-v2
phases:
  plan: {}
  design:
    entry:
      required:
        - name: plan.domain
      enrichment:
        - name: plan.notes
          severity: warning
propagation_chains:
  - chain_id: c1
    source: {phase: plan, field: plan.domain}
    destination: {phase: design, field: design.target}
"#,
        )
        .unwrap();
        let report = DriftDetector::new().compare(&baseline(), &new);
        let removed = report
            .changes
            .iter()
            .find(|c| c.kind == DriftKind::FieldRemoved)
            .unwrap();
        assert_eq!(removed.field, "plan.domain");
        assert!(removed.breaking);
    }

    #[test]
    fn severity_escalation_to_blocking_is_breaking() {
        let new = ContextContract::from_yaml_str(
            &baseline_yaml_with_notes_severity("blocking"),
        )
        .unwrap();
        let report = DriftDetector::new().compare(&baseline(), &new);
        let change = report
            .changes
            .iter()
            .find(|c| c.kind == DriftKind::SeverityChanged)
            .unwrap();
        assert!(change.breaking);
        assert_eq!(change.old_value.as_deref(), Some("warning"));
        assert_eq!(change.new_value.as_deref(), Some("blocking"));

        // De-escalation is not breaking.
        let new = ContextContract::from_yaml_str(
            &baseline_yaml_with_notes_severity("advisory"),
        )
        .unwrap();
        let report = DriftDetector::new().compare(&baseline(), &new);
        let change = report
            .changes
            .iter()
            .find(|c| c.kind == DriftKind::SeverityChanged)
            .unwrap();
        assert!(!change.breaking);
    }

    fn baseline_yaml_with_notes_severity(severity: &str) -> String {
        format!(
            r#"
pipeline_id: pipe-v2
phases:
  plan:
    exit:
      required:
        - name: plan.domain
  design:
    entry:
      required:
        - name: plan.domain
      enrichment:
        - name: plan.notes
          severity: {severity}
propagation_chains:
  - chain_id: c1
    source: {{phase: plan, field: plan.domain}}
    destination: {{phase: design, field: design.target}}
"#
        )
    }
}
