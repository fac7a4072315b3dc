// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reusable phase gates.
//!
//! Each gate verifies one structural property of the data flowing between
//! phases and records the outcome with supporting evidence. A failed
//! blocking gate means downstream phases must not run; the
//! [`GateChecker`] accumulates results and answers that question for a
//! whole run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Pipeline phase a gate ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePhase {
    /// Cross-stage contract integrity checks.
    ContractIntegrity,
    /// Ingestion: parse and assess inputs.
    IngestParseAssess,
    /// Main execution.
    Execution,
    /// Post-execution review.
    Review,
}

impl std::fmt::Display for GatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ContractIntegrity => "contract_integrity",
            Self::IngestParseAssess => "ingest_parse_assess",
            Self::Execution => "execution",
            Self::Review => "review",
        };
        f.write_str(s)
    }
}

/// Pass/fail outcome of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// Gate passed.
    Pass,
    /// Gate failed.
    Fail,
}

/// Severity attached to a gate result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateSeverity {
    /// Informational (passing gates).
    Info,
    /// Needs attention.
    Warning,
    /// Failure.
    Error,
}

/// A single piece of evidence supporting a gate outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Evidence kind, e.g. `checksum_mismatch`.
    pub kind: String,
    /// What the evidence refers to (artifact id, checksum label, ...).
    pub reference: String,
    /// Human-readable description.
    pub description: String,
}

/// Outcome of one gate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// Unique gate identifier.
    pub gate_id: String,
    /// Trace id for correlation, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Parent task span id.
    pub task_id: String,
    /// Phase the gate ran in.
    pub phase: GatePhase,
    /// Pass or fail.
    pub outcome: GateOutcome,
    /// Severity of the outcome.
    pub severity: GateSeverity,
    /// Why the gate passed or failed.
    pub reason: String,
    /// What to do next.
    pub next_action: String,
    /// Whether a failure blocks downstream phases.
    pub blocking: bool,
    /// Supporting evidence.
    pub evidence: Vec<EvidenceItem>,
    /// When the gate was checked.
    pub checked_at: DateTime<Utc>,
}

fn log_result(result: &GateResult) {
    info!(
        gate = %result.gate_id,
        outcome = ?result.outcome,
        reason = %result.reason,
        "gate checked"
    );
}

fn pass(
    gate_id: &str,
    task_id: &str,
    phase: GatePhase,
    trace_id: Option<&str>,
    reason: String,
    evidence: Vec<EvidenceItem>,
) -> GateResult {
    let result = GateResult {
        gate_id: gate_id.to_string(),
        trace_id: trace_id.map(str::to_string),
        task_id: task_id.to_string(),
        phase,
        outcome: GateOutcome::Pass,
        severity: GateSeverity::Info,
        reason,
        next_action: format!("Proceed to next phase after {phase}."),
        blocking: false,
        evidence,
        checked_at: Utc::now(),
    };
    log_result(&result);
    result
}

fn fail(
    gate_id: &str,
    task_id: &str,
    phase: GatePhase,
    trace_id: Option<&str>,
    blocking: bool,
    reason: String,
    next_action: String,
    evidence: Vec<EvidenceItem>,
) -> GateResult {
    let result = GateResult {
        gate_id: gate_id.to_string(),
        trace_id: trace_id.map(str::to_string),
        task_id: task_id.to_string(),
        phase,
        outcome: GateOutcome::Fail,
        severity: GateSeverity::Error,
        reason,
        next_action,
        blocking,
        evidence,
        checked_at: Utc::now(),
    };
    log_result(&result);
    result
}

/// Verify that actual checksums match the expected chain.
///
/// Every key in `expected` must appear in `actual` with the same hash;
/// any mismatch or missing key fails the gate.
pub fn check_checksum_chain(
    gate_id: &str,
    task_id: &str,
    expected: &BTreeMap<String, String>,
    actual: &BTreeMap<String, String>,
    trace_id: Option<&str>,
    blocking: bool,
) -> GateResult {
    let phase = GatePhase::ContractIntegrity;
    let mut mismatched = Vec::new();
    let mut missing = Vec::new();
    let mut evidence = Vec::new();

    for (label, expected_hash) in expected {
        match actual.get(label) {
            None => {
                missing.push(label.clone());
                evidence.push(EvidenceItem {
                    kind: "checksum_missing".to_string(),
                    reference: label.clone(),
                    description: format!(
                        "Expected checksum for '{label}' but not found in actual checksums."
                    ),
                });
            }
            Some(actual_hash) if actual_hash != expected_hash => {
                mismatched.push(label.clone());
                evidence.push(EvidenceItem {
                    kind: "checksum_mismatch".to_string(),
                    reference: label.clone(),
                    description: format!(
                        "Checksum mismatch for '{label}': expected={expected_hash}, actual={actual_hash}"
                    ),
                });
            }
            Some(_) => {}
        }
    }

    if mismatched.is_empty() && missing.is_empty() {
        return pass(
            gate_id,
            task_id,
            phase,
            trace_id,
            "All checksums match expected chain.".to_string(),
            vec![EvidenceItem {
                kind: "checksum_verified".to_string(),
                reference: "all".to_string(),
                description: format!("Verified {} checksum(s).", expected.len()),
            }],
        );
    }

    let mut parts = Vec::new();
    if !mismatched.is_empty() {
        parts.push(format!("mismatched: {}", mismatched.join(", ")));
    }
    if !missing.is_empty() {
        parts.push(format!("missing: {}", missing.join(", ")));
    }
    fail(
        gate_id,
        task_id,
        phase,
        trace_id,
        blocking,
        format!("Checksum chain broken — {}", parts.join("; ")),
        "Regenerate upstream artifacts with matching checksums before proceeding.".to_string(),
        evidence,
    )
}

/// Verify that every artifact id has a task mapping entry.
pub fn check_mapping_completeness(
    gate_id: &str,
    task_id: &str,
    artifact_ids: &[String],
    task_mapping: &BTreeMap<String, String>,
    trace_id: Option<&str>,
    blocking: bool,
) -> GateResult {
    let phase = GatePhase::ContractIntegrity;
    let unmapped: Vec<&String> = artifact_ids
        .iter()
        .filter(|id| !task_mapping.contains_key(*id))
        .collect();

    if unmapped.is_empty() {
        return pass(
            gate_id,
            task_id,
            phase,
            trace_id,
            format!("All {} artifact(s) mapped to tasks.", artifact_ids.len()),
            vec![EvidenceItem {
                kind: "mapping_complete".to_string(),
                reference: "artifact_task_mapping".to_string(),
                description: format!("Verified {} mapping(s).", artifact_ids.len()),
            }],
        );
    }

    let evidence = unmapped
        .iter()
        .map(|id| EvidenceItem {
            kind: "unmapped_artifact".to_string(),
            reference: (*id).clone(),
            description: format!("Artifact '{id}' has no task mapping entry."),
        })
        .collect();
    let names: Vec<&str> = unmapped.iter().map(|s| s.as_str()).collect();
    fail(
        gate_id,
        task_id,
        phase,
        trace_id,
        blocking,
        format!(
            "Mapping incomplete: {} artifact(s) unmapped — {}.",
            unmapped.len(),
            names.join(", ")
        ),
        "Add task mapping entries for all unmapped artifacts before proceeding.".to_string(),
        evidence,
    )
}

/// Verify that coverage gaps and parsed features are in parity.
///
/// Every gap must have a matching feature and no feature may be orphaned.
/// This catches artifacts silently dropped during parse/transform.
pub fn check_gap_parity(
    gate_id: &str,
    task_id: &str,
    gap_ids: &[String],
    feature_ids: &[String],
    trace_id: Option<&str>,
    blocking: bool,
) -> GateResult {
    let phase = GatePhase::IngestParseAssess;
    let gaps: BTreeSet<&String> = gap_ids.iter().collect();
    let features: BTreeSet<&String> = feature_ids.iter().collect();
    let missing: Vec<&&String> = gaps.difference(&features).collect();
    let orphaned: Vec<&&String> = features.difference(&gaps).collect();

    if missing.is_empty() && orphaned.is_empty() {
        return pass(
            gate_id,
            task_id,
            phase,
            trace_id,
            format!(
                "Gap parity verified: {} gap(s) against {} feature(s).",
                gap_ids.len(),
                feature_ids.len()
            ),
            vec![EvidenceItem {
                kind: "gap_parity_verified".to_string(),
                reference: "coverage".to_string(),
                description: format!("All {} gap(s) have matching features.", gap_ids.len()),
            }],
        );
    }

    let mut problems = Vec::new();
    let mut evidence = Vec::new();
    if !missing.is_empty() {
        problems.push(format!("{} gap(s) have no matching feature", missing.len()));
        for gap in &missing {
            evidence.push(EvidenceItem {
                kind: "missing_feature".to_string(),
                reference: (**gap).clone(),
                description: format!("Gap '{gap}' has no corresponding parsed feature."),
            });
        }
    }
    if !orphaned.is_empty() {
        problems.push(format!(
            "{} feature(s) have no matching gap",
            orphaned.len()
        ));
        for feature in &orphaned {
            evidence.push(EvidenceItem {
                kind: "orphan_feature".to_string(),
                reference: (**feature).clone(),
                description: format!("Feature '{feature}' has no corresponding gap."),
            });
        }
    }
    fail(
        gate_id,
        task_id,
        phase,
        trace_id,
        blocking,
        format!("Gap parity broken: {}.", problems.join("; ")),
        "Re-run parse/transform to ensure all gaps produce features and no artifacts are dropped."
            .to_string(),
        evidence,
    )
}

/// Summary of a checker's accumulated results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSummary {
    /// Total gates checked.
    pub total_gates: usize,
    /// Gates that passed.
    pub passed: usize,
    /// Gates that failed.
    pub failed: usize,
    /// Blocking failures.
    pub blocking_failures: usize,
    /// `true` when every gate passed.
    pub all_passed: bool,
    /// Ids of all checked gates, in order.
    pub gate_ids: Vec<String>,
}

/// Carries shared context (trace id) across multiple gate checks and
/// accumulates their results.
#[derive(Debug, Clone, Default)]
pub struct GateChecker {
    trace_id: Option<String>,
    results: Vec<GateResult>,
}

impl GateChecker {
    /// Create a checker, optionally bound to a trace.
    pub fn new(trace_id: Option<String>) -> Self {
        Self {
            trace_id,
            results: Vec::new(),
        }
    }

    /// All accumulated results.
    pub fn results(&self) -> &[GateResult] {
        &self.results
    }

    /// `true` when any blocking gate failed.
    pub fn has_blocking_failure(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.blocking && r.outcome == GateOutcome::Fail)
    }

    /// All blocking failures.
    pub fn blocking_failures(&self) -> Vec<&GateResult> {
        self.results
            .iter()
            .filter(|r| r.blocking && r.outcome == GateOutcome::Fail)
            .collect()
    }

    /// `true` when every gate passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.outcome == GateOutcome::Pass)
    }

    /// Run [`check_checksum_chain`] and record the result.
    pub fn check_checksum_chain(
        &mut self,
        gate_id: &str,
        task_id: &str,
        expected: &BTreeMap<String, String>,
        actual: &BTreeMap<String, String>,
        blocking: bool,
    ) -> GateResult {
        let result = check_checksum_chain(
            gate_id,
            task_id,
            expected,
            actual,
            self.trace_id.as_deref(),
            blocking,
        );
        self.results.push(result.clone());
        result
    }

    /// Run [`check_mapping_completeness`] and record the result.
    pub fn check_mapping_completeness(
        &mut self,
        gate_id: &str,
        task_id: &str,
        artifact_ids: &[String],
        task_mapping: &BTreeMap<String, String>,
        blocking: bool,
    ) -> GateResult {
        let result = check_mapping_completeness(
            gate_id,
            task_id,
            artifact_ids,
            task_mapping,
            self.trace_id.as_deref(),
            blocking,
        );
        self.results.push(result.clone());
        result
    }

    /// Run [`check_gap_parity`] and record the result.
    pub fn check_gap_parity(
        &mut self,
        gate_id: &str,
        task_id: &str,
        gap_ids: &[String],
        feature_ids: &[String],
        blocking: bool,
    ) -> GateResult {
        let result = check_gap_parity(
            gate_id,
            task_id,
            gap_ids,
            feature_ids,
            self.trace_id.as_deref(),
            blocking,
        );
        self.results.push(result.clone());
        result
    }

    /// Summary suitable for logging and telemetry.
    pub fn summary(&self) -> GateSummary {
        let passed = self
            .results
            .iter()
            .filter(|r| r.outcome == GateOutcome::Pass)
            .count();
        GateSummary {
            total_gates: self.results.len(),
            passed,
            failed: self.results.len() - passed,
            blocking_failures: self.blocking_failures().len(),
            all_passed: self.all_passed(),
            gate_ids: self.results.iter().map(|r| r.gate_id.clone()).collect(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn checksum_chain_passes_on_match() {
        let expected = map(&[("source", "sha256:aaa")]);
        let result = check_checksum_chain("G-1", "T-1", &expected, &expected, None, true);
        assert_eq!(result.outcome, GateOutcome::Pass);
        assert!(!result.blocking);
        assert_eq!(result.severity, GateSeverity::Info);
    }

    #[test]
    fn checksum_mismatch_and_missing_both_reported() {
        let expected = map(&[("a", "sha256:aaa"), ("b", "sha256:bbb")]);
        let actual = map(&[("a", "sha256:zzz")]);
        let result = check_checksum_chain("G-2", "T-1", &expected, &actual, None, true);
        assert_eq!(result.outcome, GateOutcome::Fail);
        assert!(result.blocking);
        assert!(result.reason.contains("mismatched: a"));
        assert!(result.reason.contains("missing: b"));
        assert_eq!(result.evidence.len(), 2);
    }

    #[test]
    fn mapping_completeness_flags_unmapped() {
        let mapping = map(&[("art-1", "task-1")]);
        let result = check_mapping_completeness(
            "G-3",
            "T-1",
            &ids(&["art-1", "art-2"]),
            &mapping,
            None,
            true,
        );
        assert_eq!(result.outcome, GateOutcome::Fail);
        assert_eq!(result.evidence[0].kind, "unmapped_artifact");
        assert_eq!(result.evidence[0].reference, "art-2");
    }

    #[test]
    fn gap_parity_catches_both_directions() {
        let result = check_gap_parity(
            "G-4",
            "T-1",
            &ids(&["gap-1", "gap-2"]),
            &ids(&["gap-1", "feat-x"]),
            None,
            true,
        );
        assert_eq!(result.outcome, GateOutcome::Fail);
        let kinds: Vec<&str> = result.evidence.iter().map(|e| e.kind.as_str()).collect();
        assert!(kinds.contains(&"missing_feature"));
        assert!(kinds.contains(&"orphan_feature"));
    }

    #[test]
    fn checker_accumulates_and_detects_blocking_failures() {
        let mut checker = GateChecker::new(Some("trace-123".to_string()));
        checker.check_checksum_chain(
            "G-5",
            "T-1",
            &map(&[("s", "sha256:aaa")]),
            &map(&[("s", "sha256:aaa")]),
            true,
        );
        checker.check_gap_parity("G-6", "T-1", &ids(&["g1"]), &ids(&[]), true);

        assert!(checker.has_blocking_failure());
        assert!(!checker.all_passed());
        let summary = checker.summary();
        assert_eq!(summary.total_gates, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.blocking_failures, 1);
        assert_eq!(summary.gate_ids, vec!["G-5", "G-6"]);

        // Trace id propagated into results.
        assert_eq!(checker.results()[0].trace_id.as_deref(), Some("trace-123"));
    }

    #[test]
    fn non_blocking_failure_does_not_block() {
        let mut checker = GateChecker::new(None);
        checker.check_gap_parity("G-7", "T-1", &ids(&["g1"]), &ids(&[]), false);
        assert!(!checker.has_blocking_failure());
        assert!(!checker.all_passed());
    }
}
