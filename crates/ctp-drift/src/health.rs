// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified health scoring.
//!
//! Collapses a post-execution report, an optional runtime summary, and an
//! optional drift report into one number the regression gate can
//! threshold on.

use crate::drift::DriftReport;
use ctp_guard::{PostExecutionReport, WorkflowRunSummary};
use serde::{Deserialize, Serialize};

/// Penalty applied per breaking drift change.
const BREAKING_CHANGE_PENALTY: f64 = 10.0;

/// Unified propagation health score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    /// Overall score in `[0, 100]`.
    pub overall: f64,
    /// Chain completeness percentage.
    pub completeness: f64,
    /// Boundary pass rate percentage.
    pub boundary: f64,
    /// Points deducted for breaking drift.
    pub drift_penalty: f64,
}

impl HealthScore {
    /// Compute a health score.
    ///
    /// - completeness comes from the post-execution report;
    /// - boundary pass rate comes from the runtime summary (`100` when no
    ///   phases were recorded or no summary was supplied);
    /// - each breaking drift change deducts a fixed penalty.
    pub fn compute(
        report: &PostExecutionReport,
        summary: Option<&WorkflowRunSummary>,
        drift: Option<&DriftReport>,
    ) -> Self {
        let completeness = report.completeness_pct;
        let boundary = match summary {
            Some(summary) if summary.total_phases > 0 => {
                summary.passed_phases as f64 / summary.total_phases as f64 * 100.0
            }
            _ => 100.0,
        };
        let drift_penalty = drift
            .map(|d| d.breaking_count as f64 * BREAKING_CHANGE_PENALTY)
            .unwrap_or(0.0);
        let overall = ((completeness + boundary) / 2.0 - drift_penalty).clamp(0.0, 100.0);

        Self {
            overall,
            completeness,
            boundary,
            drift_penalty,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ctp_guard::PostExecutionValidator;
    use ctp_contract::ContextContract;
    use serde_json::json;

    fn report(ctx: serde_json::Value) -> PostExecutionReport {
        let contract = ContextContract::from_yaml_str(
            r#"
pipeline_id: test
phases:
  plan: {}
  design: {}
propagation_chains:
  - chain_id: c1
    source: {phase: plan, field: plan.a}
    destination: {phase: design, field: design.a}
  - chain_id: c2
    source: {phase: plan, field: plan.b}
    destination: {phase: design, field: design.b}
"#,
        )
        .unwrap();
        PostExecutionValidator::new().validate_chains(&contract, &ctx)
    }

    #[test]
    fn all_intact_scores_100() {
        let score = HealthScore::compute(
            &report(json!({
                "plan": {"a": 1, "b": 2},
                "design": {"a": 1, "b": 2}
            })),
            None,
            None,
        );
        assert_eq!(score.overall, 100.0);
    }

    #[test]
    fn half_intact_halves_completeness() {
        let score = HealthScore::compute(
            &report(json!({
                "plan": {"a": 1, "b": 2},
                "design": {"a": 1}
            })),
            None,
            None,
        );
        assert_eq!(score.completeness, 50.0);
        assert_eq!(score.overall, 75.0);
    }

    #[test]
    fn breaking_drift_deducts_points() {
        let drift = DriftReport {
            changes: Vec::new(),
            total_changes: 2,
            breaking_count: 2,
            non_breaking_count: 0,
            old_pipeline_id: "a".into(),
            new_pipeline_id: "b".into(),
        };
        let score = HealthScore::compute(
            &report(json!({
                "plan": {"a": 1, "b": 2},
                "design": {"a": 1, "b": 2}
            })),
            None,
            Some(&drift),
        );
        assert_eq!(score.overall, 80.0);
        assert_eq!(score.drift_penalty, 20.0);
    }
}
