// SPDX-License-Identifier: MIT OR Apache-2.0
//! CI regression gate.
//!
//! Compares current propagation health against a stored baseline and
//! produces a pass/fail verdict. Designed to run on every PR: any check
//! combination can be evaluated; checks whose inputs are absent are
//! skipped, never failed.

use crate::drift::DriftReport;
use crate::health::HealthScore;
use ctp_guard::PostExecutionReport;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configurable gate thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    /// Minimum acceptable overall health score.
    pub min_health_score: f64,
    /// Maximum tolerated completeness drop (percentage points).
    pub max_completeness_drop: f64,
    /// Maximum tolerated increase in broken chains.
    pub max_blocking_failure_increase: i64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_health_score: 70.0,
            max_completeness_drop: 5.0,
            max_blocking_failure_increase: 0,
        }
    }
}

/// Result of a single gate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    /// Stable check identifier.
    pub check_id: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable detail.
    pub message: String,
    /// Baseline value, when the check compared against one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_value: Option<f64>,
    /// Current value observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
}

/// Aggregated regression gate verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    /// `true` iff every evaluated check passed.
    pub passed: bool,
    /// All evaluated checks.
    pub checks: Vec<GateCheck>,
    /// Number of checks evaluated.
    pub total_checks: usize,
    /// Number of checks that failed.
    pub failed_checks: usize,
}

impl GateReport {
    /// The failed checks only.
    pub fn failures(&self) -> Vec<&GateCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

/// Regression gate that prevents propagation quality degradation.
#[derive(Debug, Clone, Copy)]
pub struct RegressionGate {
    thresholds: GateThresholds,
    allow_breaking_drift: bool,
}

impl Default for RegressionGate {
    fn default() -> Self {
        Self::new(GateThresholds::default(), false)
    }
}

impl RegressionGate {
    /// Create a gate.
    ///
    /// With `allow_breaking_drift`, breaking contract drift is reported
    /// but does not fail the gate.
    pub fn new(thresholds: GateThresholds, allow_breaking_drift: bool) -> Self {
        Self {
            thresholds,
            allow_breaking_drift,
        }
    }

    /// Run every evaluable check and aggregate the verdict.
    pub fn check(
        &self,
        baseline_report: Option<&PostExecutionReport>,
        current_report: Option<&PostExecutionReport>,
        drift_report: Option<&DriftReport>,
        baseline_health: Option<&HealthScore>,
        current_health: Option<&HealthScore>,
    ) -> GateReport {
        let mut checks = Vec::new();
        checks.extend(self.check_completeness(baseline_report, current_report));
        checks.extend(self.check_health(baseline_health, current_health));
        checks.extend(self.check_drift(drift_report));
        checks.extend(self.check_blocking_failures(baseline_report, current_report));

        let failed_checks = checks.iter().filter(|c| !c.passed).count();
        let passed = failed_checks == 0;
        if passed {
            info!(total = checks.len(), "regression gate passed");
        } else {
            warn!(
                failed = failed_checks,
                total = checks.len(),
                "regression gate FAILED"
            );
        }

        GateReport {
            passed,
            total_checks: checks.len(),
            failed_checks,
            checks,
        }
    }

    fn check_completeness(
        &self,
        baseline: Option<&PostExecutionReport>,
        current: Option<&PostExecutionReport>,
    ) -> Vec<GateCheck> {
        let (Some(baseline), Some(current)) = (baseline, current) else {
            return Vec::new();
        };
        let drop = baseline.completeness_pct - current.completeness_pct;
        let passed = drop <= self.thresholds.max_completeness_drop;
        vec![GateCheck {
            check_id: "completeness_regression".to_string(),
            passed,
            message: if passed {
                format!(
                    "Completeness OK: {:.1}% (baseline={:.1}%)",
                    current.completeness_pct, baseline.completeness_pct
                )
            } else {
                format!(
                    "Completeness dropped by {drop:.1}% (baseline={:.1}%, current={:.1}%, max_allowed={:.1}%)",
                    baseline.completeness_pct,
                    current.completeness_pct,
                    self.thresholds.max_completeness_drop
                )
            },
            baseline_value: Some(baseline.completeness_pct),
            current_value: Some(current.completeness_pct),
        }]
    }

    fn check_health(
        &self,
        baseline: Option<&HealthScore>,
        current: Option<&HealthScore>,
    ) -> Vec<GateCheck> {
        let mut checks = Vec::new();
        let min = self.thresholds.min_health_score;

        if let Some(current) = current {
            let passed = current.overall >= min;
            checks.push(GateCheck {
                check_id: "health_minimum".to_string(),
                passed,
                message: if passed {
                    format!("Health score OK: {:.1} >= {min:.1}", current.overall)
                } else {
                    format!("Health score {:.1} below minimum {min:.1}", current.overall)
                },
                baseline_value: None,
                current_value: Some(current.overall),
            });
        }

        if let (Some(baseline), Some(current)) = (baseline, current) {
            let drop = baseline.overall - current.overall;
            let passed = drop <= self.thresholds.max_completeness_drop;
            checks.push(GateCheck {
                check_id: "health_regression".to_string(),
                passed,
                message: if passed {
                    format!(
                        "Health regression OK: {:.1} (baseline={:.1})",
                        current.overall, baseline.overall
                    )
                } else {
                    format!(
                        "Health score dropped by {drop:.1} (baseline={:.1}, current={:.1})",
                        baseline.overall, current.overall
                    )
                },
                baseline_value: Some(baseline.overall),
                current_value: Some(current.overall),
            });
        }

        checks
    }

    fn check_drift(&self, drift: Option<&DriftReport>) -> Vec<GateCheck> {
        let Some(drift) = drift else {
            return Vec::new();
        };

        if !drift.has_breaking_changes() {
            return vec![GateCheck {
                check_id: "contract_drift".to_string(),
                passed: true,
                message: format!(
                    "No breaking drift ({} non-breaking changes)",
                    drift.total_changes
                ),
                baseline_value: None,
                current_value: None,
            }];
        }

        let breaking = drift.breaking_changes();
        let summary = breaking
            .iter()
            .take(3)
            .map(|c| c.description.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let suffix = if breaking.len() > 3 {
            format!(" ... and {} more", breaking.len() - 3)
        } else {
            String::new()
        };

        vec![GateCheck {
            check_id: "contract_drift".to_string(),
            passed: self.allow_breaking_drift,
            message: format!(
                "{} breaking contract changes: {summary}{suffix}",
                drift.breaking_count
            ),
            baseline_value: None,
            current_value: Some(drift.breaking_count as f64),
        }]
    }

    fn check_blocking_failures(
        &self,
        baseline: Option<&PostExecutionReport>,
        current: Option<&PostExecutionReport>,
    ) -> Vec<GateCheck> {
        let Some(current) = current else {
            return Vec::new();
        };
        let baseline_broken = baseline.map_or(0, |b| b.chains_broken) as i64;
        let current_broken = current.chains_broken as i64;
        let increase = current_broken - baseline_broken;
        let passed = increase <= self.thresholds.max_blocking_failure_increase;

        vec![GateCheck {
            check_id: "blocking_failures".to_string(),
            passed,
            message: if passed {
                format!("Broken chains OK: {current_broken} (baseline={baseline_broken})")
            } else {
                format!(
                    "Broken chains increased by {increase} (baseline={baseline_broken}, current={current_broken})"
                )
            },
            baseline_value: Some(baseline_broken as f64),
            current_value: Some(current_broken as f64),
        }]
    }
}
