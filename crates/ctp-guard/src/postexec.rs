// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layer 5: post-execution validation.
//!
//! Runs after all workflow phases complete. Three checks:
//!
//! 1. every declared propagation chain verifies end-to-end against the
//!    final context;
//! 2. the final phase's exit requirements hold;
//! 3. when a Layer 4 summary is supplied, runtime records are
//!    cross-referenced to surface *late corruption* (phase passed at
//!    runtime, chain now broken) and *late healing* (phase failed at
//!    runtime, chains now intact).

use crate::guard::WorkflowRunSummary;
use crate::tracker::{ChainResult, PropagationTracker};
use ctp_contract::ContextContract;
use ctp_core::ChainStatus;
use ctp_validate::{BoundaryValidator, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Kind of discrepancy between runtime records and post-execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Phase passed at runtime but a chain touching it is now broken.
    LateCorruption,
    /// Phase failed at runtime but every chain touching it is intact.
    LateHealing,
}

/// A single runtime/post-execution discrepancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDiscrepancy {
    /// Phase involved.
    pub phase: String,
    /// Discrepancy kind.
    pub kind: DiscrepancyKind,
    /// Human-readable detail.
    pub message: String,
}

/// Aggregated post-execution validation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostExecutionReport {
    /// `true` iff no chain is broken and the final exit passed.
    pub passed: bool,
    /// Per-chain outcomes.
    pub chain_results: Vec<ChainResult>,
    /// Total chains checked.
    pub chains_total: usize,
    /// Chains intact.
    pub chains_intact: usize,
    /// Chains degraded.
    pub chains_degraded: usize,
    /// Chains broken.
    pub chains_broken: usize,
    /// `intact / total × 100`, one decimal; `100.0` with no chains.
    pub completeness_pct: f64,
    /// Exit validation of the final phase, when one was identified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_exit_result: Option<ValidationResult>,
    /// Cross-reference findings against the runtime summary.
    pub runtime_discrepancies: Vec<RuntimeDiscrepancy>,
}

/// Validates context integrity after all workflow phases complete.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostExecutionValidator {
    tracker: PropagationTracker,
    boundary: BoundaryValidator,
}

impl PostExecutionValidator {
    /// Create a validator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run all post-execution checks.
    ///
    /// `phase_order` defaults to the contract's declared phase order;
    /// `runtime_summary` enables the cross-reference check.
    pub fn validate(
        &self,
        contract: &ContextContract,
        final_context: &Value,
        phase_order: Option<&[String]>,
        runtime_summary: Option<&WorkflowRunSummary>,
    ) -> PostExecutionReport {
        let declared_order;
        let phase_order: &[String] = match phase_order {
            Some(order) => order,
            None => {
                declared_order = contract.phase_order();
                &declared_order
            }
        };

        let chain_results = self.tracker.check_all(contract, final_context);
        let mut report = summarize_chains(chain_results);

        report.final_exit_result = phase_order.last().and_then(|last| {
            contract
                .phase(last)
                .map(|_| self.boundary.validate_exit(last, final_context, contract))
        });
        if let Some(exit) = &report.final_exit_result {
            if !exit.passed {
                report.passed = false;
            }
        }

        if let Some(summary) = runtime_summary {
            report.runtime_discrepancies =
                cross_reference(contract, summary, &report.chain_results, phase_order);
        }

        if !report.passed {
            warn!(
                intact = report.chains_intact,
                total = report.chains_total,
                broken = report.chains_broken,
                discrepancies = report.runtime_discrepancies.len(),
                "post-execution validation failed"
            );
        } else if report.chains_degraded > 0 || !report.runtime_discrepancies.is_empty() {
            info!(
                degraded = report.chains_degraded,
                discrepancies = report.runtime_discrepancies.len(),
                "post-execution validation passed with issues"
            );
        }

        report
    }

    /// Run only the chain integrity check.
    pub fn validate_chains(
        &self,
        contract: &ContextContract,
        final_context: &Value,
    ) -> PostExecutionReport {
        summarize_chains(self.tracker.check_all(contract, final_context))
    }
}

fn summarize_chains(chain_results: Vec<ChainResult>) -> PostExecutionReport {
    let chains_total = chain_results.len();
    let chains_intact = chain_results
        .iter()
        .filter(|r| r.status == ChainStatus::Intact)
        .count();
    let chains_degraded = chain_results
        .iter()
        .filter(|r| r.status == ChainStatus::Degraded)
        .count();
    let chains_broken = chain_results
        .iter()
        .filter(|r| r.status == ChainStatus::Broken)
        .count();
    let completeness_pct = if chains_total == 0 {
        100.0
    } else {
        (chains_intact as f64 / chains_total as f64 * 1000.0).round() / 10.0
    };

    PostExecutionReport {
        passed: chains_broken == 0,
        chain_results,
        chains_total,
        chains_intact,
        chains_degraded,
        chains_broken,
        completeness_pct,
        final_exit_result: None,
        runtime_discrepancies: Vec::new(),
    }
}

/// Compare runtime records against post-execution chain state.
///
/// A chain touches the phases declared in its source, waypoints, and
/// destination; discrepancies are attributed to exactly those phases.
fn cross_reference(
    contract: &ContextContract,
    summary: &WorkflowRunSummary,
    chain_results: &[ChainResult],
    phase_order: &[String],
) -> Vec<RuntimeDiscrepancy> {
    let status_by_chain: BTreeMap<&str, ChainStatus> = chain_results
        .iter()
        .map(|r| (r.chain_id.as_str(), r.status))
        .collect();

    let mut phase_has_broken: BTreeSet<&str> = BTreeSet::new();
    let mut phase_not_intact: BTreeSet<&str> = BTreeSet::new();
    let mut phase_touched: BTreeSet<&str> = BTreeSet::new();

    for chain in &contract.propagation_chains {
        let Some(status) = status_by_chain.get(chain.chain_id.as_str()) else {
            continue;
        };
        let touched = [&chain.source, &chain.destination]
            .into_iter()
            .chain(chain.waypoints.iter())
            .map(|p| p.phase.as_str());
        for phase in touched {
            phase_touched.insert(phase);
            if *status == ChainStatus::Broken {
                phase_has_broken.insert(phase);
            }
            if *status != ChainStatus::Intact {
                phase_not_intact.insert(phase);
            }
        }
    }

    let runtime_passed: BTreeMap<&str, bool> = summary
        .phases
        .iter()
        .map(|r| (r.phase.as_str(), r.passed()))
        .collect();

    let mut discrepancies = Vec::new();
    for phase in phase_order {
        let Some(&passed) = runtime_passed.get(phase.as_str()) else {
            // Phase was not tracked at runtime.
            continue;
        };
        if !phase_touched.contains(phase.as_str()) {
            continue;
        }
        if passed && phase_has_broken.contains(phase.as_str()) {
            discrepancies.push(RuntimeDiscrepancy {
                phase: phase.clone(),
                kind: DiscrepancyKind::LateCorruption,
                message: format!(
                    "Phase '{phase}' passed runtime boundary checks but a propagation chain is now broken"
                ),
            });
        } else if !passed && !phase_not_intact.contains(phase.as_str()) {
            discrepancies.push(RuntimeDiscrepancy {
                phase: phase.clone(),
                kind: DiscrepancyKind::LateHealing,
                message: format!(
                    "Phase '{phase}' failed runtime boundary checks but all propagation chains are now intact"
                ),
            });
        }
    }
    discrepancies
}
