// SPDX-License-Identifier: MIT OR Apache-2.0
//! SLO budget tracking and validation.
//!
//! Consumption is recorded inside the shared workflow context (under
//! [`BUDGET_KEY`]) so it travels with the run. Health maps onto chain
//! status: within budget is intact, over a phase allocation is degraded,
//! a spent total is broken.

use ctp_contract::{BudgetContract, BudgetSpec};
use ctp_core::{BudgetHealth, ChainStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// Reserved context key holding consumption records:
/// `{budget_id: {phase: amount}}`.
pub const BUDGET_KEY: &str = "_plane_budget";

/// Synthetic phase name for the whole-budget row in summaries.
const TOTAL_PHASE: &str = "__total__";

/// Fraction of the total above which overall consumption is flagged.
const TOTAL_WARN_RATIO: f64 = 0.9;

/// Records budget consumption into a workflow context.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetTracker;

impl BudgetTracker {
    /// Create a tracker.
    pub fn new() -> Self {
        Self
    }

    /// Record `amount` consumed by `phase` against `budget_id`.
    pub fn record(&self, context: &mut Value, budget_id: &str, phase: &str, amount: f64) {
        if !context.is_object() {
            *context = json!({});
        }
        let Some(obj) = context.as_object_mut() else {
            return;
        };
        let budgets = obj
            .entry(BUDGET_KEY.to_string())
            .or_insert_with(|| json!({}));
        if !budgets.is_object() {
            *budgets = json!({});
        }
        let per_budget = budgets
            .as_object_mut()
            .map(|b| b.entry(budget_id.to_string()).or_insert_with(|| json!({})));
        if let Some(per_budget) = per_budget {
            if !per_budget.is_object() {
                *per_budget = json!({});
            }
            if let Some(phases) = per_budget.as_object_mut() {
                let current = phases.get(phase).and_then(Value::as_f64).unwrap_or(0.0);
                phases.insert(phase.to_string(), json!(current + amount));
            }
        }
    }

    /// Total consumed across all phases for a budget.
    pub fn consumed(&self, context: &Value, budget_id: &str) -> f64 {
        context
            .get(BUDGET_KEY)
            .and_then(|b| b.get(budget_id))
            .and_then(Value::as_object)
            .map(|phases| phases.values().filter_map(Value::as_f64).sum())
            .unwrap_or(0.0)
    }

    /// Amount consumed by one phase for a budget.
    pub fn phase_consumed(&self, context: &Value, budget_id: &str, phase: &str) -> f64 {
        context
            .get(BUDGET_KEY)
            .and_then(|b| b.get(budget_id))
            .and_then(|p| p.get(phase))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }
}

/// Result of checking a single budget for a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCheck {
    /// Budget identifier.
    pub budget_id: String,
    /// Phase that was checked (or `__total__`).
    pub phase: String,
    /// Health status.
    pub health: BudgetHealth,
    /// Amount allocated for this phase.
    pub allocated: f64,
    /// Amount consumed by this phase.
    pub consumed: f64,
    /// Remaining phase allocation (negative when over).
    pub remaining: f64,
    /// Human-readable diagnostic.
    pub message: String,
}

impl BudgetCheck {
    /// Map budget health onto chain status for interop with chain
    /// tooling.
    pub fn chain_status(&self) -> ChainStatus {
        self.health.chain_status()
    }
}

/// Aggregated budget check result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    /// `true` iff no budget is exhausted.
    pub passed: bool,
    /// Number of checks performed.
    pub total_checks: usize,
    /// Per-budget check results.
    pub results: Vec<BudgetCheck>,
    /// Number of exhausted budgets.
    pub exhausted_count: usize,
    /// Number of over-allocated budgets.
    pub over_allocated_count: usize,
}

/// Validates consumption against a budget contract.
#[derive(Debug, Clone)]
pub struct BudgetValidator {
    contract: BudgetContract,
    tracker: BudgetTracker,
}

impl BudgetValidator {
    /// Create a validator over a loaded contract.
    pub fn new(contract: BudgetContract) -> Self {
        Self {
            contract,
            tracker: BudgetTracker::new(),
        }
    }

    /// Check all budgets for a specific phase.
    pub fn check_phase(&self, phase: &str, context: &Value) -> BudgetSummary {
        let mut results = Vec::new();
        for budget in &self.contract.budgets {
            let allocated = budget.allocation_for(phase);
            let consumed = self.tracker.phase_consumed(context, &budget.budget_id, phase);
            let total_consumed = self.tracker.consumed(context, &budget.budget_id);
            results.push(self.assess(budget, phase, allocated, consumed, total_consumed));
        }
        summarize(results)
    }

    /// Check every declared allocation plus a whole-budget total row.
    pub fn check_all(&self, context: &Value) -> BudgetSummary {
        let mut results = Vec::new();
        for budget in &self.contract.budgets {
            let total_consumed = self.tracker.consumed(context, &budget.budget_id);

            for allocation in &budget.allocations {
                let consumed =
                    self.tracker
                        .phase_consumed(context, &budget.budget_id, &allocation.phase);
                results.push(self.assess(
                    budget,
                    &allocation.phase,
                    allocation.amount,
                    consumed,
                    total_consumed,
                ));
            }

            let total_health = if total_consumed >= budget.total {
                BudgetHealth::BudgetExhausted
            } else if total_consumed > budget.total * TOTAL_WARN_RATIO {
                BudgetHealth::OverAllocation
            } else {
                BudgetHealth::WithinBudget
            };
            results.push(BudgetCheck {
                budget_id: budget.budget_id.clone(),
                phase: TOTAL_PHASE.to_string(),
                health: total_health,
                allocated: budget.total,
                consumed: total_consumed,
                remaining: budget.total - total_consumed,
                message: message_for(
                    &budget.budget_id,
                    TOTAL_PHASE,
                    total_health,
                    budget.total,
                    total_consumed,
                    budget.total - total_consumed,
                ),
            });
        }
        summarize(results)
    }

    fn assess(
        &self,
        budget: &BudgetSpec,
        phase: &str,
        allocated: f64,
        consumed: f64,
        total_consumed: f64,
    ) -> BudgetCheck {
        let health = if total_consumed >= budget.total {
            BudgetHealth::BudgetExhausted
        } else if consumed > allocated && allocated > 0.0 {
            BudgetHealth::OverAllocation
        } else {
            BudgetHealth::WithinBudget
        };
        let remaining = allocated - consumed;

        if health != BudgetHealth::WithinBudget {
            warn!(
                budget = %budget.budget_id,
                phase,
                ?health,
                consumed,
                allocated,
                "budget check unhealthy"
            );
        }

        BudgetCheck {
            budget_id: budget.budget_id.clone(),
            phase: phase.to_string(),
            health,
            allocated,
            consumed,
            remaining,
            message: message_for(&budget.budget_id, phase, health, allocated, consumed, remaining),
        }
    }
}

fn message_for(
    budget_id: &str,
    phase: &str,
    health: BudgetHealth,
    allocated: f64,
    consumed: f64,
    remaining: f64,
) -> String {
    match health {
        BudgetHealth::WithinBudget => format!(
            "Budget '{budget_id}' phase '{phase}': within budget (consumed {consumed:.2} / allocated {allocated:.2}, remaining {remaining:.2})"
        ),
        BudgetHealth::OverAllocation => format!(
            "Budget '{budget_id}' phase '{phase}': over-allocated (consumed {consumed:.2} / allocated {allocated:.2}, over by {:.2})",
            remaining.abs()
        ),
        BudgetHealth::BudgetExhausted => format!(
            "Budget '{budget_id}' phase '{phase}': EXHAUSTED (consumed {consumed:.2} / allocated {allocated:.2})"
        ),
    }
}

fn summarize(results: Vec<BudgetCheck>) -> BudgetSummary {
    let exhausted_count = results
        .iter()
        .filter(|r| r.health == BudgetHealth::BudgetExhausted)
        .count();
    let over_allocated_count = results
        .iter()
        .filter(|r| r.health == BudgetHealth::OverAllocation)
        .count();
    BudgetSummary {
        passed: exhausted_count == 0,
        total_checks: results.len(),
        exhausted_count,
        over_allocated_count,
        results,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ctp_contract::BudgetContract;

    fn contract() -> BudgetContract {
        BudgetContract::from_yaml_str(
            r#"
contract_id: tokens
budgets:
  - budget_id: llm
    unit: tokens
    total: 1000.0
    allocations:
      - {phase: plan, amount: 200.0}
      - {phase: design, amount: 300.0}
"#,
        )
        .unwrap()
    }

    #[test]
    fn within_budget_is_intact() {
        let tracker = BudgetTracker::new();
        let mut ctx = serde_json::json!({});
        tracker.record(&mut ctx, "llm", "plan", 150.0);

        let summary = BudgetValidator::new(contract()).check_phase("plan", &ctx);
        assert!(summary.passed);
        assert_eq!(summary.results[0].health, BudgetHealth::WithinBudget);
        assert_eq!(summary.results[0].chain_status(), ChainStatus::Intact);
        assert_eq!(summary.results[0].remaining, 50.0);
    }

    #[test]
    fn over_allocation_is_degraded() {
        let tracker = BudgetTracker::new();
        let mut ctx = serde_json::json!({});
        tracker.record(&mut ctx, "llm", "plan", 250.0);

        let summary = BudgetValidator::new(contract()).check_phase("plan", &ctx);
        assert!(summary.passed);
        assert_eq!(summary.results[0].health, BudgetHealth::OverAllocation);
        assert_eq!(summary.results[0].chain_status(), ChainStatus::Degraded);
        assert_eq!(summary.over_allocated_count, 1);
    }

    #[test]
    fn exhausted_total_is_broken_and_fails() {
        let tracker = BudgetTracker::new();
        let mut ctx = serde_json::json!({});
        tracker.record(&mut ctx, "llm", "plan", 600.0);
        tracker.record(&mut ctx, "llm", "design", 500.0);

        let summary = BudgetValidator::new(contract()).check_phase("design", &ctx);
        assert!(!summary.passed);
        assert_eq!(summary.results[0].health, BudgetHealth::BudgetExhausted);
        assert_eq!(summary.results[0].chain_status(), ChainStatus::Broken);
    }

    #[test]
    fn check_all_appends_total_row() {
        let tracker = BudgetTracker::new();
        let mut ctx = serde_json::json!({});
        tracker.record(&mut ctx, "llm", "plan", 100.0);
        tracker.record(&mut ctx, "llm", "design", 850.0);

        let summary = BudgetValidator::new(contract()).check_all(&ctx);
        let total = summary
            .results
            .iter()
            .find(|r| r.phase == "__total__")
            .unwrap();
        // 950 of 1000 consumed: above the 90% warning line.
        assert_eq!(total.health, BudgetHealth::OverAllocation);
        assert_eq!(total.consumed, 950.0);
    }

    #[test]
    fn consumption_accumulates() {
        let tracker = BudgetTracker::new();
        let mut ctx = serde_json::json!({});
        tracker.record(&mut ctx, "llm", "plan", 50.0);
        tracker.record(&mut ctx, "llm", "plan", 25.0);
        assert_eq!(tracker.phase_consumed(&ctx, "llm", "plan"), 75.0);
        assert_eq!(tracker.consumed(&ctx, "llm"), 75.0);
    }

    #[test]
    fn undeclared_phase_has_zero_allocation() {
        let tracker = BudgetTracker::new();
        let mut ctx = serde_json::json!({});
        tracker.record(&mut ctx, "llm", "ship", 10.0);
        let summary = BudgetValidator::new(contract()).check_phase("ship", &ctx);
        // Consumed without allocation, but allocation is zero so no
        // over-allocation flag; totals still track it.
        assert_eq!(summary.results[0].allocated, 0.0);
        assert_eq!(summary.results[0].health, BudgetHealth::WithinBudget);
    }
}
