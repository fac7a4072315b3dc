// SPDX-License-Identifier: MIT OR Apache-2.0
//! SLO budget contracts.
//!
//! A budget contract declares how much of a shared resource (error budget,
//! token budget, time budget) each phase may consume. The tracker and
//! validator live in `ctp-gates`.

use crate::{parse_yaml, read_to_string, ContractError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A per-phase allocation inside a budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BudgetAllocation {
    /// Phase the allocation belongs to.
    pub phase: String,
    /// Amount allocated, in the budget's unit.
    pub amount: f64,
}

/// A single budget with its total and allocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BudgetSpec {
    /// Stable budget identifier.
    pub budget_id: String,
    /// Unit label, e.g. `"tokens"` or `"minutes"`.
    pub unit: String,
    /// Total budget across all phases.
    pub total: f64,
    /// Per-phase allocations.
    #[serde(default)]
    pub allocations: Vec<BudgetAllocation>,
}

impl BudgetSpec {
    /// The amount allocated to `phase`, or `0.0` when undeclared.
    pub fn allocation_for(&self, phase: &str) -> f64 {
        self.allocations
            .iter()
            .find(|a| a.phase == phase)
            .map_or(0.0, |a| a.amount)
    }
}

/// A budget propagation contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BudgetContract {
    /// Stable contract identifier.
    pub contract_id: String,
    /// Contract version string.
    #[serde(default)]
    pub version: Option<String>,
    /// Declared budgets.
    #[serde(default)]
    pub budgets: Vec<BudgetSpec>,
}

impl BudgetContract {
    /// Parse from a YAML string and validate.
    pub fn from_yaml_str(text: &str) -> Result<Self, ContractError> {
        let contract: Self = parse_yaml(text)?;
        contract.validate()?;
        Ok(contract)
    }

    /// Load from a YAML file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ContractError> {
        Self::from_yaml_str(&read_to_string(path.as_ref())?)
    }

    /// Semantic validation run at load time.
    ///
    /// Totals must be positive and allocations must not individually
    /// exceed the total. Over-subscription across phases is allowed; the
    /// validator reports it at run time.
    pub fn validate(&self) -> Result<(), ContractError> {
        let mut reasons = Vec::new();
        for budget in &self.budgets {
            if budget.total <= 0.0 {
                reasons.push(format!(
                    "budget '{}' must have a positive total",
                    budget.budget_id
                ));
            }
            for allocation in &budget.allocations {
                if allocation.amount < 0.0 {
                    reasons.push(format!(
                        "budget '{}' phase '{}' has a negative allocation",
                        budget.budget_id, allocation.phase
                    ));
                }
                if allocation.amount > budget.total {
                    reasons.push(format!(
                        "budget '{}' phase '{}' allocation exceeds the total",
                        budget.budget_id, allocation.phase
                    ));
                }
            }
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ContractError::Validation { reasons })
        }
    }
}
