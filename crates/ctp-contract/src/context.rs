// SPDX-License-Identifier: MIT OR Apache-2.0
//! Context propagation contracts.
//!
//! A context contract declares, for a named pipeline, what each phase
//! requires on entry, what it must produce on exit, and which fields must
//! flow end-to-end (propagation chains). Chains may carry a verification
//! expression, parsed and rejected at load time if it strays outside the
//! restricted language.

use crate::expr::Expr;
use crate::{parse_yaml, read_to_string, ContractError};
use ctp_core::ConstraintSeverity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A single field requirement at a phase boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldRequirement {
    /// Dot-path of the field, relative to the context root.
    pub name: String,
    /// Severity when the field is absent.
    #[serde(default = "default_severity")]
    pub severity: ConstraintSeverity,
    /// Default value a consumer may substitute; reported as `defaulted`
    /// rather than missing when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// What the field is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_severity() -> ConstraintSeverity {
    ConstraintSeverity::Blocking
}

/// Entry-side requirements of a phase.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EntrySpec {
    /// Fields the phase needs to run.
    #[serde(default)]
    pub required: Vec<FieldRequirement>,
    /// Fields that improve the phase's output but never block it.
    #[serde(default)]
    pub enrichment: Vec<FieldRequirement>,
}

/// Exit-side requirements of a phase.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExitSpec {
    /// Fields the phase must have produced.
    #[serde(default)]
    pub required: Vec<FieldRequirement>,
    /// Fields the phase may produce.
    #[serde(default)]
    pub optional: Vec<FieldRequirement>,
}

/// Entry and exit requirements for one phase.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PhaseContract {
    /// Entry-side requirements.
    #[serde(default)]
    pub entry: EntrySpec,
    /// Exit-side requirements.
    #[serde(default)]
    pub exit: ExitSpec,
}

/// One end of a propagation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ChainPoint {
    /// Phase that owns the field.
    pub phase: String,
    /// Dot-path of the field.
    pub field: String,
}

/// A declared end-to-end field flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ChainSpec {
    /// Stable chain identifier.
    pub chain_id: String,
    /// Where the field originates.
    pub source: ChainPoint,
    /// Intermediate hops, in order.
    #[serde(default)]
    pub waypoints: Vec<ChainPoint>,
    /// Where the field must arrive.
    pub destination: ChainPoint,
    /// Optional verification expression over `(context, source, dest)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
}

/// A context propagation contract for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContextContract {
    /// Pipeline this contract governs.
    pub pipeline_id: String,
    /// Contract version string.
    #[serde(default)]
    pub version: Option<String>,
    /// Phase contracts, keyed by phase name. Iteration order is the
    /// default phase order.
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseContract>,
    /// Declared propagation chains.
    #[serde(default)]
    pub propagation_chains: Vec<ChainSpec>,
}

impl ContextContract {
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

    /// Look up a phase contract by name.
    pub fn phase(&self, name: &str) -> Option<&PhaseContract> {
        self.phases.get(name)
    }

    /// Phase names in contract order.
    pub fn phase_order(&self) -> Vec<String> {
        self.phases.keys().cloned().collect()
    }

    /// Semantic validation run at load time.
    ///
    /// Chains must reference declared phases and unique chain ids, and
    /// every verification expression must parse in the restricted
    /// language.
    pub fn validate(&self) -> Result<(), ContractError> {
        let mut reasons = Vec::new();

        if self.pipeline_id.is_empty() {
            reasons.push("pipeline_id must not be empty".to_string());
        }

        let mut seen = std::collections::BTreeSet::new();
        for chain in &self.propagation_chains {
            if !seen.insert(chain.chain_id.as_str()) {
                reasons.push(format!("duplicate chain_id '{}'", chain.chain_id));
            }
            for point in [&chain.source, &chain.destination]
                .into_iter()
                .chain(chain.waypoints.iter())
            {
                if !self.phases.contains_key(&point.phase) {
                    reasons.push(format!(
                        "chain '{}' references undeclared phase '{}'",
                        chain.chain_id, point.phase
                    ));
                }
            }
            if let Some(expression) = &chain.verification {
                if let Err(err) = Expr::parse(expression) {
                    reasons.push(format!(
                        "chain '{}' verification rejected: {err}",
                        chain.chain_id
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

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
pipeline_id: startd8
version: "1.0"
phases:
  plan:
    entry:
      required:
        - name: plan.goal
    exit:
      required:
        - name: plan.domain
          severity: blocking
  design:
    entry:
      required:
        - name: plan.domain
      enrichment:
        - name: plan.constraints
          severity: advisory
    exit:
      required:
        - name: design.target
propagation_chains:
  - chain_id: domain-to-target
    source: {phase: plan, field: plan.domain}
    destination: {phase: design, field: design.target}
    verification: "source == dest"
"#;

    #[test]
    fn loads_and_validates() {
        let contract = ContextContract::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(contract.pipeline_id, "startd8");
        assert_eq!(contract.phases.len(), 2);
        assert_eq!(contract.propagation_chains.len(), 1);
        assert_eq!(
            contract.phases["plan"].exit.required[0].severity,
            ctp_core::ConstraintSeverity::Blocking
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let text = SAMPLE.replace("version:", "verzion:");
        let err = ContextContract::from_yaml_str(&text).unwrap_err();
        assert!(matches!(err, ContractError::Parse { .. }));
    }

    #[test]
    fn chains_must_reference_declared_phases() {
        let text = SAMPLE.replace("phase: design, field: design.target", "phase: ship, field: x");
        let err = ContextContract::from_yaml_str(&text).unwrap_err();
        let ContractError::Validation { reasons } = err else {
            panic!("expected validation error");
        };
        assert!(reasons.iter().any(|r| r.contains("undeclared phase")));
    }

    #[test]
    fn bad_verification_expressions_are_rejected_at_load() {
        let text = SAMPLE.replace("source == dest", "__import__('os')");
        let err = ContextContract::from_yaml_str(&text).unwrap_err();
        let ContractError::Validation { reasons } = err else {
            panic!("expected validation error");
        };
        assert!(reasons.iter().any(|r| r.contains("verification rejected")));
    }

    #[test]
    fn severity_defaults_to_blocking() {
        let contract = ContextContract::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(
            contract.phases["plan"].entry.required[0].severity,
            ctp_core::ConstraintSeverity::Blocking
        );
    }
}
