// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layer 6: field provenance tracking.
//!
//! Provenance metadata is stored inside the context itself (under
//! [`PROVENANCE_KEY`]) so it travels with the context through the
//! pipeline. Chain checks evaluate the final context snapshot and are
//! order-independent.

use chrono::{DateTime, Utc};
use ctp_contract::{ChainSpec, ContextContract, Expr};
use ctp_core::{resolve_path, ChainStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Reserved context key under which provenance records are stored.
pub const PROVENANCE_KEY: &str = "_plane_provenance";

/// Provenance record for a single field at a point in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProvenance {
    /// Phase that set the field.
    pub origin_phase: String,
    /// When it was set.
    pub set_at: DateTime<Utc>,
    /// First 8 hex chars of sha256 over the canonical JSON of the value.
    pub value_hash: String,
    /// Evaluator that scored the field, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_by: Option<String>,
    /// Evaluation score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_score: Option<f64>,
    /// When the evaluation happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_timestamp: Option<DateTime<Utc>>,
}

/// Result of stamping an evaluation onto a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Field that was evaluated.
    pub field_path: String,
    /// Evaluator identifier.
    pub evaluator: String,
    /// Score, when one was given.
    pub score: Option<f64>,
    /// When the evaluation was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Result of checking a single propagation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainResult {
    /// Chain identifier.
    pub chain_id: String,
    /// End-to-end status.
    pub status: ChainStatus,
    /// Whether the source field resolved.
    pub source_present: bool,
    /// Whether the destination field resolved.
    pub destination_present: bool,
    /// Presence of each declared waypoint, in order.
    pub waypoints_present: Vec<bool>,
    /// Human-readable detail.
    pub message: String,
}

/// Short content hash for provenance records.
pub fn value_hash(value: &Value) -> String {
    // serde_json serializes object keys in sorted order, so this is a
    // canonical form.
    let canonical = value.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    let hex = format!("{digest:x}");
    hex[..8].to_string()
}

/// Tracks field provenance across workflow phases.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagationTracker;

impl PropagationTracker {
    /// Create a tracker.
    pub fn new() -> Self {
        Self
    }

    /// Record provenance for a field set during `phase`.
    ///
    /// The value itself is not stored, only its hash.
    pub fn stamp(&self, context: &mut Value, phase: &str, field_path: &str, value: &Value) {
        let record = FieldProvenance {
            origin_phase: phase.to_string(),
            set_at: Utc::now(),
            value_hash: value_hash(value),
            evaluated_by: None,
            evaluation_score: None,
            evaluation_timestamp: None,
        };
        debug!(phase, field = field_path, hash = %record.value_hash, "stamped provenance");
        self.insert(context, field_path, record);
    }

    /// Retrieve provenance for a field, or `None` when not stamped.
    pub fn provenance(&self, context: &Value, field_path: &str) -> Option<FieldProvenance> {
        let record = context.get(PROVENANCE_KEY)?.get(field_path)?;
        serde_json::from_value(record.clone()).ok()
    }

    /// Record that a field has been evaluated, updating its existing
    /// provenance or creating a minimal one.
    pub fn stamp_evaluation(
        &self,
        context: &mut Value,
        field_path: &str,
        evaluator: &str,
        score: Option<f64>,
    ) -> EvaluationResult {
        let timestamp = Utc::now();
        let mut record = self.provenance(context, field_path).unwrap_or(FieldProvenance {
            origin_phase: "unknown".to_string(),
            set_at: timestamp,
            value_hash: String::new(),
            evaluated_by: None,
            evaluation_score: None,
            evaluation_timestamp: None,
        });
        record.evaluated_by = Some(evaluator.to_string());
        record.evaluation_score = score;
        record.evaluation_timestamp = Some(timestamp);
        self.insert(context, field_path, record);

        debug!(field = field_path, evaluator, ?score, "stamped evaluation");
        EvaluationResult {
            field_path: field_path.to_string(),
            evaluator: evaluator.to_string(),
            score,
            timestamp,
        }
    }

    fn insert(&self, context: &mut Value, field_path: &str, record: FieldProvenance) {
        if !context.is_object() {
            *context = json!({});
        }
        let map = context
            .as_object_mut()
            .and_then(|obj| {
                obj.entry(PROVENANCE_KEY.to_string())
                    .or_insert_with(|| json!({}))
                    .as_object_mut()
            });
        if let Some(map) = map {
            if let Ok(value) = serde_json::to_value(&record) {
                map.insert(field_path.to_string(), value);
            }
        }
    }

    /// Check a single propagation chain against the current context.
    pub fn check_chain(&self, chain: &ChainSpec, context: &Value) -> ChainResult {
        let source_value = resolve_path(context, &chain.source.field);
        let dest_value = resolve_path(context, &chain.destination.field);
        let waypoints_present: Vec<bool> = chain
            .waypoints
            .iter()
            .map(|wp| resolve_path(context, &wp.field).is_some())
            .collect();

        let Some(source_value) = source_value else {
            return ChainResult {
                chain_id: chain.chain_id.clone(),
                status: ChainStatus::Broken,
                source_present: false,
                destination_present: dest_value.is_some(),
                waypoints_present,
                message: format!(
                    "Source field '{}' absent at phase '{}'",
                    chain.source.field, chain.source.phase
                ),
            };
        };

        let Some(dest_value) = dest_value else {
            return ChainResult {
                chain_id: chain.chain_id.clone(),
                status: ChainStatus::Broken,
                source_present: true,
                destination_present: false,
                waypoints_present,
                message: format!(
                    "Destination field '{}' absent at phase '{}'",
                    chain.destination.field, chain.destination.phase
                ),
            };
        };

        if is_default_value(dest_value) {
            return ChainResult {
                chain_id: chain.chain_id.clone(),
                status: ChainStatus::Degraded,
                source_present: true,
                destination_present: true,
                waypoints_present,
                message: format!(
                    "Destination field '{}' has default/empty value at phase '{}'",
                    chain.destination.field, chain.destination.phase
                ),
            };
        }

        // Verification expressions were AST-validated at contract load;
        // a parse failure here means the chain was built by hand.
        if let Some(expression) = &chain.verification {
            let verdict = Expr::parse(expression)
                .map_err(|e| e.to_string())
                .and_then(|expr| {
                    expr.eval(context, source_value, dest_value)
                        .map_err(|e| e.to_string())
                });
            let failure = match verdict {
                Ok(true) => None,
                Ok(false) => Some(format!("Verification failed: {expression}")),
                Err(reason) => Some(format!("Verification error: {reason}")),
            };
            if let Some(message) = failure {
                return ChainResult {
                    chain_id: chain.chain_id.clone(),
                    status: ChainStatus::Broken,
                    source_present: true,
                    destination_present: true,
                    waypoints_present,
                    message,
                };
            }
        }

        ChainResult {
            chain_id: chain.chain_id.clone(),
            status: ChainStatus::Intact,
            source_present: true,
            destination_present: true,
            waypoints_present,
            message: "Chain intact".to_string(),
        }
    }

    /// Check every chain declared in a contract.
    pub fn check_all(&self, contract: &ContextContract, context: &Value) -> Vec<ChainResult> {
        let mut results = Vec::with_capacity(contract.propagation_chains.len());
        for chain in &contract.propagation_chains {
            let result = self.check_chain(chain, context);
            if result.status != ChainStatus::Intact {
                warn!(
                    chain = %result.chain_id,
                    status = %result.status,
                    message = %result.message,
                    "propagation chain unhealthy"
                );
            }
            results.push(result);
        }
        results
    }
}

/// Values treated as "arrived, but degraded".
fn is_default_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || s == "unknown",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
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
  plan: {}
  design: {}
propagation_chains:
  - chain_id: domain-to-target
    source: {phase: plan, field: plan.domain}
    destination: {phase: design, field: design.target}
  - chain_id: verified
    source: {phase: plan, field: plan.domain}
    destination: {phase: design, field: design.domain_copy}
    verification: "source == dest"
"#,
        )
        .unwrap()
    }

    #[test]
    fn intact_chain() {
        let tracker = PropagationTracker::new();
        let ctx = json!({"plan": {"domain": "web"}, "design": {"target": "web"}});
        let result = tracker.check_chain(&contract().propagation_chains[0], &ctx);
        assert_eq!(result.status, ChainStatus::Intact);
        assert!(result.source_present && result.destination_present);
    }

    #[test]
    fn empty_destination_is_degraded() {
        let tracker = PropagationTracker::new();
        let ctx = json!({"plan": {"domain": "web"}, "design": {"target": ""}});
        let result = tracker.check_chain(&contract().propagation_chains[0], &ctx);
        assert_eq!(result.status, ChainStatus::Degraded);
    }

    #[test]
    fn missing_source_is_broken() {
        let tracker = PropagationTracker::new();
        let ctx = json!({"design": {"target": "web"}});
        let result = tracker.check_chain(&contract().propagation_chains[0], &ctx);
        assert_eq!(result.status, ChainStatus::Broken);
        assert!(!result.source_present);
        assert!(result.message.contains("plan.domain"));
    }

    #[test]
    fn failed_verification_is_broken() {
        let tracker = PropagationTracker::new();
        let ctx = json!({"plan": {"domain": "web"}, "design": {"domain_copy": "api"}});
        let result = tracker.check_chain(&contract().propagation_chains[1], &ctx);
        assert_eq!(result.status, ChainStatus::Broken);
        assert!(result.message.contains("Verification failed"));
    }

    #[test]
    fn stamp_and_read_provenance() {
        let tracker = PropagationTracker::new();
        let mut ctx = json!({});
        tracker.stamp(&mut ctx, "plan", "plan.domain", &json!("web"));

        let record = tracker.provenance(&ctx, "plan.domain").unwrap();
        assert_eq!(record.origin_phase, "plan");
        assert_eq!(record.value_hash.len(), 8);
        assert_eq!(record.value_hash, value_hash(&json!("web")));
    }

    #[test]
    fn evaluation_updates_existing_record() {
        let tracker = PropagationTracker::new();
        let mut ctx = json!({});
        tracker.stamp(&mut ctx, "plan", "plan.domain", &json!("web"));
        let eval = tracker.stamp_evaluation(&mut ctx, "plan.domain", "judge-1", Some(0.9));
        assert_eq!(eval.evaluator, "judge-1");

        let record = tracker.provenance(&ctx, "plan.domain").unwrap();
        assert_eq!(record.origin_phase, "plan");
        assert_eq!(record.evaluated_by.as_deref(), Some("judge-1"));
        assert_eq!(record.evaluation_score, Some(0.9));
    }

    #[test]
    fn evaluation_without_prior_stamp_creates_minimal_record() {
        let tracker = PropagationTracker::new();
        let mut ctx = json!({});
        tracker.stamp_evaluation(&mut ctx, "design.target", "judge-2", None);
        let record = tracker.provenance(&ctx, "design.target").unwrap();
        assert_eq!(record.origin_phase, "unknown");
        assert!(record.value_hash.is_empty());
    }

    #[test]
    fn value_hash_is_deterministic() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(value_hash(&a), value_hash(&b));
    }
}
