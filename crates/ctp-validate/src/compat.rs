// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layer 2: schema compatibility checking.
//!
//! Read-only: evaluates whether a payload from one service is compatible
//! with the mappings declared toward another service. It never transforms
//! the payload; [`CompatibilityChecker::translate`] is offered to
//! consumers that do.

use ctp_contract::{CompatibilitySpec, FieldMapping, SourceType};
use ctp_core::{resolve_path, CompatibilityLevel, ConstraintSeverity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// The kinds of drift a mapping can exhibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    /// Source field absent from the payload.
    MissingField,
    /// Source field present with the wrong type.
    TypeMismatch,
    /// Value not in the declared allowed set.
    ValueOutsideSet,
    /// Value has no entry in the translation table.
    UnmappedValue,
}

/// Per-mapping outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCompatibilityDetail {
    /// Source-side field path.
    pub source_field: String,
    /// Target-side field path.
    pub target_field: String,
    /// Whether this mapping held.
    pub compatible: bool,
    /// Drift kind when it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift_type: Option<DriftType>,
    /// Human-readable detail.
    pub detail: String,
}

/// Aggregate compatibility verdict for one payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// `false` only when a BLOCKING mapping failed.
    pub compatible: bool,
    /// Depth the check ran at.
    pub level: CompatibilityLevel,
    /// Producing service.
    pub source_service: String,
    /// Consuming service.
    pub target_service: String,
    /// Per-mapping detail.
    pub field_results: Vec<FieldCompatibilityDetail>,
    /// Messages for every observed drift, blocking or not.
    pub drift_details: Vec<String>,
    /// Worst severity observed (warning when clean).
    pub severity: ConstraintSeverity,
    /// One-line summary.
    pub message: String,
}

/// Layer 2 checker bound to one loaded spec.
#[derive(Debug, Clone)]
pub struct CompatibilityChecker {
    spec: CompatibilitySpec,
}

impl CompatibilityChecker {
    /// Create a checker over a loaded spec.
    pub fn new(spec: CompatibilitySpec) -> Self {
        Self { spec }
    }

    /// Run a check at the given level.
    pub fn check(
        &self,
        source_service: &str,
        target_service: &str,
        payload: &Value,
        level: CompatibilityLevel,
    ) -> CompatibilityResult {
        self.run(source_service, target_service, payload, level)
    }

    /// Structural check: field presence and type only.
    pub fn check_structural(
        &self,
        source_service: &str,
        target_service: &str,
        payload: &Value,
    ) -> CompatibilityResult {
        self.run(source_service, target_service, payload, CompatibilityLevel::Structural)
    }

    /// Semantic check: structural plus allowed sets and translations.
    pub fn check_semantic(
        &self,
        source_service: &str,
        target_service: &str,
        payload: &Value,
    ) -> CompatibilityResult {
        self.run(source_service, target_service, payload, CompatibilityLevel::Semantic)
    }

    /// Translate a value through a mapping's table, when one is declared.
    pub fn translate(mapping: &FieldMapping, value: &str) -> Option<String> {
        mapping.value_map.as_ref()?.get(value).cloned()
    }

    fn run(
        &self,
        source_service: &str,
        target_service: &str,
        payload: &Value,
        level: CompatibilityLevel,
    ) -> CompatibilityResult {
        let mappings = self.spec.mappings_between(source_service, target_service);
        let mut field_results = Vec::with_capacity(mappings.len());
        let mut drift_details = Vec::new();
        let mut has_blocking_drift = false;
        let mut max_severity = ConstraintSeverity::Advisory;

        for mapping in mappings {
            let finding = evaluate_mapping(mapping, payload, level);
            if let Some(drift) = finding.drift_type {
                drift_details.push(finding.detail.clone());
                if mapping.severity == ConstraintSeverity::Blocking {
                    has_blocking_drift = true;
                }
                max_severity = max_severity.max(mapping.severity);
                warn!(
                    source_field = %mapping.source_field,
                    drift = ?drift,
                    severity = %mapping.severity,
                    "schema drift detected"
                );
            }
            field_results.push(finding);
        }

        let compatible = !has_blocking_drift;
        let message = if compatible && drift_details.is_empty() {
            "All fields compatible".to_string()
        } else if compatible {
            format!("Compatible with {} warning(s)", drift_details.len())
        } else {
            format!("Incompatible: {} drift(s) detected", drift_details.len())
        };

        CompatibilityResult {
            compatible,
            level,
            source_service: source_service.to_string(),
            target_service: target_service.to_string(),
            field_results,
            severity: if drift_details.is_empty() {
                ConstraintSeverity::Warning
            } else {
                max_severity
            },
            drift_details,
            message,
        }
    }
}

fn evaluate_mapping(
    mapping: &FieldMapping,
    payload: &Value,
    level: CompatibilityLevel,
) -> FieldCompatibilityDetail {
    let ok = || FieldCompatibilityDetail {
        source_field: mapping.source_field.clone(),
        target_field: mapping.target_field.clone(),
        compatible: true,
        drift_type: None,
        detail: String::new(),
    };
    let drift = |kind: DriftType, detail: String| FieldCompatibilityDetail {
        source_field: mapping.source_field.clone(),
        target_field: mapping.target_field.clone(),
        compatible: false,
        drift_type: Some(kind),
        detail,
    };

    let Some(value) = resolve_path(payload, &mapping.source_field) else {
        return drift(
            DriftType::MissingField,
            format!("Field '{}' not found in payload", mapping.source_field),
        );
    };

    if !type_compatible(value, mapping.source_type) {
        return drift(
            DriftType::TypeMismatch,
            format!(
                "Field '{}' expected type '{:?}', got '{}'",
                mapping.source_field,
                mapping.source_type,
                json_type_name(value)
            ),
        );
    }

    if level == CompatibilityLevel::Structural {
        return ok();
    }

    let text = value_as_text(value);

    if let Some(allowed) = &mapping.source_values {
        if !allowed.iter().any(|v| v == &text) {
            return drift(
                DriftType::ValueOutsideSet,
                format!(
                    "Value '{text}' for '{}' not in allowed set {allowed:?}",
                    mapping.source_field
                ),
            );
        }
    }

    if let Some(map) = &mapping.value_map {
        if !map.contains_key(&text) {
            return drift(
                DriftType::UnmappedValue,
                format!(
                    "Value '{text}' for '{}' has no translation in mapping",
                    mapping.source_field
                ),
            );
        }
    }

    ok()
}

fn type_compatible(value: &Value, expected: SourceType) -> bool {
    match expected {
        SourceType::Str => value.is_string(),
        SourceType::Int => value.is_i64() || value.is_u64(),
        SourceType::Float => value.is_number(),
        SourceType::Bool => value.is_boolean(),
        SourceType::List => value.is_array(),
        SourceType::Map => value.is_object(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
