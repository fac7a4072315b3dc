// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layer 3: semantic convention validation.
//!
//! Validates an attribute map against a [`ConventionContract`]: canonical
//! names pass, known aliases resolve with a warning, unknown names are
//! advisory, invalid enum values warn, and missing REQUIRED attributes
//! block.

use ctp_contract::{ConventionContract, RequirementLevel};
use ctp_core::ConstraintSeverity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Classification of a single attribute finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeStatus {
    /// Canonical name with a valid value.
    Valid,
    /// Known alias; resolved to the canonical name.
    AliasResolved,
    /// Name not in the convention at all.
    Unknown,
    /// Value outside the allowed set (or required attribute missing).
    InvalidValue,
}

/// Result of validating one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValidationResult {
    /// The attribute name as provided.
    pub attribute: String,
    /// Resolved canonical name, `None` when unknown.
    pub canonical_name: Option<String>,
    /// Finding classification.
    pub status: AttributeStatus,
    /// Severity of the finding.
    pub severity: ConstraintSeverity,
    /// Human-readable detail.
    pub message: String,
}

/// Aggregate result of validating an attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConventionValidationResult {
    /// `true` iff no blocking violations were found.
    pub passed: bool,
    /// Number of attributes supplied.
    pub total_checked: usize,
    /// Per-attribute findings (including synthesized missing-required
    /// entries).
    pub results: Vec<AttributeValidationResult>,
    /// Count of blocking violations.
    pub violations: usize,
    /// Count of aliases resolved to canonical names.
    pub aliases_resolved: usize,
}

/// Layer 3 validator with O(1) lookup tables built at construction.
#[derive(Debug, Clone)]
pub struct ConventionValidator {
    // canonical name -> allowed values (None = any)
    allowed_values: BTreeMap<String, Option<BTreeSet<String>>>,
    // alias -> canonical name
    alias_to_canonical: BTreeMap<String, String>,
    // canonical name -> requirement level
    requirement_levels: BTreeMap<String, RequirementLevel>,
    // enum name -> (values, extensible)
    enums: BTreeMap<String, (BTreeSet<String>, bool)>,
}

impl ConventionValidator {
    /// Build lookup tables from a loaded contract.
    pub fn new(contract: &ConventionContract) -> Self {
        let mut allowed_values = BTreeMap::new();
        let mut alias_to_canonical = BTreeMap::new();
        let mut requirement_levels = BTreeMap::new();
        for attribute in &contract.attributes {
            allowed_values.insert(
                attribute.name.clone(),
                attribute
                    .allowed_values
                    .as_ref()
                    .map(|v| v.iter().cloned().collect()),
            );
            requirement_levels.insert(attribute.name.clone(), attribute.requirement_level);
            for alias in &attribute.aliases {
                alias_to_canonical.insert(alias.clone(), attribute.name.clone());
            }
        }
        let enums = contract
            .enums
            .iter()
            .map(|e| {
                (
                    e.name.clone(),
                    (e.values.iter().cloned().collect(), e.extensible),
                )
            })
            .collect();
        Self {
            allowed_values,
            alias_to_canonical,
            requirement_levels,
            enums,
        }
    }

    /// Resolve a name to its canonical form (identity for canonical
    /// names), or `None` when unknown.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.allowed_values.contains_key(name) {
            return Some(name);
        }
        self.alias_to_canonical.get(name).map(String::as_str)
    }

    /// Whether a value is acceptable for an attribute. Unknown attributes
    /// and unconstrained attributes accept anything.
    pub fn validate_value(&self, name: &str, value: &Value) -> bool {
        let Some(canonical) = self.resolve_alias(name) else {
            return true;
        };
        match self.allowed_values.get(canonical) {
            Some(Some(allowed)) => allowed.contains(&value_text(value)),
            _ => true,
        }
    }

    /// Whether a value belongs to a declared enum. `None` when the enum
    /// itself is unknown; extensible enums accept anything.
    pub fn validate_enum(&self, enum_name: &str, value: &str) -> Option<bool> {
        self.enums
            .get(enum_name)
            .map(|(values, extensible)| *extensible || values.contains(value))
    }

    /// Validate a full attribute map.
    pub fn validate_attributes(
        &self,
        attributes: &BTreeMap<String, Value>,
    ) -> ConventionValidationResult {
        let mut results = Vec::with_capacity(attributes.len());
        let mut violations = 0;
        let mut aliases_resolved = 0;
        let mut seen_canonical: BTreeSet<String> = BTreeSet::new();

        for (name, value) in attributes {
            let result = self.validate_single(name, value);
            if let Some(canonical) = &result.canonical_name {
                if self.allowed_values.contains_key(canonical) {
                    seen_canonical.insert(canonical.clone());
                }
            }
            if result.status == AttributeStatus::AliasResolved {
                aliases_resolved += 1;
            }
            if result.severity == ConstraintSeverity::Blocking {
                violations += 1;
            }
            results.push(result);
        }

        for (canonical, level) in &self.requirement_levels {
            if *level == RequirementLevel::Required && !seen_canonical.contains(canonical) {
                results.push(AttributeValidationResult {
                    attribute: canonical.clone(),
                    canonical_name: Some(canonical.clone()),
                    status: AttributeStatus::InvalidValue,
                    severity: ConstraintSeverity::Blocking,
                    message: format!("Required attribute '{canonical}' is missing"),
                });
                violations += 1;
            }
        }

        let passed = violations == 0;
        if !passed {
            warn!(
                violations,
                checked = attributes.len(),
                "convention validation failed"
            );
        } else if aliases_resolved > 0 {
            info!(aliases_resolved, "convention validation passed with aliases resolved");
        }

        ConventionValidationResult {
            passed,
            total_checked: attributes.len(),
            results,
            violations,
            aliases_resolved,
        }
    }

    fn validate_single(&self, name: &str, value: &Value) -> AttributeValidationResult {
        // Canonical name.
        if self.allowed_values.contains_key(name) {
            if !self.validate_value(name, value) {
                return AttributeValidationResult {
                    attribute: name.to_string(),
                    canonical_name: Some(name.to_string()),
                    status: AttributeStatus::InvalidValue,
                    severity: ConstraintSeverity::Warning,
                    message: format!(
                        "Attribute '{name}' has invalid value '{}'",
                        value_text(value)
                    ),
                };
            }
            return AttributeValidationResult {
                attribute: name.to_string(),
                canonical_name: Some(name.to_string()),
                status: AttributeStatus::Valid,
                severity: ConstraintSeverity::Advisory,
                message: String::new(),
            };
        }

        // Known alias.
        if let Some(canonical) = self.alias_to_canonical.get(name) {
            if !self.validate_value(canonical, value) {
                return AttributeValidationResult {
                    attribute: name.to_string(),
                    canonical_name: Some(canonical.clone()),
                    status: AttributeStatus::InvalidValue,
                    severity: ConstraintSeverity::Warning,
                    message: format!(
                        "Alias '{name}' -> '{canonical}' has invalid value '{}'",
                        value_text(value)
                    ),
                };
            }
            return AttributeValidationResult {
                attribute: name.to_string(),
                canonical_name: Some(canonical.clone()),
                status: AttributeStatus::AliasResolved,
                severity: ConstraintSeverity::Warning,
                message: format!("Non-canonical name '{name}' resolved to canonical '{canonical}'"),
            };
        }

        // Unknown attribute.
        AttributeValidationResult {
            attribute: name.to_string(),
            canonical_name: None,
            status: AttributeStatus::Unknown,
            severity: ConstraintSeverity::Advisory,
            message: format!("Unknown attribute '{name}' not in convention"),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> ConventionValidator {
        ConventionValidator::new(
            &ConventionContract::from_yaml_str(
                r#"
convention_id: task-attributes
attributes:
  - name: service.name
    requirement_level: required
  - name: task.status
    aliases: [status]
    allowed_values: [todo, done]
enums:
  - name: priority
    values: [high, low]
    extensible: false
"#,
            )
            .unwrap(),
        )
    }

    fn attrs(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn canonical_names_pass() {
        let result = validator().validate_attributes(&attrs(&[
            ("service.name", json!("svc")),
            ("task.status", json!("todo")),
        ]));
        assert!(result.passed);
        assert_eq!(result.violations, 0);
        assert!(result
            .results
            .iter()
            .all(|r| r.status == AttributeStatus::Valid));
    }

    #[test]
    fn aliases_resolve_with_warning() {
        let result = validator().validate_attributes(&attrs(&[
            ("service.name", json!("svc")),
            ("status", json!("done")),
        ]));
        assert!(result.passed);
        assert_eq!(result.aliases_resolved, 1);
        let alias = result
            .results
            .iter()
            .find(|r| r.attribute == "status")
            .unwrap();
        assert_eq!(alias.status, AttributeStatus::AliasResolved);
        assert_eq!(alias.canonical_name.as_deref(), Some("task.status"));
        assert_eq!(alias.severity, ConstraintSeverity::Warning);
    }

    #[test]
    fn unknown_attributes_are_advisory() {
        let result = validator().validate_attributes(&attrs(&[
            ("service.name", json!("svc")),
            ("totally.new", json!(1)),
        ]));
        assert!(result.passed);
        let unknown = result
            .results
            .iter()
            .find(|r| r.attribute == "totally.new")
            .unwrap();
        assert_eq!(unknown.status, AttributeStatus::Unknown);
        assert_eq!(unknown.severity, ConstraintSeverity::Advisory);
    }

    #[test]
    fn invalid_enum_value_warns_but_does_not_fail() {
        let result = validator().validate_attributes(&attrs(&[
            ("service.name", json!("svc")),
            ("task.status", json!("paused")),
        ]));
        assert!(result.passed);
        let invalid = result
            .results
            .iter()
            .find(|r| r.attribute == "task.status")
            .unwrap();
        assert_eq!(invalid.status, AttributeStatus::InvalidValue);
        assert_eq!(invalid.severity, ConstraintSeverity::Warning);
    }

    #[test]
    fn missing_required_attribute_blocks() {
        let result = validator().validate_attributes(&attrs(&[("task.status", json!("todo"))]));
        assert!(!result.passed);
        assert_eq!(result.violations, 1);
        let missing = result
            .results
            .iter()
            .find(|r| r.attribute == "service.name")
            .unwrap();
        assert_eq!(missing.severity, ConstraintSeverity::Blocking);
    }

    #[test]
    fn passed_equals_no_blocking_violations() {
        let result = validator().validate_attributes(&attrs(&[("service.name", json!("svc"))]));
        assert_eq!(result.passed, result.violations == 0);
    }

    #[test]
    fn enum_lookup() {
        let v = validator();
        assert_eq!(v.validate_enum("priority", "high"), Some(true));
        assert_eq!(v.validate_enum("priority", "urgent"), Some(false));
        assert_eq!(v.validate_enum("nope", "x"), None);
    }
}
