// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-service schema compatibility specs.
//!
//! A compatibility spec declares field mappings between named services:
//! where a field lives on each side, what type it carries, which values
//! are allowed, and how values translate. The checker in `ctp-validate`
//! evaluates payloads against these mappings; this module only models and
//! loads the document.

use crate::{parse_yaml, read_to_string, ContractError};
use ctp_core::ConstraintSeverity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Wire type a mapped field is expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// UTF-8 string.
    Str,
    /// Integer.
    Int,
    /// Float (integers are acceptable).
    Float,
    /// Boolean.
    Bool,
    /// JSON array.
    List,
    /// JSON object.
    Map,
}

/// One declared field mapping between two services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldMapping {
    /// Service producing the payload.
    pub source_service: String,
    /// Service consuming the payload.
    pub target_service: String,
    /// Dot-path of the field on the source side.
    pub source_field: String,
    /// Dot-path of the field on the target side.
    pub target_field: String,
    /// Expected type of the source value.
    pub source_type: SourceType,
    /// Allowed source values; unconstrained when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_values: Option<Vec<String>>,
    /// Source-to-target value translation table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_map: Option<BTreeMap<String, String>>,
    /// Severity of drift on this mapping.
    #[serde(default = "default_severity")]
    pub severity: ConstraintSeverity,
}

fn default_severity() -> ConstraintSeverity {
    ConstraintSeverity::Blocking
}

/// A schema compatibility spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CompatibilitySpec {
    /// Stable spec identifier.
    pub spec_id: String,
    /// Spec version string.
    #[serde(default)]
    pub version: Option<String>,
    /// Declared field mappings.
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
}

impl CompatibilitySpec {
    /// Parse from a YAML string and validate.
    pub fn from_yaml_str(text: &str) -> Result<Self, ContractError> {
        let spec: Self = parse_yaml(text)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load from a YAML file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ContractError> {
        Self::from_yaml_str(&read_to_string(path.as_ref())?)
    }

    /// All mappings from `source_service` to `target_service`.
    pub fn mappings_between(&self, source_service: &str, target_service: &str) -> Vec<&FieldMapping> {
        self.mappings
            .iter()
            .filter(|m| m.source_service == source_service && m.target_service == target_service)
            .collect()
    }

    /// Find one mapping by endpoint pair and source field.
    pub fn find_mapping(
        &self,
        source_service: &str,
        target_service: &str,
        source_field: &str,
    ) -> Option<&FieldMapping> {
        self.mappings.iter().find(|m| {
            m.source_service == source_service
                && m.target_service == target_service
                && m.source_field == source_field
        })
    }

    /// Semantic validation run at load time.
    pub fn validate(&self) -> Result<(), ContractError> {
        let mut reasons = Vec::new();
        if self.spec_id.is_empty() {
            reasons.push("spec_id must not be empty".to_string());
        }
        for mapping in &self.mappings {
            if mapping.source_field.is_empty() || mapping.target_field.is_empty() {
                reasons.push(format!(
                    "mapping {}->{} has an empty field path",
                    mapping.source_service, mapping.target_service
                ));
            }
            if let (Some(values), Some(map)) = (&mapping.source_values, &mapping.value_map) {
                for key in map.keys() {
                    if !values.contains(key) {
                        reasons.push(format!(
                            "mapping '{}' translates '{key}' which is outside its allowed set",
                            mapping.source_field
                        ));
                    }
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
spec_id: tracker-to-exporter
version: "1.0"
mappings:
  - source_service: tracker
    target_service: exporter
    source_field: status
    target_field: state
    source_type: str
    source_values: [todo, done]
    value_map: {todo: open, done: closed}
    severity: blocking
  - source_service: tracker
    target_service: exporter
    source_field: points
    target_field: estimate
    source_type: int
    severity: warning
"#;

    #[test]
    fn loads_and_indexes_mappings() {
        let spec = CompatibilitySpec::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(spec.mappings_between("tracker", "exporter").len(), 2);
        assert!(spec.find_mapping("tracker", "exporter", "status").is_some());
        assert!(spec.find_mapping("exporter", "tracker", "status").is_none());
    }

    #[test]
    fn unknown_keys_rejected() {
        let text = SAMPLE.replace("source_type", "sourceType");
        assert!(matches!(
            CompatibilitySpec::from_yaml_str(&text),
            Err(ContractError::Parse { .. })
        ));
    }

    #[test]
    fn translation_keys_must_be_in_allowed_set() {
        let text = SAMPLE.replace("{todo: open, done: closed}", "{paused: held}");
        assert!(matches!(
            CompatibilitySpec::from_yaml_str(&text),
            Err(ContractError::Validation { .. })
        ));
    }
}
