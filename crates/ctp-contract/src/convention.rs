// SPDX-License-Identifier: MIT OR Apache-2.0
//! Semantic convention contracts.
//!
//! Declares the canonical attribute names telemetry must use, their
//! accepted aliases, requirement levels, and allowed enum values.

use crate::{parse_yaml, read_to_string, ContractError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// How strongly an attribute is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequirementLevel {
    /// Must be present; absence is blocking.
    Required,
    /// Should be present.
    Recommended,
    /// Present only when explicitly enabled.
    OptIn,
}

/// One canonical attribute declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AttributeConvention {
    /// Canonical attribute name.
    pub name: String,
    /// Accepted non-canonical spellings.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Requirement level.
    #[serde(default = "default_level")]
    pub requirement_level: RequirementLevel,
    /// Allowed values; unconstrained when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    /// What the attribute means.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_level() -> RequirementLevel {
    RequirementLevel::Recommended
}

/// A named enum with its allowed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EnumConvention {
    /// Enum name.
    pub name: String,
    /// Allowed values.
    pub values: Vec<String>,
    /// Whether values outside the list are tolerated.
    #[serde(default)]
    pub extensible: bool,
}

/// A semantic convention contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConventionContract {
    /// Stable contract identifier.
    pub convention_id: String,
    /// Contract version string.
    #[serde(default)]
    pub version: Option<String>,
    /// Canonical attribute declarations.
    #[serde(default)]
    pub attributes: Vec<AttributeConvention>,
    /// Named enums.
    #[serde(default)]
    pub enums: Vec<EnumConvention>,
}

impl ConventionContract {
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
    /// Canonical names must be unique, and no alias may collide with a
    /// canonical name or another alias.
    pub fn validate(&self) -> Result<(), ContractError> {
        let mut reasons = Vec::new();
        let mut canonical = BTreeSet::new();
        for attribute in &self.attributes {
            if !canonical.insert(attribute.name.as_str()) {
                reasons.push(format!("duplicate canonical name '{}'", attribute.name));
            }
        }
        let mut aliases = BTreeSet::new();
        for attribute in &self.attributes {
            for alias in &attribute.aliases {
                if canonical.contains(alias.as_str()) {
                    reasons.push(format!(
                        "alias '{alias}' collides with a canonical name"
                    ));
                }
                if !aliases.insert(alias.as_str()) {
                    reasons.push(format!("alias '{alias}' declared more than once"));
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
