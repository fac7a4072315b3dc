// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative contract documents.
//!
//! Contracts are YAML documents loaded once at startup and parsed into
//! concrete typed models. Loading is strict: unknown keys are rejected at
//! every level, severities are typed enums, and verification expressions
//! are parsed into a restricted AST at load time. A contract that loads
//! is a contract that can be enforced.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// SLO budget contracts.
pub mod budget;
/// Cross-service schema compatibility specs.
pub mod compat;
/// Context propagation contracts.
pub mod context;
/// Semantic convention contracts.
pub mod convention;
/// Restricted verification-expression language.
pub mod expr;

pub use budget::{BudgetAllocation, BudgetContract, BudgetSpec};
pub use compat::{CompatibilitySpec, FieldMapping, SourceType};
pub use context::{
    ChainPoint, ChainSpec, ContextContract, EntrySpec, ExitSpec, FieldRequirement, PhaseContract,
};
pub use convention::{AttributeConvention, ConventionContract, EnumConvention, RequirementLevel};
pub use expr::{Expr, ExprError};

use std::path::Path;

/// Errors produced while loading or validating a contract document.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// The document could not be read.
    #[error("failed to read contract {path}: {source}")]
    Io {
        /// Path that was requested.
        path: String,
        /// OS error.
        #[source]
        source: std::io::Error,
    },
    /// The document is not valid YAML or contains unknown keys.
    #[error("failed to parse contract: {reason}")]
    Parse {
        /// Parser detail, including the offending key for strict-mode
        /// rejections.
        reason: String,
    },
    /// The document parsed but is semantically invalid.
    #[error("contract validation failed: {reasons:?}")]
    Validation {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

pub(crate) fn read_to_string(path: &Path) -> Result<String, ContractError> {
    std::fs::read_to_string(path).map_err(|source| ContractError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn parse_yaml<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, ContractError> {
    serde_yaml::from_str(text).map_err(|e| ContractError::Parse {
        reason: e.to_string(),
    })
}
