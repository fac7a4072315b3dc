// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable error codes for the Context Plane.
//!
//! Each code serializes to a `SCREAMING_SNAKE_CASE` string that is stable
//! across releases, grouped into a small set of broad categories. Crates
//! carry their own `thiserror` enums; the codes here give log processors
//! and dashboards a uniform vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Task span engine errors.
    Span,
    /// Contract document errors.
    Contract,
    /// Validation-layer failures.
    Validation,
    /// Storage backend errors.
    Storage,
    /// Plan ingestion errors.
    Plan,
    /// Access-control errors.
    Rbac,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Span => "span",
            Self::Contract => "contract",
            Self::Validation => "validation",
            Self::Storage => "storage",
            Self::Plan => "plan",
            Self::Rbac => "rbac",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Machine-readable, stable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Span --
    /// A persisted span record failed schema validation.
    SpanStateCorrupt,
    /// A mutation targeted a task id with no active span.
    SpanUnknownTask,
    /// The state directory could not be acquired.
    SpanStateDirUnavailable,

    // -- Contract --
    /// Contract document failed to parse or validate.
    ContractInvalid,
    /// A verification expression was rejected at load time.
    ContractExpressionRejected,

    // -- Validation --
    /// A blocking field was missing at a phase boundary.
    BoundaryBlockingFailure,
    /// Schema drift at a blocking mapping.
    SchemaDriftBlocking,
    /// A propagation chain was found broken post-execution.
    ChainBroken,
    /// The regression gate failed.
    RegressionGateFailed,

    // -- Storage --
    /// A record carried an invalid enum value.
    StorageInvalidRecord,
    /// Backend I/O failed.
    StorageIo,

    // -- Plan --
    /// A plan document could not be analyzed.
    PlanUnparseable,
    /// The provenance inventory could not be extended.
    ProvenanceWriteFailed,

    // -- Rbac --
    /// Access denied.
    AccessDenied,
    /// Attempted mutation of a built-in role.
    BuiltInRoleImmutable,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SpanStateCorrupt | Self::SpanUnknownTask | Self::SpanStateDirUnavailable => {
                ErrorCategory::Span
            }
            Self::ContractInvalid | Self::ContractExpressionRejected => ErrorCategory::Contract,
            Self::BoundaryBlockingFailure
            | Self::SchemaDriftBlocking
            | Self::ChainBroken
            | Self::RegressionGateFailed => ErrorCategory::Validation,
            Self::StorageInvalidRecord | Self::StorageIo => ErrorCategory::Storage,
            Self::PlanUnparseable | Self::ProvenanceWriteFailed => ErrorCategory::Plan,
            Self::AccessDenied | Self::BuiltInRoleImmutable => ErrorCategory::Rbac,
            Self::Internal => ErrorCategory::Internal,
        }
    }
}
