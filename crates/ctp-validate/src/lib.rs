// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-call validators over loaded contracts.
//!
//! Three independent layers share a severity discipline: blocking findings
//! fail the containing result, warnings surface in aggregates without
//! failing anything, advisories are informational only. Every validator
//! here is stateless per call, state belongs to the runtime guard in
//! `ctp-guard`.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Layer 1: context propagation boundary validator.
pub mod boundary;
/// Layer 2: schema compatibility checker.
pub mod compat;
/// Layer 3: semantic convention validator.
pub mod convention;

pub use boundary::{BoundaryValidator, Direction, FieldResult, ValidationResult};
pub use compat::{CompatibilityChecker, CompatibilityResult, DriftType, FieldCompatibilityDetail};
pub use convention::{
    AttributeStatus, AttributeValidationResult, ConventionValidationResult, ConventionValidator,
};
