// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layer 7: regression prevention.
//!
//! Compares contract versions to detect propagation-breaking drift,
//! derives a unified health score, and gates CI on configurable
//! thresholds so propagation quality cannot silently degrade.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Contract drift detection.
pub mod drift;
/// CI regression gate.
pub mod gate;
/// Unified health scoring.
pub mod health;

pub use drift::{DriftChange, DriftDetector, DriftKind, DriftReport, FieldDirection};
pub use gate::{GateCheck, GateReport, GateThresholds, RegressionGate};
pub use health::HealthScore;
