// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime enforcement layers over the boundary validators.
//!
//! Three layers that carry state across a workflow run:
//!
//! - the **runtime guard** wraps boundary validation around phase
//!   execution with strict / permissive / audit enforcement modes;
//! - the **post-execution validator** checks end-to-end chain integrity
//!   after all phases complete and cross-references the guard's records;
//! - the **propagation tracker** stamps field provenance into the context
//!   itself so it travels with the data.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Layer 4: runtime boundary guard.
pub mod guard;
/// Layer 5: post-execution validation.
pub mod postexec;
/// Layer 6: propagation provenance tracker.
pub mod tracker;

pub use guard::{
    BoundaryViolation, PhaseExecutionRecord, RuntimeGuard, WorkflowRunSummary,
};
pub use postexec::{
    DiscrepancyKind, PostExecutionReport, PostExecutionValidator, RuntimeDiscrepancy,
};
pub use tracker::{ChainResult, EvaluationResult, FieldProvenance, PropagationTracker, PROVENANCE_KEY};
