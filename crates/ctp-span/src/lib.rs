// SPDX-License-Identifier: MIT OR Apache-2.0
//! Task Span Engine.
//!
//! Models long-running work as telemetry spans that survive process
//! restarts. A task may live for weeks across many process starts, so span
//! identity, lineage, and derived metrics are persisted on every mutation
//! and reconstructed on startup.
//!
//! The engine is deliberately forgiving on its mutation paths: I/O
//! failures are logged and swallowed, corrupt state files read as missing
//! records, and mutations against unknown tasks are warnings, not errors.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Canonical span attribute keys.
pub mod attr;
/// Persisted span state with schema versioning and migration.
pub mod state;
/// Atomic file-backed state store with temp-dir fallback.
pub mod store;
/// The task tracker: lifecycle operations and progress propagation.
pub mod tracker;

pub use state::{SpanEvent, SpanState, SCHEMA_VERSION};
pub use store::{StateStore, StoreError};
pub use tracker::{metrics_from_events, TaskLink, TaskMetrics, TaskSpec, TaskTracker};
