// SPDX-License-Identifier: MIT OR Apache-2.0
//! Context Plane, a metadata and observability control plane.
//!
//! Models software projects, tasks, agent actions, and cross-service
//! contracts as a uniform stream of structured telemetry. This crate is a
//! facade: each concern lives in its own member crate, re-exported here
//! under a stable module name.
//!
//! - [`span`], the task span engine: persistent task spans with
//!   lifecycle events and progress propagation;
//! - [`contract`], declarative contract documents and the restricted
//!   verification-expression language;
//! - [`validate`], boundary, schema compatibility, and convention
//!   validators;
//! - [`guard`], runtime boundary guard, post-execution validation, and
//!   provenance tracking;
//! - [`drift`], contract drift detection and the CI regression gate;
//! - [`gates`], SLO budgets and reusable phase gates;
//! - [`rbac`], role-based access control with sensitive-resource
//!   protection;
//! - [`plan`], plan ingestion, deterministic remediation, manifest
//!   inference, and the provenance inventory;
//! - [`storage`], handoff/session/insight/guidance storage backends;
//! - [`telemetry`], the structured lifecycle event sink;
//! - [`core`], the shared vocabulary everything above builds on.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use ctp_contract as contract;
pub use ctp_core as core;
pub use ctp_drift as drift;
pub use ctp_gates as gates;
pub use ctp_guard as guard;
pub use ctp_plan as plan;
pub use ctp_rbac as rbac;
pub use ctp_span as span;
pub use ctp_storage as storage;
pub use ctp_telemetry as telemetry;
pub use ctp_validate as validate;
