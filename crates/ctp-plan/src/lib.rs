// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plan ingestion and fix pipeline.
//!
//! A deterministic multi-stage transformation over human-authored
//! planning documents: analyze them into a structured schema, apply
//! deterministic remediations for the fixable quality checks, infer a
//! project manifest, and register every produced artifact in the
//! provenance inventory so downstream stages can discover it. Nothing
//! produced upstream may be silently discarded.
//!
//! Everything here is pure text-in/data-out except the inventory, which
//! owns the `run-provenance.json` file on disk. Repeated runs over
//! identical inputs produce identical output, excluding a single
//! `generated_at` timestamp, that is a test contract, not an accident.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Plan and requirements analysis.
pub mod analyze;
/// Deterministic remediation of fixable polish failures.
pub mod fix;
/// Provenance inventory (`run-provenance.json`).
pub mod inventory;
/// Manifest template and inference from plan text.
pub mod manifest;
/// Shared document-scanning patterns.
pub(crate) mod patterns;
/// Plan quality checks.
pub mod polish;

pub use analyze::{
    analyze_plan, ConflictReport, Deliverables, PhaseMetadata, PlanAnalysis, PlanMetadata,
    PlanStatistics, RequirementId, RequirementsDoc, ANALYSIS_SCHEMA,
};
pub use fix::{apply_fixes, fix_report, FixAction, FixOutcome, FixStatus, FIXABLE_CHECK_IDS};
pub use inventory::{
    export_inventory, extend_inventory, pre_pipeline_entry, sub_document_checksum, Freshness,
    InventoryEntry, InventoryError, PROVENANCE_FILENAME, PROVENANCE_VERSION,
};
pub use manifest::{infer_from_plan, manifest_template, Inference, InferenceOutcome};
pub use polish::{polish, CheckStatus, PolishCheck, PolishReport};
