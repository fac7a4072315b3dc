// SPDX-License-Identifier: MIT OR Apache-2.0
//! Provenance inventory.
//!
//! Every pipeline stage registers the artifacts it produced in
//! `run-provenance.json` so downstream stages can discover what has
//! already been computed instead of re-deriving it. The inventory is
//! append-only with existing-wins deduplication by `artifact_id`, and the
//! file is extended atomically (temp file + rename) so a concurrent
//! reader never sees a partial document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the provenance file each stage extends.
pub const PROVENANCE_FILENAME: &str = "run-provenance.json";

/// Current provenance schema version.
pub const PROVENANCE_VERSION: &str = "2.0.0";

/// Errors from extending the inventory.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// Filesystem failure.
    #[error("provenance i/o failed for {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// OS error.
        #[source]
        source: std::io::Error,
    },
    /// The payload could not be serialized.
    #[error("provenance serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Freshness linkage back to the upstream source an artifact was derived
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    /// SHA-256 of the upstream source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_checksum: Option<String>,
    /// Path of the upstream source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

/// One artifact registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// `<stage>.<role>`, the deduplication key.
    pub artifact_id: String,
    /// Semantic role from the controlled vocabulary.
    pub role: String,
    /// Human-readable description.
    pub description: String,
    /// Fully qualified producer identifier.
    pub produced_by: String,
    /// Pipeline stage that produced the artifact.
    pub stage: String,
    /// Relative path of the file containing the artifact.
    pub source_file: String,
    /// JSONPath to the artifact inside the source file, when nested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    /// SHA-256 of the artifact data (canonical JSON).
    pub sha256: String,
    /// When the artifact was produced.
    pub produced_at: DateTime<Utc>,
    /// Stages and phases that should consume the artifact.
    pub consumers: Vec<String>,
    /// How the consumer should use it.
    pub consumption_hint: String,
    /// Freshness linkage, when the upstream source is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Freshness>,
}

impl InventoryEntry {
    /// Build an entry for `data` produced by `produced_by` during
    /// `stage`.
    pub fn new(
        role: &str,
        stage: &str,
        source_file: &str,
        produced_by: &str,
        data: &Value,
    ) -> Self {
        Self {
            artifact_id: format!("{stage}.{role}"),
            role: role.to_string(),
            description: String::new(),
            produced_by: produced_by.to_string(),
            stage: stage.to_string(),
            source_file: source_file.to_string(),
            json_path: None,
            sha256: sub_document_checksum(data),
            produced_at: Utc::now(),
            consumers: Vec::new(),
            consumption_hint: String::new(),
            freshness: None,
        }
    }

    /// Set the description.
    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Set the JSONPath within the source file.
    pub fn at_json_path(mut self, json_path: &str) -> Self {
        self.json_path = Some(json_path.to_string());
        self
    }

    /// Declare the consumers and how they should use the artifact.
    pub fn consumed_by(mut self, consumers: &[&str], hint: &str) -> Self {
        self.consumers = consumers.iter().map(|c| c.to_string()).collect();
        self.consumption_hint = hint.to_string();
        self
    }

    /// Attach freshness linkage.
    pub fn fresh_from(mut self, checksum: Option<&str>, source_file: Option<&str>) -> Self {
        if checksum.is_some() || source_file.is_some() {
            self.freshness = Some(Freshness {
                source_checksum: checksum.map(str::to_string),
                source_file: source_file.map(str::to_string),
            });
        }
        self
    }
}

/// SHA-256 over the canonical JSON form of a sub-document.
pub fn sub_document_checksum(data: &Value) -> String {
    // serde_json keeps object keys sorted, so this is deterministic.
    let digest = Sha256::digest(data.to_string().as_bytes());
    format!("{digest:x}")
}

/// An export-stage role: where the artifact lives in the onboarding
/// metadata and who consumes it.
struct ExportRole {
    role: &'static str,
    json_path: &'static str,
    metadata_key: &'static str,
    description: &'static str,
    consumers: &'static [&'static str],
    consumption_hint: &'static str,
}

/// Controlled vocabulary of export-stage inventory roles.
const EXPORT_ROLES: &[ExportRole] = &[
    ExportRole {
        role: "derivation_rules",
        json_path: "$.derivation_rules",
        metadata_key: "derivation_rules",
        description: "Business-to-parameter derivation rules per artifact type",
        consumers: &["artisan.design", "artisan.implement"],
        consumption_hint: "Inject per-task derivation rules into the feature context to avoid re-deriving business-to-parameter mappings.",
    },
    ExportRole {
        role: "resolved_parameters",
        json_path: "$.resolved_artifact_parameters",
        metadata_key: "resolved_artifact_parameters",
        description: "Pre-resolved parameter values per artifact, ready for template substitution",
        consumers: &["artisan.design", "artisan.implement"],
        consumption_hint: "Use concrete values instead of deriving them from manifest fields again.",
    },
    ExportRole {
        role: "output_contracts",
        json_path: "$.expected_output_contracts",
        metadata_key: "expected_output_contracts",
        description: "Per-artifact-type expected depth, completeness markers, max lines",
        consumers: &["artisan.design", "artisan.implement", "artisan.test"],
        consumption_hint: "Use expected_depth to override size-based calibration and completeness_markers for post-generation validation.",
    },
    ExportRole {
        role: "dependency_graph",
        json_path: "$.artifact_dependency_graph",
        metadata_key: "artifact_dependency_graph",
        description: "Artifact-level dependency ordering",
        consumers: &["ingestion.parse", "artisan.plan"],
        consumption_hint: "Use for task ordering instead of inferred dependency edges.",
    },
    ExportRole {
        role: "calibration_hints",
        json_path: "$.design_calibration_hints",
        metadata_key: "design_calibration_hints",
        description: "Per-artifact-type expected depth tier and size range",
        consumers: &["ingestion.calibration", "artisan.design"],
        consumption_hint: "Override size-based depth tier when the artifact type has a known expected depth.",
    },
    ExportRole {
        role: "open_questions",
        json_path: "$.open_questions",
        metadata_key: "open_questions",
        description: "Unresolved questions from manifest guidance",
        consumers: &["artisan.design"],
        consumption_hint: "Surface in the design phase so decisions do not contradict unresolved questions.",
    },
    ExportRole {
        role: "parameter_sources",
        json_path: "$.parameter_sources",
        metadata_key: "parameter_sources",
        description: "Per-artifact-type parameter origin mapping",
        consumers: &["artisan.design", "artisan.implement"],
        consumption_hint: "Use to trace parameter values back to manifest fields.",
    },
    ExportRole {
        role: "semantic_conventions",
        json_path: "$.semantic_conventions",
        metadata_key: "semantic_conventions",
        description: "Metric and label naming conventions",
        consumers: &["artisan.design", "artisan.implement"],
        consumption_hint: "Enforce consistent naming in generated observability artifacts.",
    },
    ExportRole {
        role: "example_artifacts",
        json_path: "$.example_artifacts",
        metadata_key: "example_artifacts",
        description: "Example output per artifact type",
        consumers: &["artisan.design"],
        consumption_hint: "Provide as examples in design prompts.",
    },
    ExportRole {
        role: "coverage_gaps",
        json_path: "$.coverage_gaps",
        metadata_key: "coverage_gaps",
        description: "Artifact types needing generation",
        consumers: &["ingestion.parse", "artisan.plan"],
        consumption_hint: "Use as the authoritative list of what needs to be generated.",
    },
];

/// Falsy in the inventory sense: roles carrying no data are skipped.
fn is_empty_data(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Build inventory entries for every export-stage role whose data is
/// present in the onboarding metadata. Roles with missing or empty data
/// are skipped, only what exists is registered.
pub fn export_inventory(
    onboarding_metadata: &Value,
    source_checksum: Option<&str>,
    source_checksum_file: Option<&str>,
    source_file: &str,
) -> Vec<InventoryEntry> {
    let mut entries = Vec::new();
    for role in EXPORT_ROLES {
        let Some(data) = onboarding_metadata.get(role.metadata_key) else {
            continue;
        };
        if is_empty_data(data) {
            continue;
        }
        entries.push(
            InventoryEntry::new(
                role.role,
                "export",
                source_file,
                "context-plane.manifest.export",
                data,
            )
            .describe(role.description)
            .at_json_path(role.json_path)
            .consumed_by(role.consumers, role.consumption_hint)
            .fresh_from(source_checksum, source_checksum_file),
        );
    }
    entries
}

/// Build an inventory entry for a pre-pipeline stage artifact
/// (`project_context`, `polish_report`, `fix_report`,
/// `remediated_plan`). Unknown roles return `None`.
pub fn pre_pipeline_entry(role: &str, data: &Value, source_file: &str) -> Option<InventoryEntry> {
    let (stage, description, consumers, hint): (&str, &str, &[&str], &str) = match role {
        "project_context" => (
            "create",
            "Project context resource produced by the create stage",
            &["context-plane.manifest.export", "workflow.plan_ingestion"],
            "Provides project identity and business context for downstream manifest export and plan-ingestion stages.",
        ),
        "polish_report" => (
            "polish",
            "Plan quality report produced by the polish stage",
            &["workflow.plan_ingestion", "artisan.review"],
            "Surface polish check results in plan-ingestion and review phases so consumers know which quality gates the plan already passes.",
        ),
        "fix_report" => (
            "fix",
            "Auto-remediation report produced by the fix stage",
            &["context-plane.manifest.init_from_plan", "workflow.plan_ingestion", "artisan.review"],
            "Surface fix actions so consumers know which gaps were auto-remediated and which need human attention.",
        ),
        "remediated_plan" => (
            "fix",
            "Remediated plan document with deterministic fixes applied",
            &["context-plane.manifest.analyze_plan", "context-plane.manifest.init_from_plan"],
            "Use as the plan input instead of the original; it passes all fixable polish checks.",
        ),
        _ => return None,
    };
    Some(
        InventoryEntry::new(role, stage, source_file, &format!("context-plane.{stage}"), data)
            .describe(description)
            .consumed_by(consumers, hint),
    )
}

/// Append entries to the provenance file in `output_dir`.
///
/// Reads the existing file (or starts from an empty skeleton), upgrades
/// pre-2.0.0 payloads, deduplicates by `artifact_id` (existing entries
/// win), and writes back atomically.
pub fn extend_inventory(
    output_dir: &Path,
    new_entries: &[InventoryEntry],
) -> Result<(), InventoryError> {
    let prov_path = output_dir.join(PROVENANCE_FILENAME);

    let mut payload: Value = match fs::read_to_string(&prov_path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|_| json!({})),
        Err(_) => json!({}),
    };
    if !payload.is_object() {
        payload = json!({});
    }

    let version_is_old = payload
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("1.0.0")
        < PROVENANCE_VERSION;
    if version_is_old {
        payload["version"] = json!(PROVENANCE_VERSION);
    }

    let mut inventory: Vec<Value> = payload
        .get("artifact_inventory")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut existing_ids: Vec<String> = inventory
        .iter()
        .filter_map(|e| e.get("artifact_id").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    for entry in new_entries {
        if existing_ids.iter().any(|id| id == &entry.artifact_id) {
            continue;
        }
        inventory.push(serde_json::to_value(entry)?);
        existing_ids.push(entry.artifact_id.clone());
    }
    payload["artifact_inventory"] = Value::Array(inventory);

    fs::create_dir_all(output_dir).map_err(|source| InventoryError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;
    let tmp_path = output_dir.join(format!("{PROVENANCE_FILENAME}.tmp"));
    let text = serde_json::to_string_pretty(&payload)? + "\n";
    fs::write(&tmp_path, text).map_err(|source| InventoryError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, &prov_path).map_err(|source| InventoryError::Io {
        path: prov_path.clone(),
        source,
    })?;

    debug!(path = %prov_path.display(), added = new_entries.len(), "extended provenance inventory");
    Ok(())
}
