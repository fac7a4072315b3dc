// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plan analysis.
//!
//! Parses a plan document and its requirements documents *separately*,
//! extracting structured metadata the manifest inference engine can merge:
//! requirement inventory, phase metadata, traceability matrix, dependency
//! graph, conflicts, and coverage statistics.
//!
//! Output is the `context-plane.io/plan-analysis/v1` document. Two runs
//! over identical inputs differ only in `generated_at`.

use crate::patterns;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Schema identifier of the analysis document.
pub const ANALYSIS_SCHEMA: &str = "context-plane.io/plan-analysis/v1";

/// How many leading lines are scanned for header metadata.
const HEADER_SCAN_LINES: usize = 30;

/// Title extraction cap.
const TITLE_CAP: usize = 150;

/// A requirements document handed to the analyzer.
#[derive(Debug, Clone)]
pub struct RequirementsDoc {
    /// Path of the document (basename becomes the inventory key).
    pub path: String,
    /// Full text.
    pub text: String,
}

/// A discovered requirement id with its extracted title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementId {
    /// Uppercased identifier, e.g. `REQ-1`.
    pub id: String,
    /// Title scraped from the rest of the line (may be empty).
    pub title: String,
}

/// Plan header metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanMetadata {
    /// Document title (`# ` heading).
    pub title: Option<String>,
    /// Declared date.
    pub date: Option<String>,
    /// `**Requirements:**` declarations.
    pub declared_requirements: Vec<String>,
    /// `**Companion to:**` declarations.
    pub declared_companions: Vec<String>,
}

/// Per-document requirement inventory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementInventoryEntry {
    /// Path the document was read from.
    pub source_path: String,
    /// Requirement ids found, first occurrence wins.
    pub ids: Vec<RequirementId>,
}

/// Deliverables summary for a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverables {
    /// First few deliverable lines, joined.
    pub summary: String,
    /// Number of deliverable lines found.
    pub file_count: usize,
}

/// Structured metadata for one discovered phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseMetadata {
    /// Sequential id: `phase-1`, `phase-2`, ...
    pub phase_id: String,
    /// Full heading text without the `#` markers.
    pub heading: String,
    /// Requirement ids this phase satisfies.
    pub satisfies: Vec<String>,
    /// Raw dependency declaration, when present.
    pub depends_on: Option<String>,
    /// Target repository, when declared.
    pub repo: Option<String>,
    /// Deliverables summary, when any were listed.
    pub deliverables: Option<Deliverables>,
}

/// Conflicts across requirements documents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Requirement ids declared in more than one document.
    pub overlapping_ids: BTreeMap<String, Vec<String>>,
    /// Reserved for deeper semantic analysis.
    pub contradictions: Vec<String>,
}

/// Aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStatistics {
    /// Requirements across all documents.
    pub total_requirements: usize,
    /// Phases discovered in the plan.
    pub total_phases: usize,
    /// Requirements satisfied by at least one phase.
    pub covered_requirements: usize,
    /// `covered / total`, three decimals; `0.0` with no requirements.
    pub coverage_ratio: f64,
}

/// The full analysis document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAnalysis {
    /// Always [`ANALYSIS_SCHEMA`].
    pub schema: String,
    /// When this analysis ran (the only non-deterministic field).
    pub generated_at: DateTime<Utc>,
    /// Path of the analyzed plan.
    pub plan_path: String,
    /// Header metadata.
    pub plan_metadata: PlanMetadata,
    /// Per-document requirement inventory, keyed by basename.
    pub requirement_inventory: BTreeMap<String, RequirementInventoryEntry>,
    /// Requirement ids referenced from the plan itself.
    pub plan_requirement_ids: Vec<RequirementId>,
    /// Discovered phases, in document order.
    pub phase_metadata: Vec<PhaseMetadata>,
    /// `REQ-ID -> [phase ids]` (uncovered requirements map to `[]`).
    pub traceability_matrix: BTreeMap<String, Vec<String>>,
    /// `phase id -> [dependency phase ids]`.
    pub dependency_graph: BTreeMap<String, Vec<String>>,
    /// Cross-document conflicts.
    pub conflict_report: ConflictReport,
    /// Aggregate statistics.
    pub statistics: PlanStatistics,
}

/// Analyze a plan and its requirements documents.
pub fn analyze_plan(
    plan_text: &str,
    plan_path: &str,
    requirements_docs: &[RequirementsDoc],
) -> PlanAnalysis {
    let plan_lines: Vec<&str> = plan_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let plan_metadata = extract_header_metadata(&plan_lines);

    let mut requirement_inventory = BTreeMap::new();
    for doc in requirements_docs {
        let name = doc
            .path
            .rsplit('/')
            .next()
            .unwrap_or(doc.path.as_str())
            .to_string();
        requirement_inventory.insert(
            name,
            RequirementInventoryEntry {
                source_path: doc.path.clone(),
                ids: extract_requirement_ids(&doc.text),
            },
        );
    }

    let plan_requirement_ids = extract_requirement_ids(plan_text);
    let phase_metadata = extract_phase_metadata(&plan_lines);
    let traceability_matrix = build_traceability_matrix(&phase_metadata, &requirement_inventory);
    let dependency_graph = build_dependency_graph(&phase_metadata);
    let conflict_report = detect_conflicts(&requirement_inventory);

    let total_requirements: usize = requirement_inventory.values().map(|e| e.ids.len()).sum();
    let covered_requirements = traceability_matrix
        .values()
        .filter(|phases| !phases.is_empty())
        .count();
    let coverage_ratio = if total_requirements > 0 {
        round3(covered_requirements as f64 / total_requirements as f64)
    } else {
        0.0
    };

    PlanAnalysis {
        schema: ANALYSIS_SCHEMA.to_string(),
        generated_at: Utc::now(),
        plan_path: plan_path.to_string(),
        plan_metadata,
        requirement_inventory,
        plan_requirement_ids,
        statistics: PlanStatistics {
            total_requirements,
            total_phases: phase_metadata.len(),
            covered_requirements,
            coverage_ratio,
        },
        phase_metadata,
        traceability_matrix,
        dependency_graph,
        conflict_report,
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Find requirement ids with surrounding context; first occurrence wins
/// for title extraction.
pub(crate) fn extract_requirement_ids(text: &str) -> Vec<RequirementId> {
    let mut results = Vec::new();
    let mut seen = BTreeSet::new();
    for line in text.lines() {
        for m in patterns::REQ_ID.captures_iter(line) {
            let Some(found) = m.get(1) else { continue };
            let id = found.as_str().to_uppercase();
            if !seen.insert(id.clone()) {
                continue;
            }
            // "REQ-1: Title here" or "### REQ-1, Title"
            let after = line[found.end()..].trim();
            let mut title = String::new();
            if after.starts_with(':') || after.starts_with('—') || after.starts_with('-') {
                title = after
                    .trim_start_matches([':', '—', '-', ' '])
                    .trim()
                    .to_string();
            } else if !after.is_empty() && !after.starts_with(|c: char| c.is_ascii_digit()) {
                title = after.to_string();
            }
            if title.len() > TITLE_CAP {
                title.truncate(TITLE_CAP);
            }
            results.push(RequirementId { id, title });
        }
    }
    results
}

fn extract_header_metadata(plan_lines: &[&str]) -> PlanMetadata {
    let mut metadata = PlanMetadata::default();
    for line in plan_lines.iter().take(HEADER_SCAN_LINES) {
        if metadata.title.is_none() {
            if let Some(caps) = patterns::TITLE.captures(line) {
                metadata.title = Some(caps[1].trim().to_string());
                continue;
            }
        }
        if let Some(caps) = patterns::DATE_HEADER.captures(line) {
            metadata.date = Some(caps[1].trim().to_string());
            continue;
        }
        if let Some(caps) = patterns::COMPANION_HEADER.captures(line) {
            metadata
                .declared_companions
                .push(caps[1].trim().to_string());
            continue;
        }
        if let Some(caps) = patterns::REQUIREMENTS_HEADER.captures(line) {
            metadata
                .declared_requirements
                .push(caps[1].trim().to_string());
        }
    }
    metadata
}

/// Scan the plan linearly, opening a phase at each phase heading and
/// collecting its metadata lines.
pub(crate) fn extract_phase_metadata(plan_lines: &[&str]) -> Vec<PhaseMetadata> {
    struct Builder {
        phase: PhaseMetadata,
        deliverable_lines: Vec<String>,
    }

    fn flush(builder: Option<Builder>, phases: &mut Vec<PhaseMetadata>) {
        let Some(mut builder) = builder else { return };
        if !builder.deliverable_lines.is_empty() {
            builder.phase.deliverables = Some(Deliverables {
                summary: builder
                    .deliverable_lines
                    .iter()
                    .take(5)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("; "),
                file_count: builder.deliverable_lines.len(),
            });
        }
        phases.push(builder.phase);
    }

    let mut phases = Vec::new();
    let mut current: Option<Builder> = None;
    let mut collecting_deliverables = false;
    let mut counter = 0usize;

    for line in plan_lines {
        if patterns::PHASE_HEADING.is_match(line) {
            flush(current.take(), &mut phases);
            collecting_deliverables = false;
            counter += 1;
            let heading = line.trim_start_matches('#').trim().to_string();
            current = Some(Builder {
                phase: PhaseMetadata {
                    phase_id: format!("phase-{counter}"),
                    heading,
                    satisfies: Vec::new(),
                    depends_on: None,
                    repo: None,
                    deliverables: None,
                },
                deliverable_lines: Vec::new(),
            });
            continue;
        }

        // A non-phase H2 heading closes the current phase.
        if line.starts_with("## ") && current.is_some() {
            flush(current.take(), &mut phases);
            collecting_deliverables = false;
            continue;
        }

        let Some(builder) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = patterns::SATISFIES.captures(line) {
            let raw = caps[1].trim();
            let ids: Vec<String> = patterns::REQ_ID
                .captures_iter(raw)
                .map(|c| c[1].to_uppercase())
                .collect();
            builder.phase.satisfies = if ids.is_empty() {
                vec![raw.to_string()]
            } else {
                ids
            };
            continue;
        }
        if let Some(caps) = patterns::DEPENDS_ON.captures(line) {
            builder.phase.depends_on = Some(caps[1].trim().to_string());
            continue;
        }
        if let Some(caps) = patterns::REPO.captures(line) {
            builder.phase.repo = Some(caps[1].trim().to_string());
            continue;
        }
        if let Some(caps) = patterns::DELIVERABLES.captures(line) {
            let inline = caps[1].trim();
            if !inline.is_empty() {
                builder.deliverable_lines.push(inline.to_string());
            }
            collecting_deliverables = true;
            continue;
        }
        if patterns::VALIDATION.is_match(line) {
            collecting_deliverables = false;
            continue;
        }
        if collecting_deliverables {
            if let Some(caps) = patterns::CHECKLIST.captures(line) {
                builder.deliverable_lines.push(caps[1].trim().to_string());
                continue;
            }
            if !line.starts_with('-') {
                collecting_deliverables = false;
            }
        }
    }
    flush(current.take(), &mut phases);
    phases
}

/// `REQ-ID -> [phase ids]`; every inventoried id appears, even uncovered.
fn build_traceability_matrix(
    phases: &[PhaseMetadata],
    inventory: &BTreeMap<String, RequirementInventoryEntry>,
) -> BTreeMap<String, Vec<String>> {
    let mut matrix: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in inventory.values() {
        for req in &entry.ids {
            matrix.entry(req.id.clone()).or_default();
        }
    }
    for phase in phases {
        for req_id in &phase.satisfies {
            matrix
                .entry(req_id.to_uppercase())
                .or_default()
                .push(phase.phase_id.clone());
        }
    }
    matrix
}

/// `phase id -> [dependency phase ids]`, resolving numeric references and
/// ranges like `Phases 1-6` against known phases only.
fn build_dependency_graph(phases: &[PhaseMetadata]) -> BTreeMap<String, Vec<String>> {
    let phase_ids: BTreeSet<&str> = phases.iter().map(|p| p.phase_id.as_str()).collect();
    let mut graph = BTreeMap::new();

    for phase in phases {
        let mut deps: Vec<String> = Vec::new();
        if let Some(dep_str) = &phase.depends_on {
            let lowered = dep_str.to_lowercase();
            if lowered.contains("phase") {
                let mut range_numbers: BTreeSet<u64> = BTreeSet::new();
                for caps in patterns::PHASE_RANGE.captures_iter(&lowered) {
                    let (Ok(start), Ok(end)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>())
                    else {
                        continue;
                    };
                    for n in start..=end {
                        range_numbers.insert(n);
                    }
                }
                for caps in patterns::NUMBER.captures_iter(&lowered) {
                    let candidate = format!("phase-{}", &caps[1]);
                    if phase_ids.contains(candidate.as_str()) && !deps.contains(&candidate) {
                        deps.push(candidate);
                    }
                }
                for n in range_numbers {
                    let candidate = format!("phase-{n}");
                    if phase_ids.contains(candidate.as_str()) && !deps.contains(&candidate) {
                        deps.push(candidate);
                    }
                }
            }
        }
        // Normalize to numeric order so output is deterministic however
        // the dependency text was phrased.
        deps.sort_by_key(|d| {
            d.rsplit('-')
                .next()
                .and_then(|n| n.parse::<u64>().ok())
                .unwrap_or(u64::MAX)
        });
        graph.insert(phase.phase_id.clone(), deps);
    }
    graph
}

/// Requirement ids appearing in more than one requirements document.
fn detect_conflicts(
    inventory: &BTreeMap<String, RequirementInventoryEntry>,
) -> ConflictReport {
    let mut id_to_docs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (doc_name, entry) in inventory {
        for req in &entry.ids {
            id_to_docs
                .entry(req.id.clone())
                .or_default()
                .push(doc_name.clone());
        }
    }
    ConflictReport {
        overlapping_ids: id_to_docs
            .into_iter()
            .filter(|(_, docs)| docs.len() > 1)
            .collect(),
        contradictions: Vec::new(),
    }
}
