// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic remediation of fixable polish failures.
//!
//! Only checks with a deterministic strategy are remediated; everything
//! else is skipped with a reason a human can act on. Running fix on an
//! already-fixed plan changes nothing, and running polish after fix
//! yields zero failures among the fixable checks.

use crate::analyze::extract_phase_metadata;
use crate::patterns;
use crate::polish::{overview_lines, CheckStatus, PolishCheck};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Check ids with a deterministic remediation.
pub const FIXABLE_CHECK_IDS: &[&str] =
    &["overview-objectives", "overview-goals", "requirements-exist"];

/// Verbs that mark a sentence as stating intent.
const INTENT_VERBS: &[&str] = &[
    "implement",
    "establish",
    "enable",
    "ensure",
    "build",
    "create",
    "deliver",
    "provide",
    "migrate",
    "unify",
];

/// What happened to one check during a fix run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    /// A remediation was applied.
    Fixed,
    /// The check failed but could not be remediated.
    Skipped,
    /// The check already passed; nothing to do.
    NotApplicable,
}

/// One remediation action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixAction {
    /// Check the action addressed.
    pub check_id: String,
    /// What happened.
    pub status: FixStatus,
    /// Strategy identifier (empty for skipped/not-applicable).
    pub strategy: String,
    /// Why the check was skipped, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of one fix run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOutcome {
    /// Source file the content came from.
    pub source_file: String,
    /// Content as supplied.
    pub original_content: String,
    /// Content with remediations applied.
    pub remediated_content: String,
    /// Per-check actions.
    pub actions: Vec<FixAction>,
    /// Number of checks fixed.
    pub fixed_count: usize,
}

impl FixOutcome {
    /// Number of skipped checks.
    pub fn skipped_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.status == FixStatus::Skipped)
            .count()
    }

    /// Number of not-applicable checks.
    pub fn not_applicable_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.status == FixStatus::NotApplicable)
            .count()
    }
}

/// Apply every available remediation to `content`, guided by the
/// supplied polish check results.
pub fn apply_fixes(content: &str, checks: &[PolishCheck], source_path: &str) -> FixOutcome {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut actions = Vec::new();
    let mut fixed_count = 0;

    for check in checks {
        if check.status == CheckStatus::Passed {
            actions.push(FixAction {
                check_id: check.check_id.clone(),
                status: FixStatus::NotApplicable,
                strategy: String::new(),
                reason: None,
            });
            continue;
        }

        let action = match check.check_id.as_str() {
            "overview-objectives" => fix_overview_objectives(&mut lines),
            "overview-goals" => fix_overview_goals(&mut lines),
            "requirements-exist" => fix_requirements_exist(&mut lines),
            other => FixAction {
                check_id: other.to_string(),
                status: FixStatus::Skipped,
                strategy: String::new(),
                reason: Some(format!(
                    "No deterministic remediation exists for '{other}'; resolve it by hand."
                )),
            },
        };
        let action = FixAction {
            check_id: check.check_id.clone(),
            ..action
        };
        if action.status == FixStatus::Fixed {
            fixed_count += 1;
        }
        debug!(check = %action.check_id, status = ?action.status, "fix action");
        actions.push(action);
    }

    let mut remediated_content = lines.join("\n");
    if content.ends_with('\n') && !remediated_content.ends_with('\n') {
        remediated_content.push('\n');
    }
    // Nothing applied means byte-identical output.
    if fixed_count == 0 {
        remediated_content = content.to_string();
    }

    FixOutcome {
        source_file: source_path.to_string(),
        original_content: content.to_string(),
        remediated_content,
        actions,
        fixed_count,
    }
}

fn insert_block(lines: &mut Vec<String>, at: usize, block: Vec<String>) {
    for (offset, line) in block.into_iter().enumerate() {
        lines.insert(at + offset, line);
    }
}

fn overview_heading_index(lines: &[String]) -> Option<usize> {
    lines
        .iter()
        .position(|l| l.trim().to_lowercase().starts_with("## overview"))
}

/// Synthesize an `**Objectives:**` line from intent-verb sentences in
/// the Overview prose.
fn fix_overview_objectives(lines: &mut Vec<String>) -> FixAction {
    let skipped = |reason: String| FixAction {
        check_id: "overview-objectives".to_string(),
        status: FixStatus::Skipped,
        strategy: "extract_from_overview_prose".to_string(),
        reason: Some(reason),
    };

    let Some(heading_idx) = overview_heading_index(lines) else {
        return skipped("The document has no ## Overview section to remediate.".to_string());
    };

    let content = lines.join("\n");
    let prose = overview_lines(&content).join(" ");
    let sentences: Vec<&str> = prose
        .split(". ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let lowered = s.to_lowercase();
            INTENT_VERBS.iter().any(|verb| lowered.contains(verb))
        })
        .collect();

    if sentences.is_empty() {
        return skipped(
            "No intent verbs found in the Overview prose; cannot synthesize objectives."
                .to_string(),
        );
    }

    let mut objectives = sentences.join(". ");
    objectives = objectives.trim_end_matches('.').to_string();
    insert_block(
        lines,
        heading_idx + 1,
        vec![String::new(), format!("**Objectives:** {objectives}.")],
    );

    FixAction {
        check_id: "overview-objectives".to_string(),
        status: FixStatus::Fixed,
        strategy: "extract_from_overview_prose".to_string(),
        reason: None,
    }
}

/// Synthesize a `**Goals:**` bullet block from discovered phases.
fn fix_overview_goals(lines: &mut Vec<String>) -> FixAction {
    let skipped = |reason: String| FixAction {
        check_id: "overview-goals".to_string(),
        status: FixStatus::Skipped,
        strategy: "synthesize_from_phases".to_string(),
        reason: Some(reason),
    };

    let Some(heading_idx) = overview_heading_index(lines) else {
        return skipped("The document has no ## Overview section to remediate.".to_string());
    };

    let trimmed: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    let phases = extract_phase_metadata(&trimmed);
    if phases.is_empty() {
        return skipped("No phases discovered; cannot synthesize goals.".to_string());
    }

    // Goals nest under the Objectives line when one exists.
    let next_h2 = lines
        .iter()
        .enumerate()
        .skip(heading_idx + 1)
        .find(|(_, l)| l.trim().starts_with("## "))
        .map(|(i, _)| i)
        .unwrap_or(lines.len());
    let anchor = lines[heading_idx + 1..next_h2]
        .iter()
        .position(|l| l.contains("**Objectives:**"))
        .map(|offset| heading_idx + 1 + offset)
        .unwrap_or(heading_idx);

    let mut block = vec![String::new(), "**Goals:**".to_string()];
    for phase in &phases {
        block.push(format!("- Complete {}", phase.heading));
    }
    insert_block(lines, anchor + 1, block);

    FixAction {
        check_id: "overview-goals".to_string(),
        status: FixStatus::Fixed,
        strategy: "synthesize_from_phases".to_string(),
        reason: None,
    }
}

/// Assemble a `## Functional Requirements` table from the REQ ids in
/// phase `Satisfies:` lines.
fn fix_requirements_exist(lines: &mut Vec<String>) -> FixAction {
    let skipped = |reason: String| FixAction {
        check_id: "requirements-exist".to_string(),
        status: FixStatus::Skipped,
        strategy: "collect_req_ids_from_satisfies".to_string(),
        reason: Some(reason),
    };

    let trimmed: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    let phases = extract_phase_metadata(&trimmed);

    let mut rows: Vec<(String, String)> = Vec::new();
    for phase in &phases {
        for req_id in &phase.satisfies {
            if patterns::REQ_ID.is_match(req_id) && !rows.iter().any(|(id, _)| id == req_id) {
                rows.push((req_id.clone(), phase.heading.clone()));
            }
        }
    }
    if rows.is_empty() {
        return skipped(
            "No requirement ids found in phase Satisfies: lines; cannot build the table."
                .to_string(),
        );
    }

    let mut block = vec![
        "## Functional Requirements".to_string(),
        String::new(),
        "| ID | Source Phase |".to_string(),
        "|-----|-------------|".to_string(),
    ];
    for (id, heading) in &rows {
        block.push(format!("| {id} | {heading} |"));
    }
    block.push(String::new());

    let anchor = lines
        .iter()
        .position(|l| patterns::PHASE_HEADING.is_match(l.trim()))
        .unwrap_or(lines.len());
    insert_block(lines, anchor, block);

    FixAction {
        check_id: "requirements-exist".to_string(),
        status: FixStatus::Fixed,
        strategy: "collect_req_ids_from_satisfies".to_string(),
        reason: None,
    }
}

/// Build the fix-report document for a fix run.
pub fn fix_report(outcome: &FixOutcome) -> serde_json::Value {
    let traceability = json!([
        {
            "check_id": "overview-objectives",
            "polish_detects": "Overview section without an **Objectives:** line",
            "fix_remediates": "Synthesizes an Objectives line from intent verbs in the Overview prose",
            "init_extracts": "spec.project.description and strategy objectives"
        },
        {
            "check_id": "overview-goals",
            "polish_detects": "Overview section without a **Goals:** block",
            "fix_remediates": "Synthesizes Goals bullets from discovered phase headings",
            "init_extracts": "strategy.objectives from ### Goals bullets"
        },
        {
            "check_id": "requirements-exist",
            "polish_detects": "Missing ## Functional Requirements section",
            "fix_remediates": "Builds a requirements table from REQ ids in phase Satisfies: lines",
            "init_extracts": "requirement inventory and traceability matrix"
        }
    ]);

    json!({
        "source_file": outcome.source_file,
        "actions": outcome.actions,
        "summary": {
            "fixed": outcome.fixed_count,
            "skipped": outcome.skipped_count(),
            "not_applicable": outcome.not_applicable_count(),
        },
        "traceability": traceability,
    })
}
