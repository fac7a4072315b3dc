// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plan quality checks.
//!
//! Each check inspects one structural property of a plan document. The
//! fix engine consumes these results and remediates the checks it has a
//! deterministic strategy for; the rest stay human work.

use crate::patterns;
use serde::{Deserialize, Serialize};

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// The property holds.
    Passed,
    /// The property is missing.
    Failed,
}

/// One quality check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolishCheck {
    /// Stable check identifier.
    pub check_id: String,
    /// Human-readable label.
    pub label: String,
    /// Pass or fail.
    pub status: CheckStatus,
    /// One-line explanation.
    pub message: String,
    /// Optional supporting detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate polish report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolishReport {
    /// All check results, in stable order.
    pub checks: Vec<PolishCheck>,
    /// Number of failed checks.
    pub failed_count: usize,
}

impl PolishReport {
    /// `true` when every check passed.
    pub fn passed(&self) -> bool {
        self.failed_count == 0
    }

    /// Look up a check by id.
    pub fn check(&self, check_id: &str) -> Option<&PolishCheck> {
        self.checks.iter().find(|c| c.check_id == check_id)
    }
}

/// Lines of the `## Overview` section (everything until the next H2).
pub(crate) fn overview_lines(content: &str) -> Vec<&str> {
    let mut in_overview = false;
    let mut lines = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.to_lowercase().starts_with("## overview") {
            in_overview = true;
            continue;
        }
        if in_overview && trimmed.starts_with("## ") {
            break;
        }
        if in_overview {
            lines.push(trimmed);
        }
    }
    lines
}

fn has_phase_headings(content: &str) -> bool {
    content
        .lines()
        .any(|l| patterns::PHASE_HEADING.is_match(l.trim()))
}

fn has_h2(content: &str, heading: &str) -> bool {
    let needle = format!("## {heading}").to_lowercase();
    content
        .lines()
        .any(|l| l.trim().to_lowercase().starts_with(&needle))
}

/// Run every quality check over a plan document.
pub fn polish(content: &str) -> PolishReport {
    let overview = overview_lines(content);
    let overview_present = content
        .lines()
        .any(|l| l.trim().to_lowercase().starts_with("## overview"));

    let mut checks = Vec::new();

    let objectives = overview.iter().any(|l| l.contains("**Objectives:**"));
    checks.push(check(
        "overview-objectives",
        "Overview declares objectives",
        objectives,
        "Overview contains an **Objectives:** line",
        "No **Objectives:** line in the Overview section",
    ));

    let goals = overview.iter().any(|l| l.contains("**Goals:**"));
    checks.push(check(
        "overview-goals",
        "Overview declares goals",
        goals,
        "Overview contains a **Goals:** block",
        "No **Goals:** block in the Overview section",
    ));

    let requirements = has_h2(content, "Functional Requirements");
    checks.push(check(
        "requirements-exist",
        "Functional requirements section exists",
        requirements,
        "A ## Functional Requirements section is present",
        "No ## Functional Requirements section found",
    ));

    let phases = has_phase_headings(content);
    checks.push(check(
        "phases-exist",
        "Plan declares phases",
        phases,
        "At least one phase heading found",
        "No phase/milestone/step headings found",
    ));

    checks.push(check(
        "risks-section",
        "Risks section exists",
        has_h2(content, "Risks"),
        "A ## Risks section is present",
        "No ## Risks section found",
    ));

    checks.push(check(
        "validation-section",
        "Validation section exists",
        has_h2(content, "Validation"),
        "A ## Validation section is present",
        "No ## Validation section found",
    ));

    // Note for the fixable checks: an absent Overview section can never
    // be remediated deterministically.
    if !overview_present {
        for c in checks.iter_mut().take(2) {
            c.detail = Some("The document has no ## Overview section at all".to_string());
        }
    }

    let failed_count = checks
        .iter()
        .filter(|c| c.status == CheckStatus::Failed)
        .count();
    PolishReport {
        checks,
        failed_count,
    }
}

fn check(id: &str, label: &str, passed: bool, pass_msg: &str, fail_msg: &str) -> PolishCheck {
    PolishCheck {
        check_id: id.to_string(),
        label: label.to_string(),
        status: if passed {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed
        },
        message: if passed { pass_msg } else { fail_msg }.to_string(),
        detail: None,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_plan_passes_everything() {
        let plan = "\
# Plan

## Overview

**Objectives:** Do the thing.

**Goals:**
- Complete Phase 1: Work

## Functional Requirements

| ID | Source Phase |
|-----|-------------|
| REQ-1 | Phase 1: Work |

## Phase 1: Work

**Satisfies:** REQ-1

## Risks

- A risk

## Validation

- Tests pass
";
        let report = polish(plan);
        assert!(report.passed(), "failures: {:?}", report.checks);
    }

    #[test]
    fn bare_plan_fails_structural_checks() {
        let report = polish("# Bare\n\n## Overview\n\nJust prose.\n");
        assert!(!report.passed());
        for id in [
            "overview-objectives",
            "overview-goals",
            "requirements-exist",
            "phases-exist",
            "risks-section",
            "validation-section",
        ] {
            assert_eq!(
                report.check(id).unwrap().status,
                CheckStatus::Failed,
                "{id} should fail"
            );
        }
    }

    #[test]
    fn goals_outside_overview_do_not_count() {
        let plan = "\
# Plan

## Overview

Prose only.

## Appendix

**Goals:**
- Not in the overview
";
        let report = polish(plan);
        assert_eq!(
            report.check("overview-goals").unwrap().status,
            CheckStatus::Failed
        );
    }
}
