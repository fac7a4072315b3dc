// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared document-scanning patterns.
//!
//! All plan scanning goes through these expressions so the analyzer, the
//! polish checks, and the fix engine agree on what a requirement id or a
//! phase heading is.

use regex::Regex;
use std::sync::LazyLock;

/// `REQ-1`, `FR-003`, `NFR-PERF-2`, case-insensitive.
pub static REQ_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:REQ|FR|NFR)-[A-Z]*-?\d+)\b").expect("static pattern")
});

/// H2/H3 headings that open a phase.
pub static PHASE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{2,3}\s*(?:phase|milestone|action|step|task)\b").expect("static pattern")
});

/// `**Satisfies:** REQ-1, REQ-2`
pub static SATISFIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*{0,2}Satisfies:?\*{0,2}\s*(.+)$").expect("static pattern")
});

/// `**Depends on:** Phase 1`
pub static DEPENDS_ON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*{0,2}Depends\s+on:?\*{0,2}\s*(.+)$").expect("static pattern")
});

/// `**Repo:** some-repo`
pub static REPO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*{0,2}Repo:?\*{0,2}\s*(.+)$").expect("static pattern")
});

/// `**Deliverables:**` with optional inline content.
pub static DELIVERABLES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*{0,2}Deliverables:?\*{0,2}\s*(.*)$").expect("static pattern")
});

/// `**Validation:** ...` closes a deliverables block.
pub static VALIDATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*{0,2}Validation:?\*{0,2}\s*(.*)$").expect("static pattern")
});

/// Checklist bullet: `- [ ] item` or `* [x] item`.
pub static CHECKLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-*]\s*\[[ xX]?\]\s*(.+)$").expect("static pattern")
});

/// Document title: `# Title`.
pub static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s+(.+)$").expect("static pattern"));

/// Header line `**Requirements:** file.md`.
pub static REQUIREMENTS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*{0,2}Requirements?:?\*{0,2}\s*`?([^`\n]+)`?").expect("static pattern")
});

/// Header line `**Companion to:** other-plan.md`.
pub static COMPANION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*{0,2}Companion\s+to:?\*{0,2}\s*`?([^`\n]+)`?").expect("static pattern")
});

/// Header line `**Date:** 2025-01-31`.
pub static DATE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*{0,2}Date:?\*{0,2}\s*([\d\-/]+)").expect("static pattern")
});

/// Phase range reference like `Phases 1-6` (en dash tolerated).
pub static PHASE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)phases?\s*(\d+)\s*[-–]\s*(\d+)").expect("static pattern")
});

/// Any standalone number (phase reference candidate).
pub static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\b").expect("static pattern"));
