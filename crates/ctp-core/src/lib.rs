// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared vocabulary for the Context Plane.
//!
//! Every other crate in the workspace builds on the types defined here:
//! attribute values, lifecycle and severity enums, trace/span identifiers,
//! and the stable error-code taxonomy. If you only take one dependency,
//! take this one.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Stable error codes and categories.
pub mod error;
/// Trace and span identifiers.
pub mod id;
/// Dot-path resolution over JSON context maps.
pub mod path;
/// Typed attribute values for span attributes and events.
pub mod value;

pub use error::{ErrorCategory, ErrorCode};
pub use id::{IdError, SpanId, TraceId};
pub use path::resolve_path;
pub use value::AttrValue;

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Task lifecycle
// ---------------------------------------------------------------------------

/// Kind of work a task span models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Large multi-story initiative.
    Epic,
    /// User-facing unit of value.
    Story,
    /// Ordinary unit of work.
    Task,
    /// Child of another task.
    Subtask,
    /// Defect.
    Bug,
    /// Time-boxed iteration.
    Sprint,
}

impl TaskKind {
    /// Stable snake_case name, matching the wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Task => "task",
            Self::Subtask => "subtask",
            Self::Bug => "bug",
            Self::Sprint => "sprint",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not started.
    Todo,
    /// Actively being worked.
    InProgress,
    /// Waiting on something external.
    Blocked,
    /// Finished successfully (terminal).
    Done,
    /// Abandoned (terminal).
    Cancelled,
}

impl TaskStatus {
    /// `true` for `done` and `cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Stable snake_case name, matching the wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the wire form back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "done" => Some(Self::Done),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Drop everything.
    Critical,
    /// Next in line.
    High,
    /// Default.
    Medium,
    /// Backlog.
    Low,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

/// OpenTelemetry-style span status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    /// Healthy.
    Ok,
    /// Something is wrong (e.g. the task is blocked).
    Error,
    /// No status recorded yet.
    Unset,
}

/// How a progress value was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSource {
    /// Set by a person or caller.
    Manual,
    /// Derived from subtask completion.
    Subtask,
    /// Estimated.
    Estimate,
}

impl fmt::Display for ProgressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::Subtask => "subtask",
            Self::Estimate => "estimate",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Contract severities and statuses
// ---------------------------------------------------------------------------

/// Severity attached to a contract constraint.
///
/// Ordered: `Advisory < Warning < Blocking`, so `max()` picks the worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintSeverity {
    /// Logged, never blocks.
    Advisory,
    /// Surfaced in reports, does not fail pipelines.
    Warning,
    /// Fails the containing operation.
    Blocking,
}

impl fmt::Display for ConstraintSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Advisory => "advisory",
            Self::Warning => "warning",
            Self::Blocking => "blocking",
        };
        f.write_str(s)
    }
}

/// Outcome of propagating a single field across a boundary.
///
/// Ordered best-to-worst: `Propagated < Defaulted < Partial < Failed`,
/// so `max()` implements the worst-status rollup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PropagationStatus {
    /// Present as expected.
    Propagated,
    /// Absent, but a declared default covers it.
    Defaulted,
    /// Absent at warning/advisory severity.
    Partial,
    /// Absent at blocking severity.
    Failed,
}

impl fmt::Display for PropagationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Propagated => "propagated",
            Self::Defaulted => "defaulted",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// End-to-end health of a propagation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    /// Source and destination present, verification holds.
    Intact,
    /// Destination carries a default/empty value.
    Degraded,
    /// Source or destination missing, or verification failed.
    Broken,
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Intact => "intact",
            Self::Degraded => "degraded",
            Self::Broken => "broken",
        };
        f.write_str(s)
    }
}

/// Health of a budget relative to its allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetHealth {
    /// Consumption within the phase allocation.
    WithinBudget,
    /// Phase allocation exceeded, total budget still available.
    OverAllocation,
    /// Total budget gone.
    BudgetExhausted,
}

impl BudgetHealth {
    /// Map budget health onto chain status for interop with chain tooling.
    pub fn chain_status(&self) -> ChainStatus {
        match self {
            Self::WithinBudget => ChainStatus::Intact,
            Self::OverAllocation => ChainStatus::Degraded,
            Self::BudgetExhausted => ChainStatus::Broken,
        }
    }
}

/// Runtime guard enforcement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Blocking failures surface as typed errors.
    Strict,
    /// Blocking failures are logged, execution continues.
    Permissive,
    /// Everything is logged and emitted, nothing blocks.
    Audit,
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Strict => "strict",
            Self::Permissive => "permissive",
            Self::Audit => "audit",
        };
        f.write_str(s)
    }
}

/// Depth of a schema compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityLevel {
    /// Field presence and type only.
    Structural,
    /// Allowed value sets and translation tables as well.
    Semantic,
}

// ---------------------------------------------------------------------------
// Agent collaboration
// ---------------------------------------------------------------------------

/// Lifecycle of a handoff between agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    /// Queued, not yet picked up.
    Pending,
    /// Accepted by the target agent.
    Accepted,
    /// Finished successfully.
    Completed,
    /// Failed (including timeout expiry).
    Failed,
    /// Withdrawn by the requester.
    Cancelled,
}

impl HandoffStatus {
    /// Stable snake_case name, matching the wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle of an agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session in progress.
    Active,
    /// Session closed normally.
    Ended,
    /// Session terminated abnormally.
    Failed,
}

/// Classification of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Writes and edits code.
    CodeAssistant,
    /// Reviews artifacts produced by others.
    Reviewer,
    /// Coordinates other agents.
    Orchestrator,
    /// Watches and reports, never mutates.
    Observer,
}

/// Classification of an insight emitted by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    /// A decision that was taken.
    Decision,
    /// A suggested course of action.
    Recommendation,
    /// Something preventing progress.
    Blocker,
    /// A notable finding.
    Discovery,
    /// An analytical observation.
    Analysis,
}

/// Who performed an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// A human.
    User,
    /// The platform itself.
    System,
    /// An external integration.
    Integration,
}

/// How an event was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Direct invocation.
    Manual,
    /// Incoming webhook.
    Webhook,
    /// Background synchronization.
    Sync,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::Webhook => "webhook",
            Self::Sync => "sync",
        };
        f.write_str(s)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_picks_worst() {
        assert!(ConstraintSeverity::Blocking > ConstraintSeverity::Warning);
        assert!(ConstraintSeverity::Warning > ConstraintSeverity::Advisory);
        let worst = [ConstraintSeverity::Advisory, ConstraintSeverity::Blocking]
            .into_iter()
            .max()
            .unwrap();
        assert_eq!(worst, ConstraintSeverity::Blocking);
    }

    #[test]
    fn propagation_rollup_order() {
        let statuses = [
            PropagationStatus::Propagated,
            PropagationStatus::Defaulted,
            PropagationStatus::Partial,
        ];
        assert_eq!(
            statuses.into_iter().max().unwrap(),
            PropagationStatus::Partial
        );
    }

    #[test]
    fn task_status_round_trips_through_wire_form() {
        for status in [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Done,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("paused"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn budget_health_maps_to_chain_status() {
        assert_eq!(
            BudgetHealth::WithinBudget.chain_status(),
            ChainStatus::Intact
        );
        assert_eq!(
            BudgetHealth::OverAllocation.chain_status(),
            ChainStatus::Degraded
        );
        assert_eq!(
            BudgetHealth::BudgetExhausted.chain_status(),
            ChainStatus::Broken
        );
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&SpanStatus::Ok).unwrap(),
            "\"OK\""
        );
        assert_eq!(
            serde_json::to_string(&ChainStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }
}
