// SPDX-License-Identifier: MIT OR Apache-2.0
//! Storage record types.
//!
//! Wire form is camelCase JSON, matching the payloads agents exchange.
//! Enums are typed end to end, so an invalid priority or status fails at
//! deserialization instead of reaching a backend; the remaining runtime
//! constraint (confidence bounds) is enforced by the constructors.

use chrono::{DateTime, Utc};
use ctp_core::{AgentType, HandoffStatus, InsightType, SessionStatus, TaskPriority};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default handoff timeout: five minutes.
pub const DEFAULT_HANDOFF_TIMEOUT_MS: u64 = 300_000;

/// Errors from record validation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RecordError {
    /// Confidence must lie in `[0, 1]`.
    #[error("confidence must be between 0 and 1, got {0}")]
    ConfidenceOutOfRange(f64),
    /// A required identifier was empty.
    #[error("{field} must not be empty")]
    EmptyField {
        /// The offending field.
        field: &'static str,
    },
}

/// A unit of work handed from one agent to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handoff {
    /// Handoff identifier.
    pub id: String,
    /// Requesting agent.
    pub from_agent: String,
    /// Target agent.
    pub to_agent: String,
    /// Capability being invoked.
    pub capability_id: String,
    /// What to do.
    pub task: String,
    /// Input payload.
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    /// Shape of the expected output.
    #[serde(default)]
    pub expected_output: BTreeMap<String, Value>,
    /// Priority.
    pub priority: TaskPriority,
    /// Expiry budget in milliseconds.
    pub timeout_ms: u64,
    /// Lifecycle status.
    pub status: HandoffStatus,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Trace of the run that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_trace_id: Option<String>,
    /// Failure detail, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Handoff {
    /// A pending handoff with default priority and timeout.
    pub fn new(
        id: impl Into<String>,
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        capability_id: impl Into<String>,
        task: impl Into<String>,
    ) -> Result<Self, RecordError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RecordError::EmptyField { field: "id" });
        }
        Ok(Self {
            id,
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            capability_id: capability_id.into(),
            task: task.into(),
            inputs: BTreeMap::new(),
            expected_output: BTreeMap::new(),
            priority: TaskPriority::Medium,
            timeout_ms: DEFAULT_HANDOFF_TIMEOUT_MS,
            status: HandoffStatus::Pending,
            created_at: Some(Utc::now()),
            result_trace_id: None,
            error_message: None,
        })
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Attach an input value.
    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    /// When this handoff stops being waitable.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .map(|at| at + chrono::Duration::milliseconds(self.timeout_ms as i64))
    }

    /// Whether a pending handoff has outlived its timeout at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == HandoffStatus::Pending && self.deadline().is_some_and(|d| now > d)
    }
}

/// An agent working session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier.
    pub session_id: String,
    /// Agent running the session.
    pub agent_id: String,
    /// Project the session belongs to.
    pub project_id: String,
    /// Agent classification.
    pub agent_type: AgentType,
    /// When the session started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the session ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Capabilities exercised during the session.
    #[serde(default)]
    pub capabilities_used: Vec<String>,
    /// How many insights the session emitted.
    #[serde(default)]
    pub insight_count: u32,
    /// Tasks completed during the session.
    #[serde(default)]
    pub tasks_completed: Vec<String>,
}

impl Session {
    /// An active session starting now.
    pub fn new(
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        project_id: impl Into<String>,
        agent_type: AgentType,
    ) -> Result<Self, RecordError> {
        let session_id = session_id.into();
        if session_id.is_empty() {
            return Err(RecordError::EmptyField { field: "session_id" });
        }
        Ok(Self {
            session_id,
            agent_id: agent_id.into(),
            project_id: project_id.into(),
            agent_type,
            started_at: Some(Utc::now()),
            ended_at: None,
            status: SessionStatus::Active,
            capabilities_used: Vec::new(),
            insight_count: 0,
            tasks_completed: Vec::new(),
        })
    }
}

/// A structured insight emitted by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    /// Insight identifier.
    pub id: String,
    /// Project the insight belongs to.
    pub project_id: String,
    /// Emitting agent.
    pub agent_id: String,
    /// Insight classification.
    #[serde(rename = "insightType")]
    pub kind: InsightType,
    /// One-line summary.
    pub summary: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Emission timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Trace id for correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Artifacts or areas the insight applies to.
    #[serde(default)]
    pub applies_to: Vec<String>,
    /// Arbitrary supporting context.
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

impl Insight {
    /// A new insight stamped now. Confidence outside `[0, 1]` is
    /// rejected.
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        agent_id: impl Into<String>,
        kind: InsightType,
        summary: impl Into<String>,
        confidence: f64,
    ) -> Result<Self, RecordError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(RecordError::ConfidenceOutOfRange(confidence));
        }
        Ok(Self {
            id: id.into(),
            project_id: project_id.into(),
            agent_id: agent_id.into(),
            kind,
            summary: summary.into(),
            confidence,
            timestamp: Some(Utc::now()),
            trace_id: None,
            applies_to: Vec::new(),
            context: BTreeMap::new(),
        })
    }

    /// Declare what the insight applies to.
    pub fn applies_to(mut self, target: impl Into<String>) -> Self {
        self.applies_to.push(target.into());
        self
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handoff_serializes_camel_case() {
        let handoff = Handoff::new("h1", "planner", "builder", "cap.build", "build the thing")
            .unwrap()
            .with_priority(TaskPriority::High)
            .with_input("target", json!("svc"));
        let value = serde_json::to_value(&handoff).unwrap();
        assert_eq!(value["fromAgent"], "planner");
        assert_eq!(value["capabilityId"], "cap.build");
        assert_eq!(value["timeoutMs"], DEFAULT_HANDOFF_TIMEOUT_MS);
        assert_eq!(value["priority"], "high");
        assert_eq!(value["status"], "pending");
    }

    #[test]
    fn invalid_enum_values_fail_deserialization() {
        let raw = json!({
            "id": "h1",
            "fromAgent": "a",
            "toAgent": "b",
            "capabilityId": "c",
            "task": "t",
            "priority": "urgent",
            "timeoutMs": 1000,
            "status": "pending"
        });
        assert!(serde_json::from_value::<Handoff>(raw).is_err());
    }

    #[test]
    fn confidence_bounds_enforced_at_construction() {
        assert_eq!(
            Insight::new("i1", "p", "a", InsightType::Decision, "s", 1.5).unwrap_err(),
            RecordError::ConfidenceOutOfRange(1.5)
        );
        assert!(Insight::new("i1", "p", "a", InsightType::Decision, "s", 0.8).is_ok());
    }

    #[test]
    fn handoff_overdue_by_timeout() {
        let mut handoff = Handoff::new("h2", "a", "b", "c", "t")
            .unwrap()
            .with_timeout_ms(1_000);
        handoff.created_at = Some(Utc::now() - chrono::Duration::seconds(5));
        assert!(handoff.is_overdue(Utc::now()));

        handoff.status = HandoffStatus::Completed;
        assert!(!handoff.is_overdue(Utc::now()));
    }

    #[test]
    fn insight_type_wire_name() {
        let insight =
            Insight::new("i2", "p", "a", InsightType::Blocker, "stuck", 0.9).unwrap();
        let value = serde_json::to_value(&insight).unwrap();
        assert_eq!(value["insightType"], "blocker");
        assert_eq!(value["projectId"], "p");
    }
}
