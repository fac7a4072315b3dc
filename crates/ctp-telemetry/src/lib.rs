// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured lifecycle event emission for task telemetry.
//!
//! Lifecycle events are the product surface of the task span engine: each
//! one is a single-line JSON object suitable for line-oriented log
//! collectors. Diagnostics (internal warnings, I/O failures) go through
//! `tracing` instead and never mix with the event stream.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod logger;
mod sink;

pub use logger::TaskEventLogger;
pub use sink::{EventSink, MemorySink, NullSink, StdoutSink};

use chrono::{DateTime, Utc};
use ctp_core::{ActorType, TriggerKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of an emitted event line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Routine lifecycle event.
    Info,
    /// Something needs attention (e.g. a task became blocked).
    Warn,
    /// A failure was observed.
    Error,
}

/// A single structured event line.
///
/// Serializes flat: the base fields first, then any event-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Emission time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Event severity.
    pub level: EventLevel,
    /// Canonical event name, e.g. `task.created`.
    pub event: String,
    /// Emitting service name.
    pub service: String,
    /// Project the event belongs to.
    pub project_id: String,
    /// Task (or sprint) the event belongs to.
    pub task_id: String,
    /// Task kind, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    /// Task title, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    /// Sprint the task belongs to, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<String>,
    /// Who triggered the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Classification of the actor; present only alongside `actor`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_type: Option<ActorType>,
    /// How the event was triggered.
    pub trigger: TriggerKind,
    /// Event-specific fields, flattened into the line.
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl EventRecord {
    /// Start a record with the base fields; event-specific fields come
    /// through [`EventRecord::field`].
    pub fn new(
        event: impl Into<String>,
        service: impl Into<String>,
        project_id: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level: EventLevel::Info,
            event: event.into(),
            service: service.into(),
            project_id: project_id.into(),
            task_id: task_id.into(),
            task_type: None,
            task_title: None,
            sprint_id: None,
            actor: None,
            actor_type: None,
            trigger: TriggerKind::Manual,
            fields: BTreeMap::new(),
        }
    }

    /// Set the severity.
    pub fn level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    /// Attach an event-specific field. `Null` values are dropped so the
    /// emitted line only carries fields that are actually set.
    pub fn field(mut self, key: &str, value: serde_json::Value) -> Self {
        if !value.is_null() {
            self.fields.insert(key.to_string(), value);
        }
        self
    }

    /// Render as a single JSON line (no trailing newline).
    pub fn to_line(&self) -> String {
        // EventRecord is always serializable: keys are strings and values
        // are already serde_json::Value.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Install a `tracing` subscriber for diagnostics.
///
/// Honors `RUST_LOG` when set, otherwise uses `default_level`. Safe to
/// call more than once; later calls are no-ops.
pub fn init_diagnostics(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_flat() {
        let line = EventRecord::new("task.created", "context-plane", "proj", "PROJ-1")
            .field("priority", serde_json::json!("high"))
            .to_line();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "task.created");
        assert_eq!(value["project_id"], "proj");
        assert_eq!(value["priority"], "high");
        assert_eq!(value["trigger"], "manual");
        // Unset optional base fields do not appear at all.
        assert!(value.get("sprint_id").is_none());
    }

    #[test]
    fn null_fields_are_dropped() {
        let record = EventRecord::new("task.completed", "svc", "p", "t")
            .field("story_points", serde_json::Value::Null);
        assert!(record.fields.is_empty());
    }
}
