// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted span state with schema versioning.
//!
//! State files created by older versions must keep loading, so records
//! carry a `schema_version` and migration is a pure function over the raw
//! JSON value: `(any version) -> current version`. Migrated records are
//! re-saved at the current version by the store on the next load.

use chrono::{DateTime, Utc};
use ctp_core::{AttrValue, SpanId, SpanStatus, TraceId};
use ctp_core::value::AttrMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Current state-file schema version.
///
/// Version 1 (implicit): original schema without a version field.
/// Version 2: added `schema_version`, `project_id`, `created_at`.
pub const SCHEMA_VERSION: u32 = 2;

/// A single event on a span's append-only event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    /// Canonical event name, e.g. `task.status_changed`.
    pub name: String,
    /// Event time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Event attributes.
    #[serde(default)]
    pub attributes: AttrMap,
}

impl SpanEvent {
    /// Create an event stamped now.
    pub fn now(name: impl Into<String>, attributes: AttrMap) -> Self {
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            attributes,
        }
    }
}

/// Serializable span state, always written at [`SCHEMA_VERSION`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanState {
    /// Schema version of this record.
    pub schema_version: u32,
    /// Task identifier (unique within the project).
    pub task_id: String,
    /// Span name.
    pub span_name: String,
    /// 128-bit trace id.
    pub trace_id: TraceId,
    /// 64-bit span id.
    pub span_id: SpanId,
    /// Parent span id, when the task has a parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Owning project; populated by the store when absent.
    #[serde(default)]
    pub project_id: Option<String>,
    /// When the state was first persisted.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Span start time.
    pub start_time: DateTime<Utc>,
    /// Span end time; set when the task reaches a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Span attributes.
    #[serde(default)]
    pub attributes: AttrMap,
    /// Append-only event stream.
    #[serde(default)]
    pub events: Vec<SpanEvent>,
    /// Span status code.
    pub status: SpanStatus,
    /// Human-readable status description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
}

impl SpanState {
    /// Read an attribute as a string.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttrValue::as_str)
    }

    /// Read an attribute as a float (ints widen).
    pub fn attr_float(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(AttrValue::as_float)
    }

    /// Append an event to the stream.
    pub fn push_event(&mut self, event: SpanEvent) {
        self.events.push(event);
    }

    /// Deserialize from a raw JSON value, migrating older schemas forward.
    ///
    /// Unknown fields from future versions are ignored.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(migrate(value))
    }
}

/// Whether a raw record predates the current schema version.
pub fn needs_migration(value: &Value) -> bool {
    record_version(value) < u64::from(SCHEMA_VERSION)
}

fn record_version(value: &Value) -> u64 {
    value
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(1)
}

/// Migrate a raw state record to the current schema version.
///
/// Pure: `(version, value) -> current-version value`. Migrations are
/// additive and applied sequentially.
pub fn migrate(mut value: Value) -> Value {
    if record_version(&value) < 2 {
        value = migrate_v1_to_v2(value);
    }
    if let Some(obj) = value.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(SCHEMA_VERSION));
    }
    value
}

/// v1 -> v2: add `schema_version`, extract `project_id` from attributes,
/// default `created_at` from `start_time`.
fn migrate_v1_to_v2(mut value: Value) -> Value {
    let project_id = value
        .get("attributes")
        .and_then(|attrs| {
            attrs
                .get("project.id")
                .or_else(|| attrs.get("project.name"))
        })
        .and_then(Value::as_str)
        .map(str::to_string);
    let created_at = value.get("start_time").cloned().unwrap_or(Value::Null);

    if let Some(obj) = value.as_object_mut() {
        obj.insert("project_id".to_string(), json!(project_id));
        obj.insert("created_at".to_string(), created_at);
    }
    value
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn v1_record() -> Value {
        json!({
            "task_id": "PROJ-1",
            "span_name": "task/PROJ-1",
            "trace_id": "0123456789abcdef0123456789abcdef",
            "span_id": "0123456789abcdef",
            "parent_span_id": null,
            "start_time": "2025-01-02T03:04:05Z",
            "attributes": {"project.id": "demo", "task.status": "todo"},
            "events": [],
            "status": "UNSET",
            "status_description": null
        })
    }

    #[test]
    fn v1_records_migrate_forward() {
        let raw = v1_record();
        assert!(needs_migration(&raw));

        let state = SpanState::from_value(raw).unwrap();
        assert_eq!(state.schema_version, SCHEMA_VERSION);
        assert_eq!(state.project_id.as_deref(), Some("demo"));
        assert_eq!(
            state.created_at.map(|t| t.to_rfc3339()),
            state.start_time.to_rfc3339().into()
        );
    }

    #[test]
    fn current_records_pass_through() {
        let state = SpanState::from_value(v1_record()).unwrap();
        let raw = serde_json::to_value(&state).unwrap();
        assert!(!needs_migration(&raw));
        let back = SpanState::from_value(raw).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn unknown_future_fields_are_ignored() {
        let mut raw = v1_record();
        raw.as_object_mut()
            .unwrap()
            .insert("added_in_v9".to_string(), json!("whatever"));
        assert!(SpanState::from_value(raw).is_ok());
    }

    #[test]
    fn persist_then_load_is_identity_at_current_version() {
        let state = SpanState::from_value(v1_record()).unwrap();
        let text = serde_json::to_string_pretty(&state).unwrap();
        let back = SpanState::from_value(serde_json::from_str(&text).unwrap()).unwrap();
        assert_eq!(back, state);
    }
}
