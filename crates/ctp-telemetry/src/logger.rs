// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed emitters for the canonical lifecycle events.
//!
//! Only status-changing events are logged; comments and assignments live
//! in the span event stream but are not emitted separately.

use crate::{EventLevel, EventRecord, EventSink};
use ctp_core::{ProgressSource, TaskKind, TaskStatus};
use serde_json::json;
use std::sync::Arc;

/// Structured logger for task lifecycle events, bound to one project.
///
/// Each emit method produces exactly one [`EventRecord`] on the injected
/// sink. Field names are stable: downstream recording rules and dashboards
/// key on them.
#[derive(Clone)]
pub struct TaskEventLogger {
    project: String,
    service: String,
    sink: Arc<dyn EventSink>,
}

impl TaskEventLogger {
    /// Create a logger for `project` emitting through `sink`.
    pub fn new(project: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            project: project.into(),
            service: "context-plane".to_string(),
            sink,
        }
    }

    /// Override the service name used in emitted lines.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    fn base(&self, event: &str, task_id: &str) -> EventRecord {
        EventRecord::new(event, self.service.clone(), self.project.clone(), task_id)
    }

    /// Emit `task.created`.
    #[allow(clippy::too_many_arguments, reason = "event carries many optional fields")]
    pub fn task_created(
        &self,
        task_id: &str,
        title: &str,
        kind: TaskKind,
        priority: Option<&str>,
        assignee: Option<&str>,
        story_points: Option<u32>,
        sprint_id: Option<&str>,
        parent_id: Option<&str>,
    ) {
        let mut record = self.base("task.created", task_id);
        record.task_type = Some(kind.to_string());
        record.task_title = Some(title.to_string());
        record.sprint_id = sprint_id.map(str::to_string);
        let record = record
            .field("priority", json!(priority))
            .field("assignee", json!(assignee))
            .field("story_points", json!(story_points))
            .field("parent_id", json!(parent_id));
        self.sink.emit(&record);
    }

    /// Emit `task.status_changed` with the `(from, to)` pair.
    pub fn status_changed(&self, task_id: &str, from: TaskStatus, to: TaskStatus) {
        let record = self
            .base("task.status_changed", task_id)
            .field("from_status", json!(from.as_str()))
            .field("to_status", json!(to.as_str()));
        self.sink.emit(&record);
    }

    /// Emit `task.blocked` at warn level.
    pub fn blocked(&self, task_id: &str, reason: &str, blocked_by: Option<&str>) {
        let record = self
            .base("task.blocked", task_id)
            .level(EventLevel::Warn)
            .field("reason", json!(reason))
            .field("blocked_by", json!(blocked_by));
        self.sink.emit(&record);
    }

    /// Emit `task.unblocked` with the duration of the blocking interval.
    pub fn unblocked(
        &self,
        task_id: &str,
        resolution: Option<&str>,
        blocked_duration_seconds: Option<f64>,
    ) {
        let record = self
            .base("task.unblocked", task_id)
            .field("resolution", json!(resolution))
            .field("blocked_duration_seconds", json!(blocked_duration_seconds));
        self.sink.emit(&record);
    }

    /// Emit `task.completed` with derived flow metrics.
    pub fn completed(
        &self,
        task_id: &str,
        story_points: Option<u32>,
        lead_time_seconds: Option<f64>,
        cycle_time_seconds: Option<f64>,
    ) {
        let record = self
            .base("task.completed", task_id)
            .field("story_points", json!(story_points))
            .field("lead_time_seconds", json!(lead_time_seconds))
            .field("cycle_time_seconds", json!(cycle_time_seconds));
        self.sink.emit(&record);
    }

    /// Emit `task.cancelled`.
    pub fn cancelled(&self, task_id: &str, reason: Option<&str>) {
        let record = self
            .base("task.cancelled", task_id)
            .field("reason", json!(reason));
        self.sink.emit(&record);
    }

    /// Emit `task.progress_updated`.
    ///
    /// `percent_complete` feeds time-series recording rules downstream.
    pub fn progress_updated(
        &self,
        task_id: &str,
        percent_complete: f64,
        source: ProgressSource,
        subtask_completed: Option<u32>,
        subtask_count: Option<u32>,
    ) {
        let record = self
            .base("task.progress_updated", task_id)
            .field("percent_complete", json!(percent_complete))
            .field("source", json!(source.to_string()))
            .field("subtask_completed", json!(subtask_completed))
            .field("subtask_count", json!(subtask_count));
        self.sink.emit(&record);
    }

    /// Emit `subtask.completed` against the parent task.
    pub fn subtask_completed(
        &self,
        parent_id: &str,
        subtask_id: &str,
        subtask_completed: u32,
        subtask_count: u32,
        percent_complete: f64,
    ) {
        let record = self
            .base("subtask.completed", parent_id)
            .field("subtask_id", json!(subtask_id))
            .field("subtask_completed", json!(subtask_completed))
            .field("subtask_count", json!(subtask_count))
            .field("percent_complete", json!(percent_complete));
        self.sink.emit(&record);
    }

    /// Emit `sprint.started`. The sprint id doubles as the task id.
    pub fn sprint_started(
        &self,
        sprint_id: &str,
        name: &str,
        goal: Option<&str>,
        planned_points: Option<u32>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) {
        let mut record = self.base("sprint.started", sprint_id);
        record.task_type = Some("sprint".to_string());
        record.sprint_id = Some(sprint_id.to_string());
        let record = record
            .field("sprint_name", json!(name))
            .field("goal", json!(goal))
            .field("planned_points", json!(planned_points))
            .field("start_date", json!(start_date))
            .field("end_date", json!(end_date));
        self.sink.emit(&record);
    }

    /// Emit `sprint.ended`.
    pub fn sprint_ended(
        &self,
        sprint_id: &str,
        name: &str,
        planned_points: Option<u32>,
        completed_points: Option<u32>,
        percent_complete: Option<f64>,
    ) {
        let mut record = self.base("sprint.ended", sprint_id);
        record.task_type = Some("sprint".to_string());
        record.sprint_id = Some(sprint_id.to_string());
        let record = record
            .field("sprint_name", json!(name))
            .field("planned_points", json!(planned_points))
            .field("completed_points", json!(completed_points))
            .field("percent_complete", json!(percent_complete));
        self.sink.emit(&record);
    }
}

impl std::fmt::Debug for TaskEventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEventLogger")
            .field("project", &self.project)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}
