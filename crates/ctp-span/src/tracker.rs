// SPDX-License-Identifier: MIT OR Apache-2.0
//! Task tracker: lifecycle operations over persistent task spans.
//!
//! Mutations never panic and never surface I/O errors, a failed write is
//! logged and the next read may observe pre-mutation state. Mutations on a
//! single task serialize on that task's lock; distinct tasks mutate
//! independently.

use crate::attr;
use crate::state::{SpanEvent, SpanState, SCHEMA_VERSION};
use crate::store::StateStore;
use chrono::{DateTime, Utc};
use ctp_core::value::AttrMap;
use ctp_core::{AttrValue, ProgressSource, SpanId, SpanStatus, TaskKind, TaskPriority, TaskStatus, TraceId};
use ctp_telemetry::TaskEventLogger;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, warn};

// ---------------------------------------------------------------------------
// Public value types
// ---------------------------------------------------------------------------

/// Everything needed to start a task span.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Task identifier, unique within the project.
    pub task_id: String,
    /// Human-readable title.
    pub title: String,
    /// Kind of work.
    pub kind: TaskKind,
    /// Priority; defaults to medium.
    pub priority: TaskPriority,
    /// Assignee, when known.
    pub assignee: Option<String>,
    /// Story points, when estimated.
    pub story_points: Option<u32>,
    /// Labels.
    pub labels: BTreeSet<String>,
    /// Sprint the task belongs to.
    pub sprint_id: Option<String>,
    /// Parent task; fixed for the life of the span.
    pub parent_id: Option<String>,
    /// Tasks this task depends on, in order.
    pub depends_on: Vec<String>,
}

impl TaskSpec {
    /// Minimal spec; refine with the `with_*` builders.
    pub fn new(task_id: impl Into<String>, title: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            task_id: task_id.into(),
            title: title.into(),
            kind,
            priority: TaskPriority::Medium,
            assignee: None,
            story_points: None,
            labels: BTreeSet::new(),
            sprint_id: None,
            parent_id: None,
            depends_on: Vec::new(),
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the assignee.
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Set story points.
    pub fn with_story_points(mut self, points: u32) -> Self {
        self.story_points = Some(points);
        self
    }

    /// Add a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    /// Assign to a sprint.
    pub fn with_sprint(mut self, sprint_id: impl Into<String>) -> Self {
        self.sprint_id = Some(sprint_id.into());
        self
    }

    /// Set the parent task.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Declare a dependency.
    pub fn with_dependency(mut self, task_id: impl Into<String>) -> Self {
        self.depends_on.push(task_id.into());
        self
    }
}

/// Opaque reference another span may attach for cross-trace correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLink {
    /// Trace the task span belongs to.
    pub trace_id: TraceId,
    /// The task's span id.
    pub span_id: SpanId,
}

/// Flow metrics derived from a span's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TaskMetrics {
    /// Creation to completion, seconds.
    pub lead_time_seconds: Option<f64>,
    /// First `in_progress` to completion, seconds.
    pub cycle_time_seconds: Option<f64>,
    /// Total time spent blocked, seconds.
    pub blocked_time_seconds: f64,
}

/// Derive flow metrics from a span's event stream and timestamps.
pub fn metrics_from_events(state: &SpanState) -> TaskMetrics {
    let created = state.created_at.unwrap_or(state.start_time);
    let lead_time_seconds = state
        .end_time
        .map(|end| (end - created).num_milliseconds() as f64 / 1000.0);

    let first_in_progress = state.events.iter().find_map(|e| {
        if e.name == "task.status_changed"
            && e.attributes.get("to").and_then(AttrValue::as_str) == Some("in_progress")
        {
            Some(e.timestamp)
        } else {
            None
        }
    });
    let cycle_time_seconds = match (state.end_time, first_in_progress) {
        (Some(end), Some(start)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
        _ => None,
    };

    let mut blocked_time_seconds = 0.0;
    let mut blocked_since: Option<DateTime<Utc>> = None;
    for event in &state.events {
        match event.name.as_str() {
            "task.blocked" => blocked_since = Some(event.timestamp),
            "task.unblocked" => {
                if let Some(since) = blocked_since.take() {
                    blocked_time_seconds +=
                        (event.timestamp - since).num_milliseconds() as f64 / 1000.0;
                }
            }
            _ => {}
        }
    }

    TaskMetrics {
        lead_time_seconds,
        cycle_time_seconds,
        blocked_time_seconds,
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

type ActiveMap = BTreeMap<String, Arc<Mutex<SpanState>>>;

/// Tracks one project's task spans across process restarts.
pub struct TaskTracker {
    project: String,
    store: StateStore,
    logger: TaskEventLogger,
    active: RwLock<ActiveMap>,
    completed: RwLock<BTreeMap<String, SpanState>>,
}

impl TaskTracker {
    /// Create a tracker, reloading any active spans the store already
    /// holds (migrating and rewriting older records as a side effect).
    pub fn new(project: impl Into<String>, store: StateStore, logger: TaskEventLogger) -> Self {
        let project = project.into();
        let mut active = ActiveMap::new();
        for record in store.load_active() {
            active.insert(record.task_id.clone(), Arc::new(Mutex::new(record)));
        }
        debug!(project = %project, restored = active.len(), "task tracker started");
        Self {
            project,
            store,
            logger,
            active: RwLock::new(active),
            completed: RwLock::new(BTreeMap::new()),
        }
    }

    /// `true` when the backing store is running out of a temp directory.
    pub fn degraded(&self) -> bool {
        self.store.using_fallback()
    }

    /// Ids of all active (non-terminal) tasks.
    pub fn active_tasks(&self) -> Vec<String> {
        self.read_active().keys().cloned().collect()
    }

    /// Snapshot of a task's span state, active or completed.
    pub fn snapshot(&self, task_id: &str) -> Option<SpanState> {
        if let Some(entry) = self.read_active().get(task_id) {
            return Some(lock_state(entry).clone());
        }
        self.read_completed().get(task_id).cloned()
    }

    /// Current lifecycle status of a task.
    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.snapshot(task_id)
            .and_then(|s| s.attr_str(attr::STATUS).and_then(TaskStatus::parse))
    }

    /// Current percent-complete of a task.
    pub fn percent_complete(&self, task_id: &str) -> Option<f64> {
        self.snapshot(task_id)
            .and_then(|s| s.attr_float(attr::PERCENT_COMPLETE))
    }

    // -- lifecycle operations ----------------------------------------------

    /// Start a task span.
    ///
    /// Idempotent: if `task_id` is already active, the existing link is
    /// returned and nothing is mutated.
    pub fn start_task(&self, spec: TaskSpec) -> TaskLink {
        if let Some(link) = self.get_task_link(&spec.task_id) {
            debug!(task_id = %spec.task_id, "task already active, returning existing span");
            return link;
        }

        let parent_span_id = spec
            .parent_id
            .as_deref()
            .and_then(|p| self.get_task_link(p))
            .map(|l| l.span_id);
        if spec.parent_id.is_some() && parent_span_id.is_none() {
            warn!(
                task_id = %spec.task_id,
                parent = spec.parent_id.as_deref().unwrap_or(""),
                "parent task not found, recording reference without span link"
            );
        }

        let trace_id = TraceId::generate();
        let span_id = SpanId::generate();
        let now = Utc::now();

        let mut attributes = AttrMap::new();
        attributes.insert(attr::TITLE.into(), spec.title.clone().into());
        attributes.insert(attr::KIND.into(), spec.kind.as_str().into());
        attributes.insert(attr::STATUS.into(), TaskStatus::Todo.as_str().into());
        attributes.insert(attr::PRIORITY.into(), spec.priority.to_string().into());
        attributes.insert(attr::PERCENT_COMPLETE.into(), AttrValue::Float(0.0));
        attributes.insert(attr::PROJECT_ID.into(), self.project.clone().into());
        if let Some(assignee) = &spec.assignee {
            attributes.insert(attr::ASSIGNEE.into(), assignee.clone().into());
        }
        if let Some(points) = spec.story_points {
            attributes.insert(attr::STORY_POINTS.into(), points.into());
        }
        if !spec.labels.is_empty() {
            let labels: Vec<AttrValue> =
                spec.labels.iter().cloned().map(AttrValue::from).collect();
            attributes.insert(attr::LABELS.into(), AttrValue::List(labels));
        }
        if let Some(sprint) = &spec.sprint_id {
            attributes.insert(attr::SPRINT_ID.into(), sprint.clone().into());
        }
        if let Some(parent) = &spec.parent_id {
            attributes.insert(attr::PARENT_ID.into(), parent.clone().into());
        }
        if !spec.depends_on.is_empty() {
            let deps: Vec<AttrValue> =
                spec.depends_on.iter().cloned().map(AttrValue::from).collect();
            attributes.insert(attr::DEPENDS_ON.into(), AttrValue::List(deps));
        }

        let mut created_attrs = AttrMap::new();
        created_attrs.insert("title".into(), spec.title.clone().into());
        created_attrs.insert("kind".into(), spec.kind.as_str().into());

        let mut state = SpanState {
            schema_version: SCHEMA_VERSION,
            task_id: spec.task_id.clone(),
            span_name: format!("task/{}", spec.task_id),
            trace_id,
            span_id,
            parent_span_id,
            project_id: Some(self.project.clone()),
            created_at: Some(now),
            start_time: now,
            end_time: None,
            attributes,
            events: vec![SpanEvent::now("task.created", created_attrs)],
            status: SpanStatus::Unset,
            status_description: None,
        };

        if let Err(err) = self.store.save(&mut state) {
            error!(task_id = %spec.task_id, error = %err, "failed to persist new span");
        }
        self.write_active()
            .insert(spec.task_id.clone(), Arc::new(Mutex::new(state)));

        self.logger.task_created(
            &spec.task_id,
            &spec.title,
            spec.kind,
            Some(&spec.priority.to_string()),
            spec.assignee.as_deref(),
            spec.story_points,
            spec.sprint_id.as_deref(),
            spec.parent_id.as_deref(),
        );

        TaskLink { trace_id, span_id }
    }

    /// Change a task's lifecycle status.
    ///
    /// `done` and `cancelled` route through [`TaskTracker::complete_task`]
    /// and [`TaskTracker::cancel_task`] so archival always happens.
    pub fn update_status(&self, task_id: &str, to: TaskStatus) {
        match to {
            TaskStatus::Done => self.complete_task(task_id),
            TaskStatus::Cancelled => self.cancel_task(task_id, None),
            _ => {
                if let Some((from, to)) = self.transition(task_id, to, None) {
                    self.logger.status_changed(task_id, from, to);
                }
            }
        }
    }

    /// Mark a task blocked, recording the blocking interval.
    pub fn block_task(&self, task_id: &str, reason: &str, blocked_by: Option<&str>) {
        let changed = self.with_task(task_id, |state| {
            let from = current_status(state);
            if from.is_terminal() || from == TaskStatus::Blocked {
                warn!(task_id, status = %from, "cannot block task in this state");
                return None;
            }
            apply_status(state, from, TaskStatus::Blocked);

            let mut attrs = AttrMap::new();
            attrs.insert("reason".into(), reason.into());
            if let Some(by) = blocked_by {
                attrs.insert("blocked_by".into(), by.into());
            }
            state.push_event(SpanEvent::now("task.blocked", attrs));
            state.status = SpanStatus::Error;
            state.status_description = Some(reason.to_string());
            Some(from)
        });

        if let Some(Some(from)) = changed {
            self.logger.status_changed(task_id, from, TaskStatus::Blocked);
            self.logger.blocked(task_id, reason, blocked_by);
        }
    }

    /// Unblock a task, emitting the duration of the blocking interval.
    pub fn unblock_task(&self, task_id: &str, resolution: Option<&str>) {
        let outcome = self.with_task(task_id, |state| {
            let from = current_status(state);
            if from != TaskStatus::Blocked {
                warn!(task_id, status = %from, "task is not blocked");
                return None;
            }
            let blocked_since = state
                .events
                .iter()
                .rev()
                .find(|e| e.name == "task.blocked")
                .map(|e| e.timestamp);
            apply_status(state, from, TaskStatus::InProgress);

            let now = Utc::now();
            let duration = blocked_since
                .map(|since| (now - since).num_milliseconds() as f64 / 1000.0);
            let mut attrs = AttrMap::new();
            if let Some(resolution) = resolution {
                attrs.insert("resolution".into(), resolution.into());
            }
            if let Some(duration) = duration {
                attrs.insert("blocked_duration_seconds".into(), AttrValue::Float(duration));
            }
            state.push_event(SpanEvent::now("task.unblocked", attrs));
            state.status = SpanStatus::Ok;
            state.status_description = None;
            Some((from, duration))
        });

        if let Some(Some((from, duration))) = outcome {
            self.logger
                .status_changed(task_id, from, TaskStatus::InProgress);
            self.logger.unblocked(task_id, resolution, duration);
        }
    }

    /// Set a task's percent-complete, clamped to `[0, 100]`.
    pub fn set_progress(&self, task_id: &str, percent: f64, source: ProgressSource) {
        let percent = percent.clamp(0.0, 100.0);
        let applied = self.with_task(task_id, |state| {
            if current_status(state).is_terminal() {
                warn!(task_id, "cannot update progress of a terminal task");
                return false;
            }
            state
                .attributes
                .insert(attr::PERCENT_COMPLETE.into(), AttrValue::Float(percent));
            let mut attrs = AttrMap::new();
            attrs.insert("percent_complete".into(), AttrValue::Float(percent));
            attrs.insert("source".into(), source.to_string().into());
            state.push_event(SpanEvent::now("task.progress_updated", attrs));
            true
        });

        if applied == Some(true) {
            self.logger
                .progress_updated(task_id, percent, source, None, None);
        }
    }

    /// Complete a task: terminal transition, archive, progress
    /// propagation to the parent chain.
    pub fn complete_task(&self, task_id: &str) {
        let Some(finished) = self.finish(task_id, TaskStatus::Done, None) else {
            return;
        };

        let metrics = metrics_from_events(&finished);
        let story_points = finished
            .attributes
            .get(attr::STORY_POINTS)
            .and_then(AttrValue::as_int)
            .and_then(|p| u32::try_from(p).ok());
        self.logger.completed(
            task_id,
            story_points,
            metrics.lead_time_seconds,
            metrics.cycle_time_seconds,
        );

        self.propagate_progress(task_id);
    }

    /// Cancel a task: terminal transition and archive, no propagation.
    pub fn cancel_task(&self, task_id: &str, reason: Option<&str>) {
        if self.finish(task_id, TaskStatus::Cancelled, reason).is_some() {
            self.logger.cancelled(task_id, reason);
        }
    }

    /// Opaque link for cross-trace correlation, or `None` for unknown
    /// tasks.
    pub fn get_task_link(&self, task_id: &str) -> Option<TaskLink> {
        if let Some(entry) = self.read_active().get(task_id) {
            let state = lock_state(entry);
            return Some(TaskLink {
                trace_id: state.trace_id,
                span_id: state.span_id,
            });
        }
        self.read_completed().get(task_id).map(|state| TaskLink {
            trace_id: state.trace_id,
            span_id: state.span_id,
        })
    }

    // -- sprints -------------------------------------------------------------

    /// Start a sprint span.
    #[allow(clippy::too_many_arguments, reason = "sprint metadata is flat by design")]
    pub fn start_sprint(
        &self,
        sprint_id: &str,
        name: &str,
        goal: Option<&str>,
        planned_points: Option<u32>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> TaskLink {
        let spec = TaskSpec::new(sprint_id, name, TaskKind::Sprint).with_sprint(sprint_id);
        let link = self.start_task(spec);

        let _ = self.with_task(sprint_id, |state| {
            state
                .attributes
                .insert(attr::SPRINT_NAME.into(), name.into());
            if let Some(goal) = goal {
                state.attributes.insert(attr::SPRINT_GOAL.into(), goal.into());
            }
            if let Some(points) = planned_points {
                state
                    .attributes
                    .insert(attr::SPRINT_PLANNED_POINTS.into(), points.into());
            }
            let mut attrs = AttrMap::new();
            attrs.insert("sprint_name".into(), name.into());
            state.push_event(SpanEvent::now("sprint.started", attrs));
        });

        self.logger
            .sprint_started(sprint_id, name, goal, planned_points, start_date, end_date);
        link
    }

    /// End a sprint: summarizes member-task progress, then completes the
    /// sprint span.
    pub fn end_sprint(&self, sprint_id: &str) {
        let Some(sprint) = self.snapshot(sprint_id) else {
            warn!(sprint_id, "unknown sprint");
            return;
        };
        let name = sprint
            .attr_str(attr::SPRINT_NAME)
            .unwrap_or(sprint_id)
            .to_string();
        let planned = sprint
            .attributes
            .get(attr::SPRINT_PLANNED_POINTS)
            .and_then(AttrValue::as_int)
            .and_then(|p| u32::try_from(p).ok());

        let (completed_points, percent) = self.sprint_rollup(sprint_id);

        let _ = self.with_task(sprint_id, |state| {
            let mut attrs = AttrMap::new();
            attrs.insert("sprint_name".into(), name.clone().into());
            state.push_event(SpanEvent::now("sprint.ended", attrs));
        });
        if self.finish(sprint_id, TaskStatus::Done, None).is_some() {
            self.logger
                .sprint_ended(sprint_id, &name, planned, completed_points, percent);
        }
    }

    // -- internals -----------------------------------------------------------

    fn read_active(&self) -> std::sync::RwLockReadGuard<'_, ActiveMap> {
        self.active.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_active(&self) -> std::sync::RwLockWriteGuard<'_, ActiveMap> {
        self.active.write().unwrap_or_else(|p| p.into_inner())
    }

    fn read_completed(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, SpanState>> {
        self.completed.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Run `f` under the task's lock, then persist. `None` for unknown
    /// tasks (with a warning).
    fn with_task<R>(&self, task_id: &str, f: impl FnOnce(&mut SpanState) -> R) -> Option<R> {
        let entry = self.read_active().get(task_id).cloned();
        let Some(entry) = entry else {
            warn!(task_id, "mutation targeted unknown task");
            return None;
        };
        let mut state = entry.lock().unwrap_or_else(|p| p.into_inner());
        let out = f(&mut state);
        if let Err(err) = self.store.save(&mut state) {
            error!(task_id, error = %err, "failed to persist span mutation");
        }
        Some(out)
    }

    /// Non-terminal status transition. Returns `(from, to)` when applied.
    fn transition(
        &self,
        task_id: &str,
        to: TaskStatus,
        description: Option<&str>,
    ) -> Option<(TaskStatus, TaskStatus)> {
        self.with_task(task_id, |state| {
            let from = current_status(state);
            if from.is_terminal() {
                warn!(task_id, status = %from, "task is terminal, ignoring mutation");
                return None;
            }
            if from == to {
                debug!(task_id, status = %to, "status unchanged");
                return None;
            }
            apply_status(state, from, to);
            match to {
                TaskStatus::Blocked => {
                    state.status = SpanStatus::Error;
                    state.status_description = description.map(str::to_string);
                }
                _ if from == TaskStatus::Blocked => {
                    state.status = SpanStatus::Ok;
                    state.status_description = None;
                }
                _ => {}
            }
            Some((from, to))
        })
        .flatten()
    }

    /// Terminal transition + archive. Returns the final state when the
    /// task existed and was not already terminal.
    fn finish(
        &self,
        task_id: &str,
        to: TaskStatus,
        reason: Option<&str>,
    ) -> Option<SpanState> {
        let entry = self.read_active().get(task_id).cloned();
        let Some(entry) = entry else {
            warn!(task_id, "mutation targeted unknown task");
            return None;
        };

        let finished = {
            let mut state = entry.lock().unwrap_or_else(|p| p.into_inner());
            let from = current_status(&state);
            if from.is_terminal() {
                warn!(task_id, status = %from, "task already terminal");
                return None;
            }
            apply_status(&mut state, from, to);
            if to == TaskStatus::Done {
                state
                    .attributes
                    .insert(attr::PERCENT_COMPLETE.into(), AttrValue::Float(100.0));
                state.push_event(SpanEvent::now("task.completed", AttrMap::new()));
                state.status = SpanStatus::Ok;
            } else {
                let mut attrs = AttrMap::new();
                if let Some(reason) = reason {
                    attrs.insert("reason".into(), reason.into());
                }
                state.push_event(SpanEvent::now("task.cancelled", attrs));
            }
            state.end_time = Some(Utc::now());
            state.status_description = None;

            if let Err(err) = self.store.archive(&mut state) {
                error!(task_id, error = %err, "failed to archive span");
            }
            self.logger.status_changed(task_id, from, to);
            state.clone()
        };

        self.write_active().remove(task_id);
        self.completed
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(task_id.to_string(), finished.clone());
        Some(finished)
    }

    fn parent_of(&self, task_id: &str) -> Option<String> {
        self.snapshot(task_id)
            .and_then(|s| s.attr_str(attr::PARENT_ID).map(str::to_string))
    }

    /// `(avg percent, done count, total count)` over all children of
    /// `parent_id`, active and completed.
    fn children_progress(&self, parent_id: &str) -> Option<(f64, u32, u32)> {
        let mut total = 0u32;
        let mut done = 0u32;
        let mut sum = 0.0f64;

        for entry in self.read_active().values() {
            let state = lock_state(entry);
            if state.attr_str(attr::PARENT_ID) == Some(parent_id) {
                total += 1;
                sum += state.attr_float(attr::PERCENT_COMPLETE).unwrap_or(0.0);
                if state.attr_str(attr::STATUS) == Some("done") {
                    done += 1;
                }
            }
        }
        for state in self.read_completed().values() {
            if state.attr_str(attr::PARENT_ID) == Some(parent_id) {
                total += 1;
                sum += state.attr_float(attr::PERCENT_COMPLETE).unwrap_or(0.0);
                if state.attr_str(attr::STATUS) == Some("done") {
                    done += 1;
                }
            }
        }

        if total == 0 {
            None
        } else {
            Some((sum / f64::from(total), done, total))
        }
    }

    /// After `completed_child` finishes, refresh the parent's percent from
    /// the child average, then walk the ancestor chain doing the same.
    /// Parents are fixed at creation, so the walk terminates.
    fn propagate_progress(&self, completed_child: &str) {
        let Some(parent_id) = self.parent_of(completed_child) else {
            return;
        };
        let Some((avg, done, total)) = self.children_progress(&parent_id) else {
            return;
        };
        self.set_progress(&parent_id, avg, ProgressSource::Subtask);
        self.logger
            .subtask_completed(&parent_id, completed_child, done, total, avg);

        let mut current = parent_id;
        while let Some(ancestor) = self.parent_of(&current) {
            if let Some((avg, _, _)) = self.children_progress(&ancestor) {
                self.set_progress(&ancestor, avg, ProgressSource::Subtask);
            }
            current = ancestor;
        }
    }

    /// `(completed story points, avg percent)` over tasks in a sprint.
    fn sprint_rollup(&self, sprint_id: &str) -> (Option<u32>, Option<f64>) {
        let mut points = 0u32;
        let mut percents = Vec::new();
        let mut consider = |state: &SpanState| {
            if state.attr_str(attr::SPRINT_ID) != Some(sprint_id)
                || state.attr_str(attr::KIND) == Some("sprint")
            {
                return;
            }
            if let Some(p) = state.attr_float(attr::PERCENT_COMPLETE) {
                percents.push(p);
            }
            if state.attr_str(attr::STATUS) == Some("done") {
                if let Some(sp) = state
                    .attributes
                    .get(attr::STORY_POINTS)
                    .and_then(AttrValue::as_int)
                {
                    points += u32::try_from(sp).unwrap_or(0);
                }
            }
        };
        for entry in self.read_active().values() {
            consider(&lock_state(entry));
        }
        for state in self.read_completed().values() {
            consider(state);
        }

        let percent = if percents.is_empty() {
            None
        } else {
            Some(percents.iter().sum::<f64>() / percents.len() as f64)
        };
        (Some(points), percent)
    }
}

impl std::fmt::Debug for TaskTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTracker")
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

fn lock_state(entry: &Arc<Mutex<SpanState>>) -> std::sync::MutexGuard<'_, SpanState> {
    entry.lock().unwrap_or_else(|p| p.into_inner())
}

fn current_status(state: &SpanState) -> TaskStatus {
    state
        .attr_str(attr::STATUS)
        .and_then(TaskStatus::parse)
        .unwrap_or(TaskStatus::Todo)
}

fn apply_status(state: &mut SpanState, from: TaskStatus, to: TaskStatus) {
    state
        .attributes
        .insert(attr::STATUS.into(), to.as_str().into());
    let mut attrs = AttrMap::new();
    attrs.insert("from".into(), from.as_str().into());
    attrs.insert("to".into(), to.as_str().into());
    state.push_event(SpanEvent::now("task.status_changed", attrs));
}
