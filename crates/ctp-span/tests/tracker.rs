// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tracker lifecycle tests over a real (temp-dir) state store.

use ctp_core::{ProgressSource, TaskKind, TaskStatus};
use ctp_span::{attr, metrics_from_events, SpanState, StateStore, TaskSpec, TaskTracker};
use ctp_telemetry::{MemorySink, TaskEventLogger};
use std::sync::Arc;

fn tracker_in(dir: &std::path::Path) -> (TaskTracker, MemorySink) {
    let sink = MemorySink::new();
    let store = StateStore::open(dir, "default", "proj");
    let logger = TaskEventLogger::new("proj", Arc::new(sink.clone()));
    (TaskTracker::new("proj", store, logger), sink)
}

/// Replay `task.status_changed` events from the initial state and return
/// the final status.
fn replay_status(state: &SpanState) -> TaskStatus {
    let mut status = TaskStatus::Todo;
    for event in &state.events {
        if event.name == "task.status_changed" {
            if let Some(to) = event
                .attributes
                .get("to")
                .and_then(|v| v.as_str())
                .and_then(TaskStatus::parse)
            {
                status = to;
            }
        }
    }
    status
}

#[test]
fn story_lifecycle_emits_canonical_events() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, sink) = tracker_in(dir.path());

    tracker.start_task(TaskSpec::new("PROJ-1", "Implement A", TaskKind::Story));
    tracker.update_status("PROJ-1", TaskStatus::InProgress);
    tracker.complete_task("PROJ-1");

    assert_eq!(
        sink.event_names(),
        vec![
            "task.created",
            "task.status_changed",
            "task.status_changed",
            "task.completed",
        ]
    );

    let records = sink.records();
    assert_eq!(records[1].fields["from_status"], "todo");
    assert_eq!(records[1].fields["to_status"], "in_progress");
    assert_eq!(records[2].fields["from_status"], "in_progress");
    assert_eq!(records[2].fields["to_status"], "done");

    assert_eq!(tracker.status("PROJ-1"), Some(TaskStatus::Done));
    assert_eq!(tracker.percent_complete("PROJ-1"), Some(100.0));

    // Persisted record moved to the completed directory.
    let store = StateStore::open(dir.path(), "default", "proj");
    assert!(store.load("PROJ-1").unwrap().is_none());
    assert_eq!(store.completed(None, 10).len(), 1);
}

#[test]
fn replaying_status_events_yields_final_status() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, _sink) = tracker_in(dir.path());

    tracker.start_task(TaskSpec::new("PROJ-2", "B", TaskKind::Task));
    tracker.update_status("PROJ-2", TaskStatus::InProgress);
    tracker.block_task("PROJ-2", "waiting on dependency", None);
    tracker.unblock_task("PROJ-2", Some("dependency landed"));
    tracker.complete_task("PROJ-2");

    let state = tracker.snapshot("PROJ-2").unwrap();
    assert_eq!(replay_status(&state), TaskStatus::Done);
    assert_eq!(state.attr_str(attr::STATUS), Some("done"));
}

#[test]
fn blocked_time_accumulates_across_intervals() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, sink) = tracker_in(dir.path());

    tracker.start_task(TaskSpec::new("PROJ-3", "C", TaskKind::Bug));
    tracker.update_status("PROJ-3", TaskStatus::InProgress);
    tracker.block_task("PROJ-3", "first", None);
    tracker.unblock_task("PROJ-3", None);
    tracker.block_task("PROJ-3", "second", Some("PROJ-9"));
    tracker.unblock_task("PROJ-3", None);

    let state = tracker.snapshot("PROJ-3").unwrap();
    let blocked_events = state
        .events
        .iter()
        .filter(|e| e.name == "task.blocked")
        .count();
    assert_eq!(blocked_events, 2);
    let metrics = metrics_from_events(&state);
    assert!(metrics.blocked_time_seconds >= 0.0);

    // Unblock lines carry the interval duration.
    let unblocked: Vec<_> = sink
        .records()
        .into_iter()
        .filter(|r| r.event == "task.unblocked")
        .collect();
    assert_eq!(unblocked.len(), 2);
    assert!(unblocked[0].fields.contains_key("blocked_duration_seconds"));
}

#[test]
fn parent_progress_is_average_of_children() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, sink) = tracker_in(dir.path());

    tracker.start_task(TaskSpec::new("EPIC-1", "Epic", TaskKind::Epic));
    tracker.start_task(TaskSpec::new("ST-1", "one", TaskKind::Subtask).with_parent("EPIC-1"));
    tracker.start_task(TaskSpec::new("ST-2", "two", TaskKind::Subtask).with_parent("EPIC-1"));

    tracker.complete_task("ST-1");
    assert_eq!(tracker.percent_complete("EPIC-1"), Some(50.0));

    tracker.complete_task("ST-2");
    assert_eq!(tracker.percent_complete("EPIC-1"), Some(100.0));

    let subtask_events: Vec<_> = sink
        .records()
        .into_iter()
        .filter(|r| r.event == "subtask.completed")
        .collect();
    assert_eq!(subtask_events.len(), 2);
    assert_eq!(subtask_events[0].task_id, "EPIC-1");
    assert_eq!(subtask_events[0].fields["subtask_id"], "ST-1");
    assert_eq!(subtask_events[1].fields["subtask_completed"], 2);
}

#[test]
fn manual_override_is_reoverridden_on_next_subtask_completion() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, _sink) = tracker_in(dir.path());

    tracker.start_task(TaskSpec::new("EPIC-2", "Epic", TaskKind::Epic));
    tracker.start_task(TaskSpec::new("SB-1", "a", TaskKind::Subtask).with_parent("EPIC-2"));
    tracker.start_task(TaskSpec::new("SB-2", "b", TaskKind::Subtask).with_parent("EPIC-2"));

    tracker.set_progress("EPIC-2", 90.0, ProgressSource::Manual);
    assert_eq!(tracker.percent_complete("EPIC-2"), Some(90.0));

    tracker.complete_task("SB-1");
    assert_eq!(tracker.percent_complete("EPIC-2"), Some(50.0));
}

#[test]
fn grandparent_progress_recomputes_on_propagation() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, _sink) = tracker_in(dir.path());

    tracker.start_task(TaskSpec::new("EPIC-3", "Epic", TaskKind::Epic));
    tracker.start_task(TaskSpec::new("STY-1", "story", TaskKind::Story).with_parent("EPIC-3"));
    tracker.start_task(TaskSpec::new("SB-3", "leaf", TaskKind::Subtask).with_parent("STY-1"));

    tracker.complete_task("SB-3");
    assert_eq!(tracker.percent_complete("STY-1"), Some(100.0));
    assert_eq!(tracker.percent_complete("EPIC-3"), Some(100.0));
}

#[test]
fn start_task_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, sink) = tracker_in(dir.path());

    let first = tracker.start_task(TaskSpec::new("PROJ-4", "D", TaskKind::Task));
    let second = tracker.start_task(TaskSpec::new("PROJ-4", "D again", TaskKind::Task));
    assert_eq!(first, second);

    let created = sink
        .records()
        .into_iter()
        .filter(|r| r.event == "task.created")
        .count();
    assert_eq!(created, 1);
}

#[test]
fn unknown_task_mutations_are_no_ops() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, sink) = tracker_in(dir.path());

    tracker.update_status("GHOST-1", TaskStatus::InProgress);
    tracker.set_progress("GHOST-1", 50.0, ProgressSource::Manual);
    tracker.complete_task("GHOST-1");

    assert!(sink.records().is_empty());
}

#[test]
fn terminal_tasks_reject_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, _sink) = tracker_in(dir.path());

    tracker.start_task(TaskSpec::new("PROJ-5", "E", TaskKind::Task));
    tracker.cancel_task("PROJ-5", Some("descoped"));
    assert_eq!(tracker.status("PROJ-5"), Some(TaskStatus::Cancelled));

    tracker.set_progress("PROJ-5", 10.0, ProgressSource::Manual);
    // Cancellation does not force percent to 100 and later writes bounce.
    assert_eq!(tracker.percent_complete("PROJ-5"), Some(0.0));
}

#[test]
fn spans_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let link = {
        let (tracker, _sink) = tracker_in(dir.path());
        let link = tracker.start_task(TaskSpec::new("PROJ-6", "F", TaskKind::Story));
        tracker.update_status("PROJ-6", TaskStatus::InProgress);
        link
    };

    // A fresh tracker over the same directory restores span identity.
    let (tracker, _sink) = tracker_in(dir.path());
    assert_eq!(tracker.get_task_link("PROJ-6"), Some(link));
    assert_eq!(tracker.status("PROJ-6"), Some(TaskStatus::InProgress));
}

#[test]
fn sprint_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, sink) = tracker_in(dir.path());

    tracker.start_sprint("S-1", "Sprint One", Some("ship it"), Some(8), None, None);
    tracker.start_task(
        TaskSpec::new("PROJ-7", "G", TaskKind::Story)
            .with_sprint("S-1")
            .with_story_points(5),
    );
    tracker.complete_task("PROJ-7");
    tracker.end_sprint("S-1");

    let names = sink.event_names();
    assert!(names.contains(&"sprint.started".to_string()));
    assert!(names.contains(&"sprint.ended".to_string()));

    let ended = sink
        .records()
        .into_iter()
        .find(|r| r.event == "sprint.ended")
        .unwrap();
    assert_eq!(ended.fields["completed_points"], 5);
}
