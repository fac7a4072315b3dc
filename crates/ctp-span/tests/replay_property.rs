// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property: replaying `task.status_changed` events from the initial
//! state always yields the span's final status attribute, for any
//! sequence of lifecycle operations.

use ctp_core::{TaskKind, TaskStatus};
use ctp_span::{attr, SpanState, StateStore, TaskSpec, TaskTracker};
use ctp_telemetry::{NullSink, TaskEventLogger};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Op {
    Start,
    Block,
    Unblock,
    Progress(u8),
    Complete,
    Cancel,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Start),
        Just(Op::Block),
        Just(Op::Unblock),
        (0u8..=100).prop_map(Op::Progress),
        Just(Op::Complete),
        Just(Op::Cancel),
    ]
}

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

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn status_replay_matches_final_attribute(ops in proptest::collection::vec(op_strategy(), 0..12)) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "default", "proj");
        let logger = TaskEventLogger::new("proj", Arc::new(NullSink));
        let tracker = TaskTracker::new("proj", store, logger);

        tracker.start_task(TaskSpec::new("P-1", "prop", TaskKind::Task));
        for op in ops {
            match op {
                Op::Start => tracker.update_status("P-1", TaskStatus::InProgress),
                Op::Block => tracker.block_task("P-1", "blocked", None),
                Op::Unblock => tracker.unblock_task("P-1", None),
                Op::Progress(p) => tracker.set_progress(
                    "P-1",
                    f64::from(p),
                    ctp_core::ProgressSource::Manual,
                ),
                Op::Complete => tracker.complete_task("P-1"),
                Op::Cancel => tracker.cancel_task("P-1", None),
            }
        }

        let state = tracker.snapshot("P-1").unwrap();
        let final_status = state
            .attr_str(attr::STATUS)
            .and_then(TaskStatus::parse)
            .unwrap();
        prop_assert_eq!(replay_status(&state), final_status);

        // Terminal tasks always read 100% complete when done.
        if final_status == TaskStatus::Done {
            prop_assert_eq!(state.attr_float(attr::PERCENT_COMPLETE), Some(100.0));
        }
    }
}
