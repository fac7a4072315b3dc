// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event sinks.

use crate::EventRecord;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Destination for lifecycle event lines.
///
/// Implementations must be cheap to clone behind an `Arc` and safe to call
/// from multiple threads.
pub trait EventSink: Send + Sync {
    /// Emit one event.
    fn emit(&self, record: &EventRecord);
}

/// Writes one JSON line per event to stdout.
///
/// This is the production sink: container log collectors pick the lines up
/// directly.
#[derive(Debug, Default, Clone)]
pub struct StdoutSink;

impl StdoutSink {
    /// Create the stdout sink.
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for StdoutSink {
    fn emit(&self, record: &EventRecord) {
        let line = record.to_line();
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        // A failed write to stdout is not recoverable from here; drop it.
        let _ = writeln!(handle, "{line}");
    }
}

/// Collects events in memory for assertions.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Event names in emission order.
    pub fn event_names(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|r| r.event)
            .collect()
    }

    /// Drop everything collected so far.
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl EventSink for MemorySink {
    fn emit(&self, record: &EventRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _record: &EventRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_collects_in_order() {
        let sink = MemorySink::new();
        sink.emit(&EventRecord::new("task.created", "svc", "p", "A"));
        sink.emit(&EventRecord::new("task.completed", "svc", "p", "A"));
        assert_eq!(sink.event_names(), vec!["task.created", "task.completed"]);
        sink.clear();
        assert!(sink.records().is_empty());
    }
}
