// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-backed span state store.
//!
//! One JSON file per active span at
//! `<state_dir>/<namespace>/<project>/<task_id>.json`; completed spans move
//! to `.../<project>/completed/`. Every write is atomic (temp file +
//! rename, mode 0600) so a concurrent reader sees either the old or the
//! new record, never a partial one.

use crate::state::{self, SpanState, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Errors surfaced by the state store.
///
/// Callers on mutation paths are expected to log these rather than
/// propagate them; reads surface them so startup can distinguish an empty
/// store from a broken one.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying filesystem failure.
    #[error("state i/o failed for {path}: {source}")]
    Io {
        /// Path involved in the failure.
        path: PathBuf,
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// Record failed to serialize or deserialize.
    #[error("state serialization failed for {task_id}: {source}")]
    Serde {
        /// Task whose record failed.
        task_id: String,
        /// serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Default base directory for span state: `~/.context-plane/state`.
pub fn default_state_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".context-plane").join("state"),
        None => fallback_state_dir(),
    }
}

fn fallback_state_dir() -> PathBuf {
    std::env::temp_dir().join("context-plane").join("state")
}

/// Persistent store for one project's span state.
pub struct StateStore {
    project: String,
    project_dir: PathBuf,
    using_fallback: bool,
    // Corrupt files are reported once, then read as missing.
    corrupt_reported: Mutex<BTreeSet<PathBuf>>,
}

impl StateStore {
    /// Open (or create) the store for `(namespace, project)` under
    /// `base_dir`.
    ///
    /// The directory is probed with a write test; if it is not writable
    /// the store falls back to a temp-dir location with a logged warning,
    /// and as a last resort to a unique per-process directory. Opening
    /// never fails: degraded mode is observable via
    /// [`StateStore::using_fallback`].
    pub fn open(base_dir: impl Into<PathBuf>, namespace: &str, project: &str) -> Self {
        let primary = base_dir.into().join(namespace).join(project);
        match Self::probe(&primary) {
            Ok(()) => {
                debug!(dir = %primary.display(), "using state directory");
                Self::at(project, primary, false)
            }
            Err(err) => {
                warn!(
                    dir = %primary.display(),
                    error = %err,
                    "state directory not writable, falling back to temp"
                );
                let fallback = fallback_state_dir().join(namespace).join(project);
                match Self::probe(&fallback) {
                    Ok(()) => {
                        info!(dir = %fallback.display(), "using fallback state directory");
                        Self::at(project, fallback, true)
                    }
                    Err(err) => {
                        let emergency = std::env::temp_dir()
                            .join(format!("context-plane-{}", std::process::id()))
                            .join(namespace)
                            .join(project);
                        warn!(
                            dir = %emergency.display(),
                            error = %err,
                            "fallback state directory not writable, using emergency directory"
                        );
                        let _ = fs::create_dir_all(&emergency);
                        Self::at(project, emergency, true)
                    }
                }
            }
        }
    }

    fn at(project: &str, project_dir: PathBuf, using_fallback: bool) -> Self {
        Self {
            project: project.to_string(),
            project_dir,
            using_fallback,
            corrupt_reported: Mutex::new(BTreeSet::new()),
        }
    }

    fn probe(dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let test = dir.join(".write_test");
        fs::write(&test, b"")?;
        fs::remove_file(&test)
    }

    /// `true` when the primary directory was unusable and the store is
    /// running out of a temp-dir location.
    pub fn using_fallback(&self) -> bool {
        self.using_fallback
    }

    /// Directory holding this project's active span files.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn active_path(&self, task_id: &str) -> PathBuf {
        self.project_dir.join(format!("{task_id}.json"))
    }

    fn completed_dir(&self) -> PathBuf {
        self.project_dir.join("completed")
    }

    /// Persist a span record, stamping schema version, project id, and
    /// `created_at` when unset.
    pub fn save(&self, record: &mut SpanState) -> Result<(), StoreError> {
        record.schema_version = SCHEMA_VERSION;
        if record.project_id.is_none() {
            record.project_id = Some(self.project.clone());
        }
        if record.created_at.is_none() {
            record.created_at = Some(Utc::now());
        }

        let text = serde_json::to_string_pretty(record).map_err(|source| StoreError::Serde {
            task_id: record.task_id.clone(),
            source,
        })?;
        let path = self.active_path(&record.task_id);
        write_atomic(&path, &text).map_err(|source| StoreError::Io { path, source })?;
        debug!(task_id = %record.task_id, "saved span state");
        Ok(())
    }

    /// Load a span record, migrating older schemas and re-saving them at
    /// the current version.
    ///
    /// Missing files and corrupt JSON both read as `None`; corruption is
    /// logged the first time it is seen.
    pub fn load(&self, task_id: &str) -> Result<Option<SpanState>, StoreError> {
        let path = self.active_path(task_id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let raw: Value = match serde_json::from_str(&text) {
            Ok(raw) => raw,
            Err(err) => {
                self.report_corrupt(&path, &err);
                return Ok(None);
            }
        };

        let was_old = state::needs_migration(&raw);
        let record = match SpanState::from_value(raw) {
            Ok(record) => record,
            Err(err) => {
                self.report_corrupt(&path, &err);
                return Ok(None);
            }
        };

        if was_old {
            info!(task_id, to = SCHEMA_VERSION, "migrated span state schema");
            let mut migrated = record.clone();
            self.save(&mut migrated)?;
            return Ok(Some(migrated));
        }
        Ok(Some(record))
    }

    fn report_corrupt(&self, path: &Path, err: &dyn std::fmt::Display) {
        let mut reported = match self.corrupt_reported.lock() {
            Ok(reported) => reported,
            Err(poisoned) => poisoned.into_inner(),
        };
        if reported.insert(path.to_path_buf()) {
            error!(path = %path.display(), error = %err, "corrupt span state file, treating as missing");
        }
    }

    /// Load every active span in the project directory.
    pub fn load_active(&self) -> Vec<SpanState> {
        let entries = match fs::read_dir(&self.project_dir) {
            Ok(entries) => entries,
            Err(err) => {
                error!(
                    dir = %self.project_dir.display(),
                    error = %err,
                    "failed to scan state directory"
                );
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(task_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(task_id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => error!(task_id, error = %err, "failed to load span state"),
            }
        }
        records.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        records
    }

    /// Archive a completed span: stamp `end_time`, write to the completed
    /// directory, remove the active file.
    pub fn archive(&self, record: &mut SpanState) -> Result<(), StoreError> {
        if record.end_time.is_none() {
            record.end_time = Some(Utc::now());
        }
        let completed_dir = self.completed_dir();
        fs::create_dir_all(&completed_dir).map_err(|source| StoreError::Io {
            path: completed_dir.clone(),
            source,
        })?;

        let text = serde_json::to_string_pretty(record).map_err(|source| StoreError::Serde {
            task_id: record.task_id.clone(),
            source,
        })?;
        let dest = completed_dir.join(format!("{}.json", record.task_id));
        write_atomic(&dest, &text).map_err(|source| StoreError::Io { path: dest, source })?;

        let active = self.active_path(&record.task_id);
        match fs::remove_file(&active) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(StoreError::Io { path: active, source }),
        }
        debug!(task_id = %record.task_id, "archived span to completed store");
        Ok(())
    }

    /// Completed spans, newest file first, optionally bounded by
    /// completion time.
    pub fn completed(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<SpanState> {
        let completed_dir = self.completed_dir();
        let entries = match fs::read_dir(&completed_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();
        paths.reverse();

        let mut records = Vec::new();
        for path in paths {
            if records.len() >= limit {
                break;
            }
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            let record = match serde_json::from_str::<Value>(&text).map(SpanState::from_value) {
                Ok(Ok(record)) => record,
                _ => {
                    warn!(path = %path.display(), "skipping unreadable completed span");
                    continue;
                }
            };
            if let Some(since) = since {
                match record.end_time {
                    Some(end) if end >= since => {}
                    _ => continue,
                }
            }
            records.push(record);
        }
        records
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("project", &self.project)
            .field("project_dir", &self.project_dir)
            .field("using_fallback", &self.using_fallback)
            .finish_non_exhaustive()
    }
}

/// Write `contents` to `path` atomically: temp file in the same directory,
/// permissions restricted to the owner, then rename over the target.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(&tmp, path)
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ctp_core::{SpanId, SpanStatus, TraceId};

    fn sample(task_id: &str) -> SpanState {
        SpanState {
            schema_version: SCHEMA_VERSION,
            task_id: task_id.to_string(),
            span_name: format!("task/{task_id}"),
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: None,
            project_id: None,
            created_at: None,
            start_time: Utc::now(),
            end_time: None,
            attributes: Default::default(),
            events: Vec::new(),
            status: SpanStatus::Unset,
            status_description: None,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "default", "proj");
        assert!(!store.using_fallback());

        let mut record = sample("PROJ-1");
        store.save(&mut record).unwrap();
        assert_eq!(record.project_id.as_deref(), Some("proj"));
        assert!(record.created_at.is_some());

        let loaded = store.load("PROJ-1").unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "default", "proj");
        assert!(store.load("NOPE-1").unwrap().is_none());
    }

    #[test]
    fn corrupt_record_reads_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "default", "proj");
        fs::write(store.project_dir().join("BAD-1.json"), "{not json").unwrap();
        assert!(store.load("BAD-1").unwrap().is_none());
        // Second read is silent but still missing.
        assert!(store.load("BAD-1").unwrap().is_none());
    }

    #[test]
    fn archive_moves_to_completed() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "default", "proj");

        let mut record = sample("PROJ-2");
        store.save(&mut record).unwrap();
        store.archive(&mut record).unwrap();

        assert!(record.end_time.is_some());
        assert!(store.load("PROJ-2").unwrap().is_none());
        let completed = store.completed(None, 10);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].task_id, "PROJ-2");
    }

    #[test]
    fn old_schema_is_rewritten_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "default", "proj");

        let v1 = serde_json::json!({
            "task_id": "OLD-1",
            "span_name": "task/OLD-1",
            "trace_id": "0123456789abcdef0123456789abcdef",
            "span_id": "0123456789abcdef",
            "start_time": "2025-01-02T03:04:05Z",
            "attributes": {"project.id": "proj"},
            "events": [],
            "status": "UNSET",
            "status_description": null
        });
        fs::write(
            store.project_dir().join("OLD-1.json"),
            serde_json::to_string(&v1).unwrap(),
        )
        .unwrap();

        let loaded = store.load("OLD-1").unwrap().unwrap();
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);

        // The on-disk record was rewritten at the current version.
        let text = fs::read_to_string(store.project_dir().join("OLD-1.json")).unwrap();
        let raw: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw["schema_version"], SCHEMA_VERSION);
    }

    #[cfg(unix)]
    #[test]
    fn state_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), "default", "proj");
        let mut record = sample("PROJ-3");
        store.save(&mut record).unwrap();
        let mode = fs::metadata(store.project_dir().join("PROJ-3.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
