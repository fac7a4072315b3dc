// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-backed storage.
//!
//! Layout:
//!
//! ```text
//! <base>/<namespace>/<project>/
//! ├── handoffs/<id>.json
//! ├── sessions/<id>.json
//! ├── insights/<id>.json
//! └── guidance.json
//! ```
//!
//! Writes are atomic (temp file + rename); lists are sorted by timestamp
//! descending; unreadable files are skipped with a warning.

use crate::backend::{Storage, StorageError};
use crate::model::{Handoff, Insight, Session};
use chrono::{DateTime, Utc};
use ctp_core::{HandoffStatus, InsightType, SessionStatus};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// JSON-file storage for one namespace.
#[derive(Debug, Clone)]
pub struct FileStorage {
    namespace_dir: PathBuf,
}

impl FileStorage {
    /// Open storage for `namespace` under `base_dir`.
    pub fn open(base_dir: impl Into<PathBuf>, namespace: &str) -> Self {
        let namespace_dir = base_dir.into().join(namespace);
        debug!(dir = %namespace_dir.display(), "file storage opened");
        Self { namespace_dir }
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.namespace_dir.join(project_id)
    }

    fn record_dir(&self, project_id: &str, kind: &str) -> PathBuf {
        self.project_dir(project_id).join(kind)
    }

    fn write_record(&self, dir: &Path, id: &str, value: &Value) -> Result<(), StorageError> {
        fs::create_dir_all(dir).map_err(|source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(format!("{id}.json"));
        let tmp = dir.join(format!("{id}.json.tmp"));
        let text = serde_json::to_string_pretty(value)?;
        fs::write(&tmp, text).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StorageError::Io { path, source })
    }

    fn read_record<T: serde::de::DeserializeOwned>(
        path: &Path,
    ) -> Result<Option<T>, StorageError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        match serde_json::from_str(&text) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable record");
                Ok(None)
            }
        }
    }

    fn read_all<T: serde::de::DeserializeOwned>(&self, dir: &Path) -> Vec<T> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .filter_map(|p| Self::read_record(&p).ok().flatten())
            .collect()
    }
}

impl Storage for FileStorage {
    fn save_handoff(&self, project_id: &str, handoff: &Handoff) -> Result<(), StorageError> {
        let dir = self.record_dir(project_id, "handoffs");
        self.write_record(&dir, &handoff.id, &serde_json::to_value(handoff)?)
    }

    fn get_handoff(
        &self,
        project_id: &str,
        handoff_id: &str,
    ) -> Result<Option<Handoff>, StorageError> {
        let path = self
            .record_dir(project_id, "handoffs")
            .join(format!("{handoff_id}.json"));
        Self::read_record(&path)
    }

    fn update_handoff_status(
        &self,
        project_id: &str,
        handoff_id: &str,
        status: HandoffStatus,
        result_trace_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), StorageError> {
        let Some(mut handoff) = self.get_handoff(project_id, handoff_id)? else {
            return Err(StorageError::NotFound {
                kind: "handoff",
                id: handoff_id.to_string(),
                project_id: project_id.to_string(),
            });
        };
        handoff.status = status;
        if let Some(trace_id) = result_trace_id {
            handoff.result_trace_id = Some(trace_id.to_string());
        }
        if let Some(message) = error_message {
            handoff.error_message = Some(message.to_string());
        }
        self.save_handoff(project_id, &handoff)
    }

    fn list_handoffs(
        &self,
        project_id: &str,
        status: Option<HandoffStatus>,
        to_agent: Option<&str>,
    ) -> Result<Vec<Handoff>, StorageError> {
        let mut handoffs: Vec<Handoff> = self
            .read_all(&self.record_dir(project_id, "handoffs"))
            .into_iter()
            .filter(|h: &Handoff| status.is_none_or(|s| h.status == s))
            .filter(|h| to_agent.is_none_or(|a| h.to_agent == a))
            .collect();
        handoffs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(handoffs)
    }

    fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let dir = self.record_dir(&session.project_id, "sessions");
        self.write_record(&dir, &session.session_id, &serde_json::to_value(session)?)
    }

    fn get_session(
        &self,
        project_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, StorageError> {
        let path = self
            .record_dir(project_id, "sessions")
            .join(format!("{session_id}.json"));
        Self::read_record(&path)
    }

    fn update_session(&self, session: &Session) -> Result<(), StorageError> {
        if self
            .get_session(&session.project_id, &session.session_id)?
            .is_none()
        {
            return Err(StorageError::NotFound {
                kind: "session",
                id: session.session_id.clone(),
                project_id: session.project_id.clone(),
            });
        }
        self.save_session(session)
    }

    fn list_sessions(
        &self,
        project_id: &str,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, StorageError> {
        let mut sessions: Vec<Session> = self
            .read_all(&self.record_dir(project_id, "sessions"))
            .into_iter()
            .filter(|s: &Session| status.is_none_or(|wanted| s.status == wanted))
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    fn save_insight(&self, insight: &Insight) -> Result<(), StorageError> {
        let dir = self.record_dir(&insight.project_id, "insights");
        self.write_record(&dir, &insight.id, &serde_json::to_value(insight)?)
    }

    fn list_insights(
        &self,
        project_id: &str,
        kind: Option<InsightType>,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Insight>, StorageError> {
        let mut insights: Vec<Insight> = self
            .read_all(&self.record_dir(project_id, "insights"))
            .into_iter()
            .filter(|i: &Insight| kind.is_none_or(|k| i.kind == k))
            .filter(|i| match (since, i.timestamp) {
                (Some(since), Some(at)) => at >= since,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();
        insights.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        insights.truncate(limit);
        Ok(insights)
    }

    fn get_guidance(&self, project_id: &str) -> Result<Value, StorageError> {
        let path = self.project_dir(project_id).join("guidance.json");
        Ok(Self::read_record(&path)?.unwrap_or_else(|| json!({})))
    }

    fn update_guidance(&self, project_id: &str, guidance: &Value) -> Result<(), StorageError> {
        let dir = self.project_dir(project_id);
        self.write_record(&dir, "guidance", guidance)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ctp_core::{AgentType, TaskPriority};
    use serde_json::json;

    fn storage() -> (tempfile::TempDir, FileStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), "default");
        (dir, storage)
    }

    #[test]
    fn handoff_round_trip_and_status_update() {
        let (_dir, storage) = storage();
        let handoff = Handoff::new("h1", "planner", "builder", "cap.build", "build")
            .unwrap()
            .with_priority(TaskPriority::High);
        storage.save_handoff("proj", &handoff).unwrap();

        storage
            .update_handoff_status(
                "proj",
                "h1",
                HandoffStatus::Completed,
                Some("0123456789abcdef0123456789abcdef"),
                None,
            )
            .unwrap();
        let loaded = storage.get_handoff("proj", "h1").unwrap().unwrap();
        assert_eq!(loaded.status, HandoffStatus::Completed);
        assert!(loaded.result_trace_id.is_some());
    }

    #[test]
    fn updating_missing_handoff_is_not_found() {
        let (_dir, storage) = storage();
        let err = storage
            .update_handoff_status("proj", "nope", HandoffStatus::Failed, None, None)
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { kind: "handoff", .. }));
    }

    #[test]
    fn list_handoffs_filters_and_sorts_newest_first() {
        let (_dir, storage) = storage();
        for (id, agent, offset) in [("h1", "builder", 30), ("h2", "builder", 10), ("h3", "reviewer", 20)] {
            let mut handoff = Handoff::new(id, "planner", agent, "cap", "t").unwrap();
            handoff.created_at = Some(Utc::now() - chrono::Duration::seconds(offset));
            storage.save_handoff("proj", &handoff).unwrap();
        }

        let builders = storage
            .list_handoffs("proj", None, Some("builder"))
            .unwrap();
        let ids: Vec<&str> = builders.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["h2", "h1"]);
    }

    #[test]
    fn expire_overdue_fails_timed_out_handoffs() {
        let (_dir, storage) = storage();
        let mut stale = Handoff::new("h-old", "a", "b", "c", "t")
            .unwrap()
            .with_timeout_ms(1_000);
        stale.created_at = Some(Utc::now() - chrono::Duration::seconds(10));
        storage.save_handoff("proj", &stale).unwrap();

        let fresh = Handoff::new("h-new", "a", "b", "c", "t").unwrap();
        storage.save_handoff("proj", &fresh).unwrap();

        let expired = storage.expire_overdue("proj", Utc::now()).unwrap();
        assert_eq!(expired, vec!["h-old"]);

        let failed = storage.get_handoff("proj", "h-old").unwrap().unwrap();
        assert_eq!(failed.status, HandoffStatus::Failed);
        assert!(failed.error_message.unwrap().contains("timed out"));
        assert_eq!(
            storage.get_handoff("proj", "h-new").unwrap().unwrap().status,
            HandoffStatus::Pending
        );
    }

    #[test]
    fn sessions_update_requires_existing() {
        let (_dir, storage) = storage();
        let mut session =
            Session::new("s1", "agent-1", "proj", AgentType::CodeAssistant).unwrap();
        assert!(storage.update_session(&session).is_err());

        storage.save_session(&session).unwrap();
        session.insight_count = 3;
        storage.update_session(&session).unwrap();
        assert_eq!(
            storage
                .get_session("proj", "s1")
                .unwrap()
                .unwrap()
                .insight_count,
            3
        );
    }

    #[test]
    fn insights_filter_by_kind_since_and_limit() {
        let (_dir, storage) = storage();
        for (id, kind, offset) in [
            ("i1", ctp_core::InsightType::Decision, 300),
            ("i2", ctp_core::InsightType::Blocker, 200),
            ("i3", ctp_core::InsightType::Decision, 100),
        ] {
            let mut insight = Insight::new(id, "proj", "agent", kind, "s", 0.9).unwrap();
            insight.timestamp = Some(Utc::now() - chrono::Duration::seconds(offset));
            storage.save_insight(&insight).unwrap();
        }

        let decisions = storage
            .list_insights("proj", Some(ctp_core::InsightType::Decision), None, 10)
            .unwrap();
        let ids: Vec<&str> = decisions.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i3", "i1"]);

        let recent = storage
            .list_insights(
                "proj",
                None,
                Some(Utc::now() - chrono::Duration::seconds(250)),
                10,
            )
            .unwrap();
        assert_eq!(recent.len(), 2);

        let limited = storage.list_insights("proj", None, None, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "i3");
    }

    #[test]
    fn guidance_defaults_to_empty_object() {
        let (_dir, storage) = storage();
        assert_eq!(storage.get_guidance("proj").unwrap(), json!({}));

        storage
            .update_guidance("proj", &json!({"focus": {"areas": ["reliability"]}}))
            .unwrap();
        assert_eq!(
            storage.get_guidance("proj").unwrap()["focus"]["areas"][0],
            "reliability"
        );
    }

    #[test]
    fn corrupt_records_are_skipped() {
        let (_dir, storage) = storage();
        let handoff = Handoff::new("good", "a", "b", "c", "t").unwrap();
        storage.save_handoff("proj", &handoff).unwrap();
        let dir = storage.record_dir("proj", "handoffs");
        fs::write(dir.join("bad.json"), "{nope").unwrap();

        let listed = storage.list_handoffs("proj", None, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "good");
    }
}
