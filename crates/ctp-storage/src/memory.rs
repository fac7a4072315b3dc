// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory storage for tests.

use crate::backend::{Storage, StorageError};
use crate::model::{Handoff, Insight, Session};
use chrono::{DateTime, Utc};
use ctp_core::{HandoffStatus, InsightType, SessionStatus};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

type ProjectMap<T> = BTreeMap<String, BTreeMap<String, T>>;

/// Dictionary-backed storage. Data dies with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    handoffs: Mutex<ProjectMap<Handoff>>,
    sessions: Mutex<ProjectMap<Session>>,
    insights: Mutex<ProjectMap<Insight>>,
    guidance: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

impl Storage for MemoryStorage {
    fn save_handoff(&self, project_id: &str, handoff: &Handoff) -> Result<(), StorageError> {
        lock(&self.handoffs)
            .entry(project_id.to_string())
            .or_default()
            .insert(handoff.id.clone(), handoff.clone());
        Ok(())
    }

    fn get_handoff(
        &self,
        project_id: &str,
        handoff_id: &str,
    ) -> Result<Option<Handoff>, StorageError> {
        Ok(lock(&self.handoffs)
            .get(project_id)
            .and_then(|m| m.get(handoff_id))
            .cloned())
    }

    fn update_handoff_status(
        &self,
        project_id: &str,
        handoff_id: &str,
        status: HandoffStatus,
        result_trace_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut handoffs = lock(&self.handoffs);
        let Some(handoff) = handoffs
            .get_mut(project_id)
            .and_then(|m| m.get_mut(handoff_id))
        else {
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
        Ok(())
    }

    fn list_handoffs(
        &self,
        project_id: &str,
        status: Option<HandoffStatus>,
        to_agent: Option<&str>,
    ) -> Result<Vec<Handoff>, StorageError> {
        let mut handoffs: Vec<Handoff> = lock(&self.handoffs)
            .get(project_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        handoffs.retain(|h| status.is_none_or(|s| h.status == s));
        handoffs.retain(|h| to_agent.is_none_or(|a| h.to_agent == a));
        handoffs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(handoffs)
    }

    fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        lock(&self.sessions)
            .entry(session.project_id.clone())
            .or_default()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn get_session(
        &self,
        project_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, StorageError> {
        Ok(lock(&self.sessions)
            .get(project_id)
            .and_then(|m| m.get(session_id))
            .cloned())
    }

    fn update_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut sessions = lock(&self.sessions);
        let Some(existing) = sessions
            .get_mut(&session.project_id)
            .and_then(|m| m.get_mut(&session.session_id))
        else {
            return Err(StorageError::NotFound {
                kind: "session",
                id: session.session_id.clone(),
                project_id: session.project_id.clone(),
            });
        };
        *existing = session.clone();
        Ok(())
    }

    fn list_sessions(
        &self,
        project_id: &str,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, StorageError> {
        let mut sessions: Vec<Session> = lock(&self.sessions)
            .get(project_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        sessions.retain(|s| status.is_none_or(|wanted| s.status == wanted));
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    fn save_insight(&self, insight: &Insight) -> Result<(), StorageError> {
        lock(&self.insights)
            .entry(insight.project_id.clone())
            .or_default()
            .insert(insight.id.clone(), insight.clone());
        Ok(())
    }

    fn list_insights(
        &self,
        project_id: &str,
        kind: Option<InsightType>,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Insight>, StorageError> {
        let mut insights: Vec<Insight> = lock(&self.insights)
            .get(project_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        insights.retain(|i| kind.is_none_or(|k| i.kind == k));
        insights.retain(|i| match (since, i.timestamp) {
            (Some(since), Some(at)) => at >= since,
            (Some(_), None) => false,
            (None, _) => true,
        });
        insights.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        insights.truncate(limit);
        Ok(insights)
    }

    fn get_guidance(&self, project_id: &str) -> Result<Value, StorageError> {
        Ok(lock(&self.guidance)
            .get(project_id)
            .cloned()
            .unwrap_or_else(|| json!({})))
    }

    fn update_guidance(&self, project_id: &str, guidance: &Value) -> Result<(), StorageError> {
        lock(&self.guidance).insert(project_id.to_string(), guidance.clone());
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ctp_core::TaskPriority;

    #[test]
    fn behaves_like_the_file_backend() {
        let storage = MemoryStorage::new();
        let handoff = Handoff::new("h1", "a", "b", "cap", "task")
            .unwrap()
            .with_priority(TaskPriority::Critical);
        storage.save_handoff("proj", &handoff).unwrap();

        storage
            .update_handoff_status("proj", "h1", HandoffStatus::Accepted, None, None)
            .unwrap();
        assert_eq!(
            storage.get_handoff("proj", "h1").unwrap().unwrap().status,
            HandoffStatus::Accepted
        );

        assert!(storage
            .list_handoffs("other-proj", None, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn expire_overdue_default_impl_works_here_too() {
        let storage = MemoryStorage::new();
        let mut stale = Handoff::new("h-old", "a", "b", "c", "t")
            .unwrap()
            .with_timeout_ms(50);
        stale.created_at = Some(Utc::now() - chrono::Duration::seconds(1));
        storage.save_handoff("proj", &stale).unwrap();

        let expired = storage.expire_overdue("proj", Utc::now()).unwrap();
        assert_eq!(expired, vec!["h-old"]);
    }
}
