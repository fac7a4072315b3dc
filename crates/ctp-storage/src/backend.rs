// SPDX-License-Identifier: MIT OR Apache-2.0
//! The storage trait, backend detection, and the remote-backend
//! contract.

use crate::model::{Handoff, Insight, RecordError, Session};
use chrono::{DateTime, Utc};
use ctp_core::{HandoffStatus, InsightType, SessionStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Errors surfaced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("storage i/o failed for {path}: {source}")]
    Io {
        /// Path involved.
        path: std::path::PathBuf,
        /// OS error.
        #[source]
        source: std::io::Error,
    },
    /// A record failed to (de)serialize.
    #[error("storage serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    /// A record failed validation.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// The requested record does not exist.
    #[error("{kind} '{id}' not found in project '{project_id}'")]
    NotFound {
        /// Record kind ("handoff", "session", ...).
        kind: &'static str,
        /// Record id.
        id: String,
        /// Project searched.
        project_id: String,
    },
}

/// The storage backend interface.
///
/// All operations are synchronous and thread-safe; concurrency is the
/// caller's choice.
pub trait Storage: Send + Sync {
    /// Save a handoff to the project's queue.
    fn save_handoff(&self, project_id: &str, handoff: &Handoff) -> Result<(), StorageError>;

    /// Get a handoff by id.
    fn get_handoff(
        &self,
        project_id: &str,
        handoff_id: &str,
    ) -> Result<Option<Handoff>, StorageError>;

    /// Update a handoff's status (and result/error detail).
    fn update_handoff_status(
        &self,
        project_id: &str,
        handoff_id: &str,
        status: HandoffStatus,
        result_trace_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), StorageError>;

    /// List handoffs, newest first, with optional filters.
    fn list_handoffs(
        &self,
        project_id: &str,
        status: Option<HandoffStatus>,
        to_agent: Option<&str>,
    ) -> Result<Vec<Handoff>, StorageError>;

    /// Transition every pending handoff past its timeout to failed.
    /// Returns the ids that expired.
    fn expire_overdue(
        &self,
        project_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, StorageError> {
        let mut expired = Vec::new();
        for handoff in self.list_handoffs(project_id, Some(HandoffStatus::Pending), None)? {
            if handoff.is_overdue(now) {
                self.update_handoff_status(
                    project_id,
                    &handoff.id,
                    HandoffStatus::Failed,
                    None,
                    Some(&format!(
                        "handoff timed out after {}ms",
                        handoff.timeout_ms
                    )),
                )?;
                expired.push(handoff.id);
            }
        }
        Ok(expired)
    }

    /// Save an agent session.
    fn save_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Get a session by id.
    fn get_session(
        &self,
        project_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, StorageError>;

    /// Update an existing session.
    fn update_session(&self, session: &Session) -> Result<(), StorageError>;

    /// List sessions, newest first, optionally filtered by status.
    fn list_sessions(
        &self,
        project_id: &str,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, StorageError>;

    /// Save an insight.
    fn save_insight(&self, insight: &Insight) -> Result<(), StorageError>;

    /// List insights, newest first, with optional filters.
    fn list_insights(
        &self,
        project_id: &str,
        kind: Option<InsightType>,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Insight>, StorageError>;

    /// Get the guidance document for a project (empty object when none).
    fn get_guidance(&self, project_id: &str) -> Result<Value, StorageError>;

    /// Replace the guidance document for a project.
    fn update_guidance(&self, project_id: &str, guidance: &Value) -> Result<(), StorageError>;
}

/// Which backend auto-detection selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// External CRD-backed storage.
    Remote,
    /// JSON files on local disk.
    File,
    /// In-memory (tests only; never auto-detected).
    Memory,
}

/// Contract for the external CRD-backed backend.
///
/// Only the storage contract lives here: records are patched onto remote
/// resources addressed by group/version/plural within a namespace. The
/// driver that speaks to the cluster is out of scope for this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSpec {
    /// API group of the backing resources.
    pub group: String,
    /// API version.
    pub version: String,
    /// Plural resource name.
    pub plural: String,
    /// Namespace the resources live in.
    pub namespace: String,
}

impl Default for RemoteSpec {
    fn default() -> Self {
        Self {
            group: "context-plane.io".to_string(),
            version: "v1alpha2".to_string(),
            plural: "projectcontexts".to_string(),
            namespace: "default".to_string(),
        }
    }
}

/// Select the backend for this environment.
///
/// The remote backend wins when service-account credentials or a
/// cluster-config file are present; otherwise file storage.
pub fn detect_backend() -> StorageKind {
    if Path::new("/var/run/secrets/kubernetes.io/serviceaccount").exists() {
        info!("detected in-cluster service account, using remote storage");
        return StorageKind::Remote;
    }
    if std::env::var_os("KUBECONFIG").is_some() {
        info!("detected KUBECONFIG, using remote storage");
        return StorageKind::Remote;
    }
    if let Some(home) = std::env::var_os("HOME") {
        if Path::new(&home).join(".kube").join("config").exists() {
            info!("detected local cluster config, using remote storage");
            return StorageKind::Remote;
        }
    }
    info!("no cluster detected, using file storage");
    StorageKind::File
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_spec_default_contract() {
        let spec = RemoteSpec::default();
        assert_eq!(spec.group, "context-plane.io");
        assert_eq!(spec.plural, "projectcontexts");
    }
}
