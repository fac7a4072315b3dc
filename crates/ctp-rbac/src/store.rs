// SPDX-License-Identifier: MIT OR Apache-2.0
//! Role and binding stores.
//!
//! File layout:
//!
//! ```text
//! <base>/
//! ├── roles/<role_id>.yaml
//! └── bindings/<binding_id>.yaml
//! ```
//!
//! Built-in roles are materialized on initialization and are immutable
//! through this API.

use crate::builtin::{built_in_roles, BUILT_IN_ROLE_IDS};
use crate::model::{PrincipalKind, Role, RoleBinding};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, warn};

/// Errors surfaced by RBAC stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying filesystem failure.
    #[error("rbac store i/o failed for {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// OS error.
        #[source]
        source: std::io::Error,
    },
    /// A role or binding file failed to (de)serialize.
    #[error("rbac store serialization failed: {0}")]
    Serde(#[from] serde_yaml::Error),
    /// Attempted mutation of a built-in role.
    #[error("cannot modify built-in role: {role_id}")]
    BuiltInImmutable {
        /// The protected role id.
        role_id: String,
    },
}

/// Storage for roles and role bindings.
pub trait RbacStore: Send + Sync {
    /// Get a role by id.
    fn get_role(&self, role_id: &str) -> Option<Role>;

    /// List all roles.
    fn list_roles(&self) -> Vec<Role>;

    /// Save a role (create or update). Built-in roles reject updates.
    fn save_role(&self, role: &Role) -> Result<(), StoreError>;

    /// Delete a role. Returns `false` for built-in or missing roles.
    fn delete_role(&self, role_id: &str) -> Result<bool, StoreError>;

    /// Get a binding by id.
    fn get_binding(&self, binding_id: &str) -> Option<RoleBinding>;

    /// List bindings, optionally filtered by principal and role.
    fn list_bindings(&self, principal_id: Option<&str>, role_id: Option<&str>)
        -> Vec<RoleBinding>;

    /// Save a binding.
    fn save_binding(&self, binding: &RoleBinding) -> Result<(), StoreError>;

    /// Delete a binding. Returns `false` when missing.
    fn delete_binding(&self, binding_id: &str) -> Result<bool, StoreError>;

    /// All roles granted to a principal, resolving inheritance.
    ///
    /// Bindings are filtered by principal kind, scope compatibility, and
    /// expiry; inherited roles are collected transitively.
    fn roles_for_principal(
        &self,
        principal_id: &str,
        principal_kind: PrincipalKind,
        project_scope: Option<&str>,
    ) -> Vec<Role> {
        let now = Utc::now();
        let bindings = self.list_bindings(Some(principal_id), None);

        let mut to_resolve: Vec<String> = bindings
            .into_iter()
            .filter(|b| b.principal_kind == principal_kind)
            .filter(|b| !b.is_expired(now))
            .filter(|b| match (project_scope, &b.project_scope) {
                (Some(requested), Some(bound)) => requested == bound,
                _ => true,
            })
            .map(|b| b.role_id)
            .collect();

        let mut resolved: BTreeMap<String, Role> = BTreeMap::new();
        while let Some(role_id) = to_resolve.pop() {
            if resolved.contains_key(&role_id) {
                continue;
            }
            let Some(role) = self.get_role(&role_id) else {
                warn!(role_id = %role_id, "role not found for binding");
                continue;
            };
            for parent in &role.inherits_from {
                if !resolved.contains_key(parent) {
                    to_resolve.push(parent.clone());
                }
            }
            resolved.insert(role_id, role);
        }
        resolved.into_values().collect()
    }
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// YAML-file-backed RBAC store for standalone deployments.
#[derive(Debug)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Open (or create) a store under `base_dir`, materializing built-in
    /// roles that are not yet on disk.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        for sub in ["roles", "bindings"] {
            let dir = base_dir.join(sub);
            fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        }
        let store = Self { base_dir };
        for role in built_in_roles() {
            if !store.role_path(&role.id).exists() {
                store.write_role(&role)?;
            }
        }
        debug!(dir = %store.base_dir.display(), "rbac file store initialized");
        Ok(store)
    }

    fn role_path(&self, role_id: &str) -> PathBuf {
        self.base_dir.join("roles").join(format!("{role_id}.yaml"))
    }

    fn binding_path(&self, binding_id: &str) -> PathBuf {
        self.base_dir
            .join("bindings")
            .join(format!("{binding_id}.yaml"))
    }

    fn write_role(&self, role: &Role) -> Result<(), StoreError> {
        let text = serde_yaml::to_string(role)?;
        let path = self.role_path(&role.id);
        fs::write(&path, text).map_err(|source| StoreError::Io { path, source })
    }

    fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
        let text = fs::read_to_string(path).ok()?;
        match serde_yaml::from_str(&text) {
            Ok(value) => Some(value),
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to load rbac document");
                None
            }
        }
    }
}

impl RbacStore for FileStore {
    fn get_role(&self, role_id: &str) -> Option<Role> {
        Self::read_yaml(&self.role_path(role_id))
    }

    fn list_roles(&self) -> Vec<Role> {
        list_dir_yaml(&self.base_dir.join("roles"))
    }

    fn save_role(&self, role: &Role) -> Result<(), StoreError> {
        if BUILT_IN_ROLE_IDS.contains(&role.id.as_str()) && self.role_path(&role.id).exists() {
            return Err(StoreError::BuiltInImmutable {
                role_id: role.id.clone(),
            });
        }
        self.write_role(role)
    }

    fn delete_role(&self, role_id: &str) -> Result<bool, StoreError> {
        if BUILT_IN_ROLE_IDS.contains(&role_id) {
            warn!(role_id, "refusing to delete built-in role");
            return Ok(false);
        }
        let path = self.role_path(role_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })?;
        Ok(true)
    }

    fn get_binding(&self, binding_id: &str) -> Option<RoleBinding> {
        Self::read_yaml(&self.binding_path(binding_id))
    }

    fn list_bindings(
        &self,
        principal_id: Option<&str>,
        role_id: Option<&str>,
    ) -> Vec<RoleBinding> {
        list_dir_yaml::<RoleBinding>(&self.base_dir.join("bindings"))
            .into_iter()
            .filter(|b| principal_id.is_none_or(|p| b.principal_id == p))
            .filter(|b| role_id.is_none_or(|r| b.role_id == r))
            .collect()
    }

    fn save_binding(&self, binding: &RoleBinding) -> Result<(), StoreError> {
        let text = serde_yaml::to_string(binding)?;
        let path = self.binding_path(&binding.id);
        fs::write(&path, text).map_err(|source| StoreError::Io { path, source })
    }

    fn delete_binding(&self, binding_id: &str) -> Result<bool, StoreError> {
        let path = self.binding_path(binding_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })?;
        Ok(true)
    }
}

fn list_dir_yaml<T: serde::de::DeserializeOwned>(dir: &Path) -> Vec<T> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("yaml"))
        .collect();
    paths.sort();
    paths
        .iter()
        .filter_map(|p| FileStore::read_yaml(p))
        .collect()
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

/// In-memory RBAC store for tests. Data dies with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    roles: Mutex<BTreeMap<String, Role>>,
    bindings: Mutex<BTreeMap<String, RoleBinding>>,
}

impl MemoryStore {
    /// Create a store pre-loaded with the built-in roles.
    pub fn new() -> Self {
        let store = Self::default();
        {
            let mut roles = store.roles.lock().unwrap_or_else(|p| p.into_inner());
            for role in built_in_roles() {
                roles.insert(role.id.clone(), role);
            }
        }
        store
    }
}

impl RbacStore for MemoryStore {
    fn get_role(&self, role_id: &str) -> Option<Role> {
        self.roles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(role_id)
            .cloned()
    }

    fn list_roles(&self) -> Vec<Role> {
        self.roles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect()
    }

    fn save_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut roles = self.roles.lock().unwrap_or_else(|p| p.into_inner());
        if BUILT_IN_ROLE_IDS.contains(&role.id.as_str()) && roles.contains_key(&role.id) {
            return Err(StoreError::BuiltInImmutable {
                role_id: role.id.clone(),
            });
        }
        roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    fn delete_role(&self, role_id: &str) -> Result<bool, StoreError> {
        if BUILT_IN_ROLE_IDS.contains(&role_id) {
            return Ok(false);
        }
        Ok(self
            .roles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(role_id)
            .is_some())
    }

    fn get_binding(&self, binding_id: &str) -> Option<RoleBinding> {
        self.bindings
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(binding_id)
            .cloned()
    }

    fn list_bindings(
        &self,
        principal_id: Option<&str>,
        role_id: Option<&str>,
    ) -> Vec<RoleBinding> {
        self.bindings
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .filter(|b| principal_id.is_none_or(|p| b.principal_id == p))
            .filter(|b| role_id.is_none_or(|r| b.role_id == r))
            .cloned()
            .collect()
    }

    fn save_binding(&self, binding: &RoleBinding) -> Result<(), StoreError> {
        self.bindings
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(binding.id.clone(), binding.clone());
        Ok(())
    }

    fn delete_binding(&self, binding_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .bindings
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(binding_id)
            .is_some())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrincipalKind;

    #[test]
    fn memory_store_loads_built_ins() {
        let store = MemoryStore::new();
        assert!(store.get_role("reader").is_some());
        assert_eq!(store.list_roles().len(), BUILT_IN_ROLE_IDS.len());
    }

    #[test]
    fn built_in_roles_are_immutable() {
        let store = MemoryStore::new();
        let mut tampered = store.get_role("reader").unwrap();
        tampered.description = "now with sensitive access".into();
        assert!(matches!(
            store.save_role(&tampered),
            Err(StoreError::BuiltInImmutable { .. })
        ));
        assert!(!store.delete_role("reader").unwrap());
    }

    #[test]
    fn file_store_round_trips_roles_and_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get_role("agent-standard").is_some());

        let custom = Role::new("auditor", "Auditor", "Read-only audit role");
        store.save_role(&custom).unwrap();
        assert_eq!(store.get_role("auditor").unwrap().name, "Auditor");

        let binding = RoleBinding::new(
            "b1",
            "agent-1",
            PrincipalKind::Agent,
            "auditor",
            "admin",
        );
        store.save_binding(&binding).unwrap();
        assert_eq!(store.list_bindings(Some("agent-1"), None).len(), 1);
        assert!(store.delete_binding("b1").unwrap());
        assert!(!store.delete_binding("b1").unwrap());
    }

    #[test]
    fn inheritance_is_resolved_transitively() {
        let store = MemoryStore::new();
        let grand = Role::new("grand", "Grand", "base");
        let parent = Role::new("parent", "Parent", "mid").inheriting("grand");
        let child = Role::new("child", "Child", "leaf").inheriting("parent");
        store.save_role(&grand).unwrap();
        store.save_role(&parent).unwrap();
        store.save_role(&child).unwrap();

        store
            .save_binding(&RoleBinding::new(
                "b2",
                "agent-2",
                PrincipalKind::Agent,
                "child",
                "admin",
            ))
            .unwrap();

        let roles = store.roles_for_principal("agent-2", PrincipalKind::Agent, None);
        let ids: Vec<&str> = roles.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["child", "grand", "parent"]);
    }

    #[test]
    fn expired_and_mismatched_bindings_are_filtered() {
        let store = MemoryStore::new();
        let mut expired = RoleBinding::new(
            "b3",
            "agent-3",
            PrincipalKind::Agent,
            "reader",
            "admin",
        );
        expired.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        store.save_binding(&expired).unwrap();

        let wrong_kind = RoleBinding::new(
            "b4",
            "agent-3",
            PrincipalKind::User,
            "reader",
            "admin",
        );
        store.save_binding(&wrong_kind).unwrap();

        assert!(store
            .roles_for_principal("agent-3", PrincipalKind::Agent, None)
            .is_empty());
    }
}
