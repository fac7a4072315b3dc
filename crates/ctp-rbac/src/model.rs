// SPDX-License-Identifier: MIT OR Apache-2.0
//! RBAC data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classification of principals (subjects).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// An AI agent.
    Agent,
    /// A human individual.
    User,
    /// A human team or group.
    Team,
    /// A cluster service account.
    ServiceAccount,
}

/// Types of protected resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A whole knowledge category.
    KnowledgeCategory,
    /// A specific knowledge capability.
    KnowledgeCapability,
    /// A project.
    Project,
    /// Agent insights.
    Insight,
    /// Agent handoffs.
    Handoff,
    /// Human guidance.
    Guidance,
    /// Project tasks.
    Task,
}

/// Actions that can be performed on resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// View a resource.
    Read,
    /// Create or update a resource.
    Write,
    /// Remove a resource.
    Delete,
    /// Search or list resources.
    Query,
    /// Emit telemetry (insights, capabilities).
    Emit,
    /// Hand off to another agent.
    Delegate,
}

/// Result of policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Access granted.
    Allow,
    /// Access denied.
    Deny,
    /// No applicable policy.
    NotApplicable,
}

/// Identity that can be granted permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Unique identifier.
    pub id: String,
    /// Principal classification.
    pub kind: PrincipalKind,
    /// Human-readable name.
    pub display_name: String,
    /// Additional attributes.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Group memberships (for users).
    #[serde(default)]
    pub groups: Vec<String>,
    /// Cluster namespace (for service accounts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Principal {
    /// Create a principal with the given identity and kind.
    pub fn new(id: impl Into<String>, kind: PrincipalKind, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            display_name: display_name.into(),
            metadata: BTreeMap::new(),
            groups: Vec::new(),
            namespace: None,
        }
    }
}

/// A protected resource, at category or instance granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource classification.
    pub kind: ResourceKind,
    /// Resource identifier, or `"*"` for all of the kind.
    pub id: String,
    /// Limit to a specific project; `None` means all projects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_scope: Option<String>,
    /// Whether the resource requires elevated permissions.
    #[serde(default)]
    pub sensitive: bool,
    /// Why the resource is sensitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity_reason: Option<String>,
}

impl Resource {
    /// A non-sensitive resource of the given kind and id.
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            project_scope: None,
            sensitive: false,
            sensitivity_reason: None,
        }
    }

    /// Mark the resource sensitive.
    pub fn sensitive(mut self, reason: impl Into<String>) -> Self {
        self.sensitive = true;
        self.sensitivity_reason = Some(reason.into());
        self
    }

    /// Whether this (permission-side) resource pattern matches a
    /// requested resource.
    pub fn matches(&self, other: &Resource) -> bool {
        if self.kind != other.kind {
            return false;
        }
        if self.id != "*" && self.id != other.id {
            return false;
        }
        if let (Some(mine), Some(theirs)) = (&self.project_scope, &other.project_scope) {
            if mine != theirs {
                return false;
            }
        }
        true
    }
}

/// A specific permission grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    /// Unique permission identifier.
    pub id: String,
    /// Resource pattern this permission applies to.
    pub resource: Resource,
    /// Allowed actions.
    pub actions: Vec<Action>,
    /// Expiration timestamp, when time-limited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Who granted this permission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<String>,
    /// When it was granted.
    pub granted_at: DateTime<Utc>,
    /// Why it was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Permission {
    /// A permanent permission over a resource pattern.
    pub fn new(id: impl Into<String>, resource: Resource, actions: Vec<Action>) -> Self {
        Self {
            id: id.into(),
            resource,
            actions,
            expires_at: None,
            granted_by: None,
            granted_at: Utc::now(),
            reason: None,
        }
    }

    /// Whether the permission has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    /// Whether this permission allows `action` on `resource`.
    ///
    /// Hard rule: a permission over a non-sensitive resource pattern
    /// never grants access to a sensitive resource.
    pub fn allows(&self, action: Action, resource: &Resource, now: DateTime<Utc>) -> bool {
        if self.is_expired(now) {
            return false;
        }
        if !self.actions.contains(&action) {
            return false;
        }
        if resource.sensitive && !self.resource.sensitive {
            return false;
        }
        self.resource.matches(resource)
    }
}

/// Named collection of permissions, with optional inheritance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What this role provides.
    pub description: String,
    /// Granted permissions.
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Role ids this role inherits from.
    #[serde(default)]
    pub inherits_from: Vec<String>,
    /// Principal kinds this role can be bound to.
    #[serde(default = "all_principal_kinds")]
    pub assignable_to: Vec<PrincipalKind>,
    /// System-defined role; cannot be modified or deleted.
    #[serde(default)]
    pub built_in: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

fn all_principal_kinds() -> Vec<PrincipalKind> {
    vec![
        PrincipalKind::Agent,
        PrincipalKind::User,
        PrincipalKind::Team,
        PrincipalKind::ServiceAccount,
    ]
}

impl Role {
    /// A custom (non-built-in) role.
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            permissions: Vec::new(),
            inherits_from: Vec::new(),
            assignable_to: all_principal_kinds(),
            built_in: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a permission.
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Inherit from another role.
    pub fn inheriting(mut self, role_id: impl Into<String>) -> Self {
        self.inherits_from.push(role_id.into());
        self
    }
}

/// Assignment of a role to a principal within a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBinding {
    /// Unique binding identifier.
    pub id: String,
    /// Principal receiving the role.
    pub principal_id: String,
    /// Kind of the principal.
    pub principal_kind: PrincipalKind,
    /// Role being assigned.
    pub role_id: String,
    /// Limit to a project; `None` means all projects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_scope: Option<String>,
    /// Limit to a cluster namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_scope: Option<String>,
    /// Who created this binding.
    pub created_by: String,
    /// When it was created.
    pub created_at: DateTime<Utc>,
    /// Expiration, when time-limited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RoleBinding {
    /// A permanent binding.
    pub fn new(
        id: impl Into<String>,
        principal_id: impl Into<String>,
        principal_kind: PrincipalKind,
        role_id: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            principal_id: principal_id.into(),
            principal_kind,
            role_id: role_id.into(),
            project_scope: None,
            namespace_scope: None,
            created_by: created_by.into(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Whether the binding has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// Result of an access check, with audit detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Allow, deny, or not applicable.
    pub decision: Decision,
    /// Who requested access.
    pub principal_id: String,
    /// What they tried to access.
    pub resource: Resource,
    /// What action they tried.
    pub action: Action,
    /// Role that granted access, on allow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_role: Option<String>,
    /// Permission that matched, on allow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_permission: Option<String>,
    /// Why access was denied, on deny.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
    /// When the decision was evaluated.
    pub evaluated_at: DateTime<Utc>,
    /// Trace id for audit correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_within_kind_only() {
        let pattern = Resource::new(ResourceKind::KnowledgeCategory, "*");
        assert!(pattern.matches(&Resource::new(ResourceKind::KnowledgeCategory, "security")));
        assert!(!pattern.matches(&Resource::new(ResourceKind::Project, "security")));
    }

    #[test]
    fn project_scopes_must_agree_when_both_set() {
        let mut pattern = Resource::new(ResourceKind::Task, "*");
        pattern.project_scope = Some("alpha".into());
        let mut scoped = Resource::new(ResourceKind::Task, "T-1");
        scoped.project_scope = Some("beta".into());
        assert!(!pattern.matches(&scoped));
        scoped.project_scope = Some("alpha".into());
        assert!(pattern.matches(&scoped));
        // One side unscoped matches everything.
        let unscoped = Resource::new(ResourceKind::Task, "T-1");
        assert!(pattern.matches(&unscoped));
    }

    #[test]
    fn non_sensitive_permission_never_grants_sensitive_resource() {
        let permission = Permission::new(
            "read-all",
            Resource::new(ResourceKind::KnowledgeCategory, "*"),
            vec![Action::Read],
        );
        let sensitive = Resource::new(ResourceKind::KnowledgeCategory, "security")
            .sensitive("contains secrets docs");
        assert!(!permission.allows(Action::Read, &sensitive, Utc::now()));

        let elevated = Permission::new(
            "read-sensitive",
            Resource::new(ResourceKind::KnowledgeCategory, "*").sensitive("elevated"),
            vec![Action::Read],
        );
        assert!(elevated.allows(Action::Read, &sensitive, Utc::now()));
    }

    #[test]
    fn expired_permission_denies() {
        let mut permission = Permission::new(
            "temp",
            Resource::new(ResourceKind::Insight, "*"),
            vec![Action::Read],
        );
        permission.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(!permission.allows(
            Action::Read,
            &Resource::new(ResourceKind::Insight, "i1"),
            Utc::now()
        ));
    }

    #[test]
    fn action_must_be_listed() {
        let permission = Permission::new(
            "read-only",
            Resource::new(ResourceKind::Handoff, "*"),
            vec![Action::Read, Action::Query],
        );
        let handoff = Resource::new(ResourceKind::Handoff, "h1");
        assert!(permission.allows(Action::Query, &handoff, Utc::now()));
        assert!(!permission.allows(Action::Write, &handoff, Utc::now()));
    }
}
