// SPDX-License-Identifier: MIT OR Apache-2.0
//! The access engine.
//!
//! Evaluation order: resolve the principal's bindings (filtered by kind,
//! scope, and expiry), collect roles transitively through inheritance,
//! then iterate permissions in deterministic order, the first allow
//! wins. Denials explain themselves, and a denial caused by the
//! sensitivity rule says so explicitly.

use crate::model::{AccessDecision, Action, Decision, Principal, Resource};
use crate::store::RbacStore;
use chrono::Utc;
use tracing::{debug, info};

/// Evaluates access requests against a role store.
pub struct AccessEngine<S: RbacStore> {
    store: S,
    trace_id: Option<String>,
}

impl<S: RbacStore> AccessEngine<S> {
    /// Create an engine over a store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            trace_id: None,
        }
    }

    /// Attach a trace id carried into every decision for audit
    /// correlation.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Evaluate whether `principal` may perform `action` on `resource`.
    pub fn evaluate(
        &self,
        principal: &Principal,
        action: Action,
        resource: &Resource,
    ) -> AccessDecision {
        let now = Utc::now();
        let roles = self.store.roles_for_principal(
            &principal.id,
            principal.kind,
            resource.project_scope.as_deref(),
        );

        let mut blocked_by_sensitivity = false;

        for role in &roles {
            for permission in &role.permissions {
                if permission.allows(action, resource, now) {
                    info!(
                        principal = %principal.id,
                        role = %role.id,
                        permission = %permission.id,
                        "access allowed"
                    );
                    return AccessDecision {
                        decision: Decision::Allow,
                        principal_id: principal.id.clone(),
                        resource: resource.clone(),
                        action,
                        matched_role: Some(role.id.clone()),
                        matched_permission: Some(permission.id.clone()),
                        denial_reason: None,
                        evaluated_at: now,
                        trace_id: self.trace_id.clone(),
                    };
                }
                // Track near-misses caused only by the sensitivity rule,
                // so the denial can explain itself.
                if resource.sensitive
                    && !permission.resource.sensitive
                    && !permission.is_expired(now)
                    && permission.actions.contains(&action)
                    && permission.resource.matches(resource)
                {
                    blocked_by_sensitivity = true;
                }
            }
        }

        let denial_reason = if blocked_by_sensitivity {
            format!(
                "resource '{}' is marked sensitive and none of the principal's permissions carry a sensitive grant",
                resource.id
            )
        } else if roles.is_empty() {
            format!("principal '{}' has no applicable role bindings", principal.id)
        } else {
            format!(
                "no role grants {action:?} on {kind:?}:{id}",
                action = action,
                kind = resource.kind,
                id = resource.id
            )
        };
        debug!(principal = %principal.id, reason = %denial_reason, "access denied");

        AccessDecision {
            decision: Decision::Deny,
            principal_id: principal.id.clone(),
            resource: resource.clone(),
            action,
            matched_role: None,
            matched_permission: None,
            denial_reason: Some(denial_reason),
            evaluated_at: now,
            trace_id: self.trace_id.clone(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PrincipalKind, ResourceKind, RoleBinding};
    use crate::store::MemoryStore;

    fn engine_with_binding(role_id: &str) -> AccessEngine<MemoryStore> {
        let store = MemoryStore::new();
        store
            .save_binding(&RoleBinding::new(
                format!("bind-{role_id}"),
                "agent-1",
                PrincipalKind::Agent,
                role_id,
                "admin",
            ))
            .unwrap();
        AccessEngine::new(store).with_trace_id("trace-abc")
    }

    fn agent() -> Principal {
        Principal::new("agent-1", PrincipalKind::Agent, "Agent One")
    }

    #[test]
    fn reader_can_read_public_knowledge() {
        let engine = engine_with_binding("reader");
        let decision = engine.evaluate(
            &agent(),
            Action::Read,
            &Resource::new(ResourceKind::KnowledgeCategory, "deployment"),
        );
        assert_eq!(decision.decision, Decision::Allow);
        assert_eq!(decision.matched_role.as_deref(), Some("reader"));
        assert_eq!(
            decision.matched_permission.as_deref(),
            Some("read-public-knowledge")
        );
        assert_eq!(decision.trace_id.as_deref(), Some("trace-abc"));
    }

    #[test]
    fn reader_is_denied_sensitive_knowledge_with_reason() {
        let engine = engine_with_binding("reader");
        let decision = engine.evaluate(
            &agent(),
            Action::Read,
            &Resource::new(ResourceKind::KnowledgeCategory, "security")
                .sensitive("contains secrets management documentation"),
        );
        assert_eq!(decision.decision, Decision::Deny);
        assert!(decision
            .denial_reason
            .as_deref()
            .unwrap()
            .contains("sensitive"));
    }

    #[test]
    fn security_reader_can_read_sensitive_knowledge() {
        let engine = engine_with_binding("security-reader");
        let decision = engine.evaluate(
            &agent(),
            Action::Read,
            &Resource::new(ResourceKind::KnowledgeCategory, "security").sensitive("secrets"),
        );
        assert_eq!(decision.decision, Decision::Allow);
    }

    #[test]
    fn sensitive_allow_implies_sensitive_permission() {
        // The invariant behind the hard rule: any allow on a sensitive
        // resource must have matched a sensitive-marked permission.
        for role_id in ["reader", "agent-standard", "security-reader", "admin"] {
            let engine = engine_with_binding(role_id);
            let decision = engine.evaluate(
                &agent(),
                Action::Read,
                &Resource::new(ResourceKind::KnowledgeCategory, "security").sensitive("secret"),
            );
            if decision.decision == Decision::Allow {
                let role = engine.store().get_role(role_id).unwrap();
                let permission = role
                    .permissions
                    .iter()
                    .find(|p| Some(p.id.as_str()) == decision.matched_permission.as_deref())
                    .unwrap();
                assert!(permission.resource.sensitive);
            }
        }
    }

    #[test]
    fn inherited_roles_grant_access() {
        // agent-standard inherits reader.
        let engine = engine_with_binding("agent-standard");
        let decision = engine.evaluate(
            &agent(),
            Action::Query,
            &Resource::new(ResourceKind::KnowledgeCategory, "deployment"),
        );
        assert_eq!(decision.decision, Decision::Allow);
    }

    #[test]
    fn unbound_principal_is_denied() {
        let engine = AccessEngine::new(MemoryStore::new());
        let decision = engine.evaluate(
            &agent(),
            Action::Read,
            &Resource::new(ResourceKind::KnowledgeCategory, "deployment"),
        );
        assert_eq!(decision.decision, Decision::Deny);
        assert!(decision
            .denial_reason
            .as_deref()
            .unwrap()
            .contains("no applicable role bindings"));
    }

    #[test]
    fn action_outside_grants_is_denied() {
        let engine = engine_with_binding("reader");
        let decision = engine.evaluate(
            &agent(),
            Action::Delete,
            &Resource::new(ResourceKind::KnowledgeCategory, "deployment"),
        );
        assert_eq!(decision.decision, Decision::Deny);
    }
}
