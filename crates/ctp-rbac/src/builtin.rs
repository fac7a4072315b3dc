// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in roles.
//!
//! Materialized into every store on initialization. Built-in roles cannot
//! be modified or deleted through the store API.

use crate::model::{Action, Permission, Resource, ResourceKind, Role};

/// Ids of the system-defined roles.
pub const BUILT_IN_ROLE_IDS: &[&str] = &["reader", "agent-standard", "security-reader", "admin"];

/// Construct the system-defined role set.
pub fn built_in_roles() -> Vec<Role> {
    let mut reader = Role::new(
        "reader",
        "Reader",
        "Read access to non-sensitive knowledge",
    )
    .with_permission(Permission::new(
        "read-public-knowledge",
        Resource::new(ResourceKind::KnowledgeCategory, "*"),
        vec![Action::Read, Action::Query],
    ))
    .with_permission(Permission::new(
        "read-public-capabilities",
        Resource::new(ResourceKind::KnowledgeCapability, "*"),
        vec![Action::Read, Action::Query],
    ));
    reader.built_in = true;

    let mut agent_standard = Role::new(
        "agent-standard",
        "Agent Standard",
        "Baseline grants for well-behaved agents",
    )
    .inheriting("reader")
    .with_permission(Permission::new(
        "emit-insights",
        Resource::new(ResourceKind::Insight, "*"),
        vec![Action::Emit, Action::Read, Action::Query],
    ))
    .with_permission(Permission::new(
        "manage-handoffs",
        Resource::new(ResourceKind::Handoff, "*"),
        vec![Action::Read, Action::Write, Action::Query, Action::Delegate],
    ))
    .with_permission(Permission::new(
        "work-tasks",
        Resource::new(ResourceKind::Task, "*"),
        vec![Action::Read, Action::Write, Action::Query],
    ));
    agent_standard.built_in = true;

    let mut security_reader = Role::new(
        "security-reader",
        "Security Reader",
        "Read access to sensitive knowledge",
    )
    .with_permission(Permission::new(
        "read-sensitive-knowledge",
        Resource::new(ResourceKind::KnowledgeCategory, "*").sensitive("elevated read grant"),
        vec![Action::Read, Action::Query],
    ));
    security_reader.built_in = true;

    let mut admin = Role::new("admin", "Administrator", "Full access to every resource");
    for (suffix, kind) in [
        ("knowledge", ResourceKind::KnowledgeCategory),
        ("capabilities", ResourceKind::KnowledgeCapability),
        ("projects", ResourceKind::Project),
        ("insights", ResourceKind::Insight),
        ("handoffs", ResourceKind::Handoff),
        ("guidance", ResourceKind::Guidance),
        ("tasks", ResourceKind::Task),
    ] {
        admin = admin.with_permission(Permission::new(
            format!("admin-{suffix}"),
            Resource::new(kind, "*").sensitive("administrative grant"),
            vec![
                Action::Read,
                Action::Write,
                Action::Delete,
                Action::Query,
                Action::Emit,
                Action::Delegate,
            ],
        ));
    }
    admin.built_in = true;

    vec![reader, agent_standard, security_reader, admin]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_ids_match_roles() {
        let roles = built_in_roles();
        let ids: Vec<&str> = roles.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, BUILT_IN_ROLE_IDS);
        assert!(roles.iter().all(|r| r.built_in));
    }

    #[test]
    fn reader_has_no_sensitive_grants() {
        let roles = built_in_roles();
        let reader = roles.iter().find(|r| r.id == "reader").unwrap();
        assert!(reader.permissions.iter().all(|p| !p.resource.sensitive));
    }
}
