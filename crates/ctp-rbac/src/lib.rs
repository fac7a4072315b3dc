// SPDX-License-Identifier: MIT OR Apache-2.0
//! Role-based access control.
//!
//! Permission-based access to Context Plane resources, with special
//! support for protecting sensitive knowledge: a permission whose
//! resource is not itself marked sensitive can never grant access to a
//! sensitive resource, no matter how broad its wildcard.
//!
//! Decisions carry full audit detail (matched role, matched permission,
//! denial reason, trace id).
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Built-in roles.
pub mod builtin;
/// The access engine.
pub mod engine;
/// Principals, resources, permissions, roles, bindings, decisions.
pub mod model;
/// Role and binding stores.
pub mod store;

pub use builtin::{built_in_roles, BUILT_IN_ROLE_IDS};
pub use engine::AccessEngine;
pub use model::{
    AccessDecision, Action, Decision, Permission, Principal, PrincipalKind, Resource,
    ResourceKind, Role, RoleBinding,
};
pub use store::{FileStore, MemoryStore, RbacStore, StoreError};
