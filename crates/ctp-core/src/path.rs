// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dot-path resolution over JSON context maps.
//!
//! Workflow context travels as nested `serde_json::Value` objects keyed by
//! phase and field names. Contracts address fields with dot paths like
//! `plan.domain`. List indexing is deliberately unsupported.

use serde_json::Value;

/// Resolve a dot-separated path against a JSON object.
///
/// Returns `None` when any segment is missing or a non-object is traversed.
///
/// # Examples
///
/// ```
/// use ctp_core::resolve_path;
/// let ctx = serde_json::json!({"plan": {"domain": "web"}});
/// assert_eq!(
///     resolve_path(&ctx, "plan.domain").and_then(|v| v.as_str()),
///     Some("web")
/// );
/// assert!(resolve_path(&ctx, "plan.missing").is_none());
/// ```
pub fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_fields() {
        let ctx = json!({"design": {"target": {"name": "svc"}}});
        assert_eq!(
            resolve_path(&ctx, "design.target.name"),
            Some(&json!("svc"))
        );
    }

    #[test]
    fn missing_and_non_object_segments_are_none() {
        let ctx = json!({"plan": {"domain": "web"}});
        assert!(resolve_path(&ctx, "plan.domain.deeper").is_none());
        assert!(resolve_path(&ctx, "absent.field").is_none());
    }
}
