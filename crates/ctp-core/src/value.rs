// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed attribute values.
//!
//! Span attributes and event attributes are maps of `String` to
//! [`AttrValue`], a small tagged union over the shapes telemetry
//! backends accept. Nested maps are deliberately excluded; lists are the
//! only container.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value.
///
/// Serializes untagged, so the JSON form is the natural scalar or array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Homogeneous or mixed list of values.
    List(Vec<AttrValue>),
}

/// Attribute map with deterministic key ordering.
pub type AttrMap = BTreeMap<String, AttrValue>;

impl AttrValue {
    /// Borrow as `&str` when the value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract an integer when the value is an int.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a float; ints widen losslessly enough for percentages.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Extract a bool when the value is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for AttrValue {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_round_trip() {
        let map: AttrMap = [
            ("title".to_string(), AttrValue::from("Implement A")),
            ("points".to_string(), AttrValue::from(5i64)),
            ("percent".to_string(), AttrValue::from(42.5)),
            ("blocked".to_string(), AttrValue::from(false)),
            (
                "labels".to_string(),
                AttrValue::from(vec!["infra", "urgent"]),
            ),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&map).unwrap();
        let back: AttrMap = serde_json::from_str(&json).unwrap();
        assert_eq!(map, back);
    }

    #[test]
    fn integers_stay_integers() {
        let v: AttrValue = serde_json::from_str("7").unwrap();
        assert_eq!(v, AttrValue::Int(7));
        let v: AttrValue = serde_json::from_str("7.5").unwrap();
        assert_eq!(v, AttrValue::Float(7.5));
    }

    #[test]
    fn float_accessor_widens_ints() {
        assert_eq!(AttrValue::Int(50).as_float(), Some(50.0));
        assert_eq!(AttrValue::Str("x".into()).as_float(), None);
    }
}
