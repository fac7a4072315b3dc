// SPDX-License-Identifier: MIT OR Apache-2.0
//! Trace and span identifiers.
//!
//! Identifiers follow the W3C trace-context widths: 128-bit trace ids and
//! 64-bit span ids, carried on the wire as lowercase fixed-width hex.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Errors produced when parsing identifiers from hex.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    /// The hex string had the wrong length.
    #[error("expected {expected} hex chars, got {got}")]
    BadLength {
        /// Expected number of hex characters.
        expected: usize,
        /// Actual number of characters supplied.
        got: usize,
    },
    /// The string contained a non-hex character.
    #[error("invalid hex: {0}")]
    BadHex(String),
}

/// 128-bit trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// Generate a fresh random trace id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().as_u128())
    }

    /// Parse from 32 lowercase/uppercase hex characters.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        if s.len() != 32 {
            return Err(IdError::BadLength {
                expected: 32,
                got: s.len(),
            });
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| IdError::BadHex(s.to_string()))
    }

    /// Render as 32 lowercase hex characters.
    pub fn as_hex(&self) -> String {
        format!("{:032x}", self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_hex())
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// 64-bit span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// Generate a fresh random span id.
    pub fn generate() -> Self {
        // Low 64 bits of a v4 UUID are as good a random source as any.
        Self(Uuid::new_v4().as_u128() as u64)
    }

    /// Parse from 16 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        if s.len() != 16 {
            return Err(IdError::BadLength {
                expected: 16,
                got: s.len(),
            });
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| IdError::BadHex(s.to_string()))
    }

    /// Render as 16 lowercase hex characters.
    pub fn as_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_hex())
    }
}

impl<'de> Deserialize<'de> for SpanId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_hex_round_trip() {
        let id = TraceId::generate();
        let hex = id.as_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(TraceId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn span_id_hex_round_trip() {
        let id = SpanId::generate();
        let hex = id.as_hex();
        assert_eq!(hex.len(), 16);
        assert_eq!(SpanId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            TraceId::from_hex("abc"),
            Err(IdError::BadLength {
                expected: 32,
                got: 3
            })
        );
        assert!(SpanId::from_hex("zzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let id = SpanId::from_hex("00000000000000ff").unwrap();
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"00000000000000ff\""
        );
        let back: SpanId = serde_json::from_str("\"00000000000000ff\"").unwrap();
        assert_eq!(back, id);
    }
}
