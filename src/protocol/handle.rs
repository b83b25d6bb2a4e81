// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Identifiers exchanged between proxy and worker

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier of one worker session, issued when the session opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Draw a fresh random session id
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(SessionId)
    }
}

// Hex strings on the wire; JSON numbers lose precision above 2^53.
impl Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque reference to a value resident in a worker session
///
/// The caller only ever holds the identifier. The value stays in the
/// worker's memory until it is evicted, released or the session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteHandle {
    pub session: SessionId,
    pub id: u64,
}

impl RemoteHandle {
    pub fn new(session: SessionId, id: u64) -> Self {
        Self { session, id }
    }

    /// Check that this handle was issued by `session`
    pub fn belongs_to(&self, session: SessionId) -> bool {
        self.session == session
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session, self.id)
    }
}

/// Module-qualified name of a worker operation, e.g. `geometry.translate_points`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionRef(String);

impl FunctionRef {
    /// Parse a reference, rejecting names that no registry could hold
    pub fn parse(name: &str) -> Option<Self> {
        if Self::is_valid(name) {
            Some(Self(name.to_string()))
        } else {
            None
        }
    }

    /// Dot-separated identifier segments: `[A-Za-z_][A-Za-z0-9_]*`
    pub fn is_valid(name: &str) -> bool {
        !name.is_empty()
            && name.split('.').all(|segment| {
                let mut chars = segment.chars();
                match chars.next() {
                    Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                    }
                    _ => false,
                }
            })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the last dot, if any
    pub fn module(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(module, _)| module)
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_wire_format() {
        let id = SessionId::new(0xdead_beef);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000deadbeef\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_session_id_rejects_garbage() {
        assert!(serde_json::from_str::<SessionId>("\"not-hex\"").is_err());
    }

    #[test]
    fn test_handle_ownership() {
        let a = SessionId::new(1);
        let b = SessionId::new(2);
        let handle = RemoteHandle::new(a, 7);
        assert!(handle.belongs_to(a));
        assert!(!handle.belongs_to(b));
        assert_eq!(handle.to_string(), "0000000000000001:7");
    }

    #[test]
    fn test_function_ref_validation() {
        assert!(FunctionRef::is_valid("geometry.transform_points"));
        assert!(FunctionRef::is_valid("ping"));
        assert!(FunctionRef::is_valid("_private.op2"));
        assert!(!FunctionRef::is_valid(""));
        assert!(!FunctionRef::is_valid("geometry."));
        assert!(!FunctionRef::is_valid(".points"));
        assert!(!FunctionRef::is_valid("geometry.2d"));
        assert!(!FunctionRef::is_valid("geometry.transform-points"));
    }

    #[test]
    fn test_function_ref_module() {
        let f = FunctionRef::parse("compas.geometry.transform_points").unwrap();
        assert_eq!(f.module(), Some("compas.geometry"));
        assert_eq!(FunctionRef::parse("ping").unwrap().module(), None);
    }
}
