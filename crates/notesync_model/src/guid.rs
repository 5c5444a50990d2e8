//! Permanent node identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Permanent, globally-unique node identity.
///
/// A GUID is assigned once, when the node is created (locally or on some
/// other client), and never changes for the lifetime of the node. Identity
/// reconciliation across clients keys off this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(Uuid);

impl Guid {
    /// Creates a fresh random (version 4) GUID.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a GUID from a raw UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the 16 raw bytes of the GUID.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Parses a GUID from its canonical string form.
    ///
    /// Returns `None` for anything that is not a well-formed lowercase UUID,
    /// and for the nil UUID, which no real node ever carries.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let uuid = Uuid::from_str(s).ok()?;
        if uuid.is_nil() {
            return None;
        }
        // Canonical form only: mixed case or braces indicate a foreign or
        // hand-built value.
        if uuid.hyphenated().to_string() != s {
            return None;
        }
        Some(Self(uuid))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_guids_are_distinct() {
        assert_ne!(Guid::random(), Guid::random());
    }

    #[test]
    fn parse_roundtrip() {
        let guid = Guid::random();
        let parsed = Guid::parse(&guid.to_string()).unwrap();
        assert_eq!(guid, parsed);
    }

    #[test]
    fn parse_rejects_nil_and_noncanonical() {
        assert!(Guid::parse("00000000-0000-0000-0000-000000000000").is_none());
        assert!(Guid::parse("not-a-guid").is_none());
        assert!(Guid::parse("A9C60172-3477-4A22-9A55-4F25C1A7B2C1").is_none());
    }

    #[test]
    fn serde_as_string() {
        let guid = Guid::random();
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, format!("\"{guid}\""));
        let back: Guid = serde_json::from_str(&json).unwrap();
        assert_eq!(guid, back);
    }
}
