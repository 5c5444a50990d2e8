//! The unique-position contract.
//!
//! Siblings are ordered by totally-ordered fractional keys so an insert
//! never renumbers its neighbors. The encoding of the fractional key is the
//! business of the [`PositionGenerator`] collaborator; this module fixes
//! only the contract: opaque key bytes, a client-unique suffix, and a total
//! order over the pair.

use notesync_model::Guid;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Uniquifying suffix mixed into every generated position.
///
/// Derived from the node's GUID, so two clients concurrently inserting at
/// the same spot still produce distinct, consistently-ordered keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionSuffix([u8; 16]);

impl PositionSuffix {
    /// Derives the suffix for a node from its GUID.
    #[must_use]
    pub fn from_guid(guid: &Guid) -> Self {
        Self(*guid.as_bytes())
    }

    /// Returns the raw suffix bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// A totally-ordered sibling position.
///
/// Ordering is lexicographic over `(key, suffix)`. The key bytes are opaque
/// to the engine; only the generator that produced them knows their
/// structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniquePosition {
    key: Vec<u8>,
    suffix: PositionSuffix,
}

impl UniquePosition {
    /// Assembles a position from generator output.
    #[must_use]
    pub fn new(key: Vec<u8>, suffix: PositionSuffix) -> Self {
        Self { key, suffix }
    }

    /// Returns the opaque fractional key.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Returns the uniquifying suffix.
    #[must_use]
    pub fn suffix(&self) -> &PositionSuffix {
        &self.suffix
    }

    /// Returns true if this is a well-formed position.
    ///
    /// An empty key never comes out of a generator; it indicates a damaged
    /// or foreign update.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.key.is_empty()
    }
}

impl PartialOrd for UniquePosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UniquePosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.suffix.cmp(&other.suffix))
    }
}

/// The fractional-position primitive, as consumed by the engine.
///
/// Each method takes the uniquifying suffix of the node being positioned
/// and returns a key that sorts as its name says. Callers guarantee that
/// `between` receives `before < after`.
pub trait PositionGenerator: Send + Sync {
    /// A position for the only tracked child of a parent.
    fn initial(&self, suffix: &PositionSuffix) -> UniquePosition;

    /// A position strictly before `pos`.
    fn before(&self, pos: &UniquePosition, suffix: &PositionSuffix) -> UniquePosition;

    /// A position strictly after `pos`.
    fn after(&self, pos: &UniquePosition, suffix: &PositionSuffix) -> UniquePosition;

    /// A position strictly between `before` and `after`.
    fn between(
        &self,
        before: &UniquePosition,
        after: &UniquePosition,
        suffix: &PositionSuffix,
    ) -> UniquePosition;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffix(byte: u8) -> PositionSuffix {
        PositionSuffix::from_guid(&Guid::from_uuid(uuid::Uuid::from_bytes([byte; 16])))
    }

    #[test]
    fn order_is_key_then_suffix() {
        let a = UniquePosition::new(vec![1, 2], suffix(0));
        let b = UniquePosition::new(vec![1, 3], suffix(0));
        let c = UniquePosition::new(vec![1, 2], suffix(1));

        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }

    #[test]
    fn validity() {
        assert!(UniquePosition::new(vec![0x80], suffix(0)).is_valid());
        assert!(!UniquePosition::new(Vec::new(), suffix(0)).is_valid());
    }

    #[test]
    fn suffix_tracks_guid() {
        let guid = Guid::random();
        assert_eq!(PositionSuffix::from_guid(&guid).as_bytes(), guid.as_bytes());
    }
}
