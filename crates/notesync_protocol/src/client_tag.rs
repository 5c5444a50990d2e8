//! Client-tag hashing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use notesync_model::Guid;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic hash of a GUID, used as a stable identity key.
///
/// The client tag survives server-side id reassignment: when a commit
/// response is lost and the server hands the entity a fresh id, the tag is
/// what lets both sides agree they are talking about the same node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientTagHash(String);

impl ClientTagHash {
    /// Derives the client-tag hash from a GUID.
    #[must_use]
    pub fn from_guid(guid: &Guid) -> Self {
        let digest = Sha256::digest(guid.as_bytes());
        Self(STANDARD.encode(digest))
    }

    /// Wraps an already-derived hash value, e.g. one read back from the
    /// persisted metadata blob.
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the hash as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientTagHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
