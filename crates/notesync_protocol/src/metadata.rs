//! The persisted sync-metadata blob.
//!
//! Everything the Tracker needs to survive a restart: one record per tracked
//! entity plus the type-level progress state. Encoded as CBOR; a blob that
//! fails to decode is treated as absent and triggers a clean resync, never a
//! crash.

use crate::client_tag::ClientTagHash;
use crate::entity::ServerId;
use crate::error::{ProtocolError, ProtocolResult};
use crate::position::UniquePosition;
use crate::specifics::SpecificsHash;
use serde::{Deserialize, Serialize};

/// Persisted state of one tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Server id (possibly still temporary).
    pub server_id: ServerId,
    /// Client-tag hash.
    pub client_tag_hash: ClientTagHash,
    /// Fingerprint of the last synced specifics.
    pub specifics_hash: SpecificsHash,
    /// Sibling position; absent for permanent roots and tombstones.
    pub unique_position: Option<UniquePosition>,
    /// Last known server version.
    pub server_version: i64,
    /// Local change counter.
    pub sequence_number: u64,
    /// Highest acknowledged change counter.
    pub acked_sequence_number: u64,
    /// Tombstone marker.
    pub is_deleted: bool,
    /// Creation timestamp of the node, microseconds since the Unix epoch.
    pub creation_time_us: i64,
}

/// Type-level persisted sync state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTypeState {
    /// Opaque server progress token.
    pub progress_marker: Vec<u8>,
    /// Identifier of the local sync client instance.
    pub cache_guid: String,
    /// Name of the encryption key the type is currently written under.
    pub encryption_key_name: String,
    /// Whether the initial merge has completed.
    pub initial_sync_done: bool,
}

/// The full persisted blob: type state plus all tracked entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Type-level state.
    pub state: ModelTypeState,
    /// One record per tracked entity or tombstone.
    pub entities: Vec<EntityMetadata>,
}

impl SyncMetadata {
    /// Encodes the blob as CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Decodes a blob previously produced by [`SyncMetadata::encode`].
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
