//! Remote entity records: incoming updates and outgoing commits.

use crate::client_tag::ClientTagHash;
use crate::position::UniquePosition;
use crate::specifics::{NoteSpecifics, SpecificsHash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version value of an entity that has never been committed.
pub const UNCOMMITTED_VERSION: i64 = -1;

/// A server-assigned entity id, or a temporary client-generated one for
/// entities awaiting their first commit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Wraps a server-assigned id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a temporary client-side id for a not-yet-committed entity.
    ///
    /// The server replaces it with a real id in the commit response; until
    /// then it only has to be unique within this client.
    pub fn temporary(item_id: impl fmt::Display) -> Self {
        Self(format!("c-{item_id}"))
    }

    /// Returns true if this id is a temporary client-generated one.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with("c-")
    }

    /// Returns the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provenance recorded on a deletion commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionOrigin {
    /// Free-form description of where the deletion originated.
    pub origin: String,
    /// Version of the client that issued the deletion.
    pub client_version: String,
}

impl DeletionOrigin {
    /// Creates a deletion origin record.
    pub fn new(origin: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            client_version: client_version.into(),
        }
    }
}

/// One remote update as delivered by the commit queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    /// Server id (or temporary client id reflected back).
    pub id: ServerId,
    /// Parent entity id, absent for permanent roots.
    pub parent_id: Option<ServerId>,
    /// Client-tag hash derived from the GUID. Absent only on updates from
    /// clients predating tag support.
    pub client_tag_hash: Option<ClientTagHash>,
    /// Content payload. Absent on tombstones.
    pub specifics: Option<NoteSpecifics>,
    /// Whether the entity is a folder. Folderness lives on the entity, not
    /// in the specifics.
    pub folder: bool,
    /// Sibling position. Absent for permanent roots and tombstones.
    pub unique_position: Option<UniquePosition>,
    /// Monotonically increasing server version.
    pub version: i64,
    /// Tombstone marker.
    pub deleted: bool,
    /// Provenance of the deletion, when known.
    pub deletion_origin: Option<DeletionOrigin>,
    /// Cache GUID of the client that originally created the entity.
    pub originator_cache_guid: Option<String>,
    /// Item id assigned by the originating client before first commit.
    pub originator_client_item_id: Option<String>,
    /// Name of the encryption key the payload was written under.
    pub encryption_key_name: Option<String>,
    /// Well-known tag for permanent roots (`main`, `other`, `trash`).
    pub server_defined_unique_tag: Option<String>,
}

impl EntityData {
    /// Returns true if this update is a tombstone.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.deleted
    }

    /// Returns true if this update describes a permanent root.
    #[must_use]
    pub fn is_permanent_root(&self) -> bool {
        self.server_defined_unique_tag.is_some()
    }

    /// The GUID declared in the specifics, if any.
    #[must_use]
    pub fn specifics_guid(&self) -> Option<&notesync_model::Guid> {
        self.specifics.as_ref().and_then(|s| s.guid.as_ref())
    }
}

/// A batch of remote updates plus batch-level encryption state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateBatch {
    /// Key name the server reports for the whole batch, when the data type
    /// is encrypted.
    pub encryption_key_name: Option<String>,
    /// The updates, in server order.
    pub entities: Vec<EntityData>,
}

impl UpdateBatch {
    /// Creates a batch with no encryption key.
    #[must_use]
    pub fn new(entities: Vec<EntityData>) -> Self {
        Self {
            encryption_key_name: None,
            entities,
        }
    }
}

/// One outgoing commit record built from an unsynced tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Server id, temporary for first-time commits.
    pub id: ServerId,
    /// Client-tag hash.
    pub client_tag_hash: ClientTagHash,
    /// Content payload; `None` for deletions.
    pub specifics: Option<NoteSpecifics>,
    /// Whether the committed entity is a folder.
    pub folder: bool,
    /// Version the change is based on; [`UNCOMMITTED_VERSION`] for creates.
    pub base_version: i64,
    /// Sibling position; absent for deletions.
    pub unique_position: Option<UniquePosition>,
    /// Fingerprint of `specifics` as tracked locally.
    pub specifics_hash: SpecificsHash,
    /// Tombstone marker.
    pub deleted: bool,
    /// Provenance carried on deletion commits.
    pub deletion_origin: Option<DeletionOrigin>,
}

/// The server's acknowledgment of one committed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResponse {
    /// Client-tag hash identifying the committed entity.
    pub client_tag_hash: ClientTagHash,
    /// The id the server filed the entity under (fresh for creates).
    pub server_id: ServerId,
    /// The new server version.
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_ids() {
        let id = ServerId::temporary(7);
        assert!(id.is_temporary());
        assert_eq!(id.as_str(), "c-7");

        let id = ServerId::new("s42");
        assert!(!id.is_temporary());
    }

    #[test]
    fn permanent_root_detection() {
        let mut entity = EntityData {
            id: ServerId::new("root"),
            parent_id: None,
            client_tag_hash: None,
            specifics: None,
            folder: true,
            unique_position: None,
            version: 1,
            deleted: false,
            deletion_origin: None,
            originator_cache_guid: None,
            originator_client_item_id: None,
            encryption_key_name: None,
            server_defined_unique_tag: Some("main".into()),
        };
        assert!(entity.is_permanent_root());
        entity.server_defined_unique_tag = None;
        assert!(!entity.is_permanent_root());
    }
}
