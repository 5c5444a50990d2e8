//! The Tracker: authoritative sync metadata store.
//!
//! One [`TrackedEntity`] per known node-or-tombstone, reachable through
//! three indices (server id, client-tag hash, node handle). Entities hold
//! non-owning [`NodeId`] handles into the tree; [`Tracker::remove`] is the
//! single operation that makes an entity unreachable from every index at
//! once, so node destruction stays one authoritative event.

use crate::error::{EngineError, EngineResult};
use notesync_model::{NodeId, NoteTree};
use notesync_protocol::{
    ClientTagHash, EntityMetadata, ModelTypeState, ServerId, SpecificsHash, SyncMetadata,
    UniquePosition,
};
use std::collections::HashMap;

/// Sync state of one node or tombstone.
///
/// Either live (`node` set, not deleted) or a tombstone (`node` unset,
/// deleted) — never both.
#[derive(Debug, Clone)]
pub struct TrackedEntity {
    node: Option<NodeId>,
    metadata: EntityMetadata,
    commit_may_have_started: bool,
    sequence_number_in_flight: Option<u64>,
}

impl TrackedEntity {
    /// The local node, `None` for tombstones.
    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// The server id (possibly still temporary).
    #[must_use]
    pub fn server_id(&self) -> &ServerId {
        &self.metadata.server_id
    }

    /// The client-tag hash.
    #[must_use]
    pub fn client_tag_hash(&self) -> &ClientTagHash {
        &self.metadata.client_tag_hash
    }

    /// Fingerprint of the last synced (or last committed) specifics.
    #[must_use]
    pub fn specifics_hash(&self) -> &SpecificsHash {
        &self.metadata.specifics_hash
    }

    /// The tracked sibling position.
    #[must_use]
    pub fn unique_position(&self) -> Option<&UniquePosition> {
        self.metadata.unique_position.as_ref()
    }

    /// Last known server version.
    #[must_use]
    pub fn server_version(&self) -> i64 {
        self.metadata.server_version
    }

    /// True if this entity records a deletion.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.metadata.is_deleted
    }

    /// True if there are local changes the server has not acknowledged.
    #[must_use]
    pub fn is_unsynced(&self) -> bool {
        self.metadata.sequence_number > self.metadata.acked_sequence_number
    }

    /// True if a commit carrying this entity may have reached the server.
    #[must_use]
    pub fn commit_may_have_started(&self) -> bool {
        self.commit_may_have_started
    }

    /// Node creation time, microseconds since the Unix epoch.
    #[must_use]
    pub fn creation_time_us(&self) -> i64 {
        self.metadata.creation_time_us
    }

    /// The persisted form of this entity.
    #[must_use]
    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }
}

/// The authoritative store of per-entity sync metadata.
#[derive(Debug, Default)]
pub struct Tracker {
    entities: HashMap<ClientTagHash, TrackedEntity>,
    by_server_id: HashMap<ServerId, ClientTagHash>,
    by_node: HashMap<NodeId, ClientTagHash>,
    state: ModelTypeState,
}

impl Tracker {
    /// Creates an empty tracker with the given type-level state.
    #[must_use]
    pub fn new(state: ModelTypeState) -> Self {
        Self {
            entities: HashMap::new(),
            by_server_id: HashMap::new(),
            by_node: HashMap::new(),
            state,
        }
    }

    /// Restores a tracker from a persisted blob, reconnecting entities to
    /// tree nodes by GUID-derived client tag.
    ///
    /// Any inconsistency between blob and tree (a live entity without a
    /// node, or a node the blob does not know) means the metadata is stale
    /// or foreign and sync must restart clean.
    pub fn from_metadata(metadata: SyncMetadata, tree: &NoteTree) -> EngineResult<Self> {
        let mut hash_to_node: HashMap<ClientTagHash, NodeId> = HashMap::new();
        for root in tree.permanent_roots() {
            for id in tree.subtree(root) {
                if let Some(node) = tree.node(id) {
                    hash_to_node.insert(ClientTagHash::from_guid(&node.guid), id);
                }
            }
        }

        let mut tracker = Self::new(metadata.state);
        for entity_metadata in metadata.entities {
            let hash = entity_metadata.client_tag_hash.clone();
            let node = if entity_metadata.is_deleted {
                None
            } else {
                match hash_to_node.remove(&hash) {
                    Some(id) => Some(id),
                    None => {
                        return Err(EngineError::resync_required(format!(
                            "tracked entity {} has no local node",
                            entity_metadata.server_id
                        )));
                    }
                }
            };
            tracker.insert(TrackedEntity {
                node,
                metadata: entity_metadata,
                // Unknown whether a commit went out before the restart;
                // assume it did so tombstones are never pruned early.
                commit_may_have_started: true,
                sequence_number_in_flight: None,
            });
        }

        if !hash_to_node.is_empty() {
            return Err(EngineError::resync_required(format!(
                "{} local nodes missing from persisted metadata",
                hash_to_node.len()
            )));
        }
        Ok(tracker)
    }

    /// Produces the persisted form of this tracker.
    #[must_use]
    pub fn to_metadata(&self) -> SyncMetadata {
        let mut entities: Vec<EntityMetadata> =
            self.entities.values().map(|e| e.metadata.clone()).collect();
        // Deterministic blob layout.
        entities.sort_by(|a, b| a.client_tag_hash.cmp(&b.client_tag_hash));
        SyncMetadata {
            state: self.state.clone(),
            entities,
        }
    }

    /// The type-level state.
    #[must_use]
    pub fn state(&self) -> &ModelTypeState {
        &self.state
    }

    /// Updates the remembered encryption key name.
    pub fn set_encryption_key_name(&mut self, name: impl Into<String>) {
        self.state.encryption_key_name = name.into();
    }

    /// Updates the server progress marker.
    pub fn set_progress_marker(&mut self, marker: Vec<u8>) {
        self.state.progress_marker = marker;
    }

    fn insert(&mut self, entity: TrackedEntity) {
        let hash = entity.metadata.client_tag_hash.clone();
        self.by_server_id
            .insert(entity.metadata.server_id.clone(), hash.clone());
        if let Some(node) = entity.node {
            self.by_node.insert(node, hash.clone());
        }
        self.entities.insert(hash, entity);
    }

    /// Starts tracking a live node.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        hash: ClientTagHash,
        node: NodeId,
        server_id: ServerId,
        server_version: i64,
        creation_time_us: i64,
        unique_position: Option<UniquePosition>,
        specifics_hash: SpecificsHash,
    ) {
        debug_assert!(!self.entities.contains_key(&hash), "entity tracked twice");
        self.insert(TrackedEntity {
            node: Some(node),
            metadata: EntityMetadata {
                server_id,
                client_tag_hash: hash,
                specifics_hash,
                unique_position,
                server_version,
                sequence_number: 0,
                acked_sequence_number: 0,
                is_deleted: false,
                creation_time_us,
            },
            commit_may_have_started: false,
            sequence_number_in_flight: None,
        });
    }

    /// Records the applied state of a remote update on a live entity.
    pub fn update(
        &mut self,
        hash: &ClientTagHash,
        server_id: ServerId,
        server_version: i64,
        unique_position: Option<UniquePosition>,
        specifics_hash: SpecificsHash,
    ) {
        let Some(entity) = self.entities.get_mut(hash) else {
            return;
        };
        if entity.metadata.server_id != server_id {
            self.by_server_id.remove(&entity.metadata.server_id);
            self.by_server_id.insert(server_id.clone(), hash.clone());
            entity.metadata.server_id = server_id;
        }
        entity.metadata.server_version = server_version;
        entity.metadata.unique_position = unique_position;
        entity.metadata.specifics_hash = specifics_hash;
    }

    /// Turns a live entity into a tombstone.
    ///
    /// The node handle is dropped from the index here; the caller is about
    /// to destroy (or has destroyed) the node itself.
    pub fn mark_deleted(&mut self, hash: &ClientTagHash) {
        let Some(entity) = self.entities.get_mut(hash) else {
            return;
        };
        if let Some(node) = entity.node.take() {
            self.by_node.remove(&node);
        }
        entity.metadata.is_deleted = true;
        entity.metadata.unique_position = None;
    }

    /// Stops tracking an entity, removing it from every index.
    pub fn remove(&mut self, hash: &ClientTagHash) {
        if let Some(entity) = self.entities.remove(hash) {
            self.by_server_id.remove(&entity.metadata.server_id);
            if let Some(node) = entity.node {
                self.by_node.remove(&node);
            }
        }
    }

    /// Records one more local change on an entity.
    pub fn increment_sequence_number(&mut self, hash: &ClientTagHash) {
        if let Some(entity) = self.entities.get_mut(hash) {
            entity.metadata.sequence_number += 1;
        }
    }

    /// Acknowledges all local changes up to the current sequence number.
    /// Full squash; only correct when the remote side just overwrote the
    /// local state wholesale.
    pub fn ack_sequence_number(&mut self, hash: &ClientTagHash) {
        if let Some(entity) = self.entities.get_mut(hash) {
            entity.metadata.acked_sequence_number = entity.metadata.sequence_number;
            entity.sequence_number_in_flight = None;
        }
    }

    /// Acknowledges local changes up to the sequence number captured when
    /// the in-flight commit record was built. Edits made while the commit
    /// was in flight stay pending; a response with no matching in-flight
    /// record acknowledges nothing and the entity simply recommits.
    pub fn ack_in_flight_commit(&mut self, hash: &ClientTagHash) {
        if let Some(entity) = self.entities.get_mut(hash) {
            if let Some(up_to) = entity.sequence_number_in_flight.take() {
                if up_to > entity.metadata.acked_sequence_number {
                    entity.metadata.acked_sequence_number = up_to;
                }
            }
        }
    }

    /// Splices a (typically freshly server-assigned) id onto an entity.
    pub fn update_server_id(&mut self, hash: &ClientTagHash, server_id: ServerId) {
        if let Some(entity) = self.entities.get_mut(hash) {
            self.by_server_id.remove(&entity.metadata.server_id);
            self.by_server_id.insert(server_id.clone(), hash.clone());
            entity.metadata.server_id = server_id;
        }
    }

    /// Records a new server version without touching content state.
    pub fn set_server_version(&mut self, hash: &ClientTagHash, version: i64) {
        if let Some(entity) = self.entities.get_mut(hash) {
            entity.metadata.server_version = version;
        }
    }

    /// Replaces the tracked sibling position.
    pub fn set_unique_position(&mut self, hash: &ClientTagHash, position: UniquePosition) {
        if let Some(entity) = self.entities.get_mut(hash) {
            entity.metadata.unique_position = Some(position);
        }
    }

    /// Replaces the tracked specifics fingerprint.
    pub fn set_specifics_hash(&mut self, hash: &ClientTagHash, specifics_hash: SpecificsHash) {
        if let Some(entity) = self.entities.get_mut(hash) {
            entity.metadata.specifics_hash = specifics_hash;
        }
    }

    /// Marks that a commit carrying this entity may have reached the
    /// server. Guards tombstones of fresh creations against premature
    /// pruning.
    pub fn mark_commit_may_have_started(&mut self, hash: &ClientTagHash) {
        if let Some(entity) = self.entities.get_mut(hash) {
            entity.commit_may_have_started = true;
        }
    }

    /// Records that a commit record for this entity was just built. The
    /// commit may reach the server from here on, and its response may
    /// acknowledge only the changes captured in the record.
    pub fn mark_commit_in_flight(&mut self, hash: &ClientTagHash) {
        if let Some(entity) = self.entities.get_mut(hash) {
            entity.commit_may_have_started = true;
            entity.sequence_number_in_flight = Some(entity.metadata.sequence_number);
        }
    }

    /// Looks up an entity by server id.
    #[must_use]
    pub fn entity_for_server_id(&self, id: &ServerId) -> Option<&TrackedEntity> {
        self.by_server_id.get(id).and_then(|h| self.entities.get(h))
    }

    /// Looks up an entity by client-tag hash.
    #[must_use]
    pub fn entity_for_client_tag(&self, hash: &ClientTagHash) -> Option<&TrackedEntity> {
        self.entities.get(hash)
    }

    /// Looks up an entity by local node handle.
    #[must_use]
    pub fn entity_for_node(&self, node: NodeId) -> Option<&TrackedEntity> {
        self.by_node.get(&node).and_then(|h| self.entities.get(h))
    }

    /// The client-tag hash tracked for a node, if any.
    #[must_use]
    pub fn hash_for_node(&self, node: NodeId) -> Option<ClientTagHash> {
        self.by_node.get(&node).cloned()
    }

    /// Iterates over all tracked entities.
    pub fn entities(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.entities.values()
    }

    /// Number of tracked entities, tombstones included.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entities.len()
    }

    /// True if any entity has unacknowledged local changes.
    #[must_use]
    pub fn has_local_changes(&self) -> bool {
        self.entities.values().any(|e| e.is_unsynced())
    }

    /// Returns up to `limit` unsynced entities, ordered for commit.
    ///
    /// Among non-deletions a parent always precedes its children (moves and
    /// creations depend on the parent existing server-side); deletions come
    /// last and in no particular order, since any ordering dependency was
    /// already resolved by the preceding updates.
    #[must_use]
    pub fn entities_with_local_changes(
        &self,
        tree: &NoteTree,
        limit: usize,
    ) -> Vec<ClientTagHash> {
        let mut out = Vec::new();
        for root in tree.permanent_roots() {
            for node in tree.subtree(root) {
                if let Some(hash) = self.by_node.get(&node) {
                    if let Some(entity) = self.entities.get(hash) {
                        if entity.is_unsynced() && !entity.is_deleted() {
                            out.push(hash.clone());
                        }
                    }
                }
            }
        }
        let mut tombstones: Vec<ClientTagHash> = self
            .entities
            .iter()
            .filter(|(_, e)| e.is_unsynced() && e.is_deleted())
            .map(|(h, _)| h.clone())
            .collect();
        tombstones.sort();
        out.extend(tombstones);
        out.truncate(limit);
        out
    }

    /// Verifies the data-model invariants. Test and debug aid.
    pub fn check_invariants(&self, tree: &NoteTree) -> EngineResult<()> {
        for (hash, entity) in &self.entities {
            let live = entity.node.is_some() && !entity.metadata.is_deleted;
            let tombstone = entity.node.is_none() && entity.metadata.is_deleted;
            if !(live || tombstone) {
                return Err(EngineError::resync_required(format!(
                    "entity {hash} is neither live nor tombstone"
                )));
            }
            if let Some(node) = entity.node {
                if tree.is_permanent_root(node) && entity.metadata.unique_position.is_some() {
                    return Err(EngineError::resync_required(
                        "permanent root carries a position",
                    ));
                }
            }
        }
        // Sibling positions must be strictly ordered consistent with child
        // order.
        for root in tree.permanent_roots() {
            for parent in tree.subtree(root) {
                let mut last: Option<&UniquePosition> = None;
                for child in tree.children(parent) {
                    let Some(entity) = self.entity_for_node(*child) else {
                        continue;
                    };
                    let Some(position) = entity.unique_position() else {
                        continue;
                    };
                    if let Some(prev) = last {
                        if prev >= position {
                            return Err(EngineError::resync_required(format!(
                                "sibling positions out of order under {parent}"
                            )));
                        }
                    }
                    last = Some(position);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_model::{Guid, NoteTree, PermanentRoot};
    use notesync_protocol::PositionSuffix;

    fn hash_of(guid: &Guid) -> ClientTagHash {
        ClientTagHash::from_guid(guid)
    }

    fn position(byte: u8, guid: &Guid) -> UniquePosition {
        UniquePosition::new(vec![byte], PositionSuffix::from_guid(guid))
    }

    fn tracked_note(
        tracker: &mut Tracker,
        tree: &mut NoteTree,
        title: &str,
        index: usize,
        pos_byte: u8,
    ) -> (NodeId, ClientTagHash) {
        let main = tree.root(PermanentRoot::Main);
        let guid = Guid::random();
        let node = tree
            .add_note(main, index, title, None, None, guid, 0)
            .unwrap();
        let hash = hash_of(&guid);
        tracker.add(
            hash.clone(),
            node,
            ServerId::new(format!("s-{title}")),
            1,
            0,
            Some(position(pos_byte, &guid)),
            SpecificsHash::from_bytes([0u8; 32]),
        );
        (node, hash)
    }

    #[test]
    fn add_and_lookups() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let (node, hash) = tracked_note(&mut tracker, &mut tree, "a", 0, 1);

        assert_eq!(tracker.count(), 1);
        assert!(tracker.entity_for_client_tag(&hash).is_some());
        assert!(tracker.entity_for_node(node).is_some());
        assert!(tracker
            .entity_for_server_id(&ServerId::new("s-a"))
            .is_some());
    }

    #[test]
    fn sequence_numbers_drive_unsynced() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let (_, hash) = tracked_note(&mut tracker, &mut tree, "a", 0, 1);

        assert!(!tracker.entity_for_client_tag(&hash).unwrap().is_unsynced());
        tracker.increment_sequence_number(&hash);
        assert!(tracker.entity_for_client_tag(&hash).unwrap().is_unsynced());
        assert!(tracker.has_local_changes());
        tracker.ack_sequence_number(&hash);
        assert!(!tracker.has_local_changes());
    }

    #[test]
    fn ack_is_bounded_by_the_in_flight_snapshot() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let (_, hash) = tracked_note(&mut tracker, &mut tree, "a", 0, 1);

        tracker.increment_sequence_number(&hash);
        tracker.mark_commit_in_flight(&hash);
        // An edit lands while the commit is in flight.
        tracker.increment_sequence_number(&hash);

        tracker.ack_in_flight_commit(&hash);
        assert!(tracker.entity_for_client_tag(&hash).unwrap().is_unsynced());

        // A response without a matching in-flight record acks nothing.
        tracker.ack_in_flight_commit(&hash);
        assert!(tracker.entity_for_client_tag(&hash).unwrap().is_unsynced());

        tracker.mark_commit_in_flight(&hash);
        tracker.ack_in_flight_commit(&hash);
        assert!(!tracker.entity_for_client_tag(&hash).unwrap().is_unsynced());
    }

    #[test]
    fn mark_deleted_creates_tombstone() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let (node, hash) = tracked_note(&mut tracker, &mut tree, "a", 0, 1);

        tracker.mark_deleted(&hash);
        let entity = tracker.entity_for_client_tag(&hash).unwrap();
        assert!(entity.is_deleted());
        assert!(entity.node().is_none());
        assert!(entity.unique_position().is_none());
        assert!(tracker.entity_for_node(node).is_none());
    }

    #[test]
    fn remove_clears_all_indices() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let (node, hash) = tracked_note(&mut tracker, &mut tree, "a", 0, 1);

        tracker.remove(&hash);
        assert_eq!(tracker.count(), 0);
        assert!(tracker.entity_for_client_tag(&hash).is_none());
        assert!(tracker.entity_for_node(node).is_none());
        assert!(tracker.entity_for_server_id(&ServerId::new("s-a")).is_none());
    }

    #[test]
    fn server_id_splice() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let (_, hash) = tracked_note(&mut tracker, &mut tree, "a", 0, 1);

        tracker.update_server_id(&hash, ServerId::new("fresh"));
        assert!(tracker.entity_for_server_id(&ServerId::new("s-a")).is_none());
        assert_eq!(
            tracker
                .entity_for_server_id(&ServerId::new("fresh"))
                .unwrap()
                .client_tag_hash(),
            &hash
        );
    }

    #[test]
    fn local_changes_order_parents_first_deletions_last() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let main = tree.root(PermanentRoot::Main);

        let folder_guid = Guid::random();
        let folder = tree.add_folder(main, 0, "f", folder_guid, 0).unwrap();
        let folder_hash = hash_of(&folder_guid);
        tracker.add(
            folder_hash.clone(),
            folder,
            ServerId::new("s-f"),
            1,
            0,
            Some(position(1, &folder_guid)),
            SpecificsHash::from_bytes([0u8; 32]),
        );

        let child_guid = Guid::random();
        let child = tree
            .add_note(folder, 0, "c", None, None, child_guid, 0)
            .unwrap();
        let child_hash = hash_of(&child_guid);
        tracker.add(
            child_hash.clone(),
            child,
            ServerId::new("s-c"),
            1,
            0,
            Some(position(1, &child_guid)),
            SpecificsHash::from_bytes([0u8; 32]),
        );

        let (_, dead_hash) = tracked_note(&mut tracker, &mut tree, "dead", 1, 9);
        tracker.mark_deleted(&dead_hash);

        for hash in [&child_hash, &folder_hash, &dead_hash] {
            tracker.increment_sequence_number(hash);
        }

        let order = tracker.entities_with_local_changes(&tree, 10);
        assert_eq!(order.len(), 3);
        let folder_at = order.iter().position(|h| h == &folder_hash).unwrap();
        let child_at = order.iter().position(|h| h == &child_hash).unwrap();
        assert!(folder_at < child_at);
        assert_eq!(order.last().unwrap(), &dead_hash);
    }

    #[test]
    fn metadata_roundtrip_restores_nodes() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::new(ModelTypeState {
            cache_guid: "cache".into(),
            initial_sync_done: true,
            ..Default::default()
        });
        for root in tree.permanent_roots() {
            let guid = tree.node(root).unwrap().guid;
            tracker.add(
                hash_of(&guid),
                root,
                ServerId::new(format!("root-{root}")),
                1,
                0,
                None,
                SpecificsHash::from_bytes([0u8; 32]),
            );
        }
        let (node, hash) = tracked_note(&mut tracker, &mut tree, "a", 0, 1);
        tracker.increment_sequence_number(&hash);

        let restored = Tracker::from_metadata(tracker.to_metadata(), &tree).unwrap();
        assert_eq!(restored.count(), 4);
        let entity = restored.entity_for_client_tag(&hash).unwrap();
        assert_eq!(entity.node(), Some(node));
        assert!(entity.is_unsynced());
        assert!(entity.commit_may_have_started());
    }

    #[test]
    fn restore_rejects_unknown_local_nodes() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        for root in tree.permanent_roots() {
            let guid = tree.node(root).unwrap().guid;
            tracker.add(
                hash_of(&guid),
                root,
                ServerId::new(format!("root-{root}")),
                1,
                0,
                None,
                SpecificsHash::from_bytes([0u8; 32]),
            );
        }
        let metadata = tracker.to_metadata();

        // A node created after the blob was written.
        let main = tree.root(PermanentRoot::Main);
        tree.add_note(main, 0, "late", None, None, Guid::random(), 0)
            .unwrap();

        let err = Tracker::from_metadata(metadata, &tree).unwrap_err();
        assert!(err.requires_resync());
    }

    #[test]
    fn restore_rejects_live_entity_without_node() {
        let tree = NoteTree::new();
        let guid = Guid::random();
        let metadata = SyncMetadata {
            state: ModelTypeState::default(),
            entities: vec![EntityMetadata {
                server_id: ServerId::new("ghost"),
                client_tag_hash: hash_of(&guid),
                specifics_hash: SpecificsHash::from_bytes([0u8; 32]),
                unique_position: Some(position(1, &guid)),
                server_version: 2,
                sequence_number: 0,
                acked_sequence_number: 0,
                is_deleted: false,
                creation_time_us: 0,
            }],
        };
        // The three roots are untracked in this blob too, but the ghost
        // entity fails first.
        let err = Tracker::from_metadata(metadata, &tree).unwrap_err();
        assert!(err.requires_resync());
    }

    #[test]
    fn invariants_catch_misordered_positions() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let (_, first) = tracked_note(&mut tracker, &mut tree, "a", 0, 5);
        let (_, _second) = tracked_note(&mut tracker, &mut tree, "b", 1, 6);
        assert!(tracker.check_invariants(&tree).is_ok());

        // Force the first sibling's position above the second's.
        let guid = Guid::random();
        tracker.set_unique_position(&first, position(9, &guid));
        assert!(tracker.check_invariants(&tree).is_err());
    }
}
