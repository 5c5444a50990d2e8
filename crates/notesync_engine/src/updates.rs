//! Incremental remote-update application and conflict resolution.
//!
//! One batch at a time, after the initial merge. Each update resolves to an
//! explicit action computed once, then applied; invalid updates are logged
//! and dropped without failing the batch.

use crate::error::EngineResult;
use crate::ordering::index_for_position;
use crate::preprocess::{
    apply_specifics_to_node, create_node_from_specifics, declared_guid, semantics_match,
    validate_remote_update,
};
use crate::tracker::Tracker;
use notesync_model::{Guid, ModelError, NodeId, NoteTree};
use notesync_protocol::{ClientTagHash, EntityData, ServerId, UpdateBatch};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Counters describing what one batch application did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateStats {
    /// Updates applied onto existing tracked entities.
    pub applied: usize,
    /// Entities created from remote data.
    pub created: usize,
    /// Entities deleted (tombstone closures included).
    pub deleted: usize,
    /// Conflicts resolved.
    pub conflicts: usize,
    /// Updates skipped as stale or redundant.
    pub ignored: usize,
    /// Updates discarded as invalid.
    pub discarded: usize,
}

/// The action one update resolves to. Computed once, then dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Conflict,
    Delete,
    Create,
    Update,
    Ignore,
}

/// Applies one batch of incremental updates to the tree and tracker.
pub(crate) fn apply_update_batch(
    tree: &mut NoteTree,
    tracker: &mut Tracker,
    batch: &UpdateBatch,
) -> EngineResult<UpdateStats> {
    let mut handler = UpdatesHandler {
        tree,
        tracker,
        stats: UpdateStats::default(),
    };
    let key_switched = handler.adopt_batch_key(batch);
    let ordered = reorder_for_application(&batch.entities);
    let mut batch_hashes: HashSet<ClientTagHash> = HashSet::new();
    for update in ordered {
        if let Some(hash) = handler.apply_one(update)? {
            batch_hashes.insert(hash);
        }
    }
    if key_switched {
        handler.re_mark_uncovered(&batch_hashes);
    }
    Ok(handler.stats)
}

/// Orders a batch so every in-batch parent precedes its children, with
/// deletions last. Updates whose parent lies outside the batch act as roots.
fn reorder_for_application(entities: &[EntityData]) -> Vec<&EntityData> {
    let mut by_id: HashMap<&ServerId, usize> = HashMap::new();
    for (idx, update) in entities.iter().enumerate() {
        if !update.deleted {
            by_id.insert(&update.id, idx);
        }
    }
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();
    for (idx, update) in entities.iter().enumerate() {
        if update.deleted {
            continue;
        }
        match update.parent_id.as_ref().and_then(|p| by_id.get(p)) {
            Some(&parent_idx) if parent_idx != idx => {
                children.entry(parent_idx).or_default().push(idx);
            }
            _ => roots.push(idx),
        }
    }

    let mut order: Vec<&EntityData> = Vec::with_capacity(entities.len());
    let mut visited = vec![false; entities.len()];
    let mut stack: Vec<usize> = roots.into_iter().rev().collect();
    while let Some(idx) = stack.pop() {
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        order.push(&entities[idx]);
        if let Some(kids) = children.get(&idx) {
            for &child in kids.iter().rev() {
                stack.push(child);
            }
        }
    }
    // Parent cycles within a batch leave unvisited members; apply them in
    // arrival order, each will resolve or be discarded on its own.
    for (idx, update) in entities.iter().enumerate() {
        if !update.deleted && !visited[idx] {
            order.push(update);
        }
    }
    for update in entities {
        if update.deleted {
            order.push(update);
        }
    }
    order
}

struct UpdatesHandler<'a> {
    tree: &'a mut NoteTree,
    tracker: &'a mut Tracker,
    stats: UpdateStats,
}

impl UpdatesHandler<'_> {
    /// Applies one update. Returns the client-tag hash it touched, when it
    /// resolved to a tracked entity.
    fn apply_one(&mut self, update: &EntityData) -> EngineResult<Option<ClientTagHash>> {
        if update.is_permanent_root() {
            if let Some(entity) = self.tracker.entity_for_server_id(&update.id) {
                let hash = entity.client_tag_hash().clone();
                self.tracker.set_server_version(&hash, update.version);
                return Ok(Some(hash));
            }
            return Ok(None);
        }
        if let Err(reason) = validate_remote_update(update) {
            warn!(server_id = %update.id, reason, "invalid update discarded");
            self.stats.discarded += 1;
            return Ok(None);
        }

        let hash = self.resolve(update);
        let action = self.classify(update, hash.as_ref());
        let touched = match action {
            Action::Ignore => {
                self.stats.ignored += 1;
                hash
            }
            Action::Create => self.create(update)?,
            Action::Delete => {
                let hash = hash.ok_or_else(|| {
                    crate::error::EngineError::resync_required("delete resolved without entity")
                })?;
                self.delete(&hash, update);
                Some(hash)
            }
            Action::Update => {
                let hash = hash.ok_or_else(|| {
                    crate::error::EngineError::resync_required("update resolved without entity")
                })?;
                self.update(&hash, update)?;
                Some(hash)
            }
            Action::Conflict => {
                let hash = hash.ok_or_else(|| {
                    crate::error::EngineError::resync_required("conflict resolved without entity")
                })?;
                let hash = self.resolve_conflict(&hash, update)?;
                self.stats.conflicts += 1;
                hash
            }
        };
        if let Some(hash) = &touched {
            self.handle_update_key(update, hash);
        }
        Ok(touched)
    }

    /// Resolves the tracked entity an update refers to: by server id first,
    /// then by client tag for entities still under a temporary id (a commit
    /// succeeded but its response was lost). The latter splices the fresh
    /// server id onto the old entity.
    fn resolve(&mut self, update: &EntityData) -> Option<ClientTagHash> {
        if let Some(entity) = self.tracker.entity_for_server_id(&update.id) {
            return Some(entity.client_tag_hash().clone());
        }
        let hash = update
            .client_tag_hash
            .clone()
            .or_else(|| declared_guid(update).map(|g| ClientTagHash::from_guid(&g)))?;
        let entity = self.tracker.entity_for_client_tag(&hash)?;
        if entity.server_id().is_temporary() {
            debug!(server_id = %update.id, %hash, "spliced server id onto pending entity");
            self.tracker.update_server_id(&hash, update.id.clone());
            Some(hash)
        } else {
            // Same tag under a different non-temporary id; the server id
            // changed, adopt the new one.
            self.tracker.update_server_id(&hash, update.id.clone());
            Some(hash)
        }
    }

    fn classify(&self, update: &EntityData, hash: Option<&ClientTagHash>) -> Action {
        let Some(entity) = hash.and_then(|h| self.tracker.entity_for_client_tag(h)) else {
            if update.deleted {
                // A tombstone for something never tracked.
                return Action::Ignore;
            }
            return Action::Create;
        };
        if entity.is_unsynced() {
            return Action::Conflict;
        }
        if update.deleted {
            return Action::Delete;
        }
        if entity.is_deleted() {
            // Synced local tombstone, live remote update: a recreation.
            return Action::Create;
        }
        if update.version < entity.server_version() {
            return Action::Ignore;
        }
        Action::Update
    }

    /// Creates a node and tracked entity from remote data. Descendants in
    /// the same batch follow on their own, the batch is parent-first.
    fn create(&mut self, update: &EntityData) -> EngineResult<Option<ClientTagHash>> {
        let Some(specifics) = update.specifics.as_ref() else {
            self.stats.discarded += 1;
            return Ok(None);
        };
        let Some(parent) = self.trackable_parent(update) else {
            warn!(server_id = %update.id, "create without trackable parent discarded");
            self.stats.discarded += 1;
            return Ok(None);
        };
        // A synced tombstone being recreated sheds its old entity first.
        if let Some(hash) = update.client_tag_hash.clone() {
            if let Some(entity) = self.tracker.entity_for_client_tag(&hash) {
                if entity.is_deleted() {
                    self.tracker.remove(&hash);
                }
            }
        }

        let position = update
            .unique_position
            .clone()
            .ok_or_else(|| crate::error::EngineError::resync_required("create without position"))?;
        let index = index_for_position(self.tree, self.tracker, parent, &position, None);
        let mut guid = declared_guid(update).unwrap_or_else(Guid::random);
        if self.tree.node_by_guid(&guid).is_some() {
            guid = Guid::random();
        }
        let node =
            create_node_from_specifics(self.tree, parent, index, guid, update.folder, specifics)?;

        let hash = update
            .client_tag_hash
            .clone()
            .unwrap_or_else(|| ClientTagHash::from_guid(&guid));
        self.tracker.add(
            hash.clone(),
            node,
            update.id.clone(),
            update.version,
            specifics.creation_time_us,
            Some(position),
            specifics.hash()?,
        );
        if specifics.needs_title_reupload() {
            self.tracker.increment_sequence_number(&hash);
        }
        self.stats.created += 1;
        Ok(Some(hash))
    }

    /// Applies a remote update onto a live tracked entity. Unchanged
    /// specifics skip all content calls; a changed parent or position moves
    /// the node.
    fn update(&mut self, hash: &ClientTagHash, update: &EntityData) -> EngineResult<()> {
        let Some(entity) = self.tracker.entity_for_client_tag(hash) else {
            return Ok(());
        };
        let Some(node) = entity.node() else {
            return Ok(());
        };
        let old_hash = entity.specifics_hash().clone();
        let old_position = entity.unique_position().cloned();

        let Some(specifics) = update.specifics.as_ref() else {
            return Ok(());
        };
        let new_hash = specifics.hash()?;
        if new_hash != old_hash {
            apply_specifics_to_node(self.tree, node, specifics)?;
        }
        self.apply_placement(node, update, old_position.as_ref())?;
        self.tracker.update(
            hash,
            update.id.clone(),
            update.version,
            update.unique_position.clone(),
            new_hash,
        );
        if specifics.needs_title_reupload() {
            self.tracker.increment_sequence_number(hash);
        }
        self.stats.applied += 1;
        Ok(())
    }

    /// Moves `node` to match the update's parent and position, when either
    /// differs from the tracked state.
    fn apply_placement(
        &mut self,
        node: NodeId,
        update: &EntityData,
        old_position: Option<&notesync_protocol::UniquePosition>,
    ) -> EngineResult<()> {
        let Some(position) = update.unique_position.as_ref() else {
            return Ok(());
        };
        let Some(new_parent) = self.trackable_parent(update) else {
            warn!(server_id = %update.id, "move target parent unknown, placement skipped");
            return Ok(());
        };
        let current_parent = self
            .tree
            .node(node)
            .ok_or(ModelError::NodeNotFound { id: node })?
            .parent;
        if current_parent == Some(new_parent) && old_position == Some(position) {
            return Ok(());
        }
        let index =
            index_for_position(self.tree, self.tracker, new_parent, position, Some(node));
        self.tree.move_node(node, new_parent, index)?;
        Ok(())
    }

    /// Removes the node and the tracked entities of its entire subtree.
    /// A server-initiated deletion needs no tombstone; everything is pruned.
    fn delete(&mut self, hash: &ClientTagHash, update: &EntityData) {
        let Some(entity) = self.tracker.entity_for_client_tag(hash) else {
            return;
        };
        match entity.node() {
            Some(node) => match self.tree.remove(node) {
                Ok(removed) => {
                    for id in removed {
                        if let Some(h) = self.tracker.hash_for_node(id) {
                            self.tracker.remove(&h);
                        }
                    }
                    // The entity itself is gone via its node index; cover
                    // the case where the node index was already dropped.
                    self.tracker.remove(hash);
                    self.stats.deleted += 1;
                }
                Err(error) => {
                    warn!(server_id = %update.id, %error, "remote deletion failed locally");
                    self.stats.discarded += 1;
                }
            },
            None => {
                // Local tombstone meets remote tombstone; nothing left to do.
                self.tracker.remove(hash);
                self.stats.deleted += 1;
            }
        }
    }

    /// Resolves a conflict between an unsynced local entity and a remote
    /// update. The server is authoritative for content; pending local
    /// commits are squashed, not retried, except when only the remote side
    /// deleted.
    fn resolve_conflict(
        &mut self,
        hash: &ClientTagHash,
        update: &EntityData,
    ) -> EngineResult<Option<ClientTagHash>> {
        let Some(entity) = self.tracker.entity_for_client_tag(hash) else {
            return Ok(None);
        };
        let locally_deleted = entity.is_deleted();
        match (locally_deleted, update.deleted) {
            (true, true) => {
                self.tracker.remove(hash);
                Ok(Some(hash.clone()))
            }
            (false, true) => {
                // Local edit wins over the remote deletion; the pending
                // commit will recreate the entity server-side.
                self.tracker.set_server_version(hash, update.version);
                Ok(Some(hash.clone()))
            }
            (true, false) => {
                // Remote wins; undelete by recreating from remote data.
                self.tracker.remove(hash);
                self.create(update)
            }
            (false, false) => {
                let node = entity.node().ok_or_else(|| {
                    crate::error::EngineError::resync_required("live conflict entity without node")
                })?;
                let Some(specifics) = update.specifics.as_ref() else {
                    return Ok(Some(hash.clone()));
                };
                let matches = self
                    .tree
                    .node(node)
                    .is_some_and(|n| semantics_match(n, specifics, update.folder));
                let same_parent = self.trackable_parent(update)
                    == self
                        .tree
                        .node(node)
                        .ok_or(ModelError::NodeNotFound { id: node })?
                        .parent;
                if !(matches && same_parent) {
                    // Remote wins with squash.
                    self.update(hash, update)?;
                    self.stats.applied -= 1;
                } else {
                    self.tracker.update(
                        hash,
                        update.id.clone(),
                        update.version,
                        update.unique_position.clone(),
                        specifics.hash()?,
                    );
                }
                self.tracker.ack_sequence_number(hash);
                Ok(Some(hash.clone()))
            }
        }
    }

    fn trackable_parent(&self, update: &EntityData) -> Option<NodeId> {
        update
            .parent_id
            .as_ref()
            .and_then(|id| self.tracker.entity_for_server_id(id))
            .and_then(|entity| entity.node())
    }

    /// Re-marks an entity unsynced when its update was written under a key
    /// other than the remembered one, so it gets recommitted once.
    fn handle_update_key(&mut self, update: &EntityData, hash: &ClientTagHash) {
        let Some(key) = update.encryption_key_name.as_deref() else {
            return;
        };
        if key != self.tracker.state().encryption_key_name
            && self
                .tracker
                .entity_for_client_tag(hash)
                .is_some_and(|e| !e.is_deleted())
        {
            debug!(%hash, key, "entity re-marked for recommit under current key");
            self.tracker.increment_sequence_number(hash);
        }
    }

    /// Adopts a batch-level key change up front, so in-batch updates
    /// already written under the new key are not re-marked. Returns whether
    /// a switch happened.
    fn adopt_batch_key(&mut self, batch: &UpdateBatch) -> bool {
        let Some(new_key) = batch.encryption_key_name.as_deref() else {
            return false;
        };
        if new_key == self.tracker.state().encryption_key_name {
            return false;
        }
        debug!(new_key, "update batch switches encryption key");
        self.tracker.set_encryption_key_name(new_key);
        true
    }

    /// A batch arriving under a new key re-keys the whole type: every
    /// tracked live entity the batch did not already cover is re-marked so
    /// it gets recommitted under the new key. Permanent roots carry no
    /// payload and are exempt.
    fn re_mark_uncovered(&mut self, covered: &HashSet<ClientTagHash>) {
        let to_mark: Vec<ClientTagHash> = self
            .tracker
            .entities()
            .filter(|e| {
                !e.is_deleted()
                    && !covered.contains(e.client_tag_hash())
                    && e.node().is_some_and(|n| !self.tree.is_permanent_root(n))
            })
            .map(|e| e.client_tag_hash().clone())
            .collect();
        debug!(count = to_mark.len(), "re-marking entities uncovered by key switch");
        for hash in to_mark {
            self.tracker.increment_sequence_number(&hash);
        }
    }
}
