//! Local-mutation capture: turns tree change notifications into tracker
//! state.
//!
//! The embedder mutates the tree first, then reports the mutation here.
//! Each hook returns whether sync metadata changed, so the caller knows to
//! persist and nudge the commit queue. The removal hook is the exception:
//! it must run while the subtree is still readable, before the nodes go.

use crate::error::EngineResult;
use crate::ordering::position_for_node;
use crate::preprocess::specifics_for_node;
use crate::tracker::Tracker;
use notesync_model::{ModelError, NodeId, NoteTree};
use notesync_protocol::{ClientTagHash, PositionGenerator, ServerId, UNCOMMITTED_VERSION};
use tracing::debug;

/// One local-change notification context: the tree after the mutation, the
/// tracker to update, and the embedder's position generator.
pub(crate) struct ChangeObserver<'a> {
    pub tree: &'a NoteTree,
    pub tracker: &'a mut Tracker,
    pub positions: &'a dyn PositionGenerator,
}

impl ChangeObserver<'_> {
    /// A node was created locally. Starts tracking it as an uncommitted
    /// creation with a position relative to its tracked neighbors.
    pub fn node_added(&mut self, node: NodeId) -> EngineResult<bool> {
        if self.tracker.entity_for_node(node).is_some() {
            return Ok(false);
        }
        let node_ref = self
            .tree
            .node(node)
            .ok_or(ModelError::NodeNotFound { id: node })?;
        let guid = node_ref.guid;
        let creation_time_us = node_ref.creation_time_us;
        let parent = node_ref.parent.ok_or(ModelError::NodeNotFound { id: node })?;
        let specifics = specifics_for_node(self.tree, node)?;
        let position = position_for_node(self.tree, self.tracker, self.positions, parent, node);

        let hash = ClientTagHash::from_guid(&guid);
        self.tracker.add(
            hash.clone(),
            node,
            ServerId::temporary(&guid),
            UNCOMMITTED_VERSION,
            creation_time_us,
            Some(position),
            specifics.hash()?,
        );
        self.tracker.increment_sequence_number(&hash);
        Ok(true)
    }

    /// A node is about to be removed, subtree included. Tracked entities
    /// become tombstones to commit; entities whose creation never reached
    /// the server are dropped outright.
    pub fn node_will_be_removed(&mut self, node: NodeId) -> EngineResult<bool> {
        let mut changed = false;
        for id in self.tree.subtree(node) {
            let Some(hash) = self.tracker.hash_for_node(id) else {
                continue;
            };
            let prune = self.tracker.entity_for_client_tag(&hash).is_some_and(|e| {
                !e.commit_may_have_started() && e.server_version() == UNCOMMITTED_VERSION
            });
            if prune {
                // The server never heard of this entity; no tombstone owed.
                debug!(%hash, "uncommitted creation deleted, entity dropped");
                self.tracker.remove(&hash);
            } else {
                self.tracker.mark_deleted(&hash);
                self.tracker.increment_sequence_number(&hash);
            }
            changed = true;
        }
        Ok(changed)
    }

    /// A node moved (new parent or new index). Recomputes its position from
    /// its tracked neighbors at the destination.
    pub fn node_moved(&mut self, node: NodeId) -> EngineResult<bool> {
        let Some(hash) = self.tracker.hash_for_node(node) else {
            return Ok(false);
        };
        let parent = self
            .tree
            .node(node)
            .and_then(|n| n.parent)
            .ok_or(ModelError::NodeNotFound { id: node })?;
        let position = position_for_node(self.tree, self.tracker, self.positions, parent, node);
        self.tracker.set_unique_position(&hash, position);
        self.tracker.increment_sequence_number(&hash);
        Ok(true)
    }

    /// A node's content changed. A fingerprint identical to the tracked one
    /// is a true no-op and schedules nothing.
    pub fn node_changed(&mut self, node: NodeId) -> EngineResult<bool> {
        let Some(hash) = self.tracker.hash_for_node(node) else {
            return Ok(false);
        };
        let specifics_hash = specifics_for_node(self.tree, node)?.hash()?;
        let unchanged = self
            .tracker
            .entity_for_client_tag(&hash)
            .is_some_and(|e| e.specifics_hash() == &specifics_hash);
        if unchanged {
            return Ok(false);
        }
        self.tracker.increment_sequence_number(&hash);
        Ok(true)
    }

    /// The children of `parent` were reordered wholesale. Walks the new
    /// order and regenerates positions wherever the tracked keys disagree
    /// with it.
    ///
    /// The successor for a regenerated key is the next sibling whose
    /// tracked key already lies past the last accepted one; keys that the
    /// reorder invalidated are never used as anchors.
    pub fn children_reordered(&mut self, parent: NodeId) -> EngineResult<bool> {
        let mut changed = false;
        let children: Vec<NodeId> = self.tree.children(parent).to_vec();
        let mut last: Option<notesync_protocol::UniquePosition> = None;
        for (index, child) in children.iter().enumerate() {
            let Some(hash) = self.tracker.hash_for_node(*child) else {
                continue;
            };
            let position = self
                .tracker
                .entity_for_client_tag(&hash)
                .and_then(|e| e.unique_position().cloned());
            if let Some(position) = position {
                let in_order = last.as_ref().is_none_or(|prev| *prev < position);
                if in_order {
                    last = Some(position);
                    continue;
                }
            }
            let suffix = self
                .tree
                .node(*child)
                .map(|n| notesync_protocol::PositionSuffix::from_guid(&n.guid))
                .ok_or(ModelError::NodeNotFound { id: *child })?;
            let successor = children[index + 1..].iter().find_map(|c| {
                self.tracker
                    .entity_for_node(*c)
                    .and_then(|e| e.unique_position())
                    .filter(|p| last.as_ref().is_none_or(|prev| prev < *p))
                    .cloned()
            });
            let fresh = match (&last, &successor) {
                (None, None) => self.positions.initial(&suffix),
                (None, Some(next)) => self.positions.before(next, &suffix),
                (Some(prev), None) => self.positions.after(prev, &suffix),
                (Some(prev), Some(next)) => self.positions.between(prev, next, &suffix),
            };
            self.tracker.set_unique_position(&hash, fresh.clone());
            self.tracker.increment_sequence_number(&hash);
            last = Some(fresh);
            changed = true;
        }
        Ok(changed)
    }
}
