//! Initial-merge reconciliation of a full remote batch into a local tree.
//!
//! Runs exactly once, when sync is enabled over a tree that may already
//! hold local notes. Remote wins structurally: the merged tree mirrors the
//! remote forest, local-only nodes survive and are scheduled for commit.
//! Matching is by GUID first, then by semantics among untracked siblings.

use crate::error::{EngineError, EngineResult};
use crate::ordering::position_for_node;
use crate::preprocess::{
    apply_specifics_to_node, create_node_from_specifics, declared_guid, semantics_match,
    validate_remote_update,
};
use crate::tracker::Tracker;
use notesync_model::{
    Guid, ModelError, NodeId, NodeKind, NoteTree, PermanentRoot, PERMANENT_ROOTS,
};
use notesync_protocol::{
    ClientTagHash, EntityData, ModelTypeState, NoteSpecifics, PositionGenerator, ServerId,
    SpecificsHash, UpdateBatch, UNCOMMITTED_VERSION,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Counters describing what one initial merge did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Remote entities matched to an existing local node.
    pub matched: usize,
    /// Remote entities materialized as new local nodes.
    pub created: usize,
    /// Local-only nodes scheduled for their first commit.
    pub scheduled_for_commit: usize,
    /// Remote updates discarded as invalid, unreachable, or duplicate.
    pub discarded: usize,
}

/// Merges the initial full-sync batch into `tree`, producing the tracker
/// that owns sync metadata from here on.
///
/// Fails fatally when any permanent root is missing from the batch. Every
/// per-entity problem is logged and the entity discarded instead.
pub(crate) fn merge_initial_batch(
    tree: &mut NoteTree,
    batch: &UpdateBatch,
    positions: &dyn PositionGenerator,
    state: ModelTypeState,
    max_forest_depth: usize,
) -> EngineResult<(Tracker, MergeStats)> {
    let forest = RemoteForest::build(&batch.entities, max_forest_depth)?;
    let mut tracker = Tracker::new(state);
    let mut stats = MergeStats {
        discarded: forest.discarded,
        ..MergeStats::default()
    };

    for root in PERMANENT_ROOTS {
        let update = forest
            .root_updates
            .get(&root)
            .ok_or(EngineError::MissingPermanentRoots)?;
        tracker.add(
            ClientTagHash::from_guid(&root.guid()),
            tree.root(root),
            update.id.clone(),
            update.version,
            0,
            None,
            SpecificsHash::from_bytes([0u8; 32]),
        );
    }

    let mut cx = MergeContext {
        tree,
        tracker: &mut tracker,
        positions,
        forest: &forest,
        local_for_remote: HashMap::new(),
        remote_for_local: HashMap::new(),
        stats: &mut stats,
    };
    cx.build_guid_matches()?;
    for root in PERMANENT_ROOTS {
        let top = forest.root_children.get(&root).cloned().unwrap_or_default();
        let local_root = cx.tree.root(root);
        cx.merge_subtree(local_root, top)?;
    }

    Ok((tracker, stats))
}

struct MergeContext<'a> {
    tree: &'a mut NoteTree,
    tracker: &'a mut Tracker,
    positions: &'a dyn PositionGenerator,
    forest: &'a RemoteForest,
    local_for_remote: HashMap<usize, NodeId>,
    remote_for_local: HashMap<NodeId, usize>,
    stats: &'a mut MergeStats,
}

impl MergeContext<'_> {
    /// Pairs local nodes to remote entities sharing a GUID. A shared GUID
    /// across incompatible kinds is not a match; the local node gets a
    /// fresh GUID and both survive independently.
    fn build_guid_matches(&mut self) -> EngineResult<()> {
        let mut locals = Vec::new();
        for root in self.tree.permanent_roots() {
            for id in self.tree.subtree(root) {
                if !self.tree.is_permanent_root(id) {
                    locals.push(id);
                }
            }
        }
        for id in locals {
            let Some(node) = self.tree.node(id) else {
                continue;
            };
            let Some(&idx) = self.forest.by_guid.get(&node.guid) else {
                continue;
            };
            if node.kind == remote_kind(&self.forest.nodes[idx].update) {
                self.local_for_remote.insert(idx, id);
                self.remote_for_local.insert(id, idx);
            } else {
                let old = node.guid;
                self.tree.replace_guid(id, Guid::random())?;
                debug!(%old, node = %id, "guid collision across kinds, local node reassigned");
            }
        }
        Ok(())
    }

    /// Reconciles one local folder against its remote child list, then
    /// walks down matched and created subtrees.
    fn merge_subtree(&mut self, local_root: NodeId, top: Vec<usize>) -> EngineResult<()> {
        let mut stack = vec![(local_root, top)];
        while let Some((parent, remote_children)) = stack.pop() {
            for (target_index, &remote_idx) in remote_children.iter().enumerate() {
                let update = &self.forest.nodes[remote_idx].update;
                let Some(specifics) = update.specifics.as_ref() else {
                    continue;
                };
                let local = match self.local_for_remote.get(&remote_idx).copied() {
                    Some(existing) => {
                        self.adopt(existing, parent, target_index, update, specifics, false)?;
                        existing
                    }
                    None => match self.semantic_match(parent, update, specifics) {
                        Some(existing) => {
                            self.adopt(existing, parent, target_index, update, specifics, true)?;
                            existing
                        }
                        None => self.create(parent, target_index, update, specifics)?,
                    },
                };
                stack.push((local, self.forest.nodes[remote_idx].children.clone()));
            }
            self.schedule_leftovers(parent)?;
        }
        Ok(())
    }

    /// The first untracked, unmatched local child of `parent` describing
    /// the same entity as `specifics`.
    fn semantic_match(
        &self,
        parent: NodeId,
        update: &EntityData,
        specifics: &NoteSpecifics,
    ) -> Option<NodeId> {
        self.tree
            .children(parent)
            .iter()
            .copied()
            .find(|&child| {
                if self.tracker.entity_for_node(child).is_some() {
                    return false;
                }
                if self.remote_for_local.contains_key(&child) {
                    return false;
                }
                self.tree
                    .node(child)
                    .is_some_and(|node| semantics_match(node, specifics, update.folder))
            })
    }

    /// Moves an existing local node into place and overwrites it with the
    /// remote payload. Semantic matches also take over the remote GUID so
    /// both sides agree on identity going forward.
    fn adopt(
        &mut self,
        existing: NodeId,
        parent: NodeId,
        target_index: usize,
        update: &EntityData,
        specifics: &NoteSpecifics,
        is_semantic: bool,
    ) -> EngineResult<()> {
        let node = self
            .tree
            .node(existing)
            .ok_or(ModelError::NodeNotFound { id: existing })?;
        let in_place = node.parent == Some(parent)
            && self.tree.index_of(parent, existing) == Some(target_index);
        if !in_place {
            self.tree.move_node(existing, parent, target_index)?;
        }
        apply_specifics_to_node(self.tree, existing, specifics)?;
        if is_semantic {
            if let Some(remote_guid) = declared_guid(update) {
                let current = self.tree.node(existing).map(|n| n.guid);
                if current != Some(remote_guid) && self.tree.node_by_guid(&remote_guid).is_none() {
                    self.tree.replace_guid(existing, remote_guid)?;
                }
            }
        }
        self.track_remote(existing, update, specifics)?;
        self.stats.matched += 1;
        Ok(())
    }

    /// Materializes a remote entity with no local counterpart.
    fn create(
        &mut self,
        parent: NodeId,
        target_index: usize,
        update: &EntityData,
        specifics: &NoteSpecifics,
    ) -> EngineResult<NodeId> {
        let mut guid = declared_guid(update).unwrap_or_else(Guid::random);
        if self.tree.node_by_guid(&guid).is_some() {
            // Duplicate GUID kept alive across kinds; only one node per
            // GUID locally.
            guid = Guid::random();
        }
        let node = create_node_from_specifics(
            self.tree,
            parent,
            target_index,
            guid,
            update.folder,
            specifics,
        )?;
        self.track_remote(node, update, specifics)?;
        self.stats.created += 1;
        Ok(node)
    }

    fn track_remote(
        &mut self,
        node: NodeId,
        update: &EntityData,
        specifics: &NoteSpecifics,
    ) -> EngineResult<()> {
        let guid = self
            .tree
            .node(node)
            .ok_or(ModelError::NodeNotFound { id: node })?
            .guid;
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
            update.unique_position.clone(),
            specifics.hash()?,
        );
        if specifics.needs_title_reupload() {
            // Re-encode with the lossless title field on the next commit.
            self.tracker.increment_sequence_number(&hash);
        }
        Ok(())
    }

    /// Schedules every remaining untracked child subtree of `parent` for
    /// its first commit, parents before children. Nodes GUID-matched to a
    /// remote entity elsewhere are skipped; their remote side moves them.
    fn schedule_leftovers(&mut self, parent: NodeId) -> EngineResult<()> {
        let leftovers: Vec<NodeId> = self
            .tree
            .children(parent)
            .iter()
            .copied()
            .filter(|c| {
                self.tracker.entity_for_node(*c).is_none()
                    && !self.remote_for_local.contains_key(c)
            })
            .collect();
        for top in leftovers {
            let mut stack = vec![top];
            while let Some(id) = stack.pop() {
                if self.remote_for_local.contains_key(&id) {
                    continue;
                }
                self.schedule_for_commit(id)?;
                for &child in self.tree.children(id).iter().rev() {
                    stack.push(child);
                }
            }
        }
        Ok(())
    }

    fn schedule_for_commit(&mut self, id: NodeId) -> EngineResult<()> {
        let node = self.tree.node(id).ok_or(ModelError::NodeNotFound { id })?;
        let guid = node.guid;
        let creation_time_us = node.creation_time_us;
        let parent = node.parent.ok_or(ModelError::NodeNotFound { id })?;
        let parent_guid = self
            .tree
            .node(parent)
            .ok_or(ModelError::NodeNotFound { id: parent })?
            .guid;
        let specifics = NoteSpecifics::from_node(
            self.tree.node(id).ok_or(ModelError::NodeNotFound { id })?,
            parent_guid,
        );
        let position = position_for_node(self.tree, self.tracker, self.positions, parent, id);
        let hash = ClientTagHash::from_guid(&guid);
        self.tracker.add(
            hash.clone(),
            id,
            ServerId::temporary(&guid),
            UNCOMMITTED_VERSION,
            creation_time_us,
            Some(position),
            specifics.hash()?,
        );
        self.tracker.increment_sequence_number(&hash);
        self.stats.scheduled_for_commit += 1;
        Ok(())
    }
}

/// The remote batch arranged as a forest under the three permanent roots,
/// validated, deduplicated, and depth-capped.
struct RemoteForest {
    nodes: Vec<RemoteNode>,
    by_guid: HashMap<Guid, usize>,
    root_children: HashMap<PermanentRoot, Vec<usize>>,
    root_updates: HashMap<PermanentRoot, EntityData>,
    discarded: usize,
}

struct RemoteNode {
    update: EntityData,
    children: Vec<usize>,
}

impl RemoteForest {
    fn build(entities: &[EntityData], max_depth: usize) -> EngineResult<Self> {
        let mut root_updates: HashMap<PermanentRoot, EntityData> = HashMap::new();
        let mut nodes: Vec<RemoteNode> = Vec::new();
        let mut discarded = 0usize;

        for update in entities {
            if let Some(tag) = &update.server_defined_unique_tag {
                match PermanentRoot::from_tag(tag) {
                    Some(root) => {
                        root_updates.insert(root, update.clone());
                    }
                    None => {
                        warn!(server_id = %update.id, tag, "unknown server-defined tag");
                        discarded += 1;
                    }
                }
                continue;
            }
            if update.deleted {
                // Tombstones in a full initial batch refer to nothing local.
                continue;
            }
            match validate_remote_update(update) {
                Ok(()) => nodes.push(RemoteNode {
                    update: update.clone(),
                    children: Vec::new(),
                }),
                Err(reason) => {
                    warn!(server_id = %update.id, reason, "invalid initial update discarded");
                    discarded += 1;
                }
            }
        }

        for root in PERMANENT_ROOTS {
            if !root_updates.contains_key(&root) {
                return Err(EngineError::MissingPermanentRoots);
            }
        }

        let mut by_parent: HashMap<ServerId, Vec<usize>> = HashMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            match &node.update.parent_id {
                Some(parent) => by_parent.entry(parent.clone()).or_default().push(idx),
                None => {
                    warn!(server_id = %node.update.id, "non-root update without parent");
                }
            }
        }
        let ids: Vec<ServerId> = nodes.iter().map(|n| n.update.id.clone()).collect();
        for (idx, id) in ids.iter().enumerate() {
            if let Some(children) = by_parent.remove(id) {
                nodes[idx].children = children;
            }
        }

        let mut root_children: HashMap<PermanentRoot, Vec<usize>> = HashMap::new();
        let mut by_guid: HashMap<Guid, usize> = HashMap::new();
        let mut visited = vec![false; nodes.len()];
        let mut stack: Vec<(usize, usize)> = Vec::new();
        for root in PERMANENT_ROOTS {
            let list = root_updates
                .get(&root)
                .and_then(|u| by_parent.remove(&u.id))
                .unwrap_or_default();
            let list = normalize_siblings(&mut nodes, list);
            for &idx in &list {
                stack.push((idx, 1));
            }
            root_children.insert(root, list);
        }
        while let Some((idx, depth)) = stack.pop() {
            if visited[idx] {
                // Cycle or duplicate reference; first attachment wins.
                continue;
            }
            visited[idx] = true;
            if let Some(guid) = declared_guid(&nodes[idx].update) {
                by_guid.entry(guid).or_insert(idx);
            }
            if depth >= max_depth {
                if !nodes[idx].children.is_empty() {
                    warn!(server_id = %nodes[idx].update.id, depth, "forest depth cap hit, descendants dropped");
                    nodes[idx].children.clear();
                }
                continue;
            }
            let children = std::mem::take(&mut nodes[idx].children);
            let children = normalize_siblings(&mut nodes, children);
            for &child in &children {
                stack.push((child, depth + 1));
            }
            nodes[idx].children = children;
        }

        discarded += visited.iter().filter(|v| !**v).count();
        Ok(Self {
            nodes,
            by_guid,
            root_children,
            root_updates,
            discarded,
        })
    }
}

fn remote_kind(update: &EntityData) -> NodeKind {
    update
        .specifics
        .as_ref()
        .map_or(NodeKind::Folder, |s| s.kind(update.folder))
}

fn remote_creation_time(update: &EntityData) -> i64 {
    update.specifics.as_ref().map_or(0, |s| s.creation_time_us)
}

/// Collapses same-GUID same-kind siblings onto the newest one (its rival's
/// children are adopted by the survivor) and sorts the list by unique
/// position. Same GUID across kinds keeps both. Discarded duplicates stay
/// unvisited and are counted by the caller's final sweep.
fn normalize_siblings(nodes: &mut [RemoteNode], children: Vec<usize>) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::with_capacity(children.len());
    let mut slot_for_guid: HashMap<Guid, usize> = HashMap::new();
    for idx in children {
        let Some(guid) = declared_guid(&nodes[idx].update) else {
            kept.push(idx);
            continue;
        };
        match slot_for_guid.get(&guid).copied() {
            None => {
                slot_for_guid.insert(guid, kept.len());
                kept.push(idx);
            }
            Some(slot) => {
                let existing = kept[slot];
                if remote_kind(&nodes[existing].update) != remote_kind(&nodes[idx].update) {
                    kept.push(idx);
                    continue;
                }
                let (winner, loser) =
                    if remote_creation_time(&nodes[idx].update)
                        > remote_creation_time(&nodes[existing].update)
                    {
                        (idx, existing)
                    } else {
                        (existing, idx)
                    };
                let orphaned = std::mem::take(&mut nodes[loser].children);
                nodes[winner].children.extend(orphaned);
                kept[slot] = winner;
                warn!(%guid, "duplicate sibling guid, older update discarded");
            }
        }
    }
    kept.sort_by(|a, b| {
        nodes[*a]
            .update
            .unique_position
            .cmp(&nodes[*b].update.unique_position)
    });
    kept
}
