//! The notes tree: arena storage, permanent roots, mutation primitives.

use crate::error::{ModelError, ModelResult};
use crate::guid::Guid;
use crate::node::{Attachment, Node, NodeId, NodeKind};
use std::collections::HashMap;
use uuid::Uuid;

/// The three well-known permanent roots.
///
/// Permanent roots always exist, have no parent, cannot be mutated, and are
/// identified across clients by a fixed tag rather than a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermanentRoot {
    /// The primary notes root.
    Main,
    /// Notes created outside the primary surface.
    Other,
    /// Deleted notes awaiting purge.
    Trash,
}

/// All permanent roots, in canonical order.
pub const PERMANENT_ROOTS: [PermanentRoot; 3] = [
    PermanentRoot::Main,
    PermanentRoot::Other,
    PermanentRoot::Trash,
];

impl PermanentRoot {
    /// Returns the server-side tag identifying this root.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            PermanentRoot::Main => "main",
            PermanentRoot::Other => "other",
            PermanentRoot::Trash => "trash",
        }
    }

    /// Resolves a server tag to a permanent root.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "main" => Some(PermanentRoot::Main),
            "other" => Some(PermanentRoot::Other),
            "trash" => Some(PermanentRoot::Trash),
            _ => None,
        }
    }

    /// Returns the fixed, well-known GUID of this root.
    ///
    /// Shared by every client, so roots never need identity reconciliation.
    #[must_use]
    pub fn guid(self) -> Guid {
        let raw = match self {
            PermanentRoot::Main => 0x8e08_7f1a_ce21_4dd1_b9d8_0d1c_7e26_a5b1_u128,
            PermanentRoot::Other => 0x3b75_9b4c_92f0_4f60_84f1_2a6c_53d8_b07e_u128,
            PermanentRoot::Trash => 0xd72f_6a0e_10c4_41a7_9a39_f5b0_8c31_24de_u128,
        };
        Guid::from_uuid(Uuid::from_u128(raw))
    }
}

/// The local notes tree.
///
/// Owns every node; all relationships are expressed as [`NodeId`] handles.
/// The GUID index makes node destruction a single authoritative event:
/// removing a node drops it from the arena and the index in one step, so no
/// dangling identity can survive.
#[derive(Debug, Clone)]
pub struct NoteTree {
    nodes: HashMap<NodeId, Node>,
    by_guid: HashMap<Guid, NodeId>,
    roots: [NodeId; 3],
    next_id: u64,
}

impl NoteTree {
    /// Creates a tree containing only the three permanent roots.
    #[must_use]
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            by_guid: HashMap::new(),
            roots: [NodeId::new(0); 3],
            next_id: 0,
        };
        for (slot, root) in PERMANENT_ROOTS.iter().enumerate() {
            let id = tree.alloc_id();
            tree.nodes.insert(
                id,
                Node {
                    id,
                    guid: root.guid(),
                    kind: NodeKind::Folder,
                    title: root.tag().to_string(),
                    url: None,
                    content: None,
                    attachments: Vec::new(),
                    creation_time_us: 0,
                    parent: None,
                    children: Vec::new(),
                },
            );
            tree.by_guid.insert(root.guid(), id);
            tree.roots[slot] = id;
        }
        tree
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Returns the handle of a permanent root.
    #[must_use]
    pub fn root(&self, root: PermanentRoot) -> NodeId {
        let slot = PERMANENT_ROOTS
            .iter()
            .position(|r| *r == root)
            .unwrap_or(0);
        self.roots[slot]
    }

    /// Returns all three permanent root handles, in canonical order.
    #[must_use]
    pub fn permanent_roots(&self) -> [NodeId; 3] {
        self.roots
    }

    /// Returns true if the handle refers to a permanent root.
    #[must_use]
    pub fn is_permanent_root(&self, id: NodeId) -> bool {
        self.roots.contains(&id)
    }

    /// Looks up a node by handle.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Looks up a node by GUID.
    #[must_use]
    pub fn node_by_guid(&self, guid: &Guid) -> Option<&Node> {
        self.by_guid.get(guid).and_then(|id| self.nodes.get(id))
    }

    /// Returns the ordered children of a node, or an empty slice if the
    /// handle is stale.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the index of `child` among the children of `parent`.
    #[must_use]
    pub fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|c| *c == child)
    }

    /// Returns the total number of nodes, permanent roots included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the subtree rooted at `id` in preorder, `id` first.
    #[must_use]
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                out.push(current);
                // Reverse so preorder visits children left to right.
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn require(&self, id: NodeId) -> ModelResult<&Node> {
        self.nodes.get(&id).ok_or(ModelError::NodeNotFound { id })
    }

    fn check_insert(&self, parent: NodeId, index: usize, guid: &Guid) -> ModelResult<()> {
        let parent_node = self.require(parent)?;
        if parent_node.kind != NodeKind::Folder {
            return Err(ModelError::NotAFolder { id: parent });
        }
        let len = parent_node.children.len();
        if index > len {
            return Err(ModelError::IndexOutOfRange { index, len });
        }
        if self.by_guid.contains_key(guid) {
            return Err(ModelError::GuidInUse {
                guid: guid.to_string(),
            });
        }
        Ok(())
    }

    fn insert_node(
        &mut self,
        parent: NodeId,
        index: usize,
        guid: Guid,
        kind: NodeKind,
        title: String,
        url: Option<String>,
        content: Option<String>,
        creation_time_us: i64,
    ) -> ModelResult<NodeId> {
        self.check_insert(parent, index, &guid)?;
        let id = self.alloc_id();
        self.nodes.insert(
            id,
            Node {
                id,
                guid,
                kind,
                title,
                url,
                content,
                attachments: Vec::new(),
                creation_time_us,
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        self.by_guid.insert(guid, id);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.insert(index, id);
        }
        Ok(id)
    }

    /// Adds a folder under `parent` at `index`.
    pub fn add_folder(
        &mut self,
        parent: NodeId,
        index: usize,
        title: impl Into<String>,
        guid: Guid,
        creation_time_us: i64,
    ) -> ModelResult<NodeId> {
        self.insert_node(
            parent,
            index,
            guid,
            NodeKind::Folder,
            title.into(),
            None,
            None,
            creation_time_us,
        )
    }

    /// Adds a note under `parent` at `index`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_note(
        &mut self,
        parent: NodeId,
        index: usize,
        title: impl Into<String>,
        url: Option<String>,
        content: Option<String>,
        guid: Guid,
        creation_time_us: i64,
    ) -> ModelResult<NodeId> {
        self.insert_node(
            parent,
            index,
            guid,
            NodeKind::Note,
            title.into(),
            url,
            content,
            creation_time_us,
        )
    }

    /// Adds a separator under `parent` at `index`.
    pub fn add_separator(
        &mut self,
        parent: NodeId,
        index: usize,
        title: impl Into<String>,
        guid: Guid,
        creation_time_us: i64,
    ) -> ModelResult<NodeId> {
        self.insert_node(
            parent,
            index,
            guid,
            NodeKind::Separator,
            title.into(),
            None,
            None,
            creation_time_us,
        )
    }

    /// Moves a node to `new_parent` at `index`.
    ///
    /// `index` is interpreted against the child list with the node already
    /// detached, so moving within the same parent behaves like remove-then-
    /// insert.
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId, index: usize) -> ModelResult<()> {
        if self.is_permanent_root(id) {
            return Err(ModelError::PermanentRootMutation { id });
        }
        self.require(id)?;
        let parent_node = self.require(new_parent)?;
        if parent_node.kind != NodeKind::Folder {
            return Err(ModelError::NotAFolder { id: new_parent });
        }
        if self.subtree(id).contains(&new_parent) {
            return Err(ModelError::CycleDetected {
                id,
                target: new_parent,
            });
        }

        let old_parent = self.nodes.get(&id).and_then(|n| n.parent);
        if let Some(old_parent) = old_parent {
            if let Some(node) = self.nodes.get_mut(&old_parent) {
                node.children.retain(|c| *c != id);
            }
        }

        let len = self.children(new_parent).len();
        if index > len {
            // Reattach at the end rather than leaving the node orphaned.
            if let Some(node) = self.nodes.get_mut(&new_parent) {
                node.children.push(id);
            }
            if let Some(node) = self.nodes.get_mut(&id) {
                node.parent = Some(new_parent);
            }
            return Err(ModelError::IndexOutOfRange { index, len });
        }
        if let Some(node) = self.nodes.get_mut(&new_parent) {
            node.children.insert(index, id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(new_parent);
        }
        Ok(())
    }

    /// Removes a node and its whole subtree.
    ///
    /// Returns the removed handles in preorder, `id` first. Handles become
    /// permanently stale; callers holding indices onto them must drop those
    /// entries before the next model access.
    pub fn remove(&mut self, id: NodeId) -> ModelResult<Vec<NodeId>> {
        if self.is_permanent_root(id) {
            return Err(ModelError::PermanentRootMutation { id });
        }
        self.require(id)?;
        let removed = self.subtree(id);
        if let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != id);
            }
        }
        for victim in &removed {
            if let Some(node) = self.nodes.remove(victim) {
                self.by_guid.remove(&node.guid);
            }
        }
        Ok(removed)
    }

    /// Sets the title of a node.
    pub fn set_title(&mut self, id: NodeId, title: impl Into<String>) -> ModelResult<()> {
        if self.is_permanent_root(id) {
            return Err(ModelError::PermanentRootMutation { id });
        }
        let node = self.nodes.get_mut(&id).ok_or(ModelError::NodeNotFound { id })?;
        node.title = title.into();
        Ok(())
    }

    /// Sets the URL of a note.
    pub fn set_url(&mut self, id: NodeId, url: Option<String>) -> ModelResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(ModelError::NodeNotFound { id })?;
        if node.kind != NodeKind::Note {
            return Err(ModelError::NotANote { id });
        }
        node.url = url;
        Ok(())
    }

    /// Sets the content body of a note.
    pub fn set_content(&mut self, id: NodeId, content: Option<String>) -> ModelResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(ModelError::NodeNotFound { id })?;
        if node.kind != NodeKind::Note {
            return Err(ModelError::NotANote { id });
        }
        node.content = content;
        Ok(())
    }

    /// Appends an attachment reference to a note.
    pub fn add_attachment(&mut self, id: NodeId, attachment: Attachment) -> ModelResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(ModelError::NodeNotFound { id })?;
        if node.kind != NodeKind::Note {
            return Err(ModelError::NotANote { id });
        }
        node.attachments.push(attachment);
        Ok(())
    }

    /// Replaces the full attachment list of a note.
    pub fn swap_attachments(
        &mut self,
        id: NodeId,
        attachments: Vec<Attachment>,
    ) -> ModelResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(ModelError::NodeNotFound { id })?;
        if node.kind != NodeKind::Note {
            return Err(ModelError::NotANote { id });
        }
        node.attachments = attachments;
        Ok(())
    }

    /// Re-keys a node to a fresh GUID, returning the old one.
    ///
    /// The single sanctioned identity change: used to move a local node out
    /// of the way of an incompatible remote node that claims the same GUID.
    pub fn replace_guid(&mut self, id: NodeId, fresh: Guid) -> ModelResult<Guid> {
        if self.is_permanent_root(id) {
            return Err(ModelError::PermanentRootMutation { id });
        }
        if self.by_guid.contains_key(&fresh) {
            return Err(ModelError::GuidInUse {
                guid: fresh.to_string(),
            });
        }
        let node = self.nodes.get_mut(&id).ok_or(ModelError::NodeNotFound { id })?;
        let old = node.guid;
        node.guid = fresh;
        self.by_guid.remove(&old);
        self.by_guid.insert(fresh, id);
        Ok(old)
    }
}

impl Default for NoteTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> NoteTree {
        NoteTree::new()
    }

    #[test]
    fn new_tree_has_three_roots() {
        let tree = tree();
        assert_eq!(tree.node_count(), 3);
        for root in PERMANENT_ROOTS {
            let id = tree.root(root);
            assert!(tree.is_permanent_root(id));
            assert_eq!(tree.node(id).unwrap().guid, root.guid());
        }
    }

    #[test]
    fn root_tags_roundtrip() {
        for root in PERMANENT_ROOTS {
            assert_eq!(PermanentRoot::from_tag(root.tag()), Some(root));
        }
        assert_eq!(PermanentRoot::from_tag("bogus"), None);
    }

    #[test]
    fn add_and_lookup() {
        let mut tree = tree();
        let main = tree.root(PermanentRoot::Main);
        let guid = Guid::random();
        let id = tree
            .add_note(main, 0, "A", Some("http://a".into()), None, guid, 100)
            .unwrap();

        assert_eq!(tree.node_by_guid(&guid).unwrap().id, id);
        assert_eq!(tree.children(main), &[id]);
        assert_eq!(tree.index_of(main, id), Some(0));
    }

    #[test]
    fn guid_collision_rejected() {
        let mut tree = tree();
        let main = tree.root(PermanentRoot::Main);
        let guid = Guid::random();
        tree.add_folder(main, 0, "F", guid, 0).unwrap();
        let err = tree.add_folder(main, 1, "G", guid, 0).unwrap_err();
        assert!(matches!(err, ModelError::GuidInUse { .. }));
    }

    #[test]
    fn children_only_under_folders() {
        let mut tree = tree();
        let main = tree.root(PermanentRoot::Main);
        let note = tree
            .add_note(main, 0, "N", None, None, Guid::random(), 0)
            .unwrap();
        let err = tree
            .add_note(note, 0, "child", None, None, Guid::random(), 0)
            .unwrap_err();
        assert!(matches!(err, ModelError::NotAFolder { .. }));
    }

    #[test]
    fn move_within_parent_reorders() {
        let mut tree = tree();
        let main = tree.root(PermanentRoot::Main);
        let a = tree.add_note(main, 0, "a", None, None, Guid::random(), 0).unwrap();
        let b = tree.add_note(main, 1, "b", None, None, Guid::random(), 0).unwrap();
        let c = tree.add_note(main, 2, "c", None, None, Guid::random(), 0).unwrap();

        tree.move_node(c, main, 0).unwrap();
        assert_eq!(tree.children(main), &[c, a, b]);
    }

    #[test]
    fn move_rejects_cycles() {
        let mut tree = tree();
        let main = tree.root(PermanentRoot::Main);
        let outer = tree.add_folder(main, 0, "outer", Guid::random(), 0).unwrap();
        let inner = tree.add_folder(outer, 0, "inner", Guid::random(), 0).unwrap();

        let err = tree.move_node(outer, inner, 0).unwrap_err();
        assert!(matches!(err, ModelError::CycleDetected { .. }));
        // Structure unchanged.
        assert_eq!(tree.children(main), &[outer]);
        assert_eq!(tree.children(outer), &[inner]);
    }

    #[test]
    fn remove_returns_subtree_preorder() {
        let mut tree = tree();
        let main = tree.root(PermanentRoot::Main);
        let folder = tree.add_folder(main, 0, "f", Guid::random(), 0).unwrap();
        let n1 = tree.add_note(folder, 0, "n1", None, None, Guid::random(), 0).unwrap();
        let sub = tree.add_folder(folder, 1, "sub", Guid::random(), 0).unwrap();
        let n2 = tree.add_note(sub, 0, "n2", None, None, Guid::random(), 0).unwrap();

        let removed = tree.remove(folder).unwrap();
        assert_eq!(removed, vec![folder, n1, sub, n2]);
        assert_eq!(tree.node_count(), 3);
        assert!(tree.children(main).is_empty());
    }

    #[test]
    fn permanent_roots_are_immutable() {
        let mut tree = tree();
        let main = tree.root(PermanentRoot::Main);
        let other = tree.root(PermanentRoot::Other);
        assert!(tree.remove(main).is_err());
        assert!(tree.move_node(main, other, 0).is_err());
        assert!(tree.set_title(main, "x").is_err());
    }

    #[test]
    fn attachments_are_note_only() {
        let mut tree = tree();
        let main = tree.root(PermanentRoot::Main);
        let folder = tree.add_folder(main, 0, "f", Guid::random(), 0).unwrap();
        let note = tree
            .add_note(main, 1, "n", None, None, Guid::random(), 0)
            .unwrap();

        assert!(tree.add_attachment(folder, Attachment::new("abc")).is_err());
        tree.add_attachment(note, Attachment::new("abc")).unwrap();
        tree.swap_attachments(note, vec![Attachment::new("def"), Attachment::new("ghi")])
            .unwrap();
        assert_eq!(tree.node(note).unwrap().attachments.len(), 2);
    }

    #[test]
    fn replace_guid_rekeys_index() {
        let mut tree = tree();
        let main = tree.root(PermanentRoot::Main);
        let old = Guid::random();
        let id = tree.add_note(main, 0, "n", None, None, old, 0).unwrap();

        let fresh = Guid::random();
        let returned = tree.replace_guid(id, fresh).unwrap();
        assert_eq!(returned, old);
        assert!(tree.node_by_guid(&old).is_none());
        assert_eq!(tree.node_by_guid(&fresh).unwrap().id, id);
    }
}
