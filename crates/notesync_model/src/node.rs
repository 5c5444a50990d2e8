//! Node types for the notes tree.

use crate::guid::Guid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle for a node within one tree instance.
///
/// Node IDs are assigned by the tree and never reused within a tree's
/// lifetime. They are not persisted and carry no meaning across restarts;
/// cross-session identity is the [`Guid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Creates a node ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// The kind of a node. Kinds are mutually exclusive and immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A folder: holds ordered children, has a title.
    Folder,
    /// A note: title, optional URL, optional content, attachments.
    Note,
    /// A separator: an ordering-only marker with an optional title.
    Separator,
}

/// A checksum-identified attachment blob reference. Notes only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Content checksum identifying the blob.
    pub checksum: String,
}

impl Attachment {
    /// Creates an attachment reference from its checksum.
    pub fn new(checksum: impl Into<String>) -> Self {
        Self {
            checksum: checksum.into(),
        }
    }
}

/// A single node in the notes tree.
///
/// Nodes are owned by the [`NoteTree`](crate::NoteTree); parent and child
/// links are `NodeId` handles, never owning references.
#[derive(Debug, Clone)]
pub struct Node {
    /// Tree-local handle.
    pub id: NodeId,
    /// Permanent identity.
    pub guid: Guid,
    /// Node kind.
    pub kind: NodeKind,
    /// Title. Meaningful for all kinds; separators commonly leave it empty.
    pub title: String,
    /// URL. Notes only.
    pub url: Option<String>,
    /// Content body. Notes only.
    pub content: Option<String>,
    /// Attachment references. Notes only.
    pub attachments: Vec<Attachment>,
    /// Creation timestamp in microseconds since the Unix epoch.
    pub creation_time_us: i64,
    /// Parent handle. `None` only for the permanent roots.
    pub parent: Option<NodeId>,
    /// Ordered child handles.
    pub children: Vec<NodeId>,
}

impl Node {
    /// Returns true if this node is a folder.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Returns true if this node is a note.
    #[must_use]
    pub fn is_note(&self) -> bool {
        self.kind == NodeKind::Note
    }

    /// Returns true if this node is a separator.
    #[must_use]
    pub fn is_separator(&self) -> bool {
        self.kind == NodeKind::Separator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId::new(3)), "node:3");
    }

    #[test]
    fn kind_predicates() {
        let node = Node {
            id: NodeId::new(1),
            guid: Guid::random(),
            kind: NodeKind::Note,
            title: "t".into(),
            url: None,
            content: None,
            attachments: Vec::new(),
            creation_time_us: 0,
            parent: None,
            children: Vec::new(),
        };
        assert!(node.is_note());
        assert!(!node.is_folder());
        assert!(!node.is_separator());
    }
}
