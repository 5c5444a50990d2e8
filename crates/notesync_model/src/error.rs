//! Error types for the notes tree model.

use crate::node::NodeId;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur when mutating the notes tree.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The referenced node does not exist in this tree.
    #[error("node not found: {id}")]
    NodeNotFound {
        /// The missing node.
        id: NodeId,
    },

    /// A node with this GUID already exists.
    #[error("guid already in use: {guid}")]
    GuidInUse {
        /// The colliding GUID, rendered as a string.
        guid: String,
    },

    /// Permanent roots cannot be moved, removed, or retitled.
    #[error("permanent root cannot be mutated: {id}")]
    PermanentRootMutation {
        /// The permanent root that was targeted.
        id: NodeId,
    },

    /// The target parent cannot hold children.
    #[error("node {id} is not a folder and cannot hold children")]
    NotAFolder {
        /// The would-be parent.
        id: NodeId,
    },

    /// Moving a node under its own descendant.
    #[error("moving {id} under {target} would create a cycle")]
    CycleDetected {
        /// The node being moved.
        id: NodeId,
        /// The target parent inside its subtree.
        target: NodeId,
    },

    /// Child index outside the valid insertion range.
    #[error("index {index} out of range for {len} children")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Current child count.
        len: usize,
    },

    /// Attribute applies only to notes (URL, content, attachments).
    #[error("node {id} is not a note")]
    NotANote {
        /// The targeted node.
        id: NodeId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ModelError::NodeNotFound { id: NodeId::new(7) };
        assert_eq!(err.to_string(), "node not found: node:7");

        let err = ModelError::IndexOutOfRange { index: 5, len: 2 };
        assert!(err.to_string().contains("5"));
        assert!(err.to_string().contains("2"));
    }
}
