//! # NoteSync Model
//!
//! The local notes tree that the sync engine reconciles against.
//!
//! This crate provides:
//! - Permanent, GUID-keyed node identity
//! - The three well-known permanent roots (`main`, `other`, `trash`)
//! - Ordered folder/note/separator nodes with attachments
//! - The mutation primitives the engine consumes (`add_*`, `move_node`,
//!   `remove`, `set_*`)
//!
//! ## Key Invariants
//!
//! - A GUID is permanent: identity changes are modeled as
//!   delete-and-recreate, never in-place mutation (the single exception is
//!   [`NoteTree::replace_guid`], which re-keys an otherwise untouched node to
//!   escape an identity collision).
//! - Every node except the permanent roots has exactly one parent.
//! - Children are ordered; sibling order is owned by the tree, not by the
//!   nodes themselves.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod guid;
mod node;
mod tree;

pub use error::{ModelError, ModelResult};
pub use guid::Guid;
pub use node::{Attachment, Node, NodeId, NodeKind};
pub use tree::{NoteTree, PermanentRoot, PERMANENT_ROOTS};
