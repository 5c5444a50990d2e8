//! Update preprocessing: validation and wire ↔ node conversion.
//!
//! Shared by the initial merger and the incremental updates handler. A
//! failed validation discards the single update; it never escalates.

use notesync_model::{Attachment, Guid, ModelError, ModelResult, Node, NodeId, NodeKind, NoteTree};
use notesync_protocol::{EntityData, NoteSpecifics};

/// The GUID an update declares for its entity: from the specifics when
/// present, else inferred from the originator item id (older clients used
/// the GUID as their client item id).
pub(crate) fn declared_guid(update: &EntityData) -> Option<Guid> {
    if let Some(guid) = update.specifics_guid() {
        return Some(*guid);
    }
    update
        .originator_client_item_id
        .as_deref()
        .and_then(Guid::parse)
}

/// Validates one remote update. Returns the reason it must be discarded,
/// if any.
pub(crate) fn validate_remote_update(update: &EntityData) -> Result<(), String> {
    if update.is_permanent_root() {
        return Ok(());
    }
    if update.deleted {
        // Tombstones carry no payload to validate.
        return Ok(());
    }
    let Some(specifics) = &update.specifics else {
        return Err("missing specifics".into());
    };
    specifics.validate(update.folder).map_err(|e| e.to_string())?;
    match &update.unique_position {
        Some(position) if position.is_valid() => {}
        Some(_) => return Err("invalid unique position".into()),
        None => return Err("missing unique position".into()),
    }
    if let (Some(guid), Some(item_id)) = (specifics.guid, &update.originator_client_item_id) {
        if let Some(originator_guid) = Guid::parse(item_id) {
            if originator_guid != guid {
                return Err(format!(
                    "originator item id {item_id} inconsistent with declared guid {guid}"
                ));
            }
        }
    }
    Ok(())
}

/// Creates a local node from remote specifics, under `parent` at `index`.
pub(crate) fn create_node_from_specifics(
    tree: &mut NoteTree,
    parent: NodeId,
    index: usize,
    guid: Guid,
    is_folder: bool,
    specifics: &NoteSpecifics,
) -> ModelResult<NodeId> {
    let title = specifics.effective_title().to_string();
    let node = match specifics.kind(is_folder) {
        NodeKind::Folder => {
            tree.add_folder(parent, index, title, guid, specifics.creation_time_us)?
        }
        NodeKind::Note => tree.add_note(
            parent,
            index,
            title,
            specifics.url.clone(),
            specifics.content.clone(),
            guid,
            specifics.creation_time_us,
        )?,
        NodeKind::Separator => {
            tree.add_separator(parent, index, title, guid, specifics.creation_time_us)?
        }
    };
    if !specifics.attachments.is_empty() {
        tree.swap_attachments(
            node,
            specifics
                .attachments
                .iter()
                .map(|a| Attachment::new(a.checksum.clone()))
                .collect(),
        )?;
    }
    Ok(node)
}

/// Applies remote specifics onto an existing node, field by field.
/// Only touches fields that actually differ.
pub(crate) fn apply_specifics_to_node(
    tree: &mut NoteTree,
    node: NodeId,
    specifics: &NoteSpecifics,
) -> ModelResult<()> {
    let Some(current) = tree.node(node) else {
        return Ok(());
    };
    let kind = current.kind;

    if current.title != specifics.effective_title() {
        let title = specifics.effective_title().to_string();
        tree.set_title(node, title)?;
    }
    if kind == NodeKind::Note {
        let current = tree.node(node).ok_or(ModelError::NodeNotFound { id: node })?;
        if current.url != specifics.url {
            tree.set_url(node, specifics.url.clone())?;
        }
        let current = tree.node(node).ok_or(ModelError::NodeNotFound { id: node })?;
        if current.content != specifics.content {
            tree.set_content(node, specifics.content.clone())?;
        }
        let wanted: Vec<Attachment> = specifics
            .attachments
            .iter()
            .map(|a| Attachment::new(a.checksum.clone()))
            .collect();
        let current = tree.node(node).ok_or(ModelError::NodeNotFound { id: node })?;
        if current.attachments != wanted {
            tree.swap_attachments(node, wanted)?;
        }
    }
    Ok(())
}

/// Builds the wire specifics for a live node, with the parent GUID taken
/// from the tree.
pub(crate) fn specifics_for_node(
    tree: &NoteTree,
    node: NodeId,
) -> ModelResult<NoteSpecifics> {
    let node_ref = tree
        .node(node)
        .ok_or(ModelError::NodeNotFound { id: node })?;
    let parent = node_ref
        .parent
        .ok_or(ModelError::NodeNotFound { id: node })?;
    let parent_guid = tree
        .node(parent)
        .ok_or(ModelError::NodeNotFound { id: parent })?
        .guid;
    Ok(NoteSpecifics::from_node(node_ref, parent_guid))
}

/// Returns true if a local node and a remote payload describe the same
/// entity semantically: equal kind and equal content.
///
/// Titles decide for folders and separators; notes additionally compare
/// content and URL. When several untracked siblings qualify, the caller
/// takes the first in child order.
pub(crate) fn semantics_match(node: &Node, specifics: &NoteSpecifics, is_folder: bool) -> bool {
    if node.kind != specifics.kind(is_folder) {
        return false;
    }
    if node.title != specifics.effective_title() {
        return false;
    }
    if node.kind == NodeKind::Note {
        return node.url == specifics.url && node.content == specifics.content;
    }
    true
}
