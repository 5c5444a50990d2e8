//! Note specifics: the content payload of a remote entity.

use crate::error::{ProtocolError, ProtocolResult};
use notesync_model::{Guid, Node, NodeKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum byte length of the legacy `title` field.
///
/// Older clients stored the title only in this truncated field; current
/// clients write both `title` (truncated) and `full_title`.
pub const LEGACY_TITLE_LIMIT: usize = 255;

/// Distinguishes ordinary entities from separators on the wire.
///
/// Folderness is not part of the specifics; it rides on the entity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpecialType {
    /// A regular folder or note.
    #[default]
    Normal,
    /// A separator.
    Separator,
}

/// A checksum-identified attachment reference on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSpecifics {
    /// Content checksum of the attachment blob.
    pub checksum: String,
}

/// Opaque content fingerprint of a specifics payload.
///
/// Used to detect true no-op updates: if the hash and the parent both match
/// the synced state, the update carries no content change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecificsHash([u8; 32]);

impl SpecificsHash {
    /// Wraps raw digest bytes, e.g. read back from persisted metadata.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SpecificsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "…")
    }
}

/// The content payload of one remote entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSpecifics {
    /// Permanent identity. Absent in updates written by legacy clients.
    pub guid: Option<Guid>,
    /// GUID of the parent at the time the update was written.
    pub parent_guid: Option<Guid>,
    /// Legacy, truncated title. Always populated.
    pub title: String,
    /// Untruncated title. Absent in legacy updates.
    pub full_title: Option<String>,
    /// URL. Notes only.
    pub url: Option<String>,
    /// Content body. Notes only.
    pub content: Option<String>,
    /// Attachment references. Notes only.
    pub attachments: Vec<AttachmentSpecifics>,
    /// Creation timestamp in microseconds since the Unix epoch.
    pub creation_time_us: i64,
    /// Separator marker.
    pub special_type: SpecialType,
}

impl NoteSpecifics {
    /// Builds the wire payload for a local node (ToWire).
    #[must_use]
    pub fn from_node(node: &Node, parent_guid: Guid) -> Self {
        let (url, content, attachments) = match node.kind {
            NodeKind::Note => (
                node.url.clone(),
                node.content.clone(),
                node.attachments
                    .iter()
                    .map(|a| AttachmentSpecifics {
                        checksum: a.checksum.clone(),
                    })
                    .collect(),
            ),
            NodeKind::Folder | NodeKind::Separator => (None, None, Vec::new()),
        };
        Self {
            guid: Some(node.guid),
            parent_guid: Some(parent_guid),
            title: truncate_title(&node.title),
            full_title: Some(node.title.clone()),
            url,
            content,
            attachments,
            creation_time_us: node.creation_time_us,
            special_type: match node.kind {
                NodeKind::Separator => SpecialType::Separator,
                NodeKind::Folder | NodeKind::Note => SpecialType::Normal,
            },
        }
    }

    /// The title to apply locally, preferring the untruncated field.
    #[must_use]
    pub fn effective_title(&self) -> &str {
        self.full_title.as_deref().unwrap_or(&self.title)
    }

    /// Returns true if this payload shows the legacy title encoding and the
    /// entity should be recommitted once under the current encoding.
    #[must_use]
    pub fn needs_title_reupload(&self) -> bool {
        self.full_title.is_none() && !self.title.is_empty()
    }

    /// The node kind this payload describes, given the entity-level folder
    /// flag.
    #[must_use]
    pub fn kind(&self, is_folder: bool) -> NodeKind {
        if is_folder {
            NodeKind::Folder
        } else if self.special_type == SpecialType::Separator {
            NodeKind::Separator
        } else {
            NodeKind::Note
        }
    }

    /// Validates the payload against structural rules.
    ///
    /// Folders and separators must not carry note-only attributes, and the
    /// truncated title must be a prefix of the full title when both are
    /// present.
    pub fn validate(&self, is_folder: bool) -> ProtocolResult<()> {
        let kind = self.kind(is_folder);
        if kind != NodeKind::Note {
            if self.url.is_some() {
                return Err(ProtocolError::invalid_specifics(format!(
                    "{kind:?} carries a url"
                )));
            }
            if self.content.is_some() {
                return Err(ProtocolError::invalid_specifics(format!(
                    "{kind:?} carries content"
                )));
            }
            if !self.attachments.is_empty() {
                return Err(ProtocolError::invalid_specifics(format!(
                    "{kind:?} carries attachments"
                )));
            }
        }
        if is_folder && self.special_type == SpecialType::Separator {
            return Err(ProtocolError::invalid_specifics(
                "folder marked as separator",
            ));
        }
        if let Some(full) = &self.full_title {
            if !full.starts_with(&self.title) {
                return Err(ProtocolError::invalid_specifics(
                    "legacy title is not a prefix of full_title",
                ));
            }
        }
        if self.creation_time_us < 0 {
            return Err(ProtocolError::invalid_specifics(
                "negative creation timestamp",
            ));
        }
        Ok(())
    }

    /// Computes the content fingerprint over the canonical CBOR encoding.
    pub fn hash(&self) -> ProtocolResult<SpecificsHash> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        let digest = Sha256::digest(&bytes);
        Ok(SpecificsHash(digest.into()))
    }
}

/// Truncates a title to the legacy limit on a character boundary.
#[must_use]
pub(crate) fn truncate_title(title: &str) -> String {
    if title.len() <= LEGACY_TITLE_LIMIT {
        return title.to_string();
    }
    let mut end = LEGACY_TITLE_LIMIT;
    while !title.is_char_boundary(end) {
        end -= 1;
    }
    title[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_model::{Attachment, NodeId};

    fn note_node(title: &str) -> Node {
        Node {
            id: NodeId::new(1),
            guid: Guid::random(),
            kind: NodeKind::Note,
            title: title.into(),
            url: Some("http://example.com".into()),
            content: Some("body".into()),
            attachments: vec![Attachment::new("sum1")],
            creation_time_us: 42,
            parent: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn from_node_carries_note_fields() {
        let node = note_node("hello");
        let parent = Guid::random();
        let specifics = NoteSpecifics::from_node(&node, parent);

        assert_eq!(specifics.guid, Some(node.guid));
        assert_eq!(specifics.parent_guid, Some(parent));
        assert_eq!(specifics.title, "hello");
        assert_eq!(specifics.full_title.as_deref(), Some("hello"));
        assert_eq!(specifics.url.as_deref(), Some("http://example.com"));
        assert_eq!(specifics.content.as_deref(), Some("body"));
        assert_eq!(specifics.attachments.len(), 1);
        assert_eq!(specifics.special_type, SpecialType::Normal);
    }

    #[test]
    fn from_node_strips_note_fields_for_folders() {
        let mut node = note_node("f");
        node.kind = NodeKind::Folder;
        let specifics = NoteSpecifics::from_node(&node, Guid::random());
        assert!(specifics.url.is_none());
        assert!(specifics.content.is_none());
        assert!(specifics.attachments.is_empty());
        specifics.validate(true).unwrap();
    }

    #[test]
    fn long_titles_are_truncated_in_legacy_field() {
        let long = "x".repeat(LEGACY_TITLE_LIMIT + 10);
        let mut node = note_node(&long);
        node.url = None;
        node.content = None;
        let specifics = NoteSpecifics::from_node(&node, Guid::random());

        assert_eq!(specifics.title.len(), LEGACY_TITLE_LIMIT);
        assert_eq!(specifics.effective_title(), long);
        specifics.validate(false).unwrap();
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Multibyte char straddling the limit must not be split.
        let title = format!("{}é", "a".repeat(LEGACY_TITLE_LIMIT - 1));
        let truncated = truncate_title(&title);
        assert!(truncated.len() <= LEGACY_TITLE_LIMIT);
        assert!(title.starts_with(&truncated));
    }

    #[test]
    fn legacy_updates_need_reupload() {
        let mut specifics = NoteSpecifics::from_node(&note_node("t"), Guid::random());
        assert!(!specifics.needs_title_reupload());
        specifics.full_title = None;
        assert!(specifics.needs_title_reupload());
        assert_eq!(specifics.effective_title(), "t");
    }

    #[test]
    fn validation_rejects_separator_with_content() {
        let mut specifics = NoteSpecifics::from_node(&note_node("s"), Guid::random());
        specifics.special_type = SpecialType::Separator;
        assert!(specifics.validate(false).is_err());
    }

    #[test]
    fn validation_rejects_folder_separator() {
        let mut node = note_node("f");
        node.kind = NodeKind::Folder;
        let mut specifics = NoteSpecifics::from_node(&node, Guid::random());
        specifics.special_type = SpecialType::Separator;
        assert!(specifics.validate(true).is_err());
    }

    #[test]
    fn validation_rejects_mismatched_titles() {
        let mut specifics = NoteSpecifics::from_node(&note_node("abc"), Guid::random());
        specifics.title = "zzz".into();
        assert!(specifics.validate(false).is_err());
    }

    #[test]
    fn hash_tracks_content() {
        let a = NoteSpecifics::from_node(&note_node("a"), Guid::random());
        let mut b = a.clone();
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());

        b.content = Some("different".into());
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn kind_resolution() {
        let mut specifics = NoteSpecifics::from_node(&note_node("k"), Guid::random());
        assert_eq!(specifics.kind(false), NodeKind::Note);
        assert_eq!(specifics.kind(true), NodeKind::Folder);
        specifics.special_type = SpecialType::Separator;
        assert_eq!(specifics.kind(false), NodeKind::Separator);
    }
}
