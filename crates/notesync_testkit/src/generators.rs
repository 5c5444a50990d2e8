//! Property-based generators for protocol types.

use notesync_model::{Attachment, Guid, NodeKind, NoteTree, PermanentRoot};
use proptest::prelude::*;

/// Strategy over node kinds.
pub fn arb_node_kind() -> impl Strategy<Value = NodeKind> {
    prop_oneof![
        Just(NodeKind::Folder),
        Just(NodeKind::Note),
        Just(NodeKind::Separator),
    ]
}

/// Strategy over titles, including empty, unicode, and over-limit lengths.
pub fn arb_title() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-zA-Z0-9 ]{1,40}",
        // Multibyte content around the legacy truncation limit.
        proptest::collection::vec(prop_oneof![Just('é'), Just('☃'), Just('a')], 120..=300)
            .prop_map(|chars| chars.into_iter().collect()),
    ]
}

/// Strategy over optional URLs.
pub fn arb_url() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[a-z]{3,10}".prop_map(|host| format!("http://{host}.example.com")))
}

/// Strategy over attachment lists.
pub fn arb_attachments() -> impl Strategy<Value = Vec<Attachment>> {
    proptest::collection::vec("[0-9a-f]{8}".prop_map(Attachment::new), 0..4)
}

/// The inputs needed to place one node in a tree.
#[derive(Debug, Clone)]
pub struct ArbNode {
    /// Node kind.
    pub kind: NodeKind,
    /// Title.
    pub title: String,
    /// URL (notes only; dropped for other kinds).
    pub url: Option<String>,
    /// Content (notes only).
    pub content: Option<String>,
    /// Attachments (notes only).
    pub attachments: Vec<Attachment>,
    /// Creation timestamp.
    pub creation_time_us: i64,
}

/// Strategy over node inputs for every kind/content combination.
pub fn arb_node() -> impl Strategy<Value = ArbNode> {
    (
        arb_node_kind(),
        arb_title(),
        arb_url(),
        proptest::option::of(".{0,200}"),
        arb_attachments(),
        0i64..2_000_000_000_000_000,
    )
        .prop_map(
            |(kind, title, url, content, attachments, creation_time_us)| ArbNode {
                kind,
                title,
                url: (kind == NodeKind::Note).then_some(url).flatten(),
                content: (kind == NodeKind::Note).then_some(content).flatten(),
                attachments: if kind == NodeKind::Note {
                    attachments
                } else {
                    Vec::new()
                },
                creation_time_us,
            },
        )
}

/// Materializes an [`ArbNode`] under the main root of `tree`.
pub fn place_node(tree: &mut NoteTree, spec: &ArbNode) -> notesync_model::NodeId {
    let main = tree.root(PermanentRoot::Main);
    let index = tree.children(main).len();
    let guid = Guid::random();
    let id = match spec.kind {
        NodeKind::Folder => tree
            .add_folder(main, index, spec.title.clone(), guid, spec.creation_time_us)
            .unwrap(),
        NodeKind::Note => tree
            .add_note(
                main,
                index,
                spec.title.clone(),
                spec.url.clone(),
                spec.content.clone(),
                guid,
                spec.creation_time_us,
            )
            .unwrap(),
        NodeKind::Separator => tree
            .add_separator(main, index, spec.title.clone(), guid, spec.creation_time_us)
            .unwrap(),
    };
    for attachment in &spec.attachments {
        tree.add_attachment(id, attachment.clone()).unwrap();
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_protocol::NoteSpecifics;

    proptest! {
        /// ToWire then FromWire then ToWire is the identity on the wire
        /// form, for every kind/content combination.
        #[test]
        fn specifics_roundtrip(spec in arb_node()) {
            let mut tree = NoteTree::new();
            let id = place_node(&mut tree, &spec);
            let parent_guid = Guid::random();

            let node = tree.node(id).unwrap();
            let wire = NoteSpecifics::from_node(node, parent_guid);
            prop_assert!(wire.validate(spec.kind == NodeKind::Folder).is_ok());

            // FromWire: rebuild a node from the wire payload.
            let mut second_tree = NoteTree::new();
            let rebuilt = ArbNode {
                kind: spec.kind,
                title: wire.effective_title().to_string(),
                url: wire.url.clone(),
                content: wire.content.clone(),
                attachments: wire
                    .attachments
                    .iter()
                    .map(|a| Attachment::new(a.checksum.clone()))
                    .collect(),
                creation_time_us: wire.creation_time_us,
            };
            let second_id = place_node(&mut second_tree, &rebuilt);
            let mut reencoded =
                NoteSpecifics::from_node(second_tree.node(second_id).unwrap(), parent_guid);

            // The rebuilt node has a fresh GUID; everything else must
            // survive untouched.
            reencoded.guid = wire.guid;
            prop_assert_eq!(reencoded, wire);
        }

        #[test]
        fn hash_is_stable_across_reencodes(spec in arb_node()) {
            let mut tree = NoteTree::new();
            let id = place_node(&mut tree, &spec);
            let parent_guid = Guid::random();
            let wire = NoteSpecifics::from_node(tree.node(id).unwrap(), parent_guid);
            prop_assert_eq!(wire.hash().unwrap(), wire.clone().hash().unwrap());
        }
    }
}
