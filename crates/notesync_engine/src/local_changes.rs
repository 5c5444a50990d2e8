//! Outgoing commit construction from unsynced tracked entities.

use crate::error::EngineResult;
use crate::preprocess::specifics_for_node;
use crate::tracker::Tracker;
use notesync_model::{NodeKind, NoteTree};
use notesync_protocol::{CommitRecord, DeletionOrigin};
use tracing::debug;

/// Free-form origin recorded on deletion commits.
const DELETION_ORIGIN: &str = "notesync_engine";

/// Builds up to `max_entries` commit records from the tracker's unsynced
/// entities, in commit order (parents before children, deletions last).
///
/// Rebuilds each live entity's specifics from the tree so the record
/// carries the current content, refreshes the tracked fingerprint to match,
/// and marks every emitted entity's commit as in flight: its tombstone is
/// never pruned early, and the commit response acknowledges only the
/// sequence number captured here.
pub(crate) fn build_commit_records(
    tree: &NoteTree,
    tracker: &mut Tracker,
    max_entries: usize,
    client_version: &str,
) -> EngineResult<Vec<CommitRecord>> {
    let mut records = Vec::new();
    for hash in tracker.entities_with_local_changes(tree, max_entries) {
        let Some(entity) = tracker.entity_for_client_tag(&hash) else {
            continue;
        };
        let record = if entity.is_deleted() {
            CommitRecord {
                id: entity.server_id().clone(),
                client_tag_hash: hash.clone(),
                specifics: None,
                folder: false,
                base_version: entity.server_version(),
                unique_position: None,
                specifics_hash: entity.specifics_hash().clone(),
                deleted: true,
                deletion_origin: Some(DeletionOrigin::new(DELETION_ORIGIN, client_version)),
            }
        } else {
            let Some(node) = entity.node() else {
                continue;
            };
            let specifics = specifics_for_node(tree, node)?;
            let specifics_hash = specifics.hash()?;
            let folder = tree
                .node(node)
                .is_some_and(|n| n.kind == NodeKind::Folder);
            let record = CommitRecord {
                id: entity.server_id().clone(),
                client_tag_hash: hash.clone(),
                specifics: Some(specifics),
                folder,
                base_version: entity.server_version(),
                unique_position: entity.unique_position().cloned(),
                specifics_hash: specifics_hash.clone(),
                deleted: false,
                deletion_origin: None,
            };
            tracker.set_specifics_hash(&hash, specifics_hash);
            record
        };
        tracker.mark_commit_in_flight(&hash);
        records.push(record);
    }
    debug!(count = records.len(), "built commit records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_model::{Guid, NodeId, PermanentRoot};
    use notesync_protocol::{
        ClientTagHash, PositionSuffix, ServerId, SpecificsHash, UniquePosition,
        UNCOMMITTED_VERSION,
    };

    fn tracked_note(
        tracker: &mut Tracker,
        tree: &mut NoteTree,
        title: &str,
        index: usize,
        pos_byte: u8,
    ) -> (NodeId, ClientTagHash) {
        let main = tree.root(PermanentRoot::Main);
        let guid = Guid::random();
        let node = tree
            .add_note(main, index, title, None, None, guid, 0)
            .unwrap();
        let hash = ClientTagHash::from_guid(&guid);
        tracker.add(
            hash.clone(),
            node,
            ServerId::temporary(&guid),
            UNCOMMITTED_VERSION,
            0,
            Some(UniquePosition::new(
                vec![pos_byte],
                PositionSuffix::from_guid(&guid),
            )),
            SpecificsHash::from_bytes([0u8; 32]),
        );
        tracker.increment_sequence_number(&hash);
        (node, hash)
    }

    #[test]
    fn creation_record_carries_current_content() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let (node, hash) = tracked_note(&mut tracker, &mut tree, "draft", 0, 0x40);
        tree.set_content(node, Some("body".into())).unwrap();

        let records = build_commit_records(&tree, &mut tracker, 10, "1.0").unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.client_tag_hash, hash);
        assert_eq!(record.base_version, UNCOMMITTED_VERSION);
        assert!(record.id.is_temporary());
        assert!(!record.deleted);
        assert!(record.unique_position.is_some());
        let specifics = record.specifics.as_ref().unwrap();
        assert_eq!(specifics.effective_title(), "draft");
        assert_eq!(specifics.content.as_deref(), Some("body"));
        // The tracked fingerprint now matches the emitted payload.
        let entity = tracker.entity_for_client_tag(&hash).unwrap();
        assert_eq!(entity.specifics_hash(), &record.specifics_hash);
        assert!(entity.commit_may_have_started());
    }

    #[test]
    fn tombstone_record_has_origin_and_no_payload() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let (node, hash) = tracked_note(&mut tracker, &mut tree, "doomed", 0, 0x40);
        tree.remove(node).unwrap();
        tracker.mark_deleted(&hash);

        let records = build_commit_records(&tree, &mut tracker, 10, "1.0").unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.deleted);
        assert!(record.specifics.is_none());
        assert!(record.unique_position.is_none());
        let origin = record.deletion_origin.as_ref().unwrap();
        assert_eq!(origin.client_version, "1.0");
    }

    #[test]
    fn limit_caps_the_batch() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        for i in 0..5 {
            tracked_note(&mut tracker, &mut tree, &format!("n{i}"), i, 0x10 + i as u8);
        }
        let records = build_commit_records(&tree, &mut tracker, 3, "1.0").unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn synced_entities_are_skipped() {
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let (_, hash) = tracked_note(&mut tracker, &mut tree, "done", 0, 0x40);
        tracker.ack_sequence_number(&hash);
        let records = build_commit_records(&tree, &mut tracker, 10, "1.0").unwrap();
        assert!(records.is_empty());
    }
}
