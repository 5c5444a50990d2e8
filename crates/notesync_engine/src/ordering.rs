//! Sibling ordering helpers shared by the merger, the updates handler, and
//! the change observer.

use crate::tracker::Tracker;
use notesync_model::{NodeId, NoteTree};
use notesync_protocol::{PositionGenerator, PositionSuffix, UniquePosition};

/// Computes the child index at which a node with `position` belongs under
/// `parent`: after every tracked sibling with a smaller position.
///
/// `exclude` skips the node being moved so it does not count against its own
/// target index. Untracked siblings (and siblings without positions) sort
/// after all tracked ones, matching the invariant that tracked child order
/// and position order agree.
pub(crate) fn index_for_position(
    tree: &NoteTree,
    tracker: &Tracker,
    parent: NodeId,
    position: &UniquePosition,
    exclude: Option<NodeId>,
) -> usize {
    let mut index = 0;
    for child in tree.children(parent) {
        if Some(*child) == exclude {
            continue;
        }
        match tracker.entity_for_node(*child).and_then(|e| e.unique_position()) {
            Some(sibling) if sibling < position => index += 1,
            Some(_) => break,
            None => break,
        }
    }
    index
}

/// Computes a position for `node` from its current index among the children
/// of `parent`, relative to the nearest tracked neighbors.
///
/// Before-first / after-last / between-two / initial-if-none, exactly one of
/// which applies.
pub(crate) fn position_for_node(
    tree: &NoteTree,
    tracker: &Tracker,
    generator: &dyn PositionGenerator,
    parent: NodeId,
    node: NodeId,
) -> UniquePosition {
    let suffix = tree
        .node(node)
        .map(|n| PositionSuffix::from_guid(&n.guid))
        .unwrap_or_else(|| PositionSuffix::from_guid(&notesync_model::Guid::random()));

    let children = tree.children(parent);
    let index = children.iter().position(|c| *c == node).unwrap_or(0);

    let tracked_position = |id: NodeId| -> Option<UniquePosition> {
        if id == node {
            return None;
        }
        tracker
            .entity_for_node(id)
            .and_then(|e| e.unique_position())
            .cloned()
    };

    let predecessor = children[..index]
        .iter()
        .rev()
        .find_map(|c| tracked_position(*c));
    let successor = children[index + 1..]
        .iter()
        .find_map(|c| tracked_position(*c));

    match (predecessor, successor) {
        (None, None) => generator.initial(&suffix),
        (None, Some(after)) => generator.before(&after, &suffix),
        (Some(before), None) => generator.after(&before, &suffix),
        (Some(before), Some(after)) => generator.between(&before, &after, &suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_model::{Guid, NoteTree, PermanentRoot};
    use notesync_protocol::{ClientTagHash, ServerId, SpecificsHash};
    use notesync_testkit::MidpointPositionGenerator;

    fn track(
        tracker: &mut Tracker,
        tree: &NoteTree,
        node: NodeId,
        position: Option<UniquePosition>,
    ) -> ClientTagHash {
        let guid = tree.node(node).unwrap().guid;
        let hash = ClientTagHash::from_guid(&guid);
        tracker.add(
            hash.clone(),
            node,
            ServerId::new(format!("s-{node}")),
            1,
            0,
            position,
            SpecificsHash::from_bytes([0u8; 32]),
        );
        hash
    }

    #[test]
    fn index_follows_position_order() {
        let generator = MidpointPositionGenerator::new();
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let main = tree.root(PermanentRoot::Main);

        let mut last = None;
        for i in 0..3 {
            let guid = Guid::random();
            let node = tree
                .add_note(main, i, format!("n{i}"), None, None, guid, 0)
                .unwrap();
            let suffix = PositionSuffix::from_guid(&guid);
            let position = match &last {
                None => generator.initial(&suffix),
                Some(prev) => generator.after(prev, &suffix),
            };
            track(&mut tracker, &tree, node, Some(position.clone()));
            last = Some(position);
        }

        let probe_suffix = PositionSuffix::from_guid(&Guid::random());
        let children = tree.children(main).to_vec();
        let first = tracker
            .entity_for_node(children[0])
            .unwrap()
            .unique_position()
            .unwrap()
            .clone();

        let before_all = generator.before(&first, &probe_suffix);
        assert_eq!(
            index_for_position(&tree, &tracker, main, &before_all, None),
            0
        );
        let after_all = generator.after(last.as_ref().unwrap(), &probe_suffix);
        assert_eq!(
            index_for_position(&tree, &tracker, main, &after_all, None),
            3
        );
    }

    #[test]
    fn position_for_node_covers_all_four_cases() {
        let generator = MidpointPositionGenerator::new();
        let mut tree = NoteTree::new();
        let mut tracker = Tracker::default();
        let main = tree.root(PermanentRoot::Main);

        // Lone child: initial.
        let lone = tree
            .add_note(main, 0, "lone", None, None, Guid::random(), 0)
            .unwrap();
        let lone_pos = position_for_node(&tree, &tracker, &generator, main, lone);
        track(&mut tracker, &tree, lone, Some(lone_pos.clone()));

        // Inserted before: before-first.
        let head = tree
            .add_note(main, 0, "head", None, None, Guid::random(), 0)
            .unwrap();
        let head_pos = position_for_node(&tree, &tracker, &generator, main, head);
        assert!(head_pos < lone_pos);
        track(&mut tracker, &tree, head, Some(head_pos.clone()));

        // Appended: after-last.
        let tail = tree
            .add_note(main, 2, "tail", None, None, Guid::random(), 0)
            .unwrap();
        let tail_pos = position_for_node(&tree, &tracker, &generator, main, tail);
        assert!(tail_pos > lone_pos);
        track(&mut tracker, &tree, tail, Some(tail_pos.clone()));

        // Inserted in the middle: between-two.
        let mid = tree
            .add_note(main, 1, "mid", None, None, Guid::random(), 0)
            .unwrap();
        let mid_pos = position_for_node(&tree, &tracker, &generator, main, mid);
        assert!(mid_pos > head_pos);
        assert!(mid_pos < lone_pos);
    }
}
