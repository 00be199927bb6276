use crate::id::ObjectId;

/// A single retention chain for one target, target-to-root order:
/// `ids_from_target[0]` is a direct parent of the target,
/// `ids_from_target[last]` is the strong GC root that terminates it.
///
/// `merge_depth` governs how later walks for the same target may merge
/// onto or displace this record; it is fixed at creation (either
/// computed from the anchor table or inherited from a record this one
/// diverged from).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    pub ids_from_target: Vec<ObjectId>,
    pub root_id: ObjectId,
    pub merge_depth: usize,
}

impl PathRecord {
    /// `steps_from_root` for the node at `index` (0-based, same
    /// indexing as `ids_from_target`). The root itself (last index) is
    /// always 0.
    pub fn steps_from_root(&self, index: usize) -> usize {
        self.ids_from_target.len() - 1 - index
    }
}

/// Maps a node to the record that currently owns it and that record's
/// position, as `(record_index, steps_from_target)` where
/// `steps_from_target` is 1-based: the count of ids from the target up
/// to and including this node.
pub type NodeOwner = std::collections::HashMap<ObjectId, (usize, usize)>;
