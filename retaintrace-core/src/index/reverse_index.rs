use std::collections::HashMap;

use crate::id::ObjectId;

/// `child -> ordered parents` mapping built by a single forward sweep
/// from the strong GC roots. Order within a child's parent list is the
/// order edges were discovered during the sweep — the walker relies on
/// this order to pick its "first unvisited parent", so it is preserved
/// exactly as recorded, duplicates included.
#[derive(Debug, Default, Clone)]
pub struct ReverseIndex {
    parents: HashMap<ObjectId, Vec<ObjectId>>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `child`'s parent as `parent`, appending to whatever
    /// parents are already known for `child`.
    pub(crate) fn record_edge(&mut self, parent: ObjectId, child: ObjectId) {
        self.parents.entry(child).or_default().push(parent);
    }

    /// The direct parents of `child`, in discovery order. Empty if
    /// `child` has no recorded inbound strong edge (e.g. it is itself
    /// a GC root, or was never reached by the sweep).
    pub fn parents_of(&self, child: ObjectId) -> &[ObjectId] {
        self.parents.get(&child).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry_count(&self) -> usize {
        self.parents.len()
    }

    pub fn total_edge_count(&self) -> usize {
        self.parents.values().map(Vec::len).sum()
    }

    /// All `(child, parents)` entries, in arbitrary order — used only
    /// by the cache writer, which picks its own on-disk ordering.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &[ObjectId])> {
        self.parents.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Rebuilds an index from `(child, parents)` pairs, as read back
    /// from the cache.
    pub fn from_entries(entries: Vec<(ObjectId, Vec<ObjectId>)>) -> Self {
        Self {
            parents: entries.into_iter().collect(),
        }
    }
}

impl PartialEq for ReverseIndex {
    fn eq(&self, other: &Self) -> bool {
        self.parents == other.parents
    }
}
