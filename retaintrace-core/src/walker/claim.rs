//! Tracks nodes claimed by a target's far-from-root path regions, so
//! that later targets in the same run are forced to find an
//! independent retention cause instead of greedily routing through
//! ground already explained.

use std::collections::HashSet;

use crate::id::ObjectId;

use super::path::PathRecord;

/// Process-wide, append-only across a run; shared by every target's
/// walker invocation.
#[derive(Debug, Default)]
pub struct ClaimedNodes(HashSet<ObjectId>);

impl ClaimedNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.0.contains(&id)
    }

    pub fn claim_from(&mut self, record: &PathRecord) {
        for id in claimed_slice(record) {
            self.0.insert(*id);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The target-side prefix of `record.ids_from_target` whose
/// step-from-root is `>= record.merge_depth`: `max(0, steps_excluding_root
/// - merge_depth + 1)` ids, counting the root itself out of
/// `steps_excluding_root`.
fn claimed_slice(record: &PathRecord) -> &[ObjectId] {
    let steps_excluding_root = record.ids_from_target.len().saturating_sub(1);
    let raw = steps_excluding_root as i64 - record.merge_depth as i64 + 1;
    let count = raw.max(0) as usize;
    let count = count.min(steps_excluding_root);
    &record.ids_from_target[..count]
}
