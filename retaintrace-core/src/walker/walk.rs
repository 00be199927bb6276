//! The greedy backward walk and the per-target orchestration that
//! merges, displaces, and claims around it.

use std::collections::{HashMap, HashSet};

use tracing::instrument;

use crate::id::ObjectId;
use crate::index::ReverseIndex;

use super::anchors::compute_merge_depth;
use super::claim::ClaimedNodes;
use super::path::{NodeOwner, PathRecord};

pub const MAX_BACKTRACKS: usize = 10;
pub const MAX_PATHS_PER_TARGET: usize = 100;

struct Frame {
    node: ObjectId,
    /// Index into `reverse_index.parents_of(node)` of the next
    /// candidate to try.
    cursor: usize,
}

enum WalkOutcome {
    FoundRoot { ids_from_target: Vec<ObjectId>, root_id: ObjectId },
    Merged { ids_from_target: Vec<ObjectId>, shared_node: ObjectId },
    DeadEnd,
}

/// A single greedy walk from direct parent `p0` backward toward a
/// strong GC root, bounded by `MAX_BACKTRACKS` backtracks.
fn walk_to_root(
    target_id: ObjectId,
    p0: ObjectId,
    index: &ReverseIndex,
    strong_roots: &HashSet<ObjectId>,
    all_targets: &HashSet<ObjectId>,
    claimed: &ClaimedNodes,
    owner: &NodeOwner,
) -> WalkOutcome {
    let mut visited: HashSet<ObjectId> = HashSet::new();
    visited.insert(target_id);
    visited.insert(p0);

    let mut stack = vec![Frame { node: p0, cursor: 0 }];
    let mut backtracks_remaining = MAX_BACKTRACKS;

    loop {
        let c = stack.last().expect("walk stack never empties without returning").node;

        if strong_roots.contains(&c) {
            let ids = stack.iter().map(|f| f.node).collect();
            return WalkOutcome::FoundRoot { ids_from_target: ids, root_id: c };
        }
        if owner.contains_key(&c) {
            let ids = stack.iter().map(|f| f.node).collect();
            return WalkOutcome::Merged { ids_from_target: ids, shared_node: c };
        }

        let mut advanced = false;
        if !claimed.contains(c) {
            let parents = index.parents_of(c);
            let cursor = stack.last().unwrap().cursor;
            let found = parents.iter().enumerate().skip(cursor).find(|(_, q)| {
                !visited.contains(*q) && !all_targets.contains(*q) && !claimed.contains(**q)
            });
            if let Some((i, &q)) = found {
                stack.last_mut().unwrap().cursor = i + 1;
                visited.insert(q);
                stack.push(Frame { node: q, cursor: 0 });
                advanced = true;
            }
        }

        if !advanced {
            if stack.len() > 1 && backtracks_remaining > 0 {
                backtracks_remaining -= 1;
                stack.pop();
            } else {
                return WalkOutcome::DeadEnd;
            }
        }
    }
}

/// Runs the full multi-parent walk for one target: fans out over its
/// direct parents, merging/displacing surviving records against each
/// other, and claims far-from-root nodes into `claimed_nodes` once all
/// parents are processed.
#[instrument(skip(index, strong_roots, all_targets, claimed_nodes, class_of))]
pub fn walk_target(
    target_id: ObjectId,
    index: &ReverseIndex,
    strong_roots: &HashSet<ObjectId>,
    all_targets: &HashSet<ObjectId>,
    claimed_nodes: &mut ClaimedNodes,
    default_merge_depth: usize,
    class_of: &dyn Fn(ObjectId) -> Option<String>,
) -> Vec<PathRecord> {
    let mut records: Vec<PathRecord> = Vec::new();
    let mut owner: NodeOwner = HashMap::new();

    for &p0 in index.parents_of(target_id) {
        if records.len() >= MAX_PATHS_PER_TARGET {
            break;
        }
        if all_targets.contains(&p0) || claimed_nodes.contains(p0) {
            continue;
        }

        match walk_to_root(target_id, p0, index, strong_roots, all_targets, claimed_nodes, &owner) {
            WalkOutcome::DeadEnd => continue,
            WalkOutcome::FoundRoot { ids_from_target, root_id } => {
                register_found_root(&mut records, &mut owner, ids_from_target, root_id, default_merge_depth, class_of);
            }
            WalkOutcome::Merged { ids_from_target, shared_node } => {
                handle_merge(&mut records, &mut owner, ids_from_target, shared_node);
            }
        }
    }

    for record in &records {
        claimed_nodes.claim_from(record);
    }

    records
}

fn register_found_root(
    records: &mut Vec<PathRecord>,
    owner: &mut NodeOwner,
    ids_from_target: Vec<ObjectId>,
    root_id: ObjectId,
    default_merge_depth: usize,
    class_of: &dyn Fn(ObjectId) -> Option<String>,
) {
    let merge_depth = compute_merge_depth(&ids_from_target, default_merge_depth, class_of);
    let new_index = records.len();
    for (i, id) in ids_from_target.iter().enumerate() {
        owner.insert(*id, (new_index, i + 1));
    }
    records.push(PathRecord { ids_from_target, root_id, merge_depth });
}

fn handle_merge(records: &mut Vec<PathRecord>, owner: &mut NodeOwner, new_prefix: Vec<ObjectId>, shared_node: ObjectId) {
    let Some(&(r_index, e)) = owner.get(&shared_node) else {
        return;
    };
    let r_len = records[r_index].ids_from_target.len();
    if e > r_len {
        // Stale owner entry left behind by an earlier displacement; skip.
        return;
    }

    let existing_steps_from_root = r_len - e;
    let merge_depth = records[r_index].merge_depth;
    let root_id = records[r_index].root_id;

    if existing_steps_from_root < merge_depth {
        if records.len() >= MAX_PATHS_PER_TARGET {
            return;
        }
        let mut ids = new_prefix.clone();
        ids.extend_from_slice(&records[r_index].ids_from_target[e..]);
        let new_index = records.len();
        for (i, id) in new_prefix.iter().enumerate() {
            owner.insert(*id, (new_index, i + 1));
        }
        records.push(PathRecord { ids_from_target: ids, root_id, merge_depth });
    } else if new_prefix.len() < e {
        let old_ids = records[r_index].ids_from_target.clone();
        for old_id in &old_ids[0..e] {
            owner.remove(old_id);
        }
        let mut ids = new_prefix.clone();
        ids.extend_from_slice(&old_ids[e..]);
        for (i, id) in new_prefix.iter().enumerate() {
            owner.insert(*id, (r_index, i + 1));
        }
        for (i, id) in old_ids[e..].iter().enumerate() {
            owner.insert(*id, (r_index, new_prefix.len() + i + 1));
        }
        records[r_index] = PathRecord { ids_from_target: ids, root_id, merge_depth };
    }
    // else: far from root, new prefix not strictly shorter -> redundant, skip.
}
