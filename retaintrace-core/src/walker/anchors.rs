//! Anchor table: infrastructure classes whose presence along a path
//! raises the merge-depth threshold, so that retention chains passing
//! through them aren't collapsed as aggressively near the anchor.

use crate::id::ObjectId;
use crate::leaf::simple_name;

pub struct Anchor {
    pub class_name: &'static str,
    pub offset: usize,
}

/// Ordered; the first anchor matched scanning from the target side
/// wins. `Disposer` is the only anchor known today — IDEA's disposer
/// tree routinely adds 4+ hops of bookkeeping around the object it
/// actually disposes.
pub const ANCHOR_TABLE: &[Anchor] = &[Anchor {
    class_name: "Disposer",
    offset: 4,
}];

/// Computes the merge depth for a freshly discovered `FoundRoot`
/// chain: scans `ids_from_target` from the target side for the first
/// id whose class matches an anchor, and if found returns
/// `steps_from_root(idx) + anchor.offset`; otherwise `default_depth`.
pub fn compute_merge_depth(
    ids_from_target: &[ObjectId],
    default_depth: usize,
    class_of: &dyn Fn(ObjectId) -> Option<String>,
) -> usize {
    for (idx, id) in ids_from_target.iter().enumerate() {
        let Some(class_name) = class_of(*id) else {
            continue;
        };
        let simple = simple_name(&class_name);
        if let Some(anchor) = ANCHOR_TABLE.iter().find(|a| a.class_name == simple) {
            let steps_from_root = ids_from_target.len() - 1 - idx;
            return steps_from_root + anchor.offset;
        }
    }
    default_depth
}
