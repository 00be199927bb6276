mod anchors;
mod claim;
mod path;
mod walk;

pub use claim::ClaimedNodes;
pub use path::PathRecord;
pub use walk::{walk_target, MAX_BACKTRACKS, MAX_PATHS_PER_TARGET};
