mod builder;
mod reverse_index;

pub use builder::{build_reverse_index, StrongRoots};
pub use reverse_index::ReverseIndex;
