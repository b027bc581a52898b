//! B-tree index (C6, spec §4.6).

mod node;
mod tree;

pub use node::{InternalNode, LeafNode};
pub use tree::{BTreeIndex, SearchMode};
