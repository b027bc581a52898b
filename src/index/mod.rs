//! Index structures. [`btree`] is the only index kind this engine builds
//! (clustered and secondary indexes are both [`btree::BTreeIndex`]
//! instances distinguished by what's stored at the leaf).

pub mod btree;
