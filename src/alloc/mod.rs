//! Arena allocator (C1): a 32-byte-granular segregated-freelist plus
//! AVL-indexed large-block allocator over a single pre-reserved region.
//!
//! Every allocation's `used`/`free` bookkeeping lives in an out-of-band
//! [`BlockMeta`] table indexed by [`AllocHandle`] rather than as an
//! in-band header written into the raw bytes — a safe-Rust rendering of
//! the boundary-tag design in spec §4.1 (and `libak/src/ak/alloc/*` in
//! `examples/original_source`) that keeps the same bin/AVL/wild-block
//! algorithms and invariants without raw pointer arithmetic.

mod arena;
mod avl;
mod block;
mod freelist;

pub use arena::ArenaAllocator;
pub use block::{AllocHandle, BlockState};
