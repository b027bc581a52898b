//! Block metadata: the out-of-band equivalent of the boundary-tag header
//! every block carries in spec §4.1.

/// Opaque handle to a live allocation. Stable for the lifetime of the
/// allocation; invalidated by `ArenaAllocator::free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocHandle(pub(super) usize);

/// Lifecycle state of a block, per spec §3 "Alloc block".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Used,
    Free,
    Wild,
    BeginSentinel,
    EndSentinel,
    /// Reserved for a future direct-mmap large-allocation path; never
    /// produced by this allocator today, kept so the state space matches
    /// spec §3 exactly.
    LargeSentinel,
    Invalid,
}

/// One block's metadata: position/size within the region, arena-order
/// links for coalescing, and the freelist/AVL/ring links used depending on
/// which index structure currently owns it.
#[derive(Debug, Clone)]
pub(super) struct BlockMeta {
    /// Byte offset of this block's payload within the arena region.
    pub offset: usize,
    /// Size in bytes, always a multiple of 32 (`BLOCK_GRANULARITY`).
    pub size: usize,
    pub state: BlockState,

    /// Arena-order (boundary-tag) links, used for coalescing.
    pub prev: Option<usize>,
    pub next: Option<usize>,

    /// Bin freelist links (blocks with `size <= LARGE_THRESHOLD`).
    pub free_prev: Option<usize>,
    pub free_next: Option<usize>,

    /// AVL tree links (blocks with `size > LARGE_THRESHOLD`). A node with
    /// `height == -1` is a ring member, not a tree node in its own right;
    /// only the ring head participates in the BST.
    pub avl_left: Option<usize>,
    pub avl_right: Option<usize>,
    pub avl_parent: Option<usize>,
    pub avl_height: i32,
    pub ring_next: Option<usize>,
    pub ring_prev: Option<usize>,
}

impl BlockMeta {
    pub fn new(offset: usize, size: usize, state: BlockState) -> Self {
        Self {
            offset,
            size,
            state,
            prev: None,
            next: None,
            free_prev: None,
            free_next: None,
            avl_left: None,
            avl_right: None,
            avl_parent: None,
            avl_height: 0,
            ring_next: None,
            ring_prev: None,
        }
    }

    pub fn is_free_like(&self) -> bool {
        matches!(self.state, BlockState::Free | BlockState::Wild)
    }
}
