//! The arena: a single pre-reserved region carved into
//! `[begin sentinel][wild block][end sentinel]` at init, then split and
//! coalesced by `try_malloc`/`free`/`defrag` per spec §4.1.

use super::avl::AvlTree;
use super::block::{AllocHandle, BlockMeta, BlockState};
use super::freelist::{Freelist, BLOCK_GRANULARITY, LARGE_THRESHOLD};

fn align_up(size: usize) -> usize {
    let size = size.max(1);
    size.div_ceil(BLOCK_GRANULARITY) * BLOCK_GRANULARITY
}

/// A single-region allocator: a segregated freelist for blocks up to
/// [`LARGE_THRESHOLD`] bytes, an AVL tree for larger ones, and a wild
/// block carved from the arena's tail when neither index has a fit.
pub struct ArenaAllocator {
    region: Vec<u8>,
    blocks: Vec<BlockMeta>,
    freelist: Freelist,
    avl: AvlTree,
    wild: usize,
    #[allow(dead_code)]
    begin_sentinel: usize,
    end_sentinel: usize,
    mem_size: usize,
    free_bytes: usize,
    used_bytes: usize,
}

impl ArenaAllocator {
    /// Carve a fresh arena of `size` bytes (rounded down to a multiple of
    /// 32). Panics if `size < BLOCK_GRANULARITY`.
    pub fn init(size: usize) -> Self {
        assert!(
            size >= BLOCK_GRANULARITY,
            "arena must hold at least one block"
        );
        let size = (size / BLOCK_GRANULARITY) * BLOCK_GRANULARITY;

        let mut blocks = Vec::with_capacity(4);
        let begin_sentinel = 0;
        blocks.push(BlockMeta::new(0, 0, BlockState::BeginSentinel));
        let wild = 1;
        blocks.push(BlockMeta::new(0, size, BlockState::Wild));
        let end_sentinel = 2;
        blocks.push(BlockMeta::new(size, 0, BlockState::EndSentinel));

        blocks[begin_sentinel].next = Some(wild);
        blocks[wild].prev = Some(begin_sentinel);
        blocks[wild].next = Some(end_sentinel);
        blocks[end_sentinel].prev = Some(wild);

        Self {
            region: vec![0u8; size],
            blocks,
            freelist: Freelist::new(),
            avl: AvlTree::new(),
            wild,
            begin_sentinel,
            end_sentinel,
            mem_size: size,
            free_bytes: size,
            used_bytes: 0,
        }
    }

    pub fn mem_size(&self) -> usize {
        self.mem_size
    }

    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Read-only view of an allocation's bytes.
    pub fn data(&self, handle: AllocHandle) -> &[u8] {
        let b = &self.blocks[handle.0];
        debug_assert!(matches!(b.state, BlockState::Used));
        &self.region[b.offset..b.offset + b.size]
    }

    /// Mutable view of an allocation's bytes.
    pub fn data_mut(&mut self, handle: AllocHandle) -> &mut [u8] {
        let b = &self.blocks[handle.0];
        debug_assert!(matches!(b.state, BlockState::Used));
        let (start, end) = (b.offset, b.offset + b.size);
        &mut self.region[start..end]
    }

    /// Size in bytes actually reserved for this allocation (may exceed the
    /// request by up to 31 bytes of rounding).
    pub fn alloc_size(&self, handle: AllocHandle) -> usize {
        self.blocks[handle.0].size
    }

    /// Allocate `requested` bytes, or `None` if the arena is exhausted.
    pub fn try_malloc(&mut self, requested: usize) -> Option<AllocHandle> {
        let aligned = align_up(requested);

        let source = if aligned <= LARGE_THRESHOLD {
            let bin = super::freelist::bin_of(aligned);
            self.freelist
                .smallest_fit(bin)
                .and_then(|b| self.freelist.pop(&mut self.blocks, b))
        } else {
            self.avl
                .find_ge(&self.blocks, aligned)
                .map(|node| self.avl.take(&mut self.blocks, node))
        };

        let idx = match source {
            Some(idx) => idx,
            None => self.carve_from_wild(aligned)?,
        };

        let (used_idx, remainder) = self.split_block(idx, aligned);
        self.blocks[used_idx].state = BlockState::Used;
        self.used_bytes += aligned;
        self.free_bytes -= aligned;

        if let Some(rem) = remainder {
            if self.blocks[idx].state == BlockState::Wild {
                // split_block already preserved idx as the carved block;
                // the remainder inherits the Wild tail role.
            }
            self.reindex_after_split(rem);
        }

        Some(AllocHandle(used_idx))
    }

    fn carve_from_wild(&mut self, aligned: usize) -> Option<usize> {
        if self.blocks[self.wild].size < aligned {
            return None;
        }
        Some(self.wild)
    }

    /// Split `idx` into a leading block of exactly `used_size` bytes and an
    /// optional trailing remainder, inserted right after it in arena order.
    /// If `idx` was the wild block, the remainder becomes the new wild
    /// block (even if zero-sized, so the arena always has a wild tail).
    fn split_block(&mut self, idx: usize, used_size: usize) -> (usize, Option<usize>) {
        let total = self.blocks[idx].size;
        let was_wild = self.blocks[idx].state == BlockState::Wild;
        let remaining = total - used_size;

        self.blocks[idx].size = used_size;

        if remaining == 0 && !was_wild {
            return (idx, None);
        }

        let new_offset = self.blocks[idx].offset + used_size;
        let new_state = if was_wild {
            BlockState::Wild
        } else {
            BlockState::Free
        };
        let mut new_block = BlockMeta::new(new_offset, remaining, new_state);
        new_block.prev = Some(idx);
        new_block.next = self.blocks[idx].next;
        self.blocks.push(new_block);
        let new_idx = self.blocks.len() - 1;

        if let Some(n) = self.blocks[idx].next {
            self.blocks[n].prev = Some(new_idx);
        }
        self.blocks[idx].next = Some(new_idx);

        if was_wild {
            self.wild = new_idx;
        }

        (idx, Some(new_idx))
    }

    /// After a split, the non-wild remainder needs to be (re-)indexed into
    /// the bin or AVL tree it belongs to.
    fn reindex_after_split(&mut self, rem_idx: usize) {
        if self.blocks[rem_idx].state != BlockState::Free {
            return;
        }
        self.insert_into_index(rem_idx);
    }

    fn insert_into_index(&mut self, idx: usize) {
        if self.blocks[idx].size <= LARGE_THRESHOLD {
            self.freelist.push(&mut self.blocks, idx);
        } else {
            self.avl.insert(&mut self.blocks, idx);
        }
    }

    fn remove_from_index(&mut self, idx: usize) {
        if self.blocks[idx].size <= LARGE_THRESHOLD {
            self.freelist.remove(&mut self.blocks, idx);
        } else {
            self.avl.remove_any(&mut self.blocks, idx);
        }
    }

    /// Return `handle`'s block to the free pool. Does not coalesce with
    /// neighbors; call `defrag` for that.
    pub fn free(&mut self, handle: AllocHandle) {
        let idx = handle.0;
        let size = self.blocks[idx].size;
        debug_assert!(matches!(self.blocks[idx].state, BlockState::Used));

        self.blocks[idx].state = BlockState::Free;
        self.used_bytes -= size;
        self.free_bytes += size;
        self.insert_into_index(idx);
    }

    /// Coalesce adjacent free/wild neighbors, left to right, stopping once
    /// `budget` merges have happened (`0` means unlimited). Returns the
    /// number of merges performed.
    pub fn defrag(&mut self, budget: usize) -> usize {
        let mut merges = 0usize;
        let mut cur = self.blocks[self.begin_sentinel].next;

        while let Some(idx) = cur {
            if idx == self.end_sentinel {
                break;
            }
            if !self.blocks[idx].is_free_like() {
                cur = self.blocks[idx].next;
                continue;
            }

            loop {
                let Some(next) = self.blocks[idx].next else {
                    break;
                };
                if next == self.end_sentinel || !self.blocks[next].is_free_like() {
                    break;
                }
                if budget != 0 && merges >= budget {
                    break;
                }

                if self.blocks[idx].state == BlockState::Free {
                    self.remove_from_index(idx);
                }
                if self.blocks[next].state == BlockState::Free {
                    self.remove_from_index(next);
                }

                self.blocks[idx].size += self.blocks[next].size;
                self.blocks[idx].next = self.blocks[next].next;
                if let Some(n2) = self.blocks[next].next {
                    self.blocks[n2].prev = Some(idx);
                }
                if self.blocks[next].state == BlockState::Wild {
                    self.blocks[idx].state = BlockState::Wild;
                    self.wild = idx;
                }
                self.blocks[next].state = BlockState::Invalid;
                merges += 1;
            }

            if self.blocks[idx].state == BlockState::Free {
                self.insert_into_index(idx);
            }
            if budget != 0 && merges >= budget {
                break;
            }
            cur = self.blocks[idx].next;
        }

        merges
    }

    /// Debug-checked structural invariants (spec §8 "Quantified invariants").
    /// Always runs the arithmetic check; the freelist/AVL walks only run
    /// under `debug_assertions` since they're O(n).
    pub fn check_invariants(&self) {
        assert_eq!(self.free_bytes + self.used_bytes, self.mem_size);
        if cfg!(debug_assertions) {
            self.freelist.check_invariants(&self.blocks);
            self.avl.check_invariants(&self.blocks);
        }
    }

    /// Count of free (non-wild) blocks, for tests asserting defrag reduced
    /// fragmentation.
    pub fn free_block_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.state == BlockState::Free)
            .count()
    }
}
