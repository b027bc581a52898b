//! FIFO (First-In-First-Out) page replacement policy.
//!
//! This is a simple baseline eviction policy where pages are evicted
//! in the order they were first accessed.

use std::collections::{HashSet, VecDeque};

use crate::common::{FrameId, PageId};

use super::Replacer;

/// FIFO replacement policy.
///
/// Evicts pages in the order they were first brought into the buffer pool.
/// Once a frame is in the queue, re-accessing it does NOT move it to the back.
pub struct FifoReplacer {
    /// Queue of frame IDs in access order (front = oldest).
    queue: VecDeque<FrameId>,

    /// Set of frame IDs currently in the queue (for O(1) membership check).
    in_queue: HashSet<FrameId>,

    /// Set of frame IDs that are evictable (pin_count == 0).
    evictable: HashSet<FrameId>,
}

impl FifoReplacer {
    /// Create a new FIFO replacer.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            in_queue: HashSet::new(),
            evictable: HashSet::new(),
        }
    }

    /// Record that a frame was accessed.
    ///
    /// For FIFO, we only add the frame to the queue on first access.
    /// Subsequent accesses do NOT reorder the frame.
    ///
    /// # Arguments
    /// * `frame_id` - The frame that was accessed
    /// * `_page_id` - The page ID (unused for FIFO, but needed for LRU-K)
    pub fn record_access(&mut self, frame_id: FrameId, _page_id: PageId) {
        if !self.in_queue.contains(&frame_id) {
            self.queue.push_back(frame_id);
            self.in_queue.insert(frame_id);
        }
    }

    /// Set whether a frame is evictable.
    ///
    /// A frame is evictable when its pin_count reaches 0.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    /// Evict the oldest evictable frame.
    ///
    /// Returns the frame ID of the evicted frame, or None if no frames are evictable.
    ///
    /// **Important**: This implementation does NOT remove non-evictable frames from
    /// the queue. It finds the first evictable frame and only removes that one.
    pub fn evict(&mut self) -> Option<FrameId> {
        // Find the position of the first evictable frame
        let position = self.queue.iter()
            .position(|&fid| self.evictable.contains(&fid))?;

        // Remove only that frame
        let frame_id = self.queue.remove(position)?;
        self.in_queue.remove(&frame_id);
        self.evictable.remove(&frame_id);

        Some(frame_id)
    }

    /// Remove a frame from the replacer entirely.
    ///
    /// Called when a page is deleted from the buffer pool.
    pub fn remove(&mut self, frame_id: FrameId) {
        // Remove from evictable set
        self.evictable.remove(&frame_id);

        // Remove from queue tracking
        if self.in_queue.remove(&frame_id) {
            // Also remove from actual queue
            self.queue.retain(|&fid| fid != frame_id);
        }
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.evictable.len()
    }
}

impl Default for FifoReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for FifoReplacer {
    fn record_access(&mut self, frame_id: FrameId, page_id: PageId) {
        FifoReplacer::record_access(self, frame_id, page_id)
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        FifoReplacer::set_evictable(self, frame_id, evictable)
    }

    fn evict(&mut self) -> Option<FrameId> {
        FifoReplacer::evict(self)
    }

    fn remove(&mut self, frame_id: FrameId) {
        FifoReplacer::remove(self, frame_id)
    }

    fn size(&self) -> usize {
        FifoReplacer::size(self)
    }
}
