//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory, via an open-addressing
//!   [`PageFrameDirectory`] rather than a plain hash map
//! - Three in-use frame pools (`Default`, `Recycle`, `Keep`) plus `Free`,
//!   so scan-driven cache misses don't evict hot working-set pages
//! - Pin-based reference counting
//! - Automatic dirty page write-back
//! - A pluggable [`Replacer`] policy (FIFO or CLOCK by default)

use std::sync::atomic::Ordering;

use parking_lot::{Mutex, RwLock};

use crate::buffer::directory::PageFrameDirectory;
use crate::buffer::pool::{FramePool, FramePoolTable};
use crate::buffer::replacer::{Replacer, ReplacerPolicy};
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::DiskManager;

/// Manages a pool of buffer frames for caching disk pages.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌──────────────┐  ┌───────────────────────────────────┐   │
/// │  │  directory   │  │        frames: Vec<Frame>          │   │
/// │  │PageId → Fid  │─▶│  [Frame0] [Frame1] [Frame2] ...    │   │
/// │  └──────────────┘  └───────────────────────────────────┘   │
/// │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
/// │  │ pools: Free/ │  │   replacer   │  │disk_manager  │      │
/// │  │Default/Rec/  │  │ dyn Replacer │  │   Mutex      │      │
/// │  │ Keep         │  │              │  │              │      │
/// │  └──────────────┘  └──────────────┘  └──────────────┘      │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `directory`: `RwLock` — many readers, few writers
/// - `pools`: `Mutex` — always modified together
/// - `replacer`: `Mutex` — internal state changes on access
/// - `disk_manager`: `Mutex` — single-threaded I/O
/// - `frames`: No lock — fixed size, each Frame has internal locks
/// - `stats`: No lock — all atomic counters
///
/// # Usage
/// ```ignore
/// let dm = DiskManager::create("test.db")?;
/// let bpm = BufferPoolManager::new(10, dm);
///
/// // Allocate a new page
/// let mut guard = bpm.new_page()?;
/// guard.as_mut_slice()[0] = 0xAB;
/// // guard drops: page marked dirty, unpinned
///
/// // Fetch existing page for reading
/// let guard = bpm.fetch_page_read(PageId::new(0))?;
/// let data = guard.as_slice();
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Maps page IDs to frame IDs.
    directory: RwLock<PageFrameDirectory>,

    /// Free / Default / Recycle / Keep membership.
    pools: Mutex<FramePoolTable>,

    /// Eviction policy for selecting victim frames.
    replacer: Mutex<Box<dyn Replacer>>,

    /// Handles all disk I/O.
    disk_manager: Mutex<DiskManager>,

    /// Performance statistics.
    stats: BufferPoolStats,

    /// Number of frames in the pool (immutable after construction).
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a new buffer pool manager using the default (CLOCK)
    /// replacement policy.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        Self::with_policy(pool_size, disk_manager, ReplacerPolicy::default())
    }

    /// Create a new buffer pool manager with an explicit replacement
    /// policy.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn with_policy(
        pool_size: usize,
        disk_manager: DiskManager,
        policy: ReplacerPolicy,
    ) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();

        Self {
            frames,
            directory: RwLock::new(PageFrameDirectory::with_capacity(pool_size)),
            pools: Mutex::new(FramePoolTable::new(pool_size)),
            replacer: Mutex::new(policy.build()),
            disk_manager: Mutex::new(disk_manager),
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Fetch a page for reading (shared access).
    ///
    /// If the page is already in the buffer pool, returns immediately.
    /// Otherwise, loads the page from disk (possibly evicting another page).
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page doesn't exist on disk
    /// - `Error::NoFreeFrames` if all frames are pinned
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_page_internal(page_id)?;
        let lock = self.frames[frame_id.0].page();

        Ok(PageReadGuard::new(self, frame_id, page_id, lock))
    }

    /// Fetch a page for writing (exclusive access).
    ///
    /// Same as `fetch_page_read`, but returns an exclusive guard.
    /// The page is automatically marked dirty when the guard drops.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page doesn't exist on disk
    /// - `Error::NoFreeFrames` if all frames are pinned
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_page_internal(page_id)?;
        let lock = self.frames[frame_id.0].page_mut();

        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    // ========================================================================
    // Public API: Create and delete pages
    // ========================================================================

    /// Allocate a new page on disk and load it into the buffer pool.
    ///
    /// New pages enter the `Recycle` pool, same as a cold page brought in
    /// by a cache miss (spec §4.2: "New pages brought in by sequential
    /// reads enter `Recycle`").
    ///
    /// Returns a write guard for the new page.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if all frames are pinned
    /// - I/O errors from disk allocation
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.get_free_frame(FramePool::Recycle)?;

        let page_id = {
            let mut dm = self.disk_manager.lock();
            dm.allocate_page()?
        };

        let frame = &self.frames[frame_id.0];
        frame.page_mut().reset();
        frame.set_page_id(Some(page_id));
        frame.pin();

        {
            let mut dir = self.directory.write();
            dir.put(page_id, frame_id);
        }

        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id, page_id);
            replacer.set_evictable(frame_id, false);
        }

        let lock = frame.page_mut();

        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    /// Move a frame into the `Keep` pool, for pages expected to stay
    /// resident long-term (catalog pages, index roots). The page must
    /// already be in the buffer pool.
    pub fn pin_keep(&self, page_id: PageId) -> Result<()> {
        let frame_id = {
            let dir = self.directory.read();
            dir.lookup(page_id).ok_or(Error::PageNotFound(page_id.0))?
        };
        self.pools.lock().move_to_pool(frame_id, FramePool::Keep);
        Ok(())
    }

    /// Delete a page from the buffer pool.
    ///
    /// The page must not be pinned. This removes the page from the buffer pool
    /// but does NOT deallocate it on disk.
    ///
    /// # Errors
    /// - Returns error if page is still pinned
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut dir = self.directory.write();

        let frame_id = match dir.lookup(page_id) {
            Some(fid) => fid,
            None => return Ok(()), // Page not in pool, nothing to do
        };

        let frame = &self.frames[frame_id.0];

        if frame.is_pinned() {
            return Err(Error::PageNotPinned(page_id.0));
        }

        dir.remove(page_id);
        drop(dir);

        frame.set_page_id(None);
        frame.clear_dirty();

        {
            let mut replacer = self.replacer.lock();
            replacer.remove(frame_id);
        }

        self.pools.lock().free_frame(frame_id);

        Ok(())
    }

    // ========================================================================
    // Public API: Flush pages
    // ========================================================================

    /// Flush a specific page to disk if it's dirty.
    ///
    /// # Errors
    /// - I/O errors from disk write
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let frame_id = {
            let dir = self.directory.read();
            match dir.lookup(page_id) {
                Some(fid) => fid,
                None => return Ok(()), // Page not in pool
            }
        };

        self.flush_frame(frame_id, page_id)
    }

    /// Flush all dirty pages to disk.
    ///
    /// # Errors
    /// - I/O errors from disk writes
    pub fn flush_all_pages(&self) -> Result<()> {
        let pages: Vec<(PageId, FrameId)> = {
            let dir = self.directory.read();
            dir.iter().collect()
        };

        for (page_id, frame_id) in pages {
            self.flush_frame(frame_id, page_id)?;
        }

        Ok(())
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    /// Get buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Get the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Get the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.pools.lock().count(FramePool::Free)
    }

    /// Get the number of pages in the buffer pool.
    pub fn page_count(&self) -> usize {
        self.directory.read().len()
    }

    // ========================================================================
    // Internal: Called by PageGuard on drop
    // ========================================================================

    /// Unpin a page. Called by PageReadGuard/PageWriteGuard on drop.
    ///
    /// This is `pub(crate)` so guards in the same module can call it.
    pub(crate) fn unpin_page_internal(&self, frame_id: FrameId, is_dirty: bool) {
        let frame = &self.frames[frame_id.0];

        if is_dirty {
            frame.mark_dirty();
        }

        let new_pin_count = frame.unpin();

        if new_pin_count == 0 {
            let mut replacer = self.replacer.lock();
            replacer.set_evictable(frame_id, true);
        }
    }

    // ========================================================================
    // Internal: Core fetch logic
    // ========================================================================

    /// Fetch a page into the buffer pool, returning its frame ID.
    fn fetch_page_internal(&self, page_id: PageId) -> Result<FrameId> {
        // Fast path: check if page is already in pool (read lock only)
        {
            let dir = self.directory.read();
            if let Some(frame_id) = dir.lookup(page_id) {
                self.handle_cache_hit(frame_id, page_id);
                return Ok(frame_id);
            }
        }

        self.handle_cache_miss(page_id)
    }

    /// Handle a cache hit: pin the frame, promote it to `Default` (a
    /// re-referenced frame graduates out of `Recycle`), and update the
    /// replacer.
    fn handle_cache_hit(&self, frame_id: FrameId, page_id: PageId) {
        let frame = &self.frames[frame_id.0];
        frame.pin();

        {
            let mut pools = self.pools.lock();
            if pools.pool_of(frame_id) == FramePool::Recycle {
                pools.move_to_pool(frame_id, FramePool::Default);
            }
        }

        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id, page_id);
            replacer.set_evictable(frame_id, false);
        }

        self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Handle a cache miss: get a frame, load from disk, update mappings.
    /// The page enters `Recycle`, same as `new_page` (spec §4.2).
    fn handle_cache_miss(&self, page_id: PageId) -> Result<FrameId> {
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let frame_id = self.get_free_frame(FramePool::Recycle)?;

        let page_data = {
            let mut dm = self.disk_manager.lock();
            dm.read_page(page_id)?
        };

        self.stats.pages_read.fetch_add(1, Ordering::Relaxed);

        let frame = &self.frames[frame_id.0];

        {
            let mut page = frame.page_mut();
            page.as_mut_slice().copy_from_slice(page_data.as_slice());
        }

        frame.set_page_id(Some(page_id));
        frame.pin();

        {
            let mut dir = self.directory.write();
            dir.put(page_id, frame_id);
        }

        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id, page_id);
            replacer.set_evictable(frame_id, false);
        }

        Ok(frame_id)
    }

    // ========================================================================
    // Internal: Frame allocation and eviction
    // ========================================================================

    /// Get a free frame from the `Free` pool, evicting into `dest_pool`
    /// if necessary.
    fn get_free_frame(&self, dest_pool: FramePool) -> Result<FrameId> {
        {
            let mut pools = self.pools.lock();
            if let Some(frame_id) = pools.allocate_frame(dest_pool) {
                return Ok(frame_id);
            }
        }

        self.evict_page(dest_pool)
    }

    /// Evict a page and return its frame, moved into `dest_pool`.
    fn evict_page(&self, dest_pool: FramePool) -> Result<FrameId> {
        let frame_id = {
            let mut replacer = self.replacer.lock();
            replacer.evict().ok_or(Error::NoFreeFrames)?
        };

        self.stats.evictions.fetch_add(1, Ordering::Relaxed);

        let frame = &self.frames[frame_id.0];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            if let Some(pid) = old_page_id {
                self.flush_frame(frame_id, pid)?;
            }
        }

        if let Some(pid) = old_page_id {
            let mut dir = self.directory.write();
            dir.remove(pid);
        }

        frame.clear_dirty();
        frame.set_page_id(None);

        self.pools.lock().move_to_pool(frame_id, dest_pool);

        Ok(frame_id)
    }

    /// Flush a frame to disk if dirty.
    fn flush_frame(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id.0];

        if frame.is_dirty() {
            let page = frame.page();
            {
                let mut dm = self.disk_manager.lock();
                dm.write_page(page_id, &page)?;
            }
            drop(page);

            frame.clear_dirty();
            self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Helper to create a BPM with a temporary database file.
    fn create_test_bpm(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let dm = DiskManager::create(&path).unwrap();
        (BufferPoolManager::new(pool_size, dm), dir)
    }

    #[test]
    fn test_new_page() {
        let (bpm, _dir) = create_test_bpm(10);

        let guard = bpm.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(0));
        drop(guard);

        let guard = bpm.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(1));
    }

    #[test]
    fn test_fetch_page_read() {
        let (bpm, _dir) = create_test_bpm(10);

        {
            let mut guard = bpm.new_page().unwrap();
            guard.as_mut_slice()[0] = 0xAB;
        }

        {
            let guard = bpm.fetch_page_read(PageId::new(0)).unwrap();
            assert_eq!(guard.as_slice()[0], 0xAB);
        }
    }

    #[test]
    fn test_fetch_page_write() {
        let (bpm, _dir) = create_test_bpm(10);

        {
            let _guard = bpm.new_page().unwrap();
        }

        {
            let mut guard = bpm.fetch_page_write(PageId::new(0)).unwrap();
            guard.as_mut_slice()[0] = 0xCD;
        }

        {
            let guard = bpm.fetch_page_read(PageId::new(0)).unwrap();
            assert_eq!(guard.as_slice()[0], 0xCD);
        }
    }

    #[test]
    fn test_cache_hit() {
        let (bpm, _dir) = create_test_bpm(10);

        {
            let _guard = bpm.new_page().unwrap();
        }

        {
            let _guard = bpm.fetch_page_read(PageId::new(0)).unwrap();
        }
        {
            let _guard = bpm.fetch_page_read(PageId::new(0)).unwrap();
        }

        let snapshot = bpm.stats().snapshot();
        assert!(snapshot.cache_hits >= 2);
    }

    #[test]
    fn test_cache_hit_promotes_to_default_pool() {
        let (bpm, _dir) = create_test_bpm(10);
        {
            let _guard = bpm.new_page().unwrap();
        }
        // new_page landed the frame in Recycle; unpin happens on drop.
        let frame_id = bpm.directory.read().lookup(PageId::new(0)).unwrap();
        assert_eq!(bpm.pools.lock().pool_of(frame_id), FramePool::Recycle);

        {
            let _guard = bpm.fetch_page_read(PageId::new(0)).unwrap();
        }
        assert_eq!(bpm.pools.lock().pool_of(frame_id), FramePool::Default);
    }

    #[test]
    fn test_pin_keep() {
        let (bpm, _dir) = create_test_bpm(10);
        {
            let _guard = bpm.new_page().unwrap();
        }
        bpm.pin_keep(PageId::new(0)).unwrap();
        let frame_id = bpm.directory.read().lookup(PageId::new(0)).unwrap();
        assert_eq!(bpm.pools.lock().pool_of(frame_id), FramePool::Keep);
    }

    #[test]
    fn test_eviction() {
        let (bpm, _dir) = create_test_bpm(3);

        for _ in 0..3 {
            let _guard = bpm.new_page().unwrap();
        }

        assert_eq!(bpm.free_frame_count(), 0);

        let guard = bpm.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(3));

        let snapshot = bpm.stats().snapshot();
        assert_eq!(snapshot.evictions, 1);
    }

    #[test]
    fn test_dirty_page_flushed_on_eviction() {
        let (bpm, _dir) = create_test_bpm(1);

        {
            let mut guard = bpm.new_page().unwrap();
            guard.as_mut_slice()[0] = 0x42;
        }

        {
            let _guard = bpm.new_page().unwrap();
        }

        {
            let guard = bpm.fetch_page_read(PageId::new(0)).unwrap();
            assert_eq!(guard.as_slice()[0], 0x42);
        }
    }

    #[test]
    fn test_delete_page() {
        let (bpm, _dir) = create_test_bpm(10);

        {
            let _guard = bpm.new_page().unwrap();
        }

        assert_eq!(bpm.page_count(), 1);

        bpm.delete_page(PageId::new(0)).unwrap();

        assert_eq!(bpm.free_frame_count(), 10);
        assert_eq!(bpm.page_count(), 0);
    }

    #[test]
    fn test_delete_pinned_page_fails() {
        let (bpm, _dir) = create_test_bpm(10);

        let _guard = bpm.new_page().unwrap();

        let result = bpm.delete_page(PageId::new(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_flush_page() {
        let (bpm, _dir) = create_test_bpm(10);

        {
            let mut guard = bpm.new_page().unwrap();
            guard.as_mut_slice()[0] = 0xFF;
        }

        bpm.flush_page(PageId::new(0)).unwrap();

        let snapshot = bpm.stats().snapshot();
        assert!(snapshot.pages_written >= 1);
    }

    #[test]
    fn test_flush_all_pages() {
        let (bpm, _dir) = create_test_bpm(10);

        for i in 0..5 {
            let mut guard = bpm.new_page().unwrap();
            guard.as_mut_slice()[0] = i;
        }

        bpm.flush_all_pages().unwrap();

        let snapshot = bpm.stats().snapshot();
        assert!(snapshot.pages_written >= 5);
    }

    #[test]
    fn test_multiple_read_guards() {
        let (bpm, _dir) = create_test_bpm(10);

        {
            let _guard = bpm.new_page().unwrap();
        }

        let guard1 = bpm.fetch_page_read(PageId::new(0)).unwrap();
        let guard2 = bpm.fetch_page_read(PageId::new(0)).unwrap();

        assert_eq!(guard1.page_id(), guard2.page_id());

        drop(guard1);
        drop(guard2);
    }

    #[test]
    fn test_page_not_found() {
        let (bpm, _dir) = create_test_bpm(10);

        let result = bpm.fetch_page_read(PageId::new(999));
        assert!(result.is_err());
    }

    #[test]
    fn test_no_free_frames() {
        let (bpm, _dir) = create_test_bpm(2);

        let _guard1 = bpm.new_page().unwrap();
        let _guard2 = bpm.new_page().unwrap();

        let result = bpm.new_page();
        assert!(result.is_err());
    }

    #[test]
    fn test_pin_count_tracking() {
        let (bpm, _dir) = create_test_bpm(10);

        let _guard = bpm.new_page().unwrap();

        let frame = &bpm.frames[0];
        assert_eq!(frame.pin_count(), 0);
        assert!(frame.page_id().is_some());
        assert!(frame.is_evictable());

        let _guard = bpm.fetch_page_read(PageId::new(0)).unwrap();
        assert_eq!(frame.pin_count(), 1);
        assert!(!frame.is_evictable());

        assert_eq!(frame.pin_count(), 0);
        assert!(frame.is_evictable());
    }

    #[test]
    fn test_concurrent_reads() {
        use std::sync::Arc;
        use std::thread;

        let (bpm, _dir) = create_test_bpm(10);
        let bpm = Arc::new(bpm);

        {
            let mut guard = bpm.new_page().unwrap();
            guard.as_mut_slice()[0] = 0x42;
        }

        let mut handles = vec![];

        for _ in 0..10 {
            let bpm_clone = Arc::clone(&bpm);
            handles.push(thread::spawn(move || {
                let guard = bpm_clone.fetch_page_read(PageId::new(0)).unwrap();
                assert_eq!(guard.as_slice()[0], 0x42);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_with_fifo_policy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let dm = DiskManager::create(&path).unwrap();
        let bpm = BufferPoolManager::with_policy(3, dm, ReplacerPolicy::Fifo);

        for _ in 0..3 {
            let _guard = bpm.new_page().unwrap();
        }
        let guard = bpm.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(3));
    }
}
