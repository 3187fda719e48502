//! Buffer pool management for page caching.
//!
//! The buffer pool owns a fixed array of frames, maps resident page ids to
//! frames, and enforces pin/latch discipline:
//! - Pages are pinned while in use and only unpinned frames are evicted
//! - Eviction victims are chosen by the LRU-K replacer
//! - Dirty pages are written through the disk scheduler before their frame
//!   is reused
//! - All page data access happens through scoped guards ([`PageGuard`],
//!   [`PageReadGuard`], [`PageWriteGuard`])
//!
//! # Locking
//!
//! One coarse mutex protects the page table, the free list, all frame
//! metadata and the replacer; every public operation holds it for its whole
//! duration, so concurrent callers observe a linearisable history. Each frame
//! additionally carries its own reader-writer latch for page *data*; guards
//! acquire that latch strictly after the mutex is released, and the mutex is
//! never held while waiting on a latch that a guard could own.

mod buffer_frame;
mod page_guard;
mod replacer;

pub use buffer_frame::{FrameHeader, FrameId};
pub use page_guard::{PageGuard, PageReadGuard, PageWriteGuard};
pub use replacer::LruKReplacer;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{OxbowError, Result};
use crate::storage::buffer_pool::buffer_frame::FrameMeta;
use crate::storage::page::{DiskManager, DiskRequest, DiskScheduler, PageId};

/// Bookkeeping shared by all buffer pool operations, behind one mutex.
struct PoolState {
    /// Maps resident page ids to frame indices, unique in both directions.
    page_table: HashMap<PageId, FrameId>,
    /// Frames that hold no page.
    free_list: VecDeque<FrameId>,
    /// Eviction policy over the occupied frames.
    replacer: LruKReplacer,
    /// Per-frame page id, pin count and dirty flag.
    metas: Vec<FrameMeta>,
}

/// Point-in-time counters describing the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub pool_size: usize,
    pub pages_used: usize,
    pub pinned_pages: usize,
    pub dirty_pages: usize,
    pub free_frames: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
}

/// The buffer pool manager: a fixed-size cache of disk pages.
pub struct BufferPoolManager {
    pool_size: usize,
    /// Frame data latches, indexed by `FrameId`. Immutable after construction.
    frames: Vec<FrameHeader>,
    state: Mutex<PoolState>,
    disk_scheduler: DiskScheduler,
    /// Monotonic page id allocator.
    next_page_id: AtomicI32,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    evictions: AtomicU64,
}

impl BufferPoolManager {
    /// Creates a buffer pool of `pool_size` frames over the given disk
    /// manager, with an LRU-K replacer of the given `k`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pool_size` or `replacer_k` is zero.
    pub fn new(
        pool_size: usize,
        disk_manager: impl DiskManager,
        replacer_k: usize,
    ) -> Result<Self> {
        if pool_size == 0 {
            return Err(OxbowError::BufferPoolError(
                "pool size must be greater than 0".into(),
            ));
        }
        if replacer_k == 0 {
            return Err(OxbowError::BufferPoolError(
                "replacer k must be greater than 0".into(),
            ));
        }

        let frames = (0..pool_size).map(FrameHeader::new).collect();
        let state = PoolState {
            page_table: HashMap::with_capacity(pool_size),
            free_list: (0..pool_size).collect(),
            replacer: LruKReplacer::new(pool_size, replacer_k),
            metas: (0..pool_size).map(|_| FrameMeta::new()).collect(),
        };

        Ok(Self {
            pool_size,
            frames,
            state: Mutex::new(state),
            disk_scheduler: DiskScheduler::new(disk_manager),
            next_page_id: AtomicI32::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Number of frames in the pool.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Allocates a new page, pinned with pin count 1.
    ///
    /// Returns `None` when every frame is pinned. The new page's bytes are
    /// zeroed; access them through [`Self::fetch_page_basic`] or allocate via
    /// [`Self::new_page_guarded`] directly.
    pub fn new_page(&self) -> Option<PageId> {
        self.new_page_inner().map(|(_, page_id)| page_id)
    }

    /// Allocates a new page and wraps it in a basic guard.
    pub fn new_page_guarded(&self) -> Option<PageGuard<'_>> {
        let (frame_id, page_id) = self.new_page_inner()?;
        Some(PageGuard::new(self, frame_id, page_id))
    }

    /// Fetches a page, pinned, wrapped in a basic guard (no latch held).
    ///
    /// Returns `None` when the page is not resident and every frame is
    /// pinned.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Option<PageGuard<'_>> {
        let frame_id = self.pin_page(page_id)?;
        Some(PageGuard::new(self, frame_id, page_id))
    }

    /// Fetches a page and acquires its shared latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Option<PageReadGuard<'_>> {
        Some(self.fetch_page_basic(page_id)?.upgrade_read())
    }

    /// Fetches a page and acquires its exclusive latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Option<PageWriteGuard<'_>> {
        Some(self.fetch_page_basic(page_id)?.upgrade_write())
    }

    /// Drops one pin on `page_id`, ORing `is_dirty` into the frame's dirty
    /// flag. The frame becomes evictable when its pin count reaches zero.
    ///
    /// Returns `false` if the page is not resident or already unpinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        {
            let meta = &mut state.metas[frame_id];
            if meta.pin_count == 0 {
                return false;
            }
            meta.pin_count -= 1;
            meta.is_dirty |= is_dirty;
            if meta.pin_count > 0 {
                return true;
            }
        }
        state.replacer.set_evictable(frame_id, true);
        true
    }

    /// Writes `page_id` through the disk scheduler and clears its dirty flag,
    /// regardless of pin state. Returns `false` if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        self.write_frame(frame_id, page_id);
        state.metas[frame_id].is_dirty = false;
        true
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) {
        let mut state = self.state.lock();
        let resident: Vec<(PageId, FrameId)> = state
            .page_table
            .iter()
            .map(|(&page_id, &frame_id)| (page_id, frame_id))
            .collect();
        for (page_id, frame_id) in resident {
            self.write_frame(frame_id, page_id);
            state.metas[frame_id].is_dirty = false;
        }
    }

    /// Removes `page_id` from the pool and returns its frame to the free
    /// list.
    ///
    /// Returns `true` if the page was not resident to begin with, `false` if
    /// it is currently pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        if state.metas[frame_id].pin_count > 0 {
            return false;
        }
        state.replacer.remove(frame_id);
        state.page_table.remove(&page_id);
        state.metas[frame_id].reset();
        self.frames[frame_id].data().write().reset();
        state.free_list.push_back(frame_id);
        true
    }

    /// Current pin count of a resident page, or `None` if not resident.
    #[must_use]
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(state.metas[frame_id].pin_count)
    }

    /// Returns buffer pool statistics.
    #[must_use]
    pub fn stats(&self) -> BufferPoolStats {
        let state = self.state.lock();
        let mut pinned_pages = 0;
        let mut dirty_pages = 0;
        for &frame_id in state.page_table.values() {
            let meta = &state.metas[frame_id];
            if meta.pin_count > 0 {
                pinned_pages += 1;
            }
            if meta.is_dirty {
                dirty_pages += 1;
            }
        }
        BufferPoolStats {
            pool_size: self.pool_size,
            pages_used: state.page_table.len(),
            pinned_pages,
            dirty_pages,
            free_frames: state.free_list.len(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Resets the hit/miss/eviction counters.
    pub fn reset_stats(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    pub(crate) fn frame(&self, frame_id: FrameId) -> &FrameHeader {
        &self.frames[frame_id]
    }

    fn allocate_page(&self) -> PageId {
        PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst))
    }

    fn new_page_inner(&self) -> Option<(FrameId, PageId)> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = self.allocate_page();

        self.frames[frame_id].data().write().reset();
        let meta = &mut state.metas[frame_id];
        meta.page_id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;
        state.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);
        Some((frame_id, page_id))
    }

    /// Pins `page_id`, loading it from disk on a miss.
    fn pin_page(&self, page_id: PageId) -> Option<FrameId> {
        debug_assert!(page_id.is_valid(), "fetch of invalid page id");
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.metas[frame_id].pin_count += 1;
            state.replacer.record_access(frame_id);
            state.replacer.set_evictable(frame_id, false);
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Some(frame_id);
        }

        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        let frame_id = self.acquire_frame(&mut state)?;

        let meta = &mut state.metas[frame_id];
        meta.page_id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;
        state.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);

        // No guard can reference this frame yet, so the worker's exclusive
        // latch acquisition cannot block.
        self.read_frame(frame_id, page_id);
        Some(frame_id)
    }

    /// Pops a free frame, or evicts a victim (writing it out first if dirty).
    fn acquire_frame(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Some(frame_id);
        }

        let frame_id = state.replacer.evict()?;
        let (old_page_id, was_dirty) = {
            let meta = &state.metas[frame_id];
            debug_assert_eq!(meta.pin_count, 0, "evicted a pinned frame");
            (meta.page_id, meta.is_dirty)
        };
        state.page_table.remove(&old_page_id);
        if was_dirty {
            self.write_frame(frame_id, old_page_id);
            state.metas[frame_id].is_dirty = false;
        }
        self.evictions.fetch_add(1, Ordering::Relaxed);
        Some(frame_id)
    }

    /// Schedules a write of the frame's contents and awaits completion.
    fn write_frame(&self, frame_id: FrameId, page_id: PageId) {
        let (done, future) = DiskScheduler::create_completion();
        self.disk_scheduler.schedule(DiskRequest {
            is_write: true,
            data: self.frames[frame_id].share_data(),
            page_id,
            done,
        });
        future
            .wait()
            .expect("disk write failed; the storage engine cannot continue");
    }

    /// Schedules a read into the frame and awaits completion.
    fn read_frame(&self, frame_id: FrameId, page_id: PageId) {
        let (done, future) = DiskScheduler::create_completion();
        self.disk_scheduler.schedule(DiskRequest {
            is_write: false,
            data: self.frames[frame_id].share_data(),
            page_id,
            done,
        });
        future
            .wait()
            .expect("disk read failed; the storage engine cannot continue");
    }
}
