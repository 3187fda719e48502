//! Buffer frames: in-memory slots for cached pages.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::storage::page::{PageData, PageId};

/// Index of a frame within the buffer pool, in `[0, pool_size)`.
pub type FrameId = usize;

/// The latched data half of a frame.
///
/// The `RwLock` is the frame's reader-writer latch: page guards hold it for
/// their lifetime, the buffer pool takes it transiently while re-initialising
/// an unpinned frame, and the disk scheduler's worker takes it for the
/// duration of each I/O against the frame. The buffer is shared with the
/// scheduler through the `Arc`.
#[derive(Debug)]
pub struct FrameHeader {
    frame_id: FrameId,
    data: Arc<RwLock<PageData>>,
}

impl FrameHeader {
    /// Creates an empty frame.
    #[must_use]
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            data: Arc::new(RwLock::new(PageData::new())),
        }
    }

    /// Index of this frame in the pool.
    #[must_use]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// The frame's latched page buffer.
    #[must_use]
    pub fn data(&self) -> &RwLock<PageData> {
        &self.data
    }

    /// Shares the page buffer with the disk scheduler.
    #[must_use]
    pub(crate) fn share_data(&self) -> Arc<RwLock<PageData>> {
        Arc::clone(&self.data)
    }
}

/// The bookkeeping half of a frame, guarded by the buffer pool's mutex.
#[derive(Debug)]
pub(crate) struct FrameMeta {
    /// Page resident in the frame, or `PageId::INVALID` for a free frame.
    pub page_id: PageId,
    /// Number of live users of the page. Only unpinned frames are evictable.
    pub pin_count: u32,
    /// Whether the in-memory page differs from its on-disk copy.
    pub is_dirty: bool,
}

impl FrameMeta {
    pub(crate) fn new() -> Self {
        Self {
            page_id: PageId::INVALID,
            pin_count: 0,
            is_dirty: false,
        }
    }

    /// Resets the slot to the free state.
    pub(crate) fn reset(&mut self) {
        self.page_id = PageId::INVALID;
        self.pin_count = 0;
        self.is_dirty = false;
    }
}
