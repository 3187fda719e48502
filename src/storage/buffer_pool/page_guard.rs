//! Scoped guards over pinned buffer pool pages.
//!
//! A guard owns exactly one pin on its page and releases it when dropped.
//! [`PageReadGuard`] and [`PageWriteGuard`] additionally hold the frame's
//! shared or exclusive latch for their whole lifetime; the basic [`PageGuard`]
//! takes the latch only transiently, per data access.
//!
//! Guards are move-only. Moving one transfers the pin; overwriting a guard
//! variable drops (and therefore unpins) the previous guard first. On drop,
//! Read/Write guards release the latch *before* unpinning, so a thread never
//! holds a frame latch while waiting on the buffer pool mutex.

use std::mem::size_of;

use bytemuck::Pod;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard,
};

use crate::storage::buffer_pool::{BufferPoolManager, FrameHeader};
use crate::storage::page::{PageData, PageId};

struct BasicInner<'a> {
    frame: &'a FrameHeader,
    page_id: PageId,
    is_dirty: bool,
}

/// A pinned page with no latch held.
///
/// Data accessors latch the frame for the duration of each call. Mutable
/// access marks the guard dirty; the accumulated dirty flag is passed to the
/// buffer pool on unpin (and carried through upgrades).
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    inner: Option<BasicInner<'a>>,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame_id: usize, page_id: PageId) -> Self {
        Self {
            bpm,
            inner: Some(BasicInner {
                frame: bpm.frame(frame_id),
                page_id,
                is_dirty: false,
            }),
        }
    }

    /// The id of the guarded page.
    #[must_use]
    pub fn page_id(&self) -> PageId {
        self.expect_inner().page_id
    }

    /// Read access to the page bytes, holding the shared latch for the
    /// lifetime of the returned view.
    #[must_use]
    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.expect_inner().frame.data().read(), PageData::as_slice)
    }

    /// Write access to the page bytes, holding the exclusive latch for the
    /// lifetime of the returned view. Marks the page dirty.
    pub fn data_mut(&mut self) -> MappedRwLockWriteGuard<'_, [u8]> {
        let inner = self.inner.as_mut().expect("access through an empty page guard");
        inner.is_dirty = true;
        RwLockWriteGuard::map(inner.frame.data().write(), PageData::as_mut_slice)
    }

    /// Reinterprets the page as a structured page type.
    #[must_use]
    pub fn as_page<T: Pod>(&self) -> MappedRwLockReadGuard<'_, T> {
        RwLockReadGuard::map(self.expect_inner().frame.data().read(), |data| {
            bytemuck::from_bytes(&data.as_slice()[..size_of::<T>()])
        })
    }

    /// Reinterprets the page as a mutable structured page type and marks it
    /// dirty.
    pub fn as_page_mut<T: Pod>(&mut self) -> MappedRwLockWriteGuard<'_, T> {
        let inner = self.inner.as_mut().expect("access through an empty page guard");
        inner.is_dirty = true;
        RwLockWriteGuard::map(inner.frame.data().write(), |data| {
            bytemuck::from_bytes_mut(&mut data.as_mut_slice()[..size_of::<T>()])
        })
    }

    /// Acquires the shared latch and converts into a [`PageReadGuard`],
    /// transferring the pin.
    #[must_use]
    pub fn upgrade_read(mut self) -> PageReadGuard<'a> {
        let inner = self.inner.take().expect("upgrade of an empty page guard");
        let latch = inner.frame.data().read();
        PageReadGuard {
            bpm: self.bpm,
            inner: Some(ReadInner {
                page_id: inner.page_id,
                is_dirty: inner.is_dirty,
                latch,
            }),
        }
    }

    /// Acquires the exclusive latch and converts into a [`PageWriteGuard`],
    /// transferring the pin.
    #[must_use]
    pub fn upgrade_write(mut self) -> PageWriteGuard<'a> {
        let inner = self.inner.take().expect("upgrade of an empty page guard");
        let latch = inner.frame.data().write();
        PageWriteGuard {
            bpm: self.bpm,
            inner: Some(WriteInner {
                page_id: inner.page_id,
                is_dirty: inner.is_dirty,
                latch,
            }),
        }
    }

    fn expect_inner(&self) -> &BasicInner<'a> {
        self.inner.as_ref().expect("access through an empty page guard")
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            self.bpm.unpin_page(inner.page_id, inner.is_dirty);
        }
    }
}

struct ReadInner<'a> {
    page_id: PageId,
    is_dirty: bool,
    latch: RwLockReadGuard<'a, PageData>,
}

/// A pinned page holding the frame's shared latch.
pub struct PageReadGuard<'a> {
    bpm: &'a BufferPoolManager,
    inner: Option<ReadInner<'a>>,
}

impl<'a> PageReadGuard<'a> {
    /// The id of the guarded page.
    #[must_use]
    pub fn page_id(&self) -> PageId {
        self.expect_inner().page_id
    }

    /// The page bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.expect_inner().latch.as_slice()
    }

    /// Reinterprets the page as a structured page type.
    #[must_use]
    pub fn as_page<T: Pod>(&self) -> &T {
        bytemuck::from_bytes(&self.data()[..size_of::<T>()])
    }

    fn expect_inner(&self) -> &ReadInner<'a> {
        self.inner.as_ref().expect("access through an empty page guard")
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let ReadInner {
                page_id,
                is_dirty,
                latch,
            } = inner;
            // Latch first, pin second: unpinning takes the pool mutex, and
            // the mutex holder may itself be waiting on this latch.
            drop(latch);
            self.bpm.unpin_page(page_id, is_dirty);
        }
    }
}

struct WriteInner<'a> {
    page_id: PageId,
    is_dirty: bool,
    latch: RwLockWriteGuard<'a, PageData>,
}

/// A pinned page holding the frame's exclusive latch.
pub struct PageWriteGuard<'a> {
    bpm: &'a BufferPoolManager,
    inner: Option<WriteInner<'a>>,
}

impl<'a> PageWriteGuard<'a> {
    /// The id of the guarded page.
    #[must_use]
    pub fn page_id(&self) -> PageId {
        self.expect_inner().page_id
    }

    /// The page bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.expect_inner().latch.as_slice()
    }

    /// Mutable page bytes. Marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let inner = self.inner.as_mut().expect("access through an empty page guard");
        inner.is_dirty = true;
        inner.latch.as_mut_slice()
    }

    /// Reinterprets the page as a structured page type.
    #[must_use]
    pub fn as_page<T: Pod>(&self) -> &T {
        bytemuck::from_bytes(&self.data()[..size_of::<T>()])
    }

    /// Reinterprets the page as a mutable structured page type and marks it
    /// dirty.
    pub fn as_page_mut<T: Pod>(&mut self) -> &mut T {
        let data = self.data_mut();
        bytemuck::from_bytes_mut(&mut data[..size_of::<T>()])
    }

    fn expect_inner(&self) -> &WriteInner<'a> {
        self.inner.as_ref().expect("access through an empty page guard")
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let WriteInner {
                page_id,
                is_dirty,
                latch,
            } = inner;
            drop(latch);
            self.bpm.unpin_page(page_id, is_dirty);
        }
    }
}
