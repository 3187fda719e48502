//! Page-level storage primitives.
//!
//! This module defines the building blocks underneath the buffer pool:
//! - [`PageId`]: Unique identifier for a page
//! - [`PageData`]: Fixed-size page buffer (4KB)
//! - [`DiskManager`]: Page I/O abstraction, with file and in-memory backends
//! - [`DiskScheduler`]: Background worker that serialises disk requests

mod disk_manager;
mod disk_scheduler;
mod page_id;

pub use disk_manager::{DiskManager, FileDiskManager, MemoryDiskManager};
pub use disk_scheduler::{DiskFuture, DiskRequest, DiskScheduler};
pub use page_id::{PageId, INVALID_PAGE_ID};

/// Page size in bytes (4KB).
pub const PAGE_SIZE: usize = 4096;

/// A fixed-size page buffer.
///
/// The buffer is 8-byte aligned so that structured page layouts (hash header,
/// directory and bucket pages) can be reinterpreted in place with `bytemuck`
/// casts.
#[repr(C, align(8))]
#[derive(Clone)]
pub struct PageData([u8; PAGE_SIZE]);

impl PageData {
    /// Creates a zero-filled page buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self([0u8; PAGE_SIZE])
    }

    /// Returns a read-only view of the page bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns a mutable view of the page bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Resets every byte to zero.
    pub fn reset(&mut self) {
        self.0.fill(0);
    }
}

impl Default for PageData {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for PageData {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for PageData {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl std::fmt::Debug for PageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageData")
            .field("len", &self.0.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_data_starts_zeroed() {
        let data = PageData::new();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_data_reset() {
        let mut data = PageData::new();
        data.as_mut_slice()[0] = 0xAB;
        data.as_mut_slice()[PAGE_SIZE - 1] = 0xCD;

        data.reset();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_data_alignment() {
        // Structured page casts rely on 8-byte alignment of the buffer.
        assert_eq!(std::mem::align_of::<PageData>(), 8);
        assert_eq!(std::mem::size_of::<PageData>(), PAGE_SIZE);
    }
}
