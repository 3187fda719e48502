//! Page identifier type.

use bytemuck::{Pod, Zeroable};

/// Unique identifier for a page in the database file.
///
/// Page ids are allocated monotonically starting at 0. The sentinel
/// [`PageId::INVALID`] (`-1`) marks unallocated slots, e.g. empty directory
/// entries in the extendible hash index. `PageId` is `Pod` so it can be
/// embedded directly in byte-interpreted page layouts.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PageId(pub i32);

/// Sentinel id for "no page".
pub const INVALID_PAGE_ID: PageId = PageId(-1);

impl PageId {
    /// Sentinel id for "no page".
    pub const INVALID: PageId = INVALID_PAGE_ID;

    /// Creates a new page ID.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns whether this id refers to an allocated page.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Returns the byte offset of this page within the database file.
    ///
    /// Only meaningful for valid ids.
    #[must_use]
    pub const fn offset(self) -> u64 {
        (self.0 as u64) * (super::PAGE_SIZE as u64)
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Page({})", self.0)
    }
}
