//! oxbow - an educational relational database storage engine.
//!
//! The crate implements the storage-engine core of a relational database:
//!
//! - A **buffer pool manager** caching fixed-size disk pages in a fixed-size
//!   frame array, with pin counts, dirty tracking and write-back on eviction
//! - An **LRU-K replacer** choosing eviction victims
//! - Move-only **page guards** that scope pins and per-frame latches
//! - A disk-backed **extendible hash table** built entirely out of buffer
//!   pool pages
//! - A **persistent trie**: an immutable, structurally-shared key-value map
//!
//! Disk traffic goes through a [`storage::DiskScheduler`] worker backed by a
//! [`storage::DiskManager`] (file-based, or in-memory for tests).

pub mod error;
pub mod storage;
pub mod trie;

pub use error::{OxbowError, Result};
pub use storage::{
    BufferPoolManager, BufferPoolStats, DiskManager, ExtendibleHashTable, FileDiskManager,
    LruKReplacer, MemoryDiskManager, PageGuard, PageId, PageReadGuard, PageWriteGuard,
    Transaction, INVALID_PAGE_ID, PAGE_SIZE,
};
pub use trie::Trie;
