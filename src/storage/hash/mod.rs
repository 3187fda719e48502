//! Disk-backed extendible hash index.
//!
//! The index is built entirely out of buffer pool pages, reached only through
//! page guards:
//! - A single *header* page routes the top bits of a key's hash to a
//!   directory page
//! - Each *directory* page routes the low `global_depth` bits to a bucket
//!   page and tracks per-slot local depths
//! - *Bucket* pages store the `(key, value)` entries
//!
//! Buckets split (doubling the directory when needed) on overflow and merge
//! with their split image when emptied, shrinking the directory once no slot
//! uses its full depth.

mod bucket_page;
mod directory_page;
mod hash_function;
mod header_page;
mod table;

pub use bucket_page::{bucket_array_size, HashBucketMut, HashBucketRef};
pub use directory_page::{HashDirectoryPage, HASH_DIRECTORY_MAX_DEPTH};
pub use hash_function::{DefaultHashFunction, HashFunction};
pub use header_page::{HashHeaderPage, HASH_HEADER_MAX_DEPTH};
pub use table::ExtendibleHashTable;
