//! Directory page of the extendible hash index.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::storage::page::{PageId, PAGE_SIZE};

/// Maximum global depth such that the directory fits in one page.
pub const HASH_DIRECTORY_MAX_DEPTH: u32 = 9;

const DIRECTORY_ARRAY_SIZE: usize = 1 << HASH_DIRECTORY_MAX_DEPTH;

/// Routes the low `global_depth` bits of a hash to a bucket page.
///
/// Each slot carries a *local depth*: the number of low hash bits every key
/// in its bucket agrees on. Two slots share a bucket page exactly when they
/// agree on the bucket's local depth bits. Doubling copies the first half of
/// the slot array into the second; halving just drops the (then redundant)
/// upper half by decrementing `global_depth`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct HashDirectoryPage {
    max_depth: u32,
    global_depth: u32,
    bucket_page_ids: [PageId; DIRECTORY_ARRAY_SIZE],
    local_depths: [u8; DIRECTORY_ARRAY_SIZE],
}

const _: () = assert!(std::mem::size_of::<HashDirectoryPage>() <= PAGE_SIZE);

impl HashDirectoryPage {
    /// Initialises a freshly allocated directory page at global depth 0 with
    /// every bucket slot unallocated.
    ///
    /// # Panics
    ///
    /// Panics if `max_depth` exceeds [`HASH_DIRECTORY_MAX_DEPTH`].
    pub fn init(&mut self, max_depth: u32) {
        assert!(
            max_depth <= HASH_DIRECTORY_MAX_DEPTH,
            "directory max depth {max_depth} exceeds {HASH_DIRECTORY_MAX_DEPTH}"
        );
        self.max_depth = max_depth;
        self.global_depth = 0;
        self.bucket_page_ids = [PageId::INVALID; DIRECTORY_ARRAY_SIZE];
        self.local_depths = [0; DIRECTORY_ARRAY_SIZE];
    }

    /// Routes a hash to a bucket slot using its low `global_depth` bits.
    #[must_use]
    pub fn hash_to_bucket_index(&self, hash: u32) -> u32 {
        hash & self.global_depth_mask()
    }

    /// The bucket page at `bucket_idx`, or [`PageId::INVALID`].
    #[must_use]
    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        self.bucket_page_ids[bucket_idx as usize]
    }

    /// Points `bucket_idx` at a bucket page.
    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, page_id: PageId) {
        self.bucket_page_ids[bucket_idx as usize] = page_id;
    }

    /// Index of the bucket `bucket_idx` splits with (or merges into): the
    /// slot that differs only in the local depth's highest bit.
    ///
    /// Only meaningful while `local_depth(bucket_idx) > 0`.
    #[must_use]
    pub fn split_image_index(&self, bucket_idx: u32) -> u32 {
        let local_depth = self.local_depth(bucket_idx);
        debug_assert!(local_depth > 0, "split image of depth-0 bucket");
        (bucket_idx & self.local_depth_mask(bucket_idx)) ^ (1 << (local_depth - 1))
    }

    /// Current global depth.
    #[must_use]
    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Mask selecting the low `global_depth` bits.
    #[must_use]
    pub fn global_depth_mask(&self) -> u32 {
        (1 << self.global_depth) - 1
    }

    /// Local depth of the bucket at `bucket_idx`.
    #[must_use]
    pub fn local_depth(&self, bucket_idx: u32) -> u32 {
        u32::from(self.local_depths[bucket_idx as usize])
    }

    /// Mask selecting the low `local_depth(bucket_idx)` bits.
    #[must_use]
    pub fn local_depth_mask(&self, bucket_idx: u32) -> u32 {
        (1 << self.local_depth(bucket_idx)) - 1
    }

    /// Sets the local depth of the slot at `bucket_idx`.
    pub fn set_local_depth(&mut self, bucket_idx: u32, local_depth: u8) {
        self.local_depths[bucket_idx as usize] = local_depth;
    }

    /// Increments the local depth of the slot at `bucket_idx`.
    pub fn incr_local_depth(&mut self, bucket_idx: u32) {
        self.local_depths[bucket_idx as usize] += 1;
    }

    /// Decrements the local depth of the slot at `bucket_idx`.
    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        self.local_depths[bucket_idx as usize] -= 1;
    }

    /// Doubles the directory: the new upper half mirrors the lower half,
    /// bucket ids and local depths alike.
    ///
    /// # Panics
    ///
    /// Panics if the directory is already at `max_depth`.
    pub fn incr_global_depth(&mut self) {
        assert!(
            self.global_depth < self.max_depth,
            "directory already at max depth {}",
            self.max_depth
        );
        let old_size = self.size() as usize;
        self.global_depth += 1;
        for i in old_size..self.size() as usize {
            self.bucket_page_ids[i] = self.bucket_page_ids[i - old_size];
            self.local_depths[i] = self.local_depths[i - old_size];
        }
    }

    /// Halves the directory. Slots beyond the new size become unreachable.
    ///
    /// # Panics
    ///
    /// Panics if the global depth is already 0.
    pub fn decr_global_depth(&mut self) {
        assert!(self.global_depth > 0, "directory already at depth 0");
        self.global_depth -= 1;
    }

    /// Whether the directory can halve: true when `global_depth > 0` and no
    /// reachable slot uses its full depth.
    #[must_use]
    pub fn can_shrink(&self) -> bool {
        if self.global_depth == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.local_depth(i) < self.global_depth)
    }

    /// Number of reachable slots (`2^global_depth`).
    #[must_use]
    pub fn size(&self) -> u32 {
        1 << self.global_depth
    }

    /// Number of addressable slots (`2^max_depth`).
    #[must_use]
    pub fn max_size(&self) -> u32 {
        1 << self.max_depth
    }

    /// The depth this directory was initialised with.
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Asserts the directory's structural invariants:
    /// - every reachable slot's local depth is at most the global depth
    /// - all slots sharing a bucket page agree on its local depth
    /// - a bucket of local depth `d` is referenced by exactly
    ///   `2^(global_depth - d)` slots
    ///
    /// # Panics
    ///
    /// Panics when an invariant is violated.
    pub fn verify_integrity(&self) {
        // page id -> (slot count, local depth of first sighting)
        let mut seen: HashMap<PageId, (u32, u32)> = HashMap::new();

        for i in 0..self.size() {
            let local_depth = self.local_depth(i);
            assert!(
                local_depth <= self.global_depth,
                "slot {i}: local depth {local_depth} exceeds global depth {}",
                self.global_depth
            );
            let page_id = self.bucket_page_id(i);
            if !page_id.is_valid() {
                continue;
            }
            let entry = seen.entry(page_id).or_insert((0, local_depth));
            entry.0 += 1;
            assert_eq!(
                entry.1, local_depth,
                "bucket {page_id} referenced with differing local depths"
            );
        }

        for (page_id, (count, local_depth)) in seen {
            assert_eq!(
                count,
                1 << (self.global_depth - local_depth),
                "bucket {page_id} at depth {local_depth} has wrong slot count"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_directory(max_depth: u32) -> HashDirectoryPage {
        let mut directory = HashDirectoryPage::zeroed();
        directory.init(max_depth);
        directory
    }

    #[test]
    fn test_init_state() {
        let directory = make_directory(3);
        assert_eq!(directory.global_depth(), 0);
        assert_eq!(directory.size(), 1);
        assert_eq!(directory.max_size(), 8);
        assert_eq!(directory.bucket_page_id(0), PageId::INVALID);
        assert!(!directory.can_shrink());
    }

    #[test]
    fn test_routing_uses_low_bits() {
        let mut directory = make_directory(3);
        directory.incr_global_depth();
        directory.incr_global_depth();
        assert_eq!(directory.global_depth_mask(), 0b11);
        assert_eq!(directory.hash_to_bucket_index(0b1010_0110), 0b10);
        assert_eq!(directory.hash_to_bucket_index(0b0000_0101), 0b01);
    }

    #[test]
    fn test_doubling_mirrors_lower_half() {
        let mut directory = make_directory(3);
        directory.set_bucket_page_id(0, PageId::new(10));
        directory.set_local_depth(0, 0);

        directory.incr_global_depth();
        assert_eq!(directory.size(), 2);
        assert_eq!(directory.bucket_page_id(1), PageId::new(10));
        assert_eq!(directory.local_depth(1), 0);
        directory.verify_integrity();
    }

    #[test]
    fn test_split_image_index() {
        let mut directory = make_directory(3);
        directory.incr_global_depth();
        directory.incr_global_depth();

        directory.set_local_depth(0b01, 2);
        assert_eq!(directory.split_image_index(0b01), 0b11);
        directory.set_local_depth(0b11, 2);
        assert_eq!(directory.split_image_index(0b11), 0b01);

        // At local depth 1 only the lowest bit participates.
        directory.set_local_depth(0b10, 1);
        assert_eq!(directory.split_image_index(0b10), 0b1);
    }

    #[test]
    fn test_can_shrink_and_halve() {
        let mut directory = make_directory(3);
        directory.set_bucket_page_id(0, PageId::new(5));
        directory.incr_global_depth();

        // Both slots share the depth-0 bucket: the doubling was unnecessary.
        assert!(directory.can_shrink());
        directory.decr_global_depth();
        assert_eq!(directory.global_depth(), 0);

        // A slot at full depth pins the directory size.
        directory.incr_global_depth();
        directory.set_bucket_page_id(1, PageId::new(6));
        directory.set_local_depth(0, 1);
        directory.set_local_depth(1, 1);
        assert!(!directory.can_shrink());
    }

    #[test]
    #[should_panic(expected = "max depth")]
    fn test_doubling_past_max_depth_panics() {
        let mut directory = make_directory(1);
        directory.incr_global_depth();
        directory.incr_global_depth();
    }

    #[test]
    #[should_panic(expected = "wrong slot count")]
    fn test_verify_integrity_catches_bad_mapping() {
        let mut directory = make_directory(2);
        directory.incr_global_depth();
        // Claim depth 1 for slot 0's bucket but point both slots at it.
        directory.set_bucket_page_id(0, PageId::new(4));
        directory.set_bucket_page_id(1, PageId::new(4));
        directory.set_local_depth(0, 1);
        directory.set_local_depth(1, 1);
        directory.verify_integrity();
    }
}
