//! The disk-backed extendible hash table.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;

use crate::error::{OxbowError, Result};
use crate::storage::buffer_pool::{BufferPoolManager, PageWriteGuard};
use crate::storage::hash::{
    bucket_array_size, DefaultHashFunction, HashBucketMut, HashBucketRef, HashDirectoryPage,
    HashFunction, HashHeaderPage, HASH_DIRECTORY_MAX_DEPTH, HASH_HEADER_MAX_DEPTH,
};
use crate::storage::page::PageId;
use crate::storage::Transaction;

/// A persistent extendible hash index over buffer pool pages.
///
/// All page access goes through page guards obtained from the buffer pool,
/// with lock crabbing from header to directory to bucket: a parent's latch is
/// released as soon as the child's is held, except that structural changes
/// (splits, merges, shrinks) keep the directory write latch for their whole
/// duration, so at most one writer restructures a directory at a time.
///
/// Keys need `Pod + Eq` (fixed-size, byte-comparable storage); values need
/// `Pod`. The hash function is injectable, mainly so tests can force
/// collisions.
pub struct ExtendibleHashTable<K, V, H = DefaultHashFunction> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    hash_fn: H,
    header_max_depth: u32,
    directory_max_depth: u32,
    bucket_max_size: u32,
    header_page_id: PageId,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, H> ExtendibleHashTable<K, V, H>
where
    K: Pod + Eq,
    V: Pod,
    H: HashFunction<K>,
{
    /// Creates the index, allocating and initialising its header page.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer pool cannot supply the header page.
    ///
    /// # Panics
    ///
    /// Panics if a depth exceeds its page-imposed limit or the bucket
    /// capacity does not fit a page (programmer error).
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        hash_fn: H,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        assert!(header_max_depth <= HASH_HEADER_MAX_DEPTH);
        assert!(directory_max_depth <= HASH_DIRECTORY_MAX_DEPTH);
        assert!(
            bucket_max_size > 0 && bucket_max_size as usize <= bucket_array_size::<K, V>(),
            "bucket capacity must fit a page"
        );

        let header_page_id = {
            let Some(guard) = bpm.new_page_guarded() else {
                return Err(OxbowError::BufferPoolError(
                    "no frame available for hash table header".into(),
                ));
            };
            let mut header_guard = guard.upgrade_write();
            header_guard
                .as_page_mut::<HashHeaderPage>()
                .init(header_max_depth);
            header_guard.page_id()
        };

        Ok(Self {
            index_name: index_name.into(),
            bpm,
            hash_fn,
            header_max_depth,
            directory_max_depth,
            bucket_max_size,
            header_page_id,
            _marker: PhantomData,
        })
    }

    /// Name this index was created under.
    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Page id of the index's header page.
    #[must_use]
    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// The header depth this index was created with.
    #[must_use]
    pub fn header_max_depth(&self) -> u32 {
        self.header_max_depth
    }

    /// Looks up `key`, appending its value to `result`.
    ///
    /// Returns `true` iff the key was found.
    pub fn get_value(&self, key: &K, result: &mut Vec<V>, _txn: Option<&Transaction>) -> bool {
        let hash = self.hash_fn.hash_key(key);

        let Some(header_guard) = self.bpm.fetch_page_read(self.header_page_id) else {
            return false;
        };
        let directory_page_id = {
            let header = header_guard.as_page::<HashHeaderPage>();
            header.directory_page_id(header.hash_to_directory_index(hash))
        };
        if !directory_page_id.is_valid() {
            return false;
        }
        let Some(directory_guard) = self.bpm.fetch_page_read(directory_page_id) else {
            return false;
        };
        drop(header_guard);

        let bucket_page_id = {
            let directory = directory_guard.as_page::<HashDirectoryPage>();
            directory.bucket_page_id(directory.hash_to_bucket_index(hash))
        };
        if !bucket_page_id.is_valid() {
            return false;
        }
        let Some(bucket_guard) = self.bpm.fetch_page_read(bucket_page_id) else {
            return false;
        };
        drop(directory_guard);

        match HashBucketRef::<K, V>::new(bucket_guard.data()).lookup(key) {
            Some(value) => {
                result.push(value);
                true
            }
            None => false,
        }
    }

    /// Inserts `(key, value)`.
    ///
    /// Returns `false` on a duplicate key, or when the index is out of
    /// capacity (directory at max depth with a full bucket, or the buffer
    /// pool exhausted).
    pub fn insert(&self, key: K, value: V, _txn: Option<&Transaction>) -> bool {
        let hash = self.hash_fn.hash_key(&key);

        let Some(mut header_guard) = self.bpm.fetch_page_write(self.header_page_id) else {
            return false;
        };
        let (directory_idx, directory_page_id) = {
            let header = header_guard.as_page::<HashHeaderPage>();
            let idx = header.hash_to_directory_index(hash);
            (idx, header.directory_page_id(idx))
        };
        if !directory_page_id.is_valid() {
            return self.insert_to_new_directory(&mut header_guard, directory_idx, hash, key, value);
        }

        let Some(mut directory_guard) = self.bpm.fetch_page_write(directory_page_id) else {
            return false;
        };
        drop(header_guard);

        let mut bucket_idx = {
            let directory = directory_guard.as_page::<HashDirectoryPage>();
            directory.hash_to_bucket_index(hash)
        };
        let mut bucket_page_id = directory_guard
            .as_page::<HashDirectoryPage>()
            .bucket_page_id(bucket_idx);
        if !bucket_page_id.is_valid() {
            return self.insert_to_new_bucket(&mut directory_guard, bucket_idx, key, value);
        }

        let Some(mut bucket_guard) = self.bpm.fetch_page_write(bucket_page_id) else {
            return false;
        };
        if HashBucketRef::<K, V>::new(bucket_guard.data())
            .lookup(&key)
            .is_some()
        {
            return false;
        }

        // Split until the routed bucket has room.
        while HashBucketRef::<K, V>::new(bucket_guard.data()).is_full() {
            let (global_depth, local_depth) = {
                let directory = directory_guard.as_page::<HashDirectoryPage>();
                (directory.global_depth(), directory.local_depth(bucket_idx))
            };
            if local_depth == global_depth {
                if global_depth == self.directory_max_depth {
                    // Directory cannot grow further: out of capacity.
                    return false;
                }
                directory_guard
                    .as_page_mut::<HashDirectoryPage>()
                    .incr_global_depth();
            }

            let Some(new_guard) = self.bpm.new_page_guarded() else {
                return false;
            };
            let mut new_bucket_guard = new_guard.upgrade_write();
            let new_bucket_page_id = new_bucket_guard.page_id();
            HashBucketMut::<K, V>::init(new_bucket_guard.data_mut(), self.bucket_max_size);

            let (new_bucket_idx, local_depth_mask) = {
                let directory = directory_guard.as_page_mut::<HashDirectoryPage>();
                directory.incr_local_depth(bucket_idx);
                let new_local_depth = directory.local_depth(bucket_idx);
                let mask = directory.local_depth_mask(bucket_idx);
                Self::update_directory_mapping(
                    directory,
                    bucket_idx,
                    new_bucket_page_id,
                    new_local_depth,
                    mask,
                );
                (bucket_idx & (mask >> 1), mask)
            };
            self.migrate_entries(
                &mut bucket_guard,
                &mut new_bucket_guard,
                new_bucket_idx,
                local_depth_mask,
            );

            // Re-route the hash: the insert target may be either half.
            let routed_page_id = {
                let directory = directory_guard.as_page::<HashDirectoryPage>();
                bucket_idx = directory.hash_to_bucket_index(hash);
                directory.bucket_page_id(bucket_idx)
            };
            if routed_page_id != bucket_page_id {
                debug_assert_eq!(routed_page_id, new_bucket_page_id);
                bucket_guard = new_bucket_guard;
                bucket_page_id = routed_page_id;
            }
        }

        HashBucketMut::<K, V>::new(bucket_guard.data_mut()).insert(key, value)
    }

    /// Removes `key`.
    ///
    /// Returns `true` iff the key was present. Emptied buckets merge with
    /// their split image when depths allow, cascading; the directory shrinks
    /// while no slot uses its full depth.
    pub fn remove(&self, key: &K, _txn: Option<&Transaction>) -> bool {
        let hash = self.hash_fn.hash_key(key);

        let Some(header_guard) = self.bpm.fetch_page_read(self.header_page_id) else {
            return false;
        };
        let directory_page_id = {
            let header = header_guard.as_page::<HashHeaderPage>();
            header.directory_page_id(header.hash_to_directory_index(hash))
        };
        if !directory_page_id.is_valid() {
            return false;
        }
        let Some(mut directory_guard) = self.bpm.fetch_page_write(directory_page_id) else {
            return false;
        };
        drop(header_guard);

        let mut bucket_idx = {
            let directory = directory_guard.as_page::<HashDirectoryPage>();
            directory.hash_to_bucket_index(hash)
        };
        let mut bucket_page_id = directory_guard
            .as_page::<HashDirectoryPage>()
            .bucket_page_id(bucket_idx);
        if !bucket_page_id.is_valid() {
            return false;
        }
        let Some(mut bucket_guard) = self.bpm.fetch_page_write(bucket_page_id) else {
            return false;
        };

        let removed = HashBucketMut::<K, V>::new(bucket_guard.data_mut()).remove(key);

        // Merge cascade: while the current bucket is empty, fold it into its
        // split image and move on to the merged bucket's neighbour.
        while HashBucketRef::<K, V>::new(bucket_guard.data()).is_empty() {
            drop(bucket_guard);

            let (local_depth, image_idx) = {
                let directory = directory_guard.as_page::<HashDirectoryPage>();
                let local_depth = directory.local_depth(bucket_idx);
                if local_depth == 0 {
                    break;
                }
                (local_depth, directory.split_image_index(bucket_idx))
            };
            let (image_local_depth, image_page_id) = {
                let directory = directory_guard.as_page::<HashDirectoryPage>();
                (
                    directory.local_depth(image_idx),
                    directory.bucket_page_id(image_idx),
                )
            };
            if image_local_depth != local_depth {
                break;
            }

            let new_local_depth = local_depth - 1;
            {
                let directory = directory_guard.as_page_mut::<HashDirectoryPage>();
                let start = bucket_idx & (directory.local_depth_mask(bucket_idx) >> 1);
                let step = 1u32 << new_local_depth;
                let mut i = start;
                while i < directory.size() {
                    directory.set_bucket_page_id(i, image_page_id);
                    directory.set_local_depth(i, new_local_depth as u8);
                    i += step;
                }
            }
            self.bpm.delete_page(bucket_page_id);

            if new_local_depth == 0 {
                break;
            }
            let (next_idx, next_page_id) = {
                let directory = directory_guard.as_page::<HashDirectoryPage>();
                let next_idx = directory.split_image_index(image_idx);
                (next_idx, directory.bucket_page_id(next_idx))
            };
            if !next_page_id.is_valid() {
                break;
            }
            let Some(guard) = self.bpm.fetch_page_write(next_page_id) else {
                break;
            };
            bucket_guard = guard;
            bucket_idx = next_idx;
            bucket_page_id = next_page_id;
        }

        {
            let directory = directory_guard.as_page_mut::<HashDirectoryPage>();
            while directory.can_shrink() {
                directory.decr_global_depth();
            }
        }

        removed
    }

    /// Walks the whole index and asserts its structural invariants: the
    /// per-directory depth/mapping rules, and that every stored key hashes
    /// into the bucket that holds it.
    ///
    /// # Panics
    ///
    /// Panics when an invariant is violated, or when the buffer pool cannot
    /// supply a frame for the walk.
    pub fn verify_integrity(&self) {
        let header_guard = self
            .bpm
            .fetch_page_read(self.header_page_id)
            .expect("no frame available to verify header");
        let header = header_guard.as_page::<HashHeaderPage>();

        for directory_idx in 0..header.max_size() {
            let directory_page_id = header.directory_page_id(directory_idx);
            if !directory_page_id.is_valid() {
                continue;
            }
            let directory_guard = self
                .bpm
                .fetch_page_read(directory_page_id)
                .expect("no frame available to verify directory");
            let directory = directory_guard.as_page::<HashDirectoryPage>();
            directory.verify_integrity();

            let mut verified = std::collections::HashSet::new();
            for bucket_idx in 0..directory.size() {
                let bucket_page_id = directory.bucket_page_id(bucket_idx);
                if !bucket_page_id.is_valid() || !verified.insert(bucket_page_id) {
                    continue;
                }
                let bucket_guard = self
                    .bpm
                    .fetch_page_read(bucket_page_id)
                    .expect("no frame available to verify bucket");
                let bucket = HashBucketRef::<K, V>::new(bucket_guard.data());
                let mask = directory.local_depth_mask(bucket_idx);
                for slot in 0..bucket.size() {
                    let key = bucket.key_at(slot);
                    assert_eq!(
                        self.hash_fn.hash_key(&key) & mask,
                        bucket_idx & mask,
                        "key in bucket {bucket_page_id} does not match its slot pattern"
                    );
                }
            }
        }
    }

    fn insert_to_new_directory(
        &self,
        header_guard: &mut PageWriteGuard<'_>,
        directory_idx: u32,
        hash: u32,
        key: K,
        value: V,
    ) -> bool {
        let Some(guard) = self.bpm.new_page_guarded() else {
            return false;
        };
        let mut directory_guard = guard.upgrade_write();
        let directory_page_id = directory_guard.page_id();
        directory_guard
            .as_page_mut::<HashDirectoryPage>()
            .init(self.directory_max_depth);
        header_guard
            .as_page_mut::<HashHeaderPage>()
            .set_directory_page_id(directory_idx, directory_page_id);

        let bucket_idx = directory_guard
            .as_page::<HashDirectoryPage>()
            .hash_to_bucket_index(hash);
        self.insert_to_new_bucket(&mut directory_guard, bucket_idx, key, value)
    }

    fn insert_to_new_bucket(
        &self,
        directory_guard: &mut PageWriteGuard<'_>,
        bucket_idx: u32,
        key: K,
        value: V,
    ) -> bool {
        let Some(guard) = self.bpm.new_page_guarded() else {
            return false;
        };
        let mut bucket_guard = guard.upgrade_write();
        let bucket_page_id = bucket_guard.page_id();
        HashBucketMut::<K, V>::init(bucket_guard.data_mut(), self.bucket_max_size);

        {
            let directory = directory_guard.as_page_mut::<HashDirectoryPage>();
            directory.set_bucket_page_id(bucket_idx, bucket_page_id);
            directory.set_local_depth(bucket_idx, 0);
        }
        HashBucketMut::<K, V>::new(bucket_guard.data_mut()).insert(key, value)
    }

    /// After a split, repoints every slot that agreed with the old bucket on
    /// its previous depth: slots whose new depth bit is 0 take the new
    /// bucket; slots with the bit set keep the old one. All affected slots
    /// get the new local depth.
    fn update_directory_mapping(
        directory: &mut HashDirectoryPage,
        old_bucket_idx: u32,
        new_bucket_page_id: PageId,
        new_local_depth: u32,
        local_depth_mask: u32,
    ) {
        let new_first_idx = old_bucket_idx & (local_depth_mask >> 1);
        let mut image_idx = new_first_idx | (1 << (new_local_depth - 1));
        let step = 1u32 << new_local_depth;

        let mut i = new_first_idx;
        while i < directory.size() {
            directory.set_bucket_page_id(i, new_bucket_page_id);
            directory.set_local_depth(i, new_local_depth as u8);
            directory.set_local_depth(image_idx, new_local_depth as u8);
            i += step;
            image_idx += step;
        }
    }

    /// Moves every entry whose masked hash routes to the new bucket.
    fn migrate_entries(
        &self,
        old_bucket_guard: &mut PageWriteGuard<'_>,
        new_bucket_guard: &mut PageWriteGuard<'_>,
        new_bucket_idx: u32,
        local_depth_mask: u32,
    ) {
        let mut old_bucket = HashBucketMut::<K, V>::new(old_bucket_guard.data_mut());
        let mut new_bucket = HashBucketMut::<K, V>::new(new_bucket_guard.data_mut());

        let mut slot = 0;
        while slot < old_bucket.size() {
            let (key, value) = old_bucket.as_ref().entry_at(slot);
            if (self.hash_fn.hash_key(&key) & local_depth_mask) == new_bucket_idx {
                new_bucket.insert(key, value);
                old_bucket.remove_at(slot);
            } else {
                slot += 1;
            }
        }
    }
}

impl<K, V, H> std::fmt::Debug for ExtendibleHashTable<K, V, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendibleHashTable")
            .field("index_name", &self.index_name)
            .field("header_page_id", &self.header_page_id)
            .field("header_max_depth", &self.header_max_depth)
            .field("directory_max_depth", &self.directory_max_depth)
            .field("bucket_max_size", &self.bucket_max_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::MemoryDiskManager;

    fn make_table(
        bucket_max_size: u32,
    ) -> ExtendibleHashTable<u32, u64, DefaultHashFunction> {
        let bpm = Arc::new(BufferPoolManager::new(32, MemoryDiskManager::new(), 2).unwrap());
        ExtendibleHashTable::new("test_index", bpm, DefaultHashFunction, 2, 3, bucket_max_size)
            .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let table = make_table(4);
        assert!(table.insert(1, 100, None));
        assert!(table.insert(2, 200, None));

        let mut result = Vec::new();
        assert!(table.get_value(&1, &mut result, None));
        assert_eq!(result, vec![100]);

        result.clear();
        assert!(table.get_value(&2, &mut result, None));
        assert_eq!(result, vec![200]);

        result.clear();
        assert!(!table.get_value(&3, &mut result, None));
        assert!(result.is_empty());
        table.verify_integrity();
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let table = make_table(4);
        assert!(table.insert(1, 100, None));
        assert!(!table.insert(1, 999, None));

        let mut result = Vec::new();
        assert!(table.get_value(&1, &mut result, None));
        assert_eq!(result, vec![100]);
    }

    #[test]
    fn test_remove_present_and_absent() {
        let table = make_table(4);
        assert!(table.insert(1, 100, None));
        assert!(table.remove(&1, None));
        assert!(!table.remove(&1, None));

        let mut result = Vec::new();
        assert!(!table.get_value(&1, &mut result, None));
        table.verify_integrity();
    }

    #[test]
    fn test_growth_under_load() {
        let table = make_table(4);
        for key in 0..16u32 {
            assert!(table.insert(key, u64::from(key) * 10, None), "insert {key}");
            table.verify_integrity();
        }
        for key in 0..16u32 {
            let mut result = Vec::new();
            assert!(table.get_value(&key, &mut result, None), "lookup {key}");
            assert_eq!(result, vec![u64::from(key) * 10]);
        }
    }

    #[test]
    fn test_churn_insert_remove_all() {
        let table = make_table(4);
        for key in 0..16u32 {
            assert!(table.insert(key, 1, None));
        }
        for key in 0..16u32 {
            assert!(table.remove(&key, None), "remove {key}");
            table.verify_integrity();
        }
        for key in 0..16u32 {
            let mut result = Vec::new();
            assert!(!table.get_value(&key, &mut result, None));
        }
        // Everything was removed: the table accepts the keys again.
        for key in 0..16u32 {
            assert!(table.insert(key, 2, None));
        }
    }

    #[test]
    fn test_index_metadata() {
        let table = make_table(4);
        assert_eq!(table.index_name(), "test_index");
        assert_eq!(table.header_max_depth(), 2);
        assert!(table.header_page_id().is_valid());
    }
}
