//! End-to-end buffer pool scenarios: pool exhaustion, eviction write-back,
//! binary page contents, and guard pin accounting.

use oxbow::{BufferPoolManager, FileDiskManager, MemoryDiskManager, PageId, PAGE_SIZE};
use rand::Rng;
use tempfile::TempDir;

const POOL_SIZE: usize = 10;
const REPLACER_K: usize = 5;

fn file_backed_bpm(temp_dir: &TempDir) -> BufferPoolManager {
    let db_path = temp_dir.path().join("test.db");
    let disk_manager = FileDiskManager::new(&db_path).expect("create disk manager");
    BufferPoolManager::new(POOL_SIZE, disk_manager, REPLACER_K).expect("create buffer pool")
}

#[test]
fn test_new_page_fills_pool_then_recovers() {
    let temp_dir = TempDir::new().unwrap();
    let bpm = file_backed_bpm(&temp_dir);

    // The buffer pool is empty: creating a page succeeds, and ids start at 0.
    let mut guard0 = bpm.new_page_guarded().expect("first page");
    let page0 = guard0.page_id();
    assert_eq!(page0, PageId::new(0));

    // Once we have a page, we can read and write its content.
    guard0.data_mut()[..5].copy_from_slice(b"Hello");
    assert_eq!(&guard0.data()[..5], b"Hello");

    // Fill the rest of the pool.
    let mut page_ids = vec![page0];
    for _ in 1..POOL_SIZE {
        let page_id = bpm.new_page().expect("pool not yet full");
        page_ids.push(page_id);
    }

    // Every frame is pinned: no further page can be created.
    for _ in 0..POOL_SIZE {
        assert_eq!(bpm.new_page(), None);
    }

    // Unpin pages {0..4}. Page 0's pin is owned by its guard.
    drop(guard0);
    for &page_id in &page_ids[1..5] {
        assert!(bpm.unpin_page(page_id, true));
        assert!(bpm.flush_page(page_id));
    }

    // Five frames are evictable again: five new pages succeed.
    for _ in 0..5 {
        let page_id = bpm.new_page().expect("evictable frame available");
        assert!(bpm.unpin_page(page_id, false));
    }

    // The data written long ago survives eviction.
    let guard0 = bpm.fetch_page_basic(page0).expect("fetch page 0");
    assert_eq!(&guard0.data()[..5], b"Hello");
}

#[test]
fn test_binary_data_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let bpm = file_backed_bpm(&temp_dir);

    let mut random_binary_data = [0u8; PAGE_SIZE];
    rand::thread_rng().fill(&mut random_binary_data[..]);
    // Embedded terminator bytes both in the middle and at the end.
    random_binary_data[PAGE_SIZE / 2] = 0;
    random_binary_data[PAGE_SIZE - 1] = 0;

    let mut guard0 = bpm.new_page_guarded().expect("first page");
    let page0 = guard0.page_id();
    guard0.data_mut().copy_from_slice(&random_binary_data);
    assert_eq!(&*guard0.data(), &random_binary_data[..]);

    let mut page_ids = vec![page0];
    for _ in 1..POOL_SIZE {
        page_ids.push(bpm.new_page().expect("pool not yet full"));
    }
    for _ in 0..POOL_SIZE {
        assert_eq!(bpm.new_page(), None);
    }

    drop(guard0);
    for &page_id in &page_ids[1..5] {
        assert!(bpm.unpin_page(page_id, true));
        assert!(bpm.flush_page(page_id));
    }
    assert!(bpm.flush_page(page0));

    for _ in 0..5 {
        let page_id = bpm.new_page().expect("evictable frame available");
        assert!(bpm.unpin_page(page_id, false));
    }

    // The page comes back from disk byte-for-byte, zeroes included.
    let guard0 = bpm.fetch_page_basic(page0).expect("fetch page 0");
    assert_eq!(&*guard0.data(), &random_binary_data[..]);
}

#[test]
fn test_guard_pin_accounting() {
    let bpm = BufferPoolManager::new(POOL_SIZE, MemoryDiskManager::new(), REPLACER_K).unwrap();

    let basic = bpm.new_page_guarded().expect("new page");
    let page = basic.page_id();
    assert_eq!(bpm.pin_count(page), Some(1));

    // A read guard on the same page raises the pin count to 2...
    let read = bpm.fetch_page_read(page).expect("fetch read");
    assert_eq!(bpm.pin_count(page), Some(2));

    // ...and dropping it restores 1.
    drop(read);
    assert_eq!(bpm.pin_count(page), Some(1));

    // Moving a guard does not change the pin count.
    let moved = basic;
    assert_eq!(bpm.pin_count(page), Some(1));

    // Moving a guard into a populated slot unpins the overwritten page.
    let mut slot = bpm.new_page_guarded().expect("second page");
    let other = slot.page_id();
    assert_eq!(bpm.pin_count(other), Some(1));
    slot = moved;
    assert_eq!(bpm.pin_count(other), Some(0));
    assert_eq!(bpm.pin_count(page), Some(1));

    drop(slot);
    assert_eq!(bpm.pin_count(page), Some(0));
}

#[test]
fn test_evictor_contract_all_pinned() {
    let bpm = BufferPoolManager::new(3, MemoryDiskManager::new(), 2).unwrap();

    let pages: Vec<PageId> = (0..3).map(|_| bpm.new_page().unwrap()).collect();
    assert_eq!(bpm.new_page(), None);

    assert!(bpm.unpin_page(pages[1], false));
    assert!(bpm.new_page().is_some());
    // The freed frame was reused; everything is pinned again.
    assert_eq!(bpm.new_page(), None);
}

#[test]
fn test_pin_conservation_across_fetches() {
    let bpm = BufferPoolManager::new(POOL_SIZE, MemoryDiskManager::new(), REPLACER_K).unwrap();

    let page = bpm.new_page().unwrap();
    assert_eq!(bpm.pin_count(page), Some(1));

    {
        let _a = bpm.fetch_page_basic(page).unwrap();
        let _b = bpm.fetch_page_read(page).unwrap();
        assert_eq!(bpm.pin_count(page), Some(3));
    }
    assert_eq!(bpm.pin_count(page), Some(1));

    assert!(bpm.unpin_page(page, false));
    assert_eq!(bpm.pin_count(page), Some(0));
    // Pin count never goes negative.
    assert!(!bpm.unpin_page(page, false));
    assert_eq!(bpm.pin_count(page), Some(0));
}

#[test]
fn test_dirty_page_written_before_frame_reuse() {
    let temp_dir = TempDir::new().unwrap();
    let bpm = file_backed_bpm(&temp_dir);

    // Dirty every frame, then unpin everything.
    let mut page_ids = Vec::new();
    for i in 0..POOL_SIZE {
        let mut guard = bpm.new_page_guarded().unwrap();
        guard.data_mut()[0] = i as u8;
        page_ids.push(guard.page_id());
    }

    // Evict all of them by allocating a full pool of new pages.
    for _ in 0..POOL_SIZE {
        let page_id = bpm.new_page().unwrap();
        bpm.unpin_page(page_id, false);
    }

    // Each evicted page was flushed on eviction and reads back intact.
    for (i, &page_id) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_basic(page_id).expect("fetch evicted page");
        assert_eq!(guard.data()[0], i as u8);
    }
}

#[test]
fn test_contents_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let page;

    {
        let disk_manager = FileDiskManager::new(&db_path).unwrap();
        let bpm = BufferPoolManager::new(4, disk_manager, 2).unwrap();
        let mut guard = bpm.new_page_guarded().unwrap();
        page = guard.page_id();
        guard.data_mut()[..4].copy_from_slice(&[9, 8, 7, 6]);
        drop(guard);
        assert!(bpm.flush_page(page));
        // Dropping the pool shuts the disk scheduler (and the file) down.
    }

    let disk_manager = FileDiskManager::new(&db_path).unwrap();
    let bpm = BufferPoolManager::new(4, disk_manager, 2).unwrap();
    let guard = bpm.fetch_page_basic(page).unwrap();
    assert_eq!(&guard.data()[..4], &[9, 8, 7, 6]);
}
