//! Buffer pool benchmarks.
//!
//! Measures buffer pool performance for:
//! - Page allocation
//! - Cache-hit fetches through read guards
//! - Fetches under eviction pressure

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use oxbow::{BufferPoolManager, MemoryDiskManager, PageId};

fn bench_page_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_allocation");

    for pool_size in &[64usize, 256, 1024] {
        let bpm = BufferPoolManager::new(*pool_size, MemoryDiskManager::new(), 2)
            .expect("create buffer pool");

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(pool_size), pool_size, |b, _| {
            b.iter(|| {
                let page_id = bpm.new_page().expect("allocate page");
                bpm.unpin_page(page_id, false);
                black_box(page_id)
            });
        });
    }
    group.finish();
}

fn bench_cache_hit_fetch(c: &mut Criterion) {
    let bpm = BufferPoolManager::new(64, MemoryDiskManager::new(), 2).expect("create buffer pool");
    let page_id = bpm.new_page().expect("allocate page");
    bpm.unpin_page(page_id, false);

    c.bench_function("fetch_page_read_hit", |b| {
        b.iter(|| {
            let guard = bpm.fetch_page_read(page_id).expect("fetch page");
            black_box(guard.data()[0])
        });
    });
}

fn bench_fetch_under_eviction_pressure(c: &mut Criterion) {
    // Twice as many pages as frames: every other fetch evicts.
    let pool_size = 32;
    let bpm =
        BufferPoolManager::new(pool_size, MemoryDiskManager::new(), 2).expect("create buffer pool");
    let page_ids: Vec<PageId> = (0..pool_size * 2)
        .map(|_| {
            let page_id = bpm.new_page().expect("allocate page");
            bpm.unpin_page(page_id, false);
            page_id
        })
        .collect();

    c.bench_function("fetch_page_with_eviction", |b| {
        let mut next = 0;
        b.iter(|| {
            let page_id = page_ids[next % page_ids.len()];
            next += 1;
            let guard = bpm.fetch_page_basic(page_id).expect("fetch page");
            black_box(guard.page_id())
        });
    });
}

criterion_group!(
    benches,
    bench_page_allocation,
    bench_cache_hit_fetch,
    bench_fetch_under_eviction_pressure
);
criterion_main!(benches);
