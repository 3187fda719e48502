//! Disk scheduler: a background worker that serialises page I/O.
//!
//! The buffer pool never talks to the disk manager directly. It enqueues
//! [`DiskRequest`]s and synchronously awaits their one-shot completions, so
//! all disk traffic is funnelled through a single worker thread that owns the
//! disk manager.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::RwLock;

use crate::error::{OxbowError, Result};
use crate::storage::page::{DiskManager, PageData, PageId};

/// A single read or write request against the backing store.
pub struct DiskRequest {
    /// `true` for a write (frame -> disk), `false` for a read (disk -> frame).
    pub is_write: bool,
    /// The frame buffer the request operates on. The worker takes the frame's
    /// own latch: shared for writes, exclusive for reads.
    pub data: Arc<RwLock<PageData>>,
    /// The on-disk page the request targets.
    pub page_id: PageId,
    /// One-shot completion, fulfilled after the I/O finishes.
    pub done: flume::Sender<Result<()>>,
}

/// Completion handle for a scheduled request.
pub struct DiskFuture {
    rx: flume::Receiver<Result<()>>,
}

impl DiskFuture {
    /// Blocks until the scheduled request completes.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the disk manager, or a storage error if the
    /// scheduler shut down before completing the request.
    pub fn wait(self) -> Result<()> {
        self.rx
            .recv()
            .map_err(|_| OxbowError::StorageError("disk scheduler shut down".into()))?
    }
}

/// Serialises page I/O onto a dedicated worker thread.
///
/// Dropping the scheduler closes the request queue; the worker drains
/// remaining requests, shuts the disk manager down, and is joined.
pub struct DiskScheduler {
    request_tx: Option<flume::Sender<DiskRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawns the worker thread, handing it ownership of the disk manager.
    pub fn new(disk_manager: impl DiskManager) -> Self {
        let (request_tx, request_rx) = flume::unbounded::<DiskRequest>();
        let worker = std::thread::Builder::new()
            .name("oxbow-disk-scheduler".into())
            .spawn(move || Self::run_worker(disk_manager, &request_rx))
            .expect("failed to spawn disk scheduler thread");

        Self {
            request_tx: Some(request_tx),
            worker: Some(worker),
        }
    }

    /// Creates a one-shot completion pair for a request.
    #[must_use]
    pub fn create_completion() -> (flume::Sender<Result<()>>, DiskFuture) {
        let (tx, rx) = flume::bounded(1);
        (tx, DiskFuture { rx })
    }

    /// Enqueues a request for the worker thread.
    pub fn schedule(&self, request: DiskRequest) {
        self.request_tx
            .as_ref()
            .and_then(|tx| tx.send(request).ok())
            .expect("disk scheduler queue is closed");
    }

    fn run_worker(mut disk_manager: impl DiskManager, request_rx: &flume::Receiver<DiskRequest>) {
        while let Ok(request) = request_rx.recv() {
            let result = if request.is_write {
                let data = request.data.read();
                disk_manager.write_page(request.page_id, data.as_slice())
            } else {
                let mut data = request.data.write();
                disk_manager.read_page(request.page_id, data.as_mut_slice())
            };
            // The requester may have given up waiting; that is not an error.
            let _ = request.done.send(result);
        }
        disk_manager.shutdown();
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        drop(self.request_tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
