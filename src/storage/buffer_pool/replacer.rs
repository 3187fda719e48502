//! LRU-K replacement policy for the buffer pool.
//!
//! Frames with fewer than K recorded accesses have no reliable K-distance and
//! are preferred victims, ranked by plain recency. Frames with at least K
//! accesses are only considered once no under-K frame is evictable, again in
//! least-recently-used order.

use std::collections::{HashMap, VecDeque};

use crate::storage::buffer_pool::FrameId;

#[derive(Debug)]
struct LruKNode {
    access_count: usize,
    is_evictable: bool,
}

/// LRU-K replacer over a fixed set of frames.
///
/// Tracks which frames are candidates for eviction and picks victims by the
/// LRU-K policy. Not internally synchronised: the buffer pool manager guards
/// it with its own mutex.
#[derive(Debug)]
pub struct LruKReplacer {
    /// Per-frame access state. A frame appears here from its first recorded
    /// access until it is evicted or removed.
    node_store: HashMap<FrameId, LruKNode>,
    /// Frames with fewer than `k` accesses, front = most recently used.
    young: VecDeque<FrameId>,
    /// Frames with at least `k` accesses, front = most recently used.
    mature: VecDeque<FrameId>,
    /// Number of frames currently evictable.
    curr_size: usize,
    /// Total number of frames the replacer may be asked about.
    num_frames: usize,
    k: usize,
}

impl LruKReplacer {
    /// Creates a replacer for `num_frames` frames with the given `k`.
    #[must_use]
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "LRU-K requires k > 0");
        Self {
            node_store: HashMap::with_capacity(num_frames),
            young: VecDeque::new(),
            mature: VecDeque::new(),
            curr_size: 0,
            num_frames,
            k,
        }
    }

    /// Records an access to `frame_id`.
    ///
    /// The first access enters the frame into the young list; the k-th access
    /// promotes it to the mature list. Every access moves the frame to the
    /// front of its list.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is out of range.
    pub fn record_access(&mut self, frame_id: FrameId) {
        self.check_frame(frame_id);

        let node = self.node_store.entry(frame_id).or_insert_with(|| {
            self.young.push_front(frame_id);
            LruKNode {
                access_count: 0,
                is_evictable: false,
            }
        });
        node.access_count += 1;
        let count = node.access_count;

        if count == self.k {
            detach(&mut self.young, frame_id);
            self.mature.push_front(frame_id);
        } else if count > self.k {
            detach(&mut self.mature, frame_id);
            self.mature.push_front(frame_id);
        } else if count > 1 {
            detach(&mut self.young, frame_id);
            self.young.push_front(frame_id);
        }
    }

    /// Marks `frame_id` evictable or pinned. Idempotent; a no-op for frames
    /// with no recorded access.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is out of range.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        self.check_frame(frame_id);

        let Some(node) = self.node_store.get_mut(&frame_id) else {
            return;
        };
        if node.is_evictable == evictable {
            return;
        }
        node.is_evictable = evictable;
        if evictable {
            self.curr_size += 1;
        } else {
            self.curr_size -= 1;
        }
    }

    /// Selects and removes a victim frame, or returns `None` if no frame is
    /// evictable.
    ///
    /// Under-K frames are tried first in LRU order; mature frames only when
    /// no young frame qualifies.
    pub fn evict(&mut self) -> Option<FrameId> {
        if self.curr_size == 0 {
            return None;
        }

        let victim = Self::find_lru_evictable(&self.young, &self.node_store)
            .or_else(|| Self::find_lru_evictable(&self.mature, &self.node_store))?;

        detach(&mut self.young, victim);
        detach(&mut self.mature, victim);
        self.node_store.remove(&victim);
        self.curr_size -= 1;
        Some(victim)
    }

    /// Drops all access history for `frame_id`. No-op for untracked frames.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is out of range, or if the frame is tracked but
    /// not evictable (removing a pinned frame is a programmer error).
    pub fn remove(&mut self, frame_id: FrameId) {
        self.check_frame(frame_id);

        let Some(node) = self.node_store.get(&frame_id) else {
            return;
        };
        assert!(
            node.is_evictable,
            "cannot remove non-evictable frame {frame_id}"
        );
        detach(&mut self.young, frame_id);
        detach(&mut self.mature, frame_id);
        self.node_store.remove(&frame_id);
        self.curr_size -= 1;
    }

    /// Returns the number of evictable frames.
    #[must_use]
    pub fn size(&self) -> usize {
        self.curr_size
    }

    fn find_lru_evictable(
        list: &VecDeque<FrameId>,
        store: &HashMap<FrameId, LruKNode>,
    ) -> Option<FrameId> {
        list.iter()
            .rev()
            .copied()
            .find(|frame_id| store.get(frame_id).is_some_and(|node| node.is_evictable))
    }

    fn check_frame(&self, frame_id: FrameId) {
        assert!(
            frame_id < self.num_frames,
            "frame id {frame_id} out of range (pool has {} frames)",
            self.num_frames
        );
    }
}

/// Removes `frame_id` from `list` if present.
fn detach(list: &mut VecDeque<FrameId>, frame_id: FrameId) {
    if let Some(pos) = list.iter().position(|&fid| fid == frame_id) {
        list.remove(pos);
    }
}
