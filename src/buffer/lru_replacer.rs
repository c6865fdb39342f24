use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::common::FrameId;

/// LRU replacement policy.
///
/// Tracks the frames that are currently eligible for eviction, ordered by
/// recency: the most recently unpinned frame sits at the front, the least
/// recent at the back. `victim` always takes the back entry. Capacity equals
/// the pool size; inserting past it drops the back entry.
pub struct LruReplacer {
    /// Frames eligible for eviction, front = most recently unpinned
    queue: Mutex<VecDeque<FrameId>>,
    /// Maximum number of frames the replacer can track
    capacity: usize,
}

impl LruReplacer {
    /// Creates a new LRU replacer sized to the buffer pool.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Removes and returns the least recently unpinned frame.
    /// Returns None if no frame is evictable.
    pub fn victim(&self) -> Option<FrameId> {
        let mut queue = self.queue.lock();
        queue.pop_back()
    }

    /// Removes a frame from the replacer after it was pinned.
    /// Idempotent: pinning a frame that is not tracked is a no-op.
    pub fn pin(&self, frame_id: FrameId) {
        let mut queue = self.queue.lock();
        if let Some(pos) = queue.iter().position(|&f| f == frame_id) {
            queue.remove(pos);
        }
    }

    /// Marks a frame evictable once its pin count has dropped to zero.
    /// A frame that is already tracked keeps its position.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut queue = self.queue.lock();
        if queue.iter().any(|&f| f == frame_id) {
            return;
        }
        queue.push_front(frame_id);
        if queue.len() > self.capacity {
            queue.pop_back();
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.queue.lock().len()
    }
}
