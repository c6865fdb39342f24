use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// One slot of the buffer pool: which page is resident, how many callers
/// hold it pinned, whether its bytes differ from disk, and the bytes.
///
/// Page IDs are plain u32 values, so the resident id lives in an atomic
/// rather than behind a lock. The data buffer keeps its own RwLock; page
/// guards hold that lock for as long as a caller reads or writes through
/// them.
pub struct Frame {
    /// Index of this slot in the buffer pool
    frame_id: FrameId,
    /// Raw id of the resident page, INVALID_PAGE_ID when the slot is empty
    page_id: AtomicU32,
    /// Outstanding reservations preventing eviction
    pin_count: AtomicU32,
    /// Whether the buffer has been written since it was last synced
    dirty: AtomicBool,
    /// The page bytes (pub(crate) so page guards can lock them)
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Frame {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU32::new(INVALID_PAGE_ID.as_u32()),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    /// Installs a new resident page. A page fresh from disk (or freshly
    /// allocated) matches its on-disk bytes, so the dirty flag drops too.
    pub fn assign(&self, page_id: PageId) {
        self.page_id.store(page_id.as_u32(), Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Takes one reservation; returns the new count.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Releases one reservation; returns the new count, or None when there
    /// was nothing to release (caller misuse).
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Copy of the page bytes, for writing back to disk.
    pub fn snapshot(&self) -> [u8; PAGE_SIZE] {
        **self.data.read()
    }

    /// Overwrites the buffer with bytes read from disk.
    pub fn fill_from(&self, bytes: &[u8; PAGE_SIZE]) {
        **self.data.write() = *bytes;
    }

    /// Returns the slot to its empty state.
    pub fn clear(&self) {
        self.page_id
            .store(INVALID_PAGE_ID.as_u32(), Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_starts_empty() {
        let frame = Frame::new(FrameId::new(3));
        assert_eq!(frame.frame_id(), FrameId::new(3));
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_frame_pin_unpin_counts() {
        let frame = Frame::new(FrameId::new(0));

        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);

        assert_eq!(frame.unpin(), Some(1));
        assert_eq!(frame.unpin(), Some(0));
        // Unpinning an unpinned frame reports misuse instead of wrapping
        assert_eq!(frame.unpin(), None);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_frame_assign_clears_dirty() {
        let frame = Frame::new(FrameId::new(0));

        frame.set_dirty(true);
        frame.assign(PageId::new(9));

        assert_eq!(frame.page_id(), PageId::new(9));
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_frame_snapshot_round_trip() {
        let frame = Frame::new(FrameId::new(0));

        let mut bytes = [0u8; PAGE_SIZE];
        bytes[0] = 42;
        bytes[PAGE_SIZE - 1] = 7;
        frame.fill_from(&bytes);

        let copy = frame.snapshot();
        assert_eq!(copy[0], 42);
        assert_eq!(copy[PAGE_SIZE - 1], 7);
    }

    #[test]
    fn test_frame_clear() {
        let frame = Frame::new(FrameId::new(0));

        frame.assign(PageId::new(5));
        frame.pin();
        frame.set_dirty(true);
        frame.fill_from(&[1u8; PAGE_SIZE]);

        frame.clear();

        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert_eq!(frame.snapshot()[0], 0);
    }
}
