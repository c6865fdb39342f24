use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::{BufferPoolManager, Frame};

/// Shared access to a pinned page.
///
/// The guard borrows the buffer pool, so it cannot outlive it, and holds
/// the frame's data lock for its whole lifetime. Dropping it releases the
/// pin through `unpin_page` with `is_dirty = false`: reading never marks
/// a page dirty.
pub struct ReadPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    data: RwLockReadGuard<'a, Box<[u8; PAGE_SIZE]>>,
}

impl<'a> ReadPageGuard<'a> {
    /// Caller must already hold a pin on the frame; the guard takes
    /// ownership of exactly that one pin.
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, frame: &'a Frame) -> Self {
        Self {
            bpm,
            page_id,
            data: frame.data.read(),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, false);
    }
}

/// Exclusive access to a pinned page.
///
/// The dirty flag handed to `unpin_page` on drop is decided by usage: it
/// is set the first time `data_mut` is taken, so a guard that only ever
/// read leaves the page clean and a mutated page always reaches the
/// replacer with its dirty bit recorded.
pub struct WritePageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    dirtied: bool,
    data: Option<RwLockWriteGuard<'a, Box<[u8; PAGE_SIZE]>>>,
}

impl<'a> WritePageGuard<'a> {
    /// Caller must already hold a pin on the frame; the guard takes
    /// ownership of exactly that one pin.
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, frame: &'a Frame) -> Self {
        Self {
            bpm,
            page_id,
            dirtied: false,
            data: Some(frame.data.write()),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirtied = true;
        &mut self.data.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        // The data lock must go first: a flush already holding the pool
        // lock may be waiting to read these bytes
        self.data.take();
        self.bpm.unpin_page(self.page_id, self.dirtied);
    }
}
