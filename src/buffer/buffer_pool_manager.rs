use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{Frame, LruReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping guarded by the pool's single mutex
struct PoolInner {
    /// Page table: maps page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Free list: frames holding no resident page
    free_list: VecDeque<FrameId>,
}

/// Internal state that can be shared across threads
struct PoolState {
    /// The buffer pool frames
    frames: Vec<Arc<Frame>>,
    /// Page table and free list under one lock
    inner: Mutex<PoolInner>,
    /// LRU replacer for eviction decisions; keeps its own lock
    replacer: LruReplacer,
}

/// BufferPoolManager serves database pages out of a fixed set of in-memory
/// frames backed by a disk file. Pages are fetched and pinned through RAII
/// guards and evicted with an LRU policy once their pin count reaches zero.
///
/// Every operation runs under the pool mutex from entry to return, disk I/O
/// included, so pool operations are linearizable. When every frame is pinned,
/// `read_page`/`write_page`/`new_page` return `Ok(None)`; callers unpin
/// something and retry.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Shared state
    state: Arc<PoolState>,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size and disk
    /// manager. Initially every frame is on the free list.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(PoolState {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruReplacer::new(pool_size),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Creates a new page pinned in the buffer pool and returns its ID with
    /// a write guard over the zeroed frame. Returns Ok(None) when every
    /// frame is pinned.
    pub fn new_page(&self) -> Result<Option<(PageId, WritePageGuard<'_>)>> {
        let mut inner = self.state.inner.lock();

        let frame_id = match self.acquire_frame(&mut inner)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };

        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                // Hand the frame back so the pool invariants hold
                inner.free_list.push_front(frame_id);
                return Err(e);
            }
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.assign(page_id);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        drop(inner);

        Ok(Some((page_id, WritePageGuard::new(self, page_id, frame))))
    }

    /// Fetches a page for read access. Returns Ok(None) when every frame is
    /// pinned.
    pub fn read_page(&self, page_id: PageId) -> Result<Option<ReadPageGuard<'_>>> {
        if page_id == INVALID_PAGE_ID {
            return Err(crate::common::StrataError::InvalidPageId(page_id));
        }

        let frame_id = match self.fetch_frame(page_id)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        Ok(Some(ReadPageGuard::new(self, page_id, frame)))
    }

    /// Fetches a page for write access. Returns Ok(None) when every frame is
    /// pinned.
    pub fn write_page(&self, page_id: PageId) -> Result<Option<WritePageGuard<'_>>> {
        if page_id == INVALID_PAGE_ID {
            return Err(crate::common::StrataError::InvalidPageId(page_id));
        }

        let frame_id = match self.fetch_frame(page_id)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        Ok(Some(WritePageGuard::new(self, page_id, frame)))
    }

    /// Drops one pin on a page. Returns true when the page is not resident
    /// (nothing to do) or the pin was released; false when the pin count was
    /// already zero, which is caller misuse. The dirty flag is ORed in and
    /// never cleared here.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.state.inner.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return true,
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if remaining == 0 {
                    self.state.replacer.unpin(frame_id);
                }
                if is_dirty {
                    frame.set_dirty(true);
                }
                true
            }
        }
    }

    /// Writes a page's frame back to disk and clears its dirty flag.
    /// Returns false if the page is not resident. Does not unpin.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(crate::common::StrataError::InvalidPageId(page_id));
        }

        let inner = self.state.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            self.flush_frame_locked(page_id, frame_id)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.state.inner.lock();

        for (&page_id, &frame_id) in inner.page_table.iter() {
            self.flush_frame_locked(page_id, frame_id)?;
        }

        Ok(())
    }

    /// Removes a page from the buffer pool and releases its disk ID.
    /// Returns true if the page is gone (including when it was not resident)
    /// and false if it is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.state.inner.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(true),
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        self.state.replacer.pin(frame_id);
        if frame.is_dirty() {
            self.flush_frame_locked(page_id, frame_id)?;
        }
        frame.clear();
        inner.page_table.remove(&page_id);
        inner.free_list.push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns the pin count for a page, or None if it is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.inner.lock();

        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.inner.lock().free_list.len()
    }

    /// Returns the underlying disk manager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Pins the frame holding the given page, reading it from disk first if
    /// it is not resident. Returns None when no frame can be obtained.
    fn fetch_frame(&self, page_id: PageId) -> Result<Option<FrameId>> {
        let mut inner = self.state.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.pin(frame_id);
            return Ok(Some(frame_id));
        }

        let frame_id = match self.acquire_frame(&mut inner)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut data) {
            inner.free_list.push_front(frame_id);
            return Err(e);
        }

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.assign(page_id);
        frame.fill_from(&data);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);

        Ok(Some(frame_id))
    }

    /// Obtains an empty frame, preferring the free list over eviction.
    /// A dirty victim is written back before its frame is reused.
    /// Assumes the pool mutex is held.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<Option<FrameId>> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let frame_id = match self.state.replacer.victim() {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let data = frame.snapshot();
            if let Err(e) = self.disk_scheduler.schedule_write_sync(old_page_id, &data) {
                // The frame stays dirty and evictable; report the failure
                self.state.replacer.unpin(frame_id);
                return Err(e);
            }
        }

        inner.page_table.remove(&old_page_id);
        frame.clear();

        Ok(Some(frame_id))
    }

    /// Writes one resident frame back to disk and clears its dirty flag.
    /// Assumes the pool mutex is held.
    fn flush_frame_locked(&self, page_id: PageId, frame_id: FrameId) -> Result<()> {
        let frame = &self.state.frames[frame_id.as_usize()];

        let data = frame.snapshot();
        self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        frame.set_dirty(false);

        Ok(())
    }
}
