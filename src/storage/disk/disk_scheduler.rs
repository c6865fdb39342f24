use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PageId, Result, StrataError, PAGE_SIZE};

use super::DiskManager;

/// A queued disk operation. Requests own their buffers: a write carries the
/// bytes to persist, a read gets a fresh page buffer back over its
/// completion channel together with the I/O outcome.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        done: Sender<Result<Box<[u8; PAGE_SIZE]>>>,
    },
    Write {
        page_id: PageId,
        data: Box<[u8; PAGE_SIZE]>,
        done: Sender<Result<()>>,
    },
}

/// DiskScheduler funnels page I/O through a single background worker so the
/// disk sees one request at a time in submission order.
///
/// Shutdown is driven by channel disconnection: dropping the scheduler drops
/// the request sender, the worker finishes whatever is still queued and its
/// receive loop ends.
pub struct DiskScheduler {
    /// The disk manager the worker drives
    disk_manager: Arc<DiskManager>,
    /// Queue feeding the worker; None once shutdown has begun
    request_sender: Option<Sender<DiskRequest>>,
    /// Handle to the worker thread, joined on drop
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawns the worker thread over the given disk manager.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);

        let dm = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || Self::run_worker(dm, receiver));

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| StrataError::DiskScheduler("scheduler is shut down".to_string()))?;
        sender
            .send(request)
            .map_err(|e| StrataError::DiskScheduler(format!("failed to queue request: {}", e)))
    }

    /// Reads a page through the worker, blocking until it completes.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let (done, wait) = bounded(1);
        self.schedule(DiskRequest::Read { page_id, done })?;

        let bytes = wait
            .recv()
            .map_err(|e| StrataError::DiskScheduler(format!("worker dropped request: {}", e)))??;
        *data = *bytes;
        Ok(())
    }

    /// Writes a page through the worker, blocking until it completes.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let (done, wait) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_id,
            data: Box::new(*data),
            done,
        })?;

        wait.recv()
            .map_err(|e| StrataError::DiskScheduler(format!("worker dropped request: {}", e)))?
    }

    /// Worker loop: runs every queued request in order until the request
    /// channel disconnects, then exits. A receiver keeps yielding whatever
    /// was queued before the disconnect, so nothing in flight is lost.
    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        for request in receiver.iter() {
            match request {
                DiskRequest::Read { page_id, done } => {
                    let mut buffer = Box::new([0u8; PAGE_SIZE]);
                    let outcome = disk_manager
                        .read_page(page_id, &mut buffer)
                        .map(|()| buffer);
                    let _ = done.send(outcome);
                }
                DiskRequest::Write { page_id, data, done } => {
                    let _ = done.send(disk_manager.write_page(page_id, &data));
                }
            }
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Disconnect the queue, then wait for the worker to drain it
        self.request_sender.take();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.schedule_write_sync(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler
            .schedule_read_sync(page_id, &mut read_data)
            .unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_requests_in_order() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        // Later writes to the same page win
        for value in 1..=5u8 {
            let data = [value; PAGE_SIZE];
            scheduler.schedule_write_sync(page_id, &data).unwrap();
        }

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler
            .schedule_read_sync(page_id, &mut read_data)
            .unwrap();
        assert_eq!(read_data[0], 5);
    }

    #[test]
    fn test_disk_scheduler_drains_on_drop() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        let page_id = {
            let dm = Arc::new(DiskManager::new(&path).unwrap());
            let scheduler = DiskScheduler::new(Arc::clone(&dm));

            let page_id = dm.allocate_page().unwrap();
            let data = [9u8; PAGE_SIZE];
            scheduler.schedule_write_sync(page_id, &data).unwrap();
            page_id
            // Scheduler drops here; the worker must finish cleanly
        };

        let dm = DiskManager::new(&path).unwrap();
        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_data).unwrap();
        assert_eq!(read_data[0], 9);
    }
}
