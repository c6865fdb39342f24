//! StrataDB - the storage-engine core of a disk-oriented database
//!
//! This crate provides the two subsystems at the bottom of a relational
//! database: a buffer pool that serves fixed-size pages out of a bounded
//! set of in-memory frames, and a B+tree index whose every node lives
//! inside one of those frames.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): disk I/O
//!   - `DiskManager`: reads and writes pages in a single page file
//!   - `DiskScheduler`: background worker that serializes disk requests
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: fetches pages from disk and caches them in frames
//!   - `LruReplacer`: least-recently-used eviction over unpinned frames
//!   - `Frame`: per-slot metadata and the page bytes
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pinning with dirty tracking
//!
//! - **Index** (`index`): a B+tree over fixed-width keys
//!   - `BPlusTree`: point lookup, insert, remove, range scan
//!   - `LeafPage`/`InternalPage`: typed views over frame bytes
//!   - `IndexIterator`: ascending scan along the leaf chain
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stratadb::buffer::BufferPoolManager;
//! use stratadb::common::{PageId, RecordId, SlotId};
//! use stratadb::index::{BPlusTree, U32Comparator};
//! use stratadb::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let tree = BPlusTree::<u32, _>::new(Arc::clone(&bpm), U32Comparator);
//! tree.insert(&42, RecordId::new(PageId::new(7), SlotId::new(0))).unwrap();
//! assert!(tree.get_value(&42).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StrataError};
