use std::sync::Arc;

use stratadb::buffer::BufferPoolManager;
use stratadb::common::{PageId, RecordId, SlotId};
use stratadb::index::{BPlusTree, U32Comparator};
use stratadb::storage::disk::DiskManager;

fn main() {
    println!("StrataDB - a disk-oriented storage engine in Rust");
    println!("=================================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(16, disk_manager));
    println!("Created buffer pool manager with 16 frames\n");

    let tree = BPlusTree::<u32, _>::new(Arc::clone(&bpm), U32Comparator);

    for key in (1..=300).rev() {
        let rid = RecordId::new(PageId::new(key), SlotId::new(0));
        tree.insert(&key, rid).expect("Failed to insert");
    }
    println!("Inserted keys 1..=300 in reverse order");
    println!("Root page: {}", tree.root_page_id());

    let value = tree.get_value(&150).expect("Lookup failed");
    println!("Lookup 150 -> {:?}", value);

    let mut iter = tree.begin_at(&290).expect("Failed to position iterator");
    print!("Scan from 290:");
    while let Some(entry) = iter.next_entry().expect("Scan failed") {
        print!(" {}", entry.0);
    }
    println!();

    for key in 1..=300 {
        tree.remove(&key).expect("Failed to remove");
    }
    println!("Removed every key; tree empty: {}", tree.is_empty());

    bpm.flush_all_pages().expect("Failed to flush");
    println!("Flushed all pages");

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
