//! Integration tests for the LRU replacement policy

use stratadb::buffer::LruReplacer;
use stratadb::common::FrameId;

#[test]
fn test_lru_victim_order() {
    let replacer = LruReplacer::new(7);

    for i in [1u32, 2, 3, 4, 5, 6] {
        replacer.unpin(FrameId::new(i));
    }
    assert_eq!(replacer.size(), 6);

    // Victims come out least recently unpinned first
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(3)));
    assert_eq!(replacer.size(), 3);
}

#[test]
fn test_lru_pin_then_victim() {
    let replacer = LruReplacer::new(7);

    for i in [1u32, 2, 3, 4, 5, 6] {
        replacer.unpin(FrameId::new(i));
    }

    // Pinned frames drop out of the eviction order
    replacer.pin(FrameId::new(3));
    replacer.pin(FrameId::new(4));
    assert_eq!(replacer.size(), 4);

    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(5)));
    assert_eq!(replacer.victim(), Some(FrameId::new(6)));
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_lru_unpin_twice_keeps_position() {
    let replacer = LruReplacer::new(7);

    replacer.unpin(FrameId::new(1));
    replacer.unpin(FrameId::new(2));
    replacer.unpin(FrameId::new(1));

    assert_eq!(replacer.size(), 2);
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
}

#[test]
fn test_lru_pin_absent_is_noop() {
    let replacer = LruReplacer::new(7);

    replacer.unpin(FrameId::new(1));
    replacer.pin(FrameId::new(9));
    assert_eq!(replacer.size(), 1);
}

#[test]
fn test_lru_capacity_drops_back() {
    let replacer = LruReplacer::new(3);

    for i in 0u32..5 {
        replacer.unpin(FrameId::new(i));
    }

    // Only the three most recent survive
    assert_eq!(replacer.size(), 3);
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(3)));
    assert_eq!(replacer.victim(), Some(FrameId::new(4)));
}

#[test]
fn test_lru_concurrent_unpin() {
    use std::sync::Arc;
    use std::thread;

    let replacer = Arc::new(LruReplacer::new(100));

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for i in 0..25 {
                    replacer.unpin(FrameId::new(t * 25 + i));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.size(), 100);
    let mut seen = std::collections::HashSet::new();
    while let Some(frame_id) = replacer.victim() {
        assert!(seen.insert(frame_id));
    }
    assert_eq!(seen.len(), 100);
}
