//! Tests for ShardedIndex
//!
//! These tests verify:
//! - Shard selection by the key's top bits
//! - Get/Put/Delete and their lock-holding `*_with` variants
//! - Shard independence under a held write lock
//! - Concurrent writers on disjoint shards

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use kidkv::index::{HashedKey, Locator, ShardedIndex};
use kidkv::storage::Address;
use kidkv::KidError;

// =============================================================================
// Helper Functions
// =============================================================================

fn key(k: u32) -> HashedKey {
    HashedKey::from_raw(k)
}

fn loc(n: u32) -> Locator {
    Locator::new(Address::from_raw(n), 4)
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_shard_count_must_be_power_of_two() {
    assert!(matches!(ShardedIndex::new(0, 8), Err(KidError::Config(_))));
    assert!(matches!(ShardedIndex::new(3, 8), Err(KidError::Config(_))));
    assert!(matches!(ShardedIndex::new(12, 8), Err(KidError::Config(_))));
    assert!(ShardedIndex::new(16, 8).is_ok());
}

#[test]
fn test_shard_of_uses_top_bits() {
    let index = ShardedIndex::new(16, 8).unwrap();

    assert_eq!(index.shard_of(key(0x0000_0001)), 0);
    assert_eq!(index.shard_of(key(0x1FFF_FFFF)), 1);
    assert_eq!(index.shard_of(key(0x7000_0000)), 7);
    // the reserved high bit is cleared before selection
    assert_eq!(index.shard_of(HashedKey::from_raw(0xF000_0000)), 7);
}

#[test]
fn test_single_shard_takes_every_key() {
    let index = ShardedIndex::new(1, 8).unwrap();

    assert_eq!(index.shard_of(key(0)), 0);
    assert_eq!(index.shard_of(key(0x7FFF_FFFF)), 0);
}

#[test]
fn test_hashed_keys_land_in_lower_half() {
    let index = ShardedIndex::new(16, 8).unwrap();

    for i in 0..1000 {
        let hashed = HashedKey::hash(format!("key-{}", i).as_bytes());
        assert!(index.shard_of(hashed) < 8);
    }
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_put_get_delete() {
    let index = ShardedIndex::new(4, 8).unwrap();

    assert_eq!(index.put(key(7), loc(1)).unwrap(), None);
    assert_eq!(index.get(key(7)), Some(loc(1)));

    assert_eq!(index.delete(key(7)).unwrap(), Some(loc(1)));
    assert_eq!(index.get(key(7)), None);
    assert_eq!(index.delete(key(7)).unwrap(), None);
}

#[test]
fn test_put_returns_replaced_locator() {
    let index = ShardedIndex::new(4, 8).unwrap();

    index.put(key(7), loc(1)).unwrap();
    let replaced = index.put(key(7), loc(2)).unwrap();

    assert_eq!(replaced, Some(loc(1)));
    assert_eq!(index.get(key(7)), Some(loc(2)));
    assert_eq!(index.len(), 1);
}

#[test]
fn test_put_with_failure_leaves_index_unchanged() {
    let index = ShardedIndex::new(4, 8).unwrap();
    index.put(key(9), loc(1)).unwrap();

    let result = index.put_with(
        key(9),
        |current| {
            assert_eq!(current, Some(loc(1)));
            Err(KidError::Io(std::io::Error::other("disk full")))
        },
        |_| panic!("nothing was replaced"),
    );

    assert!(result.is_err());
    assert_eq!(index.get(key(9)), Some(loc(1)));

    let result = index.put_with(
        key(10),
        |_| Err(KidError::Io(std::io::Error::other("disk full"))),
        |_| panic!("nothing was replaced"),
    );
    assert!(result.is_err());
    assert_eq!(index.get(key(10)), None);
}

#[test]
fn test_put_with_retires_replaced_locator() {
    let index = ShardedIndex::new(4, 8).unwrap();
    let mut retired = Vec::new();

    index.put_with(key(9), |_| Ok(loc(1)), |old| retired.push(old)).unwrap();
    assert!(retired.is_empty());

    let replaced = index
        .put_with(key(9), |_| Ok(loc(2)), |old| retired.push(old))
        .unwrap();

    assert_eq!(replaced, Some(loc(1)));
    assert_eq!(retired, vec![loc(1)]);
    assert_eq!(index.get(key(9)), Some(loc(2)));
}

#[test]
fn test_delete_with_failure_keeps_key() {
    let index = ShardedIndex::new(4, 8).unwrap();
    index.put(key(9), loc(1)).unwrap();

    let result: kidkv::Result<Option<(Locator, ())>> = index.delete_with(
        key(9),
        |_| Err(KidError::Io(std::io::Error::other("read failed"))),
        |_| panic!("key must stay linked"),
    );

    assert!(result.is_err());
    assert_eq!(index.get(key(9)), Some(loc(1)));
}

#[test]
fn test_delete_with_retires_unlinked_locator() {
    let index = ShardedIndex::new(4, 8).unwrap();
    index.put(key(9), loc(1)).unwrap();
    let mut retired = Vec::new();

    let removed = index
        .delete_with(key(9), |locator| Ok(locator.length), |old| retired.push(old))
        .unwrap();

    assert_eq!(removed, Some((loc(1), 4)));
    assert_eq!(retired, vec![loc(1)]);
    assert_eq!(index.get(key(9)), None);
}

#[test]
fn test_get_with_absent_key_skips_closure() {
    let index = ShardedIndex::new(4, 8).unwrap();

    let result = index
        .get_with(key(1), |_| -> kidkv::Result<()> { panic!("should not run") })
        .unwrap();

    assert_eq!(result, None);
}

#[test]
fn test_snapshot_sees_every_shard() {
    let index = ShardedIndex::new(16, 8).unwrap();
    for shard in 0..8u32 {
        index.put(key(shard << 28 | 5), loc(shard)).unwrap();
    }

    let count = index.snapshot(|entries| entries.len());

    assert_eq!(count, 8);
    for shard in 0..8 {
        assert_eq!(index.shard_len(shard), 1);
    }
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_held_write_lock_does_not_block_other_shard() {
    let index = Arc::new(ShardedIndex::new(16, 8).unwrap());
    let shard_a = key(0x0000_0010);
    let shard_a_other = key(0x0000_0020);
    let shard_b = key(0x1000_0010);
    assert_ne!(index.shard_of(shard_a), index.shard_of(shard_b));
    index.put(shard_b, loc(2)).unwrap();

    let (entered_tx, entered_rx) = channel::bounded(0);
    let (release_tx, release_rx) = channel::bounded::<()>(0);

    let writer = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            index
                .put_with(
                    shard_a,
                    |_| {
                        entered_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(loc(1))
                    },
                    |_| {},
                )
                .unwrap();
        })
    };
    entered_rx.recv().unwrap();

    // Other shard: completes while shard A is held
    let start = Instant::now();
    assert_eq!(index.get(shard_b), Some(loc(2)));
    index.put(shard_b, loc(3)).unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));

    // Same shard: waits for the writer
    let (done_tx, done_rx) = channel::bounded(1);
    let reader = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            let found = index.get(shard_a_other);
            done_tx.send(found).unwrap();
        })
    };
    assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());

    release_tx.send(()).unwrap();
    writer.join().unwrap();
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), None);
    reader.join().unwrap();

    assert_eq!(index.get(shard_a), Some(loc(1)));
}

#[test]
fn test_concurrent_writers_on_disjoint_shards() {
    let index = Arc::new(ShardedIndex::new(16, 1024).unwrap());

    let handles: Vec<_> = (0..8u32)
        .map(|shard| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0..1000u32 {
                    let k = key(shard << 28 | i * 13);
                    index.put(k, loc(i)).unwrap();
                    if i % 3 == 0 {
                        index.delete(k).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    index.check_invariants().unwrap();
    for shard in 0..8 {
        assert_eq!(index.shard_len(shard), 666);
        let keys = index.shard_keys(shard);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }
}
