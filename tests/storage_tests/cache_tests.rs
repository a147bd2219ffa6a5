//! Tests for the two-tier CacheLayer

use bytes::Bytes;
use kidkv::storage::{Address, CacheLayer};

fn addr(n: u32) -> Address {
    Address::from_raw(n)
}

fn val(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

#[test]
fn test_hot_hit() {
    let cache = CacheLayer::new(4, 2);
    cache.insert(addr(1), val("one"));

    assert_eq!(cache.get(addr(1)), Some(val("one")));
    assert_eq!(cache.get(addr(2)), None);

    let stats = cache.stats();
    assert_eq!(stats.hot_entries, 1);
    assert_eq!(stats.hot_hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_seal_when_hot_tier_full() {
    let cache = CacheLayer::new(4, 2);
    for i in 0..5 {
        cache.insert(addr(i), val(&format!("v{}", i)));
    }

    assert_eq!(cache.cold_tier_count(), 1);
    let stats = cache.stats();
    assert_eq!(stats.hot_entries, 1);
    assert_eq!(stats.cold_entries, 4);

    // oldest entry is still served from the sealed tier
    assert_eq!(cache.get(addr(0)), Some(val("v0")));
    assert_eq!(cache.stats().cold_hits, 1);
}

#[test]
fn test_newest_cold_tier_wins() {
    let cache = CacheLayer::new(1, 8);
    cache.insert(addr(10), val("x-old"));
    cache.insert(addr(20), val("y"));
    cache.insert(addr(10), val("x-new"));
    cache.insert(addr(30), val("z"));

    assert_eq!(cache.cold_tier_count(), 3);
    assert_eq!(cache.get(addr(10)), Some(val("x-new")));
    assert_eq!(cache.get(addr(20)), Some(val("y")));
    assert_eq!(cache.get(addr(30)), Some(val("z")));
}

#[test]
fn test_cold_limit_drops_oldest_tier() {
    let cache = CacheLayer::new(1, 2);
    cache.insert(addr(1), val("a"));
    cache.insert(addr(2), val("b"));
    cache.insert(addr(3), val("c"));
    cache.insert(addr(4), val("d"));

    assert_eq!(cache.cold_tier_count(), 2);
    assert_eq!(cache.get(addr(1)), None);
    assert_eq!(cache.get(addr(2)), Some(val("b")));
    assert_eq!(cache.get(addr(3)), Some(val("c")));
    assert_eq!(cache.get(addr(4)), Some(val("d")));
}

#[test]
fn test_zero_cold_limit_keeps_only_hot() {
    let cache = CacheLayer::new(1, 0);
    cache.insert(addr(1), val("a"));
    cache.insert(addr(2), val("b"));

    assert_eq!(cache.cold_tier_count(), 0);
    assert_eq!(cache.get(addr(1)), None);
    assert_eq!(cache.get(addr(2)), Some(val("b")));
}

#[test]
fn test_evict_removes_every_copy() {
    let cache = CacheLayer::new(1, 8);
    cache.insert(addr(7), val("first"));
    cache.insert(addr(8), val("other"));
    cache.insert(addr(7), val("second"));
    cache.insert(addr(9), val("third"));

    cache.evict(addr(7));

    assert_eq!(cache.get(addr(7)), None);
    assert_eq!(cache.get(addr(8)), Some(val("other")));
    assert_eq!(cache.get(addr(9)), Some(val("third")));
}

#[test]
fn test_reinsert_existing_address_does_not_seal() {
    let cache = CacheLayer::new(2, 4);
    cache.insert(addr(1), val("a"));
    cache.insert(addr(2), val("b"));
    cache.insert(addr(2), val("b2"));

    assert_eq!(cache.cold_tier_count(), 0);
    assert_eq!(cache.get(addr(2)), Some(val("b2")));
    assert_eq!(cache.stats().hot_entries, 2);
}
