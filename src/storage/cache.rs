//! Two-tier value cache
//!
//! ## Layout
//! ```text
//!   hot  (RwLock<HashMap>)      accepts every new write
//!    │ seal when full
//!    ▼
//!   cold (RwLock<VecDeque>)     [newest, ..., oldest], read-only maps
//! ```
//!
//! Lock order is hot → cold. Reads release the hot lock before taking the
//! cold one, so the two are never held together on the read path.

use std::collections::{HashMap, VecDeque};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;

use super::Address;

type Tier = HashMap<Address, Bytes>;

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hot_entries: usize,
    pub cold_tiers: usize,
    pub cold_entries: usize,
    pub hot_hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
}

/// Hot tier plus a newest-first sequence of sealed cold tiers
pub struct CacheLayer {
    hot: RwLock<Tier>,
    cold: RwLock<VecDeque<Tier>>,
    hot_capacity: usize,
    cold_limit: usize,

    hot_hits: AtomicU64,
    cold_hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheLayer {
    pub fn new(hot_capacity: usize, cold_limit: usize) -> Self {
        Self {
            hot: RwLock::new(HashMap::with_capacity(hot_capacity)),
            cold: RwLock::new(VecDeque::new()),
            hot_capacity,
            cold_limit,
            hot_hits: AtomicU64::new(0),
            cold_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache `value` under `address`, sealing the hot tier first if it is full
    pub fn insert(&self, address: Address, value: Bytes) {
        let mut hot = self.hot.write();
        if hot.len() >= self.hot_capacity && !hot.contains_key(&address) {
            let sealed = mem::replace(&mut *hot, HashMap::with_capacity(self.hot_capacity));
            let mut cold = self.cold.write();
            cold.push_front(sealed);
            while cold.len() > self.cold_limit {
                cold.pop_back();
            }
            tracing::debug!(cold_tiers = cold.len(), "Sealed hot tier");
        }
        hot.insert(address, value);
    }

    /// Look up `address`: hot tier, then cold tiers newest → oldest
    pub fn get(&self, address: Address) -> Option<Bytes> {
        if let Some(value) = self.hot.read().get(&address) {
            self.hot_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value.clone());
        }

        let found = self
            .cold
            .read()
            .iter()
            .find_map(|tier| tier.get(&address).cloned());

        match found {
            Some(value) => {
                self.cold_hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Drop every cached copy of `address`
    pub fn evict(&self, address: Address) {
        self.hot.write().remove(&address);
        for tier in self.cold.write().iter_mut() {
            tier.remove(&address);
        }
    }

    /// Number of sealed tiers currently retained
    pub fn cold_tier_count(&self) -> usize {
        self.cold.read().len()
    }

    pub fn stats(&self) -> CacheStats {
        let hot_entries = self.hot.read().len();
        let (cold_tiers, cold_entries) = {
            let cold = self.cold.read();
            (cold.len(), cold.iter().map(HashMap::len).sum())
        };
        CacheStats {
            hot_entries,
            cold_tiers,
            cold_entries,
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            cold_hits: self.cold_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
