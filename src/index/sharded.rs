//! ShardedIndex
//!
//! Splits the 32-bit key space into `shard_count` partitions by the key's top
//! bits. Each shard is one OrderedShard behind its own RwLock; shards never
//! touch each other.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ShardedIndex                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ RB-tree │ │ RB-tree │ │ RB-tree │ │ RB-tree │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `*_with` variants run a closure while the shard lock is held. That is
//! how the store reads or writes value bytes without another thread swapping
//! the Locator underneath it. Closures may call into storage; storage never
//! calls back here.

use parking_lot::RwLock;

use crate::error::{KidError, Result};

use super::{HashedKey, Locator, OrderedShard};

/// Concurrency-partitioned index of HashedKey → Locator
pub struct ShardedIndex {
    shards: Vec<RwLock<OrderedShard>>,
    /// Right shift that leaves only the shard-selecting bits
    shift: u32,
}

impl ShardedIndex {
    /// Create `shard_count` empty shards (must be a power of two)
    pub fn new(shard_count: usize, capacity_hint: usize) -> Result<Self> {
        if shard_count == 0 || !shard_count.is_power_of_two() || shard_count > 1 << 16 {
            return Err(KidError::Config(format!(
                "shard count must be a power of two up to 65536, got {}",
                shard_count
            )));
        }

        let index_bits = usize::BITS - (shard_count - 1).leading_zeros();
        let shards = (0..shard_count)
            .map(|i| RwLock::new(OrderedShard::new(i, capacity_hint)))
            .collect();

        Ok(Self {
            shards,
            shift: 32 - index_bits,
        })
    }

    /// Shard owning `key`
    #[inline]
    pub fn shard_of(&self, key: HashedKey) -> usize {
        (u64::from(key.raw()) >> self.shift) as usize
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Look up `key` under the shard's shared lock
    pub fn get(&self, key: HashedKey) -> Option<Locator> {
        self.shards[self.shard_of(key)].read().get(key)
    }

    /// Install `locator` for `key`, returning the Locator it replaced
    pub fn put(&self, key: HashedKey, locator: Locator) -> Result<Option<Locator>> {
        self.shards[self.shard_of(key)].write().insert(key, locator)
    }

    /// Remove `key`, returning its Locator
    pub fn delete(&self, key: HashedKey) -> Result<Option<Locator>> {
        self.shards[self.shard_of(key)].write().remove(key)
    }

    /// Run `read` on `key`'s Locator while holding the shard's shared lock
    pub fn get_with<T, F>(&self, key: HashedKey, read: F) -> Result<Option<T>>
    where
        F: FnOnce(Locator) -> Result<T>,
    {
        let shard = self.shards[self.shard_of(key)].read();
        shard.get(key).map(read).transpose()
    }

    /// Produce a new Locator with `write` and install it, all under the
    /// shard's exclusive lock. `write` sees the current Locator. If it fails
    /// the tree is left untouched. The replaced Locator, once unlinked, is
    /// handed to `retire` before the lock is released.
    pub fn put_with<F, R>(&self, key: HashedKey, write: F, retire: R) -> Result<Option<Locator>>
    where
        F: FnOnce(Option<Locator>) -> Result<Locator>,
        R: FnOnce(Locator),
    {
        let mut shard = self.shards[self.shard_of(key)].write();
        let locator = write(shard.get(key))?;
        let replaced = shard.insert(key, locator)?;
        if let Some(old) = replaced {
            retire(old);
        }
        Ok(replaced)
    }

    /// Run `read` on `key`'s Locator and, if it succeeds, unlink the key and
    /// pass the Locator to `retire`, all under the shard's exclusive lock.
    pub fn delete_with<T, F, R>(&self, key: HashedKey, read: F, retire: R) -> Result<Option<(Locator, T)>>
    where
        F: FnOnce(Locator) -> Result<T>,
        R: FnOnce(Locator),
    {
        let mut shard = self.shards[self.shard_of(key)].write();
        let Some(locator) = shard.get(key) else {
            return Ok(None);
        };
        let value = read(locator)?;
        shard.remove(key)?;
        retire(locator);
        Ok(Some((locator, value)))
    }

    /// Total number of keys (not atomic across shards)
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Number of keys in shard `shard`
    pub fn shard_len(&self, shard: usize) -> usize {
        self.shards[shard].read().len()
    }

    /// Keys of one shard in order
    pub fn shard_keys(&self, shard: usize) -> Vec<HashedKey> {
        self.shards[shard].read().iter().map(|(k, _)| k).collect()
    }

    /// Check every shard's tree
    pub fn check_invariants(&self) -> Result<()> {
        for shard in &self.shards {
            shard.read().check_invariants()?;
        }
        Ok(())
    }

    /// Hold every shard's shared lock (ascending order) and hand all entries
    /// to `f`. No Put or Delete can run until `f` returns.
    pub fn snapshot<T, F>(&self, f: F) -> T
    where
        F: FnOnce(Vec<(HashedKey, Locator)>) -> T,
    {
        let guards: Vec<_> = self.shards.iter().map(|s| s.read()).collect();
        let entries = guards.iter().flat_map(|g| g.iter()).collect();
        let result = f(entries);
        drop(guards);
        result
    }
}
