//! Store Module
//!
//! The public key-value façade over the index and storage.
//!
//! ## Responsibilities
//! - Hash keys and route them to the owning shard
//! - Write, read and free value bytes while that shard's lock is held
//! - Run the background recycler for the store's lifetime
//! - Restore from and write back the manifest

use std::fs;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::Config;
use crate::error::{KidError, Result};
use crate::index::{HashedKey, Locator, ShardedIndex};
use crate::manifest::Manifest;
use crate::storage::{
    AddressLayout, CacheStats, ReclaimReport, RecyclerStats, RecyclerWorker, StorageManager,
};

/// Point-in-time counters for the whole store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub keys: usize,
    pub shards: usize,
    pub data_files: u32,
    pub cache: CacheStats,
    pub recycler: RecyclerStats,
}

/// Embeddable key-value store
///
/// ## Concurrency Model
///
/// - **Put / Delete**: exclusive lock on the key's shard while value bytes are
///   written (Put) or read back (Delete) and the tree is updated. The old
///   span is freed once the tree no longer points at it, before the lock is
///   released, so a checkpoint never sees a span that is neither live nor
///   free.
/// - **Get**: shared lock on the key's shard while the bytes are read, so a
///   concurrent overwrite cannot free them mid-read.
/// - Keys in different shards never wait on each other.
///
/// Lock order is always shard → storage (tail, recycler, cache tiers).
pub struct Store {
    config: Config,
    layout: AddressLayout,
    index: ShardedIndex,
    storage: Arc<StorageManager>,
    worker: Option<RecyclerWorker>,
}

impl Store {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Load the manifest if one exists and rebuild the index
    /// 3. Open the data files and restore the allocator
    /// 4. Start the recycler worker
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let layout = AddressLayout::new(config.address_file_bits)?;
        let index = ShardedIndex::new(config.shard_count, config.shard_capacity_hint)?;

        let storage_state = match Manifest::load(&config.data_dir)? {
            Some(manifest) => {
                if manifest.layout != layout {
                    return Err(KidError::Manifest(format!(
                        "store was created with {} address file bits, config asks for {}",
                        manifest.layout.file_bits(),
                        layout.file_bits()
                    )));
                }
                if manifest.shard_count as usize != config.shard_count {
                    // Entries carry full keys, so routing them again is enough
                    tracing::info!(
                        from = manifest.shard_count,
                        to = config.shard_count,
                        "Re-sharding index from manifest"
                    );
                }
                let entries = manifest.entries.len();
                for (key, locator) in manifest.entries {
                    index.put(key, locator)?;
                }
                tracing::info!(entries, files = manifest.storage.file_count, "Restored store from manifest");
                Some(manifest.storage)
            }
            None if StorageManager::data_files_exist(&config.data_dir)? => {
                return Err(KidError::Manifest(format!(
                    "data files in {} but no manifest",
                    config.data_dir.display()
                )));
            }
            None => None,
        };

        let storage = Arc::new(StorageManager::open(&config, layout, storage_state)?);
        let worker = RecyclerWorker::start(
            Arc::clone(&storage),
            config.recycle_interval,
            config.recycle_batch,
        )?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            shards = config.shard_count,
            file_bits = layout.file_bits(),
            "Store opened"
        );

        Ok(Self {
            config,
            layout,
            index,
            storage,
            worker: Some(worker),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Get a value by key. `Ok(None)` when the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let hashed = HashedKey::hash(key);
        self.index
            .get_with(hashed, |locator| self.storage.read(locator.address, locator.length))
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Lock the owning shard
    /// 2. Write the bytes (a failure leaves the index untouched)
    /// 3. Install the new Locator
    /// 4. Free the replaced Locator's span and unlock
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let hashed = HashedKey::hash(key);
        self.index.put_with(
            hashed,
            |_| {
                let address = self.storage.write(value)?;
                Ok(Locator::new(address, value.len() as u32))
            },
            |old| self.storage.free(old.address, old.length),
        )?;
        Ok(())
    }

    /// Delete a key, returning the value it held
    ///
    /// The value is read back before the key is unlinked; its span is freed
    /// right after, still under the shard lock.
    pub fn delete(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let hashed = HashedKey::hash(key);
        let removed = self.index.delete_with(
            hashed,
            |locator| self.storage.read(locator.address, locator.length),
            |locator| self.storage.free(locator.address, locator.length),
        )?;

        Ok(removed.map(|(_, value)| value))
    }

    /// Sync data files and write the manifest.
    ///
    /// Every shard is read-locked while the snapshot is taken.
    pub fn checkpoint(&self) -> Result<()> {
        let manifest = self.index.snapshot(|entries| -> Result<Manifest> {
            self.storage.sync()?;
            Ok(Manifest {
                layout: self.layout,
                shard_count: self.index.shard_count() as u32,
                storage: self.storage.state(),
                entries,
            })
        })?;

        manifest.save(&self.config.data_dir)?;
        tracing::debug!(entries = manifest.entries.len(), "Checkpoint written");
        Ok(())
    }

    /// Run one reclamation pass now instead of waiting for the worker
    pub fn reclaim(&self) -> ReclaimReport {
        self.storage.reclaim(self.config.recycle_batch)
    }

    /// Close the store gracefully
    ///
    /// Stops the recycler, runs a final pass and checkpoints. Dropping a
    /// store without closing it stops the recycler but writes nothing.
    pub fn close(mut self) -> Result<()> {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        self.reclaim();
        self.checkpoint()?;
        tracing::info!(data_dir = %self.config.data_dir.display(), "Store closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.index.len(),
            shards: self.index.shard_count(),
            data_files: self.storage.file_count(),
            cache: self.storage.cache_stats(),
            recycler: self.storage.recycler_stats(),
        }
    }

    pub fn index(&self) -> &ShardedIndex {
        &self.index
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn recycler_running(&self) -> bool {
        self.worker.as_ref().is_some_and(RecyclerWorker::is_running)
    }
}
