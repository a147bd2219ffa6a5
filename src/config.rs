//! Configuration for KiD
//!
//! Centralized configuration with sensible defaults. A `Config` is built once
//! and handed to `Store::open`; nothing in it can change afterwards.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KidError, Result};

/// Main configuration for a KiD instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── MANIFEST         (index + allocator snapshot)
    ///     └── data_NNN.kid     (value bytes, one file per selector)
    pub data_dir: PathBuf,

    /// Bytes by which a data file is physically extended when it fills up
    pub file_growth: u64,

    /// High-order Address bits selecting the data file. The remaining bits
    /// are the offset inside the file. Part of the on-disk format.
    pub address_file_bits: u8,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Number of independent shards (must be a power of two)
    pub shard_count: usize,

    /// Initial node capacity reserved per shard
    pub shard_capacity_hint: usize,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Entries held by the hot tier before it is sealed
    pub hot_tier_capacity: usize,

    /// Sealed tiers retained for reads; older ones are dropped
    pub cold_tier_limit: usize,

    // -------------------------------------------------------------------------
    // Recycler Configuration
    // -------------------------------------------------------------------------
    /// Pause between background reclamation passes
    pub recycle_interval: Duration,

    /// Free spans examined per locked section of a reclamation pass
    pub recycle_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./kid_data"),
            file_growth: 4 * 1024 * 1024, // 4 MB
            address_file_bits: 4,         // 16 files x 256 MB
            shard_count: 16,
            shard_capacity_hint: 1024,
            hot_tier_capacity: 1024,
            cold_tier_limit: 8,
            recycle_interval: Duration::from_secs(1),
            recycle_batch: 256,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that every option is usable
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 || !self.shard_count.is_power_of_two() {
            return Err(KidError::Config(format!(
                "shard_count must be a power of two, got {}",
                self.shard_count
            )));
        }
        // Shard selection uses the top bits of a 32-bit key
        if self.shard_count > 1 << 16 {
            return Err(KidError::Config(format!(
                "shard_count {} exceeds 65536",
                self.shard_count
            )));
        }
        if !(1..=8).contains(&self.address_file_bits) {
            return Err(KidError::Config(format!(
                "address_file_bits must be within 1..=8, got {}",
                self.address_file_bits
            )));
        }
        if self.hot_tier_capacity == 0 {
            return Err(KidError::Config("hot_tier_capacity must be non-zero".into()));
        }
        if self.file_growth == 0 {
            return Err(KidError::Config("file_growth must be non-zero".into()));
        }
        if self.recycle_batch == 0 {
            return Err(KidError::Config("recycle_batch must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the physical growth step of data files (in bytes)
    pub fn file_growth(mut self, bytes: u64) -> Self {
        self.config.file_growth = bytes;
        self
    }

    /// Set the number of file-selector bits in an Address
    pub fn address_file_bits(mut self, bits: u8) -> Self {
        self.config.address_file_bits = bits;
        self
    }

    /// Set the number of index shards
    pub fn shard_count(mut self, count: usize) -> Self {
        self.config.shard_count = count;
        self
    }

    /// Set the initial per-shard node capacity
    pub fn shard_capacity_hint(mut self, hint: usize) -> Self {
        self.config.shard_capacity_hint = hint;
        self
    }

    /// Set the hot tier capacity (entries)
    pub fn hot_tier_capacity(mut self, entries: usize) -> Self {
        self.config.hot_tier_capacity = entries;
        self
    }

    /// Set how many sealed tiers are kept
    pub fn cold_tier_limit(mut self, tiers: usize) -> Self {
        self.config.cold_tier_limit = tiers;
        self
    }

    /// Set the pause between reclamation passes
    pub fn recycle_interval(mut self, interval: Duration) -> Self {
        self.config.recycle_interval = interval;
        self
    }

    /// Set the number of spans examined per reclamation batch
    pub fn recycle_batch(mut self, spans: usize) -> Self {
        self.config.recycle_batch = spans;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
