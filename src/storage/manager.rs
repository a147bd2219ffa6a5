//! Storage Manager
//!
//! Address-oriented byte store over the data files.
//!
//! ## Responsibilities
//! - Hand out Addresses: recycled spans first, then the allocation tail
//! - Write values through to the data file, then into the hot tier
//! - Serve reads from the cache tiers before touching a file
//! - Return freed spans to the recycler and evict their cached copies
//!
//! ## Concurrency:
//! - `tail`: Mutex, taken before the recycler lock when both are needed
//! - `recycler`, `cache`: own locks, never held across file I/O
//! - Never calls back into the index

use std::path::Path;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{KidError, Result};

use super::{
    Address, AddressLayout, CacheLayer, CacheStats, DataFiles, FreeSpan, ReclaimReport,
    RecyclerStats, SpaceRecycler,
};

/// Next unallocated position: `offset` bytes into data file `file`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tail {
    pub file: u32,
    pub offset: u64,
}

/// Allocator state recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageState {
    pub tail: Tail,
    pub file_count: u32,
    pub free_spans: Vec<FreeSpan>,
}

/// Bytes a value of `length` occupies. Empty values still take one byte so
/// every live Locator owns a distinct Address.
pub fn span_for(length: u32) -> u32 {
    length.max(1)
}

/// Manages the storage layer
pub struct StorageManager {
    layout: AddressLayout,
    files: DataFiles,
    tail: Mutex<Tail>,
    recycler: SpaceRecycler,
    cache: CacheLayer,
    file_growth: u64,
}

impl StorageManager {
    /// Open storage in `config.data_dir`, either fresh or from a saved state
    pub fn open(config: &Config, layout: AddressLayout, state: Option<StorageState>) -> Result<Self> {
        let StorageState {
            tail,
            file_count,
            free_spans,
        } = state.unwrap_or(StorageState {
            tail: Tail { file: 0, offset: 0 },
            file_count: 0,
            free_spans: Vec::new(),
        });

        let files = DataFiles::open(&config.data_dir, file_count)?;
        let recycler = SpaceRecycler::new(layout);
        for span in free_spans {
            recycler.add(span.address, span.length);
        }

        Ok(Self {
            layout,
            files,
            tail: Mutex::new(tail),
            recycler,
            cache: CacheLayer::new(config.hot_tier_capacity, config.cold_tier_limit),
            file_growth: config.file_growth,
        })
    }

    /// Store `data` and return its Address.
    ///
    /// On a failed file write the span goes back to the recycler and nothing
    /// is cached.
    pub fn write(&self, data: &[u8]) -> Result<Address> {
        let max = self.layout.file_capacity();
        if data.len() as u64 > max {
            return Err(KidError::ValueTooLarge { len: data.len(), max });
        }
        let span = span_for(data.len() as u32);

        let address = match self.recycler.acquire(span) {
            Some(address) => address,
            None => self.extend(span)?,
        };

        let (file, offset) = self.layout.decode(address);
        if let Err(source) = self.files.write_at(file, offset, data) {
            tracing::warn!(%address, error = %source, "Value write failed");
            self.recycler.add(address, span);
            return Err(KidError::IoWrite { address, source });
        }

        self.cache.insert(address, Bytes::copy_from_slice(data));
        Ok(address)
    }

    /// Read `length` bytes at `address`: hot tier, cold tiers, then file
    pub fn read(&self, address: Address, length: u32) -> Result<Bytes> {
        if let Some(value) = self.cache.get(address) {
            if value.len() != length as usize {
                return Err(self.corrupt(
                    address,
                    format!("cached {} bytes, locator says {}", value.len(), length),
                ));
            }
            return Ok(value);
        }

        self.check_extent(address, length)?;
        let (file, offset) = self.layout.decode(address);
        self.files
            .read_at(file, offset, length as usize)
            .map(Bytes::from)
            .map_err(|source| {
                tracing::warn!(%address, error = %source, "Value read failed");
                KidError::IoRead { address, source }
            })
    }

    /// Release the span behind a Locator
    pub fn free(&self, address: Address, length: u32) {
        self.cache.evict(address);
        self.recycler.add(address, span_for(length));
    }

    /// One reclamation pass: coalesce free spans, then give any free span
    /// touching the allocation tail back to the tail.
    pub fn reclaim(&self, batch: usize) -> ReclaimReport {
        let mut report = self.recycler.reclaim(batch);

        {
            let mut tail = self.tail.lock();
            while let Some(end) = self.layout.encode(tail.file, tail.offset) {
                match self.recycler.take_ending_at(end) {
                    Some(span) => {
                        tail.offset -= u64::from(span.length);
                        report.trimmed += u64::from(span.length);
                    }
                    None => break,
                }
            }
        }

        if report.trimmed > 0 {
            let stats = self.recycler.stats();
            report.spans = stats.spans;
            report.free_bytes = stats.free_bytes;
        }
        report
    }

    /// fsync all data files
    pub fn sync(&self) -> Result<()> {
        self.files.sync_all()?;
        Ok(())
    }

    /// Snapshot of the allocator for the manifest
    ///
    /// Tail and free spans are read under the tail lock, so a concurrent
    /// tail trim cannot land between the two reads.
    pub fn state(&self) -> StorageState {
        let tail = self.tail.lock();
        StorageState {
            tail: *tail,
            file_count: self.files.count(),
            free_spans: self.recycler.spans(),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn layout(&self) -> AddressLayout {
        self.layout
    }

    pub fn tail(&self) -> Tail {
        *self.tail.lock()
    }

    pub fn file_count(&self) -> u32 {
        self.files.count()
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn recycler_stats(&self) -> RecyclerStats {
        self.recycler.stats()
    }

    /// True if `dir` already holds data files
    pub fn data_files_exist(dir: &Path) -> Result<bool> {
        Ok(!DataFiles::discover(dir)?.is_empty())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Claim `span` bytes at the allocation tail, moving to the next file if
    /// the current one cannot hold them.
    ///
    /// Nothing changes unless the backing file is ready: on failure the tail
    /// and the recycler are as they were.
    fn extend(&self, span: u32) -> Result<Address> {
        let capacity = self.layout.file_capacity();
        let mut tail = self.tail.lock();

        let (next, rest) = if tail.offset + u64::from(span) > capacity {
            if tail.file + 1 >= self.layout.max_files() {
                tracing::error!(requested = span, "Address space exhausted");
                return Err(KidError::StorageExhausted { requested: span });
            }
            let rest = self
                .layout
                .encode(tail.file, tail.offset)
                .map(|address| (address, (capacity - tail.offset) as u32));
            (Tail { file: tail.file + 1, offset: 0 }, rest)
        } else {
            (*tail, None)
        };

        let address = self
            .layout
            .encode(next.file, next.offset)
            .ok_or(KidError::StorageExhausted { requested: span })?;

        self.files
            .ensure(
                next.file,
                next.offset + u64::from(span),
                self.file_growth,
                capacity,
            )
            .map_err(|source| {
                tracing::warn!(%address, error = %source, "Data file extension failed");
                KidError::IoWrite { address, source }
            })?;

        if let Some((rest, length)) = rest {
            self.recycler.add(rest, length);
        }
        if next.file != tail.file {
            tracing::info!(file = next.file, "Allocation moved to next data file");
        }
        *tail = Tail {
            file: next.file,
            offset: next.offset + u64::from(span),
        };
        Ok(address)
    }

    /// Reject addresses outside everything ever allocated
    fn check_extent(&self, address: Address, length: u32) -> Result<()> {
        let (file, offset) = self.layout.decode(address);
        let end = offset + u64::from(span_for(length));
        let tail = *self.tail.lock();

        if file >= self.files.count() {
            return Err(self.corrupt(address, format!("file {} does not exist", file)));
        }
        if file > tail.file || (file == tail.file && end > tail.offset) {
            return Err(self.corrupt(
                address,
                format!("range ends at {} beyond allocated tail {:?}", end, tail),
            ));
        }
        if end > self.layout.file_capacity() {
            return Err(self.corrupt(address, format!("range ends at {} past file end", end)));
        }
        Ok(())
    }

    fn corrupt(&self, address: Address, reason: String) -> KidError {
        tracing::error!(%address, %reason, "Corrupt address");
        KidError::CorruptAddress { address, reason }
    }
}
