//! Free space recycler
//!
//! Tracks byte ranges released by `StorageManager::free` and hands them back
//! out to later writes (best fit, splitting oversized spans). A background
//! worker periodically coalesces address-adjacent spans.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{Address, AddressLayout, StorageManager};

/// A reclaimable byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSpan {
    pub address: Address,
    pub length: u32,
}

/// Counters exposed by the recycler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecyclerStats {
    pub spans: usize,
    pub free_bytes: u64,
    pub passes: u64,
    pub merges: u64,
}

/// Result of one coalescing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub merged: u64,
    /// Bytes returned to the allocation tail instead of staying free
    pub trimmed: u64,
    pub spans: usize,
    pub free_bytes: u64,
}

/// Both indexes over the same set of spans
#[derive(Default)]
struct FreeSpans {
    by_address: BTreeMap<Address, u32>,
    by_size: BTreeSet<(u32, Address)>,
    free_bytes: u64,
}

impl FreeSpans {
    fn insert(&mut self, address: Address, length: u32) {
        self.by_address.insert(address, length);
        self.by_size.insert((length, address));
        self.free_bytes += u64::from(length);
    }

    fn remove(&mut self, address: Address) -> Option<u32> {
        let length = self.by_address.remove(&address)?;
        self.by_size.remove(&(length, address));
        self.free_bytes -= u64::from(length);
        Some(length)
    }

    fn overlaps(&self, address: Address, length: u32) -> bool {
        let start = u64::from(address.raw());
        let end = start + u64::from(length);
        if let Some((&prev, &prev_len)) = self.by_address.range(..=address).next_back() {
            if u64::from(prev.raw()) + u64::from(prev_len) > start {
                return true;
            }
        }
        self.by_address
            .range((Excluded(address), Unbounded))
            .next()
            .is_some_and(|(&next, _)| u64::from(next.raw()) < end)
    }
}

/// Shared free-span bookkeeping, guarded by its own lock
pub struct SpaceRecycler {
    layout: AddressLayout,
    spans: Mutex<FreeSpans>,
    passes: AtomicU64,
    merges: AtomicU64,
}

impl SpaceRecycler {
    pub fn new(layout: AddressLayout) -> Self {
        Self {
            layout,
            spans: Mutex::new(FreeSpans::default()),
            passes: AtomicU64::new(0),
            merges: AtomicU64::new(0),
        }
    }

    /// Record a freed span. Overlapping or empty spans are rejected.
    pub fn add(&self, address: Address, length: u32) -> bool {
        if length == 0 {
            return false;
        }
        let mut spans = self.spans.lock();
        if spans.overlaps(address, length) {
            tracing::warn!(%address, length, "Ignoring free of span that is already free");
            return false;
        }
        spans.insert(address, length);
        true
    }

    /// Take the smallest free span of at least `min_length` bytes.
    ///
    /// Any excess stays free as a new span right after the returned range.
    /// `None` means the caller must extend backing storage.
    pub fn acquire(&self, min_length: u32) -> Option<Address> {
        let mut spans = self.spans.lock();
        let (length, address) = spans
            .by_size
            .range((min_length, Address::from_raw(0))..)
            .next()
            .copied()?;
        spans.remove(address);
        if length > min_length {
            let rest = Address::from_raw(address.raw() + min_length);
            spans.insert(rest, length - min_length);
        }
        Some(address)
    }

    /// Remove and return the free span ending exactly at `end` (exclusive)
    pub fn take_ending_at(&self, end: Address) -> Option<FreeSpan> {
        let mut spans = self.spans.lock();
        let (&address, &length) = spans.by_address.range(..end).next_back()?;
        if !self.layout.same_file(address, end)
            || u64::from(address.raw()) + u64::from(length) != u64::from(end.raw())
        {
            return None;
        }
        spans.remove(address);
        Some(FreeSpan { address, length })
    }

    /// Coalesce adjacent spans, holding the lock for at most `batch` spans
    /// at a time.
    pub fn reclaim(&self, batch: usize) -> ReclaimReport {
        let batch = batch.max(1);
        let mut cursor: Option<Address> = None;
        let mut merged = 0u64;

        loop {
            let mut spans = self.spans.lock();
            let mut current = match cursor {
                None => spans.by_address.iter().next(),
                Some(from) => spans.by_address.range(from..).next(),
            }
            .map(|(&a, &l)| (a, l));

            let mut steps = 0;
            let finished = loop {
                let Some((address, length)) = current else {
                    break true;
                };
                if steps == batch {
                    cursor = Some(address);
                    break false;
                }
                steps += 1;

                let next = spans
                    .by_address
                    .range((Excluded(address), Unbounded))
                    .next()
                    .map(|(&a, &l)| (a, l));
                current = match next {
                    Some((next_address, next_length))
                        if self.adjacent(address, length, next_address) =>
                    {
                        spans.remove(address);
                        spans.remove(next_address);
                        spans.insert(address, length + next_length);
                        merged += 1;
                        Some((address, length + next_length))
                    }
                    other => other,
                };
            };
            drop(spans);

            if finished {
                break;
            }
        }

        self.passes.fetch_add(1, Ordering::Relaxed);
        self.merges.fetch_add(merged, Ordering::Relaxed);

        let spans = self.spans.lock();
        ReclaimReport {
            merged,
            trimmed: 0,
            spans: spans.by_address.len(),
            free_bytes: spans.free_bytes,
        }
    }

    /// All free spans in address order
    pub fn spans(&self) -> Vec<FreeSpan> {
        self.spans
            .lock()
            .by_address
            .iter()
            .map(|(&address, &length)| FreeSpan { address, length })
            .collect()
    }

    pub fn stats(&self) -> RecyclerStats {
        let spans = self.spans.lock();
        RecyclerStats {
            spans: spans.by_address.len(),
            free_bytes: spans.free_bytes,
            passes: self.passes.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
        }
    }

    fn adjacent(&self, address: Address, length: u32, next: Address) -> bool {
        self.layout.same_file(address, next)
            && u64::from(address.raw()) + u64::from(length) == u64::from(next.raw())
    }
}

// =============================================================================
// Background Worker
// =============================================================================

/// Handle to the periodic reclamation thread.
///
/// The stop signal is checked between passes; dropping the handle stops the
/// thread and waits for the pass in flight to finish.
pub struct RecyclerWorker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RecyclerWorker {
    pub fn start(storage: Arc<StorageManager>, interval: Duration, batch: usize) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("kid-recycler".to_string())
            .spawn(move || {
                tracing::info!(interval_ms = interval.as_millis() as u64, "Recycler worker started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let report = storage.reclaim(batch);
                            tracing::debug!(
                                merged = report.merged,
                                trimmed = report.trimmed,
                                spans = report.spans,
                                free_bytes = report.free_bytes,
                                "Recycler pass complete"
                            );
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::info!("Recycler worker stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the worker and wait for it to exit
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Recycler worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for RecyclerWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
