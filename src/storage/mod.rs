//! Storage Module
//!
//! Address-based persistent byte store with a two-tier cache and a free
//! space recycler.
//!
//! ## Responsibilities
//! - Allocate byte ranges in the data files (recycled spans first)
//! - Keep recently written values in memory (hot tier, sealed cold tiers)
//! - Track freed ranges and coalesce them in the background
//!
//! ## Address Format
//! ```text
//! ┌──────────────────┬──────────────────────────────────────┐
//! │ File (file_bits) │ Offset (32 - file_bits)              │
//! └──────────────────┴──────────────────────────────────────┘
//!   default: 4 bits → 16 files, 28 bits → 256 MB per file
//! ```

mod address;
mod cache;
mod files;
mod manager;
mod recycler;

pub use address::{Address, AddressLayout};
pub use cache::{CacheLayer, CacheStats};
pub use files::DataFiles;
pub use manager::{span_for, StorageManager, StorageState, Tail};
pub use recycler::{FreeSpan, ReclaimReport, RecyclerStats, RecyclerWorker, SpaceRecycler};
