//! # KiD
//!
//! An embeddable key-value store with:
//! - A sharded index: one red-black tree and one RwLock per shard
//! - Address-based value storage across a fixed set of data files
//! - A two-tier (hot / sealed cold) value cache
//! - A free-space recycler with a background coalescing worker
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Store                                 │
//! │              (hash key → shard → Locator)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    ShardedIndex                              │
//! │        Shard 0 … Shard N  (RwLock + red-black tree)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Locator {address, length}
//!                       ▼
//!               ┌───────────────┐
//!               │StorageManager │
//!               └──┬─────────┬──┘
//!                  │         │
//!                  ▼         ▼
//!          ┌────────────┐ ┌──────────────┐
//!          │ CacheLayer │ │SpaceRecycler │◄── RecyclerWorker
//!          │ hot / cold │ │ free spans   │
//!          └─────┬──────┘ └──────────────┘
//!                ▼
//!          data_NNN.kid
//! ```
//!
//! Not transactional and not crash-consistent: no WAL, no multi-key
//! atomicity. State survives a clean `Store::close`.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod index;
pub mod storage;
pub mod manifest;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KidError, Result};
pub use config::Config;
pub use index::{HashedKey, Locator};
pub use store::{Store, StoreStats};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of KiD
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
