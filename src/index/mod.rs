//! Index Module
//!
//! Maps hashed keys to Locators.
//!
//! ## Responsibilities
//! - Fold textual keys into 31-bit HashedKeys
//! - Keep one red-black tree per shard, each behind its own RwLock
//! - Run storage work under the owning shard's lock when asked to
//!
//! ## Shard Selection
//! ```text
//!   HashedKey (32 bits, top bit always 0)
//!   ┌───────────────┬───────────────────────────────────────┐
//!   │ shard bits    │ remaining key bits                    │
//!   └───────────────┴───────────────────────────────────────┘
//!   shard = key >> (32 - log2(shard_count))
//! ```
//! Because the top bit is reserved, only the lower half of the shards ever
//! receives keys produced by `HashedKey::hash`.

mod key;
mod locator;
mod rbtree;
mod sharded;

pub use key::HashedKey;
pub use locator::Locator;
pub use rbtree::{Iter, OrderedShard};
pub use sharded::ShardedIndex;
