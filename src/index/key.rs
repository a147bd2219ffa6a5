//! Hashed keys
//!
//! Textual keys are folded into 31 bits with a multiplicative rolling hash
//! (`hash = hash * 131 + byte`). The top bit of a HashedKey is always zero.
//! Distinct keys may collide; the index then treats them as the same key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Multiplier of the rolling hash
const SEED: u32 = 131;

/// Keeps the reserved high bit clear
const MASK: u32 = 0x7FFF_FFFF;

/// 31-bit key used by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashedKey(u32);

impl HashedKey {
    /// Hash an arbitrary byte string
    pub fn hash(bytes: &[u8]) -> Self {
        let hash = bytes
            .iter()
            .fold(0u32, |hash, &b| hash.wrapping_mul(SEED).wrapping_add(u32::from(b)));
        Self(hash & MASK)
    }

    /// Wrap an already-hashed value, clearing the reserved bit
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & MASK)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HashedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
