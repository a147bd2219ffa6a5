//! Address encoding
//!
//! An Address is a 32-bit handle: the high `file_bits` select the data file,
//! the rest is the byte offset inside it. The split is fixed when a store is
//! created and recorded in its manifest.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KidError, Result};

/// Opaque handle to a byte range start in the backing files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(u32);

impl Address {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Split between file-selector bits and offset bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLayout {
    file_bits: u8,
}

impl AddressLayout {
    pub fn new(file_bits: u8) -> Result<Self> {
        if !(1..=8).contains(&file_bits) {
            return Err(KidError::Config(format!(
                "address layout needs 1..=8 file bits, got {}",
                file_bits
            )));
        }
        Ok(Self { file_bits })
    }

    pub fn file_bits(self) -> u8 {
        self.file_bits
    }

    pub fn offset_bits(self) -> u8 {
        32 - self.file_bits
    }

    /// Number of data files addressable with this layout
    pub fn max_files(self) -> u32 {
        1 << self.file_bits
    }

    /// Bytes addressable inside one file
    pub fn file_capacity(self) -> u64 {
        1u64 << self.offset_bits()
    }

    /// Encode a `{file, offset}` pair, or `None` if either is out of range
    pub fn encode(self, file: u32, offset: u64) -> Option<Address> {
        if file >= self.max_files() || offset >= self.file_capacity() {
            return None;
        }
        Some(Address((file << self.offset_bits()) | offset as u32))
    }

    /// Decode into `(file, offset)`
    pub fn decode(self, address: Address) -> (u32, u64) {
        let shift = self.offset_bits();
        let mask = (1u64 << shift) - 1;
        (address.0 >> shift, u64::from(address.0) & mask)
    }

    /// True when both addresses live in the same data file
    pub fn same_file(self, a: Address, b: Address) -> bool {
        self.decode(a).0 == self.decode(b).0
    }
}
