//! Error types for KiD
//!
//! Provides a unified error type for all operations. A missing key is not an
//! error: lookups return `Option`.

use thiserror::Error;

use crate::storage::Address;

/// Result type alias using KidError
pub type Result<T> = std::result::Result<T, KidError>;

/// Unified error type for KiD operations
#[derive(Debug, Error)]
pub enum KidError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Read failed at {address}: {source}")]
    IoRead {
        address: Address,
        #[source]
        source: std::io::Error,
    },

    #[error("Write failed at {address}: {source}")]
    IoWrite {
        address: Address,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt address {address}: {reason}")]
    CorruptAddress { address: Address, reason: String },

    #[error("Storage exhausted: no file left for a {requested}-byte span")]
    StorageExhausted { requested: u32 },

    #[error("Value of {len} bytes exceeds the per-file limit of {max} bytes")]
    ValueTooLarge { len: usize, max: u64 },

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Red-black invariant violated in shard {shard} at key {key}: {reason}")]
    InvariantViolation { shard: usize, key: u32, reason: String },

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for KidError {
    fn from(err: bincode::Error) -> Self {
        KidError::Serialization(err.to_string())
    }
}
