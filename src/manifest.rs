//! Manifest
//!
//! Snapshot of everything that only lives in memory: the index entries and
//! the allocator bookkeeping, plus the address layout every saved Address
//! depends on.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                       │
//! │   Magic: "KIDM" (4) | Version: u16 (2) | CRC32: u32 (4) │
//! │   BodyLen: u64 (8)                                      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Body (bincode)                                          │
//! │   layout | shard_count | storage state | entries        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! All integers are little-endian. The file is written beside the target
//! and renamed into place.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KidError, Result};
use crate::index::{HashedKey, Locator};
use crate::storage::{AddressLayout, StorageState};

/// Manifest file name inside the data directory
pub const MANIFEST_FILENAME: &str = "MANIFEST";

const MAGIC: &[u8; 4] = b"KIDM";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 18;

/// Persisted store snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub layout: AddressLayout,
    pub shard_count: u32,
    pub storage: StorageState,
    pub entries: Vec<(HashedKey, Locator)>,
}

impl Manifest {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILENAME)
    }

    /// Load the manifest in `dir`, if there is one
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(dir);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Self::decode(&bytes).map(Some)
    }

    /// Write the manifest to `dir`, replacing any previous one
    pub fn save(&self, dir: &Path) -> Result<()> {
        let bytes = self.encode()?;
        let tmp = dir.join(format!("{}.tmp", MANIFEST_FILENAME));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, Self::path(dir))?;
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;

        let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        out.extend_from_slice(&(body.len() as u64).to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(KidError::Manifest(format!(
                "truncated header: {} bytes",
                bytes.len()
            )));
        }
        let (header, body) = bytes.split_at(HEADER_SIZE);

        if &header[0..4] != MAGIC {
            return Err(KidError::Manifest(format!(
                "invalid magic: expected KIDM, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(KidError::Manifest(format!(
                "unsupported version: {}",
                version
            )));
        }

        let crc = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&header[10..18]);
        let body_len = u64::from_le_bytes(len_bytes);

        if body.len() as u64 != body_len {
            return Err(KidError::Manifest(format!(
                "body length {} does not match header {}",
                body.len(),
                body_len
            )));
        }
        if crc32fast::hash(body) != crc {
            return Err(KidError::Manifest("checksum mismatch".into()));
        }

        Ok(bincode::deserialize(body)?)
    }
}
