//! Locator: where a value's bytes live

use serde::{Deserialize, Serialize};

use crate::storage::Address;

/// `{address, length}` of a value in storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub address: Address,
    pub length: u32,
}

impl Locator {
    pub fn new(address: Address, length: u32) -> Self {
        Self { address, length }
    }
}
