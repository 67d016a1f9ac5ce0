//! A block packed with [`BlockAddress`]es: the unit of indirection in the
//! indirect tree (§3.4). Holds `block_size / 8` addresses, no header.

use crate::block_address::{BlockAddress, ADDRESS_SIZE};

/// Wraps a raw block's worth of bytes as a sequence of addresses.
pub struct AddressBlock {
    data: Vec<u8>,
}

impl AddressBlock {
    /// Builds an address block of the given size, all-zero (i.e. every slot
    /// is the unallocated sentinel). Used when an indirect tier has not yet
    /// been allocated.
    pub fn empty(block_size: usize) -> Self {
        Self {
            data: vec![0u8; block_size],
        }
    }

    /// Wraps existing on-log bytes as an address block.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Number of address slots this block can hold.
    pub fn capacity(&self) -> usize {
        self.data.len() / ADDRESS_SIZE
    }

    pub fn get(&self, offset: usize) -> BlockAddress {
        let start = offset * ADDRESS_SIZE;
        BlockAddress::from_bytes(&self.data[start..start + ADDRESS_SIZE])
    }

    pub fn set(&mut self, offset: usize, addr: BlockAddress) {
        let start = offset * ADDRESS_SIZE;
        self.data[start..start + ADDRESS_SIZE].copy_from_slice(&addr.to_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Number of address slots an address block holds for the given filesystem
/// block size (`A`).
pub fn addresses_per_block(block_size: usize) -> usize {
    block_size / ADDRESS_SIZE
}
