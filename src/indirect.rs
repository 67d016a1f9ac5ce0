//! Indirect-block address translation.
//!
//! `direct + A + A^2 + A^3` addressable blocks per inode, where `A =
//! block_size / 8`. Reads descend through unallocated tiers as all-zero
//! address blocks; writes carry the existing tree down so untouched slots
//! survive, then re-pack and re-append each modified address block on the
//! way back up.

use crate::address_block::{addresses_per_block, AddressBlock};
use crate::block_address::BlockAddress;
use crate::error::{Error, Result};
use crate::inode::{INode, NUM_DIRECT};
use crate::log::Log;

/// Where a logical file block index lives.
enum Location {
    Direct(usize),
    /// `level` is 0/1/2 for single/double/triple indirect; `offsets` has
    /// `level + 1` entries, most-significant tier first.
    Indirect { level: usize, offsets: Vec<usize> },
}

fn locate(i: u64, a: u64) -> Result<Location> {
    let direct = NUM_DIRECT as u64;
    if i < direct {
        return Ok(Location::Direct(i as usize));
    }
    let i = i - direct;
    if i < a {
        return Ok(Location::Indirect {
            level: 0,
            offsets: vec![i as usize],
        });
    }
    let i = i - a;
    if i < a * a {
        return Ok(Location::Indirect {
            level: 1,
            offsets: vec![(i / a) as usize, (i % a) as usize],
        });
    }
    let i = i - a * a;
    if i < a * a * a {
        return Ok(Location::Indirect {
            level: 2,
            offsets: vec![
                (i / (a * a)) as usize,
                ((i / a) % a) as usize,
                (i % a) as usize,
            ],
        });
    }
    Err(Error::Invariant(format!(
        "logical block index {} exceeds addressable range",
        i + direct + a + a * a
    )))
}

fn read_chain(log: &Log, root: BlockAddress, offsets: &[usize]) -> Result<BlockAddress> {
    if root.is_none() {
        return Ok(BlockAddress::NONE);
    }
    let bytes = log.read_block(root)?;
    let block = AddressBlock::from_bytes(bytes);
    let next = block.get(offsets[0]);
    if offsets.len() == 1 {
        Ok(next)
    } else {
        read_chain(log, next, &offsets[1..])
    }
}

/// Writes `new_addr` at the leaf of `offsets`, preserving every other slot
/// along the path, and returns the address of the (possibly new) root block.
fn write_chain(log: &mut Log, root: BlockAddress, offsets: &[usize], new_addr: BlockAddress, block_size: usize) -> Result<BlockAddress> {
    let mut block = if root.is_none() {
        AddressBlock::empty(block_size)
    } else {
        AddressBlock::from_bytes(log.read_block(root)?)
    };
    if offsets.len() == 1 {
        block.set(offsets[0], new_addr);
    } else {
        let child_root = block.get(offsets[0]);
        let new_child = write_chain(log, child_root, &offsets[1..], new_addr, block_size)?;
        block.set(offsets[0], new_child);
    }
    log.write_data_block(block.as_bytes())
}

/// Reads the data-block address for logical file block `i`.
pub fn read_block_address(log: &Log, inode: &INode, i: u64) -> Result<BlockAddress> {
    let a = addresses_per_block(log.block_size()) as u64;
    match locate(i, a)? {
        Location::Direct(idx) => Ok(inode.direct[idx]),
        Location::Indirect { level, offsets } => read_chain(log, inode.indirect[level], &offsets),
    }
}

/// Writes the data-block address for logical file block `i`, updating the
/// inode's direct slot or indirect root as needed.
pub fn write_block_address(log: &mut Log, inode: &mut INode, i: u64, new_addr: BlockAddress) -> Result<()> {
    let block_size = log.block_size();
    let a = addresses_per_block(block_size) as u64;
    match locate(i, a)? {
        Location::Direct(idx) => {
            inode.direct[idx] = new_addr;
        }
        Location::Indirect { level, offsets } => {
            let root = inode.indirect[level];
            let new_root = write_chain(log, root, &offsets, new_addr, block_size)?;
            inode.indirect[level] = new_root;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryStore;
    use std::sync::Arc;

    fn new_log() -> Log {
        Log::new(1, Arc::new(MemoryStore::new()), 64, 1024)
    }

    #[test]
    fn direct_tier_round_trips() {
        let mut log = new_log();
        let mut inode = INode::new(1, 0, libc::S_IFREG | 0o644, 0, 0, 64);
        let addr = log.write_data_block(b"direct").unwrap();
        write_block_address(&mut log, &mut inode, 0, addr).unwrap();
        assert_eq!(read_block_address(&log, &inode, 0).unwrap(), addr);
    }

    #[test]
    fn single_indirect_tier_round_trips() {
        // block_size = 64 => A = 8, direct = 16, so index 16 is the first
        // single-indirect slot.
        let mut log = new_log();
        let mut inode = INode::new(1, 0, libc::S_IFREG | 0o644, 0, 0, 64);
        let addr = log.write_data_block(b"lvl1").unwrap();
        write_block_address(&mut log, &mut inode, 16, addr).unwrap();
        assert!(!inode.indirect[0].is_none());
        assert_eq!(read_block_address(&log, &inode, 16).unwrap(), addr);
    }

    #[test]
    fn sibling_write_preserves_other_indirect_entry() {
        let mut log = new_log();
        let mut inode = INode::new(1, 0, libc::S_IFREG | 0o644, 0, 0, 64);
        let addr16 = log.write_data_block(b"a").unwrap();
        write_block_address(&mut log, &mut inode, 16, addr16).unwrap();
        // index 24 = 16 + 8, requires a fresh double-indirect write sharing
        // no block with 16 here (16..24 is still within the single-indirect
        // tier of size A=8, so 24 actually falls into the double-indirect
        // tier). Writing it must not disturb block 16.
        let addr24 = log.write_data_block(b"b").unwrap();
        write_block_address(&mut log, &mut inode, 24, addr24).unwrap();
        assert_eq!(read_block_address(&log, &inode, 16).unwrap(), addr16);
        assert_eq!(read_block_address(&log, &inode, 24).unwrap(), addr24);
    }

    #[test]
    fn unallocated_tier_reads_as_none() {
        let log = new_log();
        let inode = INode::new(1, 0, libc::S_IFREG | 0o644, 0, 0, 64);
        assert!(read_block_address(&log, &inode, 1000).unwrap().is_none());
    }
}
