//! Splits an inode's logical byte range into block-sized log operations.
//! Shared by file data and directory child tables, which are both just
//! bytes placed into an inode's data blocks.

use crate::directory::ChildTable;
use crate::error::Result;
use crate::inode::INode;
use crate::log::Log;
use crate::{directory, indirect};

/// Reads `len` bytes starting at byte `offset`. Logical blocks with no
/// allocated address (a hole, or reading past what was ever written within
/// an allocated tier) read back as zeros.
pub(crate) fn read_bytes_at(log: &Log, inode: &INode, offset: u64, len: usize) -> Result<Vec<u8>> {
    let block_size = log.block_size() as u64;
    let mut out = Vec::with_capacity(len);
    let mut pos = offset;
    let mut remaining = len;
    while remaining > 0 {
        let block_index = pos / block_size;
        let within = (pos % block_size) as usize;
        let take = remaining.min(block_size as usize - within);
        let addr = indirect::read_block_address(log, inode, block_index)?;
        let block_bytes = if addr.is_none() {
            vec![0u8; block_size as usize]
        } else {
            log.read_block(addr)?
        };
        out.extend_from_slice(&block_bytes[within..within + take]);
        pos += take as u64;
        remaining -= take;
    }
    Ok(out)
}

/// Writes `data` starting at byte `offset`, splitting across blocks and
/// performing a read-modify-write on any partially-touched block. Extends
/// `inode.size` if the write reaches past the current end of file but does
/// not touch `mtime`/`ctime` (callers update those).
pub(crate) fn write_bytes_at(log: &mut Log, inode: &mut INode, offset: u64, data: &[u8]) -> Result<()> {
    let block_size = log.block_size() as u64;
    let mut pos = offset;
    let mut remaining = data.len();
    let mut src = 0usize;
    while remaining > 0 {
        let block_index = pos / block_size;
        let within = (pos % block_size) as usize;
        let take = remaining.min(block_size as usize - within);
        let mut block_bytes = if within != 0 || take < block_size as usize {
            let addr = indirect::read_block_address(log, inode, block_index)?;
            if addr.is_none() {
                vec![0u8; block_size as usize]
            } else {
                log.read_block(addr)?
            }
        } else {
            vec![0u8; block_size as usize]
        };
        block_bytes[within..within + take].copy_from_slice(&data[src..src + take]);
        let new_addr = log.write_data_block(&block_bytes)?;
        indirect::write_block_address(log, inode, block_index, new_addr)?;
        pos += take as u64;
        remaining -= take;
        src += take;
    }
    let end = offset + data.len() as u64;
    if end > inode.size {
        inode.size = end;
    }
    Ok(())
}

pub(crate) fn read_children(log: &Log, inode: &INode) -> Result<ChildTable> {
    let bytes = read_bytes_at(log, inode, 0, inode.size as usize)?;
    directory::decode(&bytes)
}

/// Re-encodes and writes the full child table: directory mutations always
/// rewrite the whole table rather than patching individual entries in place.
pub(crate) fn write_children(log: &mut Log, inode: &mut INode, children: &ChildTable) -> Result<()> {
    let encoded = directory::encode(children);
    inode.size = 0; // the table is always rewritten from offset 0
    write_bytes_at(log, inode, 0, &encoded)?;
    inode.touch_mtime();
    Ok(())
}
