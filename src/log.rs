//! Append-only writer over the current RW segment.
//!
//! Only one instance should exist per mounted filesystem; it is owned
//! exclusively by the upcall thread until a segment seals, at which point
//! ownership of the sealed bytes passes to the backend chain.

use std::sync::Arc;

use crate::block_address::BlockAddress;
use crate::error::Result;
use crate::object_store::ObjectStore;
use crate::segment::{ReadOnlySegment, ReadWriteSegment};

pub struct Log {
    current_segment_id: u64,
    current: ReadWriteSegment,
    block_size: usize,
    blocks_per_segment: usize,
    backend: Arc<dyn ObjectStore>,
}

impl Log {
    pub fn new(
        next_segment_id: u64,
        backend: Arc<dyn ObjectStore>,
        block_size: usize,
        blocks_per_segment: usize,
    ) -> Self {
        Self {
            current_segment_id: next_segment_id,
            current: ReadWriteSegment::new(next_segment_id, block_size, blocks_per_segment),
            block_size,
            blocks_per_segment,
            backend,
        }
    }

    pub fn current_segment_id(&self) -> u64 {
        self.current_segment_id
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn blocks_per_segment(&self) -> usize {
        self.blocks_per_segment
    }

    /// Rolls the current segment to the backend and opens the next one.
    fn roll(&mut self) -> Result<()> {
        let sealed_id = self.current_segment_id;
        self.current_segment_id += 1;
        let next = ReadWriteSegment::new(self.current_segment_id, self.block_size, self.blocks_per_segment);
        let sealed = std::mem::replace(&mut self.current, next);
        let sealed = sealed.seal();
        // If the backend put fails, the next segment id was already
        // allocated and is still valid to write into; the failed segment's
        // bytes never reached the store so no checkpoint may reference it.
        self.backend.put_segment(sealed_id, sealed.as_bytes())?;
        Ok(())
    }

    pub fn write_data_block(&mut self, bytes: &[u8]) -> Result<BlockAddress> {
        let offset = self.current.write_data(bytes)?;
        let addr = BlockAddress::new(self.current_segment_id, offset as u16);
        debug_assert!(!addr.is_none(), "segment 0 is reserved; see BlockAddress::NONE");
        if self.current.is_full() {
            self.roll()?;
        }
        Ok(addr)
    }

    pub fn write_inode(&mut self, bytes: &[u8], inode_number: u64) -> Result<BlockAddress> {
        let offset = self.current.write_inode(bytes, inode_number)?;
        let addr = BlockAddress::new(self.current_segment_id, offset as u16);
        debug_assert!(!addr.is_none(), "segment 0 is reserved; see BlockAddress::NONE");
        if self.current.is_full() {
            self.roll()?;
        }
        Ok(addr)
    }

    pub fn read_block(&self, addr: BlockAddress) -> Result<Vec<u8>> {
        if addr.segment_id == self.current_segment_id {
            self.current.read_block(addr.offset as u32)
        } else {
            let bytes = self.backend.get_segment(addr.segment_id)?;
            let segment = ReadOnlySegment::from_bytes(
                addr.segment_id,
                self.block_size,
                self.blocks_per_segment,
                bytes,
            )?;
            segment.read_block(addr.offset as u32)
        }
    }

    /// Seals the current segment (if it has any writes), advances to the
    /// next one, and blocks until the backend has durably stored everything
    /// submitted so far.
    pub fn flush(&mut self) -> Result<()> {
        if self.current.block_count() > 0 {
            self.roll()?;
        }
        self.backend.flush()
    }
}
