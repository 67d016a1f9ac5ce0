//! Fixed-size assemblage of blocks plus a trailing summary block.
//!
//! A segment is either still being assembled (`ReadWrite`) or has been
//! sealed and is addressed by its on-wire bytes (`ReadOnly`). Both forms
//! share the same `(inode_number, block_index)` summary contract.

use crate::error::{Error, Result};

/// One summary entry: an inode image was written at this block index.
pub type SummaryEntry = (u64, u32);

/// A segment under assembly. Accepts writes until full.
pub struct ReadWriteSegment {
    id: u64,
    block_size: usize,
    blocks_per_segment: usize,
    blocks: Vec<u8>,
    next_block: usize,
    summary: Vec<SummaryEntry>,
}

/// A sealed segment, addressed by its on-wire bytes: summary block followed
/// by `blocks_per_segment` payload blocks.
pub struct ReadOnlySegment {
    id: u64,
    block_size: usize,
    blocks_per_segment: usize,
    bytes: Vec<u8>,
    summary: Vec<SummaryEntry>,
}

/// Either form of a segment: under assembly or sealed.
pub enum Segment {
    ReadWrite(ReadWriteSegment),
    ReadOnly(ReadOnlySegment),
}

impl ReadWriteSegment {
    pub fn new(id: u64, block_size: usize, blocks_per_segment: usize) -> Self {
        Self {
            id,
            block_size,
            blocks_per_segment,
            blocks: Vec::with_capacity(block_size * blocks_per_segment),
            next_block: 0,
            summary: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_full(&self) -> bool {
        self.next_block >= self.blocks_per_segment
    }

    /// Number of blocks written so far.
    pub fn block_count(&self) -> usize {
        self.next_block
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<u32> {
        if self.is_full() {
            return Err(Error::Invariant(format!(
                "segment {} is full, cannot accept more writes",
                self.id
            )));
        }
        if bytes.len() > self.block_size {
            return Err(Error::Invariant(format!(
                "block of {} bytes exceeds block_size {}",
                bytes.len(),
                self.block_size
            )));
        }
        self.blocks.extend_from_slice(bytes);
        self.blocks
            .extend(std::iter::repeat(0u8).take(self.block_size - bytes.len()));
        let block_index = self.next_block as u32;
        self.next_block += 1;
        Ok(block_index)
    }

    /// Appends one block's worth of data, zero-padded if short.
    pub fn write_data(&mut self, bytes: &[u8]) -> Result<u32> {
        self.write_raw(bytes)
    }

    /// Appends one inode image, recording it in the summary.
    pub fn write_inode(&mut self, bytes: &[u8], inode_number: u64) -> Result<u32> {
        let block_index = self.write_raw(bytes)?;
        self.summary.push((inode_number, block_index));
        Ok(block_index)
    }

    /// Reads back payload block `i` from the in-progress buffer.
    pub fn read_block(&self, i: u32) -> Result<Vec<u8>> {
        let i = i as usize;
        if i >= self.next_block {
            return Err(Error::Invariant(format!(
                "block {i} not yet written in segment {}",
                self.id
            )));
        }
        let start = i * self.block_size;
        Ok(self.blocks[start..start + self.block_size].to_vec())
    }

    /// Encodes the summary body: `u32` count followed by `(u64, u32)`
    /// entries, padded with zeros to `block_size`.
    fn encode_summary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.block_size);
        out.extend_from_slice(&(self.summary.len() as u32).to_le_bytes());
        for (inum, bidx) in &self.summary {
            out.extend_from_slice(&inum.to_le_bytes());
            out.extend_from_slice(&bidx.to_le_bytes());
        }
        assert!(
            out.len() <= self.block_size,
            "segment summary overflowed block_size"
        );
        out.resize(self.block_size, 0);
        out
    }

    /// Materializes the summary block and concatenates it with the payload
    /// blocks (zero-padding any never-written trailing blocks), producing
    /// the on-wire form. The segment is never modified after this point.
    pub fn seal(self) -> ReadOnlySegment {
        let mut bytes = self.encode_summary();
        bytes.extend_from_slice(&self.blocks);
        // Pad unwritten trailing blocks so the on-wire size is always exact.
        let written_bytes = self.next_block * self.block_size;
        let total_payload_bytes = self.blocks_per_segment * self.block_size;
        if written_bytes < total_payload_bytes {
            bytes.extend(std::iter::repeat(0u8).take(total_payload_bytes - written_bytes));
        }
        ReadOnlySegment {
            id: self.id,
            block_size: self.block_size,
            blocks_per_segment: self.blocks_per_segment,
            bytes,
            summary: self.summary,
        }
    }
}

impl ReadOnlySegment {
    /// Parses a segment's on-wire bytes: summary block first, then payload.
    pub fn from_bytes(id: u64, block_size: usize, blocks_per_segment: usize, bytes: Vec<u8>) -> Result<Self> {
        let expected = (blocks_per_segment + 1) * block_size;
        if bytes.len() != expected {
            return Err(Error::Invariant(format!(
                "segment {id} has {} bytes, expected {expected}",
                bytes.len()
            )));
        }
        let summary = decode_summary(&bytes[..block_size])?;
        Ok(Self {
            id,
            block_size,
            blocks_per_segment,
            bytes,
            summary,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_full(&self) -> bool {
        true
    }

    pub fn read_block(&self, i: u32) -> Result<Vec<u8>> {
        let i = i as usize;
        if i >= self.blocks_per_segment {
            return Err(Error::Invariant(format!(
                "block index {i} out of range for segment {}",
                self.id
            )));
        }
        // Payload starts after the summary block.
        let start = self.block_size + i * self.block_size;
        Ok(self.bytes[start..start + self.block_size].to_vec())
    }

    pub fn inode_block_numbers(&self) -> &[SummaryEntry] {
        &self.summary
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

fn decode_summary(block: &[u8]) -> Result<Vec<SummaryEntry>> {
    if block.len() < 4 {
        return Err(Error::Invariant("summary block too short".into()));
    }
    let mut count_bytes = [0u8; 4];
    count_bytes.copy_from_slice(&block[..4]);
    let count = u32::from_le_bytes(count_bytes) as usize;
    let entry_size = 12; // u64 inum + u32 block index
    let needed = 4 + count * entry_size;
    if needed > block.len() {
        return Err(Error::Invariant("summary entry count overflows block".into()));
    }
    let mut entries = Vec::with_capacity(count);
    let mut offset = 4;
    for _ in 0..count {
        let mut inum_bytes = [0u8; 8];
        inum_bytes.copy_from_slice(&block[offset..offset + 8]);
        let inum = u64::from_le_bytes(inum_bytes);
        let mut bidx_bytes = [0u8; 4];
        bidx_bytes.copy_from_slice(&block[offset + 8..offset + 12]);
        let bidx = u32::from_le_bytes(bidx_bytes);
        entries.push((inum, bidx));
        offset += entry_size;
    }
    Ok(entries)
}

impl Segment {
    pub fn id(&self) -> u64 {
        match self {
            Self::ReadWrite(s) => s.id(),
            Self::ReadOnly(s) => s.id(),
        }
    }

    pub fn is_full(&self) -> bool {
        match self {
            Self::ReadWrite(s) => s.is_full(),
            Self::ReadOnly(s) => s.is_full(),
        }
    }

    pub fn read_block(&self, i: u32) -> Result<Vec<u8>> {
        match self {
            Self::ReadWrite(s) => s.read_block(i),
            Self::ReadOnly(s) => s.read_block(i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_block_round_trips_with_padding() {
        let mut seg = ReadWriteSegment::new(0, 64, 4);
        let idx = seg.write_data(b"hi").unwrap();
        let block = seg.read_block(idx).unwrap();
        assert_eq!(block.len(), 64);
        assert_eq!(&block[..2], b"hi");
        assert!(block[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn full_segment_rejects_writes() {
        let mut seg = ReadWriteSegment::new(0, 64, 2);
        seg.write_data(b"a").unwrap();
        seg.write_data(b"b").unwrap();
        assert!(seg.is_full());
        assert!(seg.write_data(b"c").is_err());
    }

    #[test]
    fn summary_round_trips_through_seal() {
        let mut seg = ReadWriteSegment::new(3, 64, 4);
        seg.write_data(b"data0").unwrap();
        seg.write_inode(b"inode-bytes", 100).unwrap();
        seg.write_data(b"data2").unwrap();
        seg.write_inode(b"inode-bytes-2", 200).unwrap();
        let ro = seg.seal();
        assert_eq!(ro.inode_block_numbers(), &[(100, 1), (200, 3)]);
        assert_eq!(&ro.read_block(0).unwrap()[..5], b"data0");
        assert_eq!(&ro.read_block(2).unwrap()[..5], b"data2");

        let reloaded =
            ReadOnlySegment::from_bytes(3, 64, 4, ro.as_bytes().to_vec()).unwrap();
        assert_eq!(reloaded.inode_block_numbers(), &[(100, 1), (200, 3)]);
        assert_eq!(&reloaded.read_block(1).unwrap()[..11], b"inode-bytes");
    }

    #[test]
    fn on_wire_size_is_exact() {
        let seg = ReadWriteSegment::new(0, 64, 4);
        let ro = seg.seal();
        assert_eq!(ro.as_bytes().len(), (4 + 1) * 64);
    }
}
