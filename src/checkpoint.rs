//! Serialized imap + counters + filesystem parameters.
//!
//! Encoded by hand as a self-describing, length-prefixed binary record
//! rather than with a generic serialization crate, so the on-disk format
//! stays a documented byte layout instead of depending on a library's
//! encoding decisions.

use std::collections::HashMap;

use crate::block_address::{BlockAddress, ADDRESS_SIZE};
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub block_size: u32,
    pub blocks_per_segment: u32,
    /// Filesystem size hint, in blocks.
    pub fs_size_hint: u64,
    pub bucket_name: String,
    pub root_inode_id: u64,
    /// Id of the last *sealed* segment covered by this checkpoint. Any
    /// segment with a greater id must be recovered by roll-forward.
    pub segment_counter: u64,
    pub inode_counter: u64,
    pub inode_map: HashMap<u64, BlockAddress>,
    pub checkpoint_time: i64,
}

impl Checkpoint {
    pub fn new(bucket_name: String, block_size: u32, blocks_per_segment: u32, fs_size_hint: u64) -> Self {
        Self {
            block_size,
            blocks_per_segment,
            fs_size_hint,
            bucket_name,
            root_inode_id: 0,
            segment_counter: 0,
            inode_counter: 0,
            inode_map: HashMap::new(),
            checkpoint_time: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.block_size.to_le_bytes());
        out.extend_from_slice(&self.blocks_per_segment.to_le_bytes());
        out.extend_from_slice(&self.fs_size_hint.to_le_bytes());
        out.extend_from_slice(&self.root_inode_id.to_le_bytes());
        out.extend_from_slice(&self.segment_counter.to_le_bytes());
        out.extend_from_slice(&self.inode_counter.to_le_bytes());
        out.extend_from_slice(&self.checkpoint_time.to_le_bytes());

        let name_bytes = self.bucket_name.as_bytes();
        out.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(name_bytes);

        out.extend_from_slice(&(self.inode_map.len() as u32).to_le_bytes());
        for (inum, addr) in &self.inode_map {
            out.extend_from_slice(&inum.to_le_bytes());
            out.extend_from_slice(&addr.to_bytes());
        }
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut p = 0usize;
        let need = |p: usize, n: usize| -> Result<()> {
            if p + n > data.len() {
                Err(Error::Invariant("checkpoint record truncated".into()))
            } else {
                Ok(())
            }
        };

        need(p, 4)?;
        let block_size = u32::from_le_bytes(data[p..p + 4].try_into().unwrap());
        p += 4;
        need(p, 4)?;
        let blocks_per_segment = u32::from_le_bytes(data[p..p + 4].try_into().unwrap());
        p += 4;
        need(p, 8)?;
        let fs_size_hint = u64::from_le_bytes(data[p..p + 8].try_into().unwrap());
        p += 8;
        need(p, 8)?;
        let root_inode_id = u64::from_le_bytes(data[p..p + 8].try_into().unwrap());
        p += 8;
        need(p, 8)?;
        let segment_counter = u64::from_le_bytes(data[p..p + 8].try_into().unwrap());
        p += 8;
        need(p, 8)?;
        let inode_counter = u64::from_le_bytes(data[p..p + 8].try_into().unwrap());
        p += 8;
        need(p, 8)?;
        let checkpoint_time = i64::from_le_bytes(data[p..p + 8].try_into().unwrap());
        p += 8;

        need(p, 4)?;
        let name_len = u32::from_le_bytes(data[p..p + 4].try_into().unwrap()) as usize;
        p += 4;
        need(p, name_len)?;
        let bucket_name = String::from_utf8(data[p..p + name_len].to_vec())
            .map_err(|e| Error::Invariant(format!("bucket name not utf8: {e}")))?;
        p += name_len;

        need(p, 4)?;
        let map_len = u32::from_le_bytes(data[p..p + 4].try_into().unwrap()) as usize;
        p += 4;
        let mut inode_map = HashMap::with_capacity(map_len);
        for _ in 0..map_len {
            need(p, 8 + ADDRESS_SIZE)?;
            let inum = u64::from_le_bytes(data[p..p + 8].try_into().unwrap());
            p += 8;
            let addr = BlockAddress::from_bytes(&data[p..p + ADDRESS_SIZE]);
            p += ADDRESS_SIZE;
            inode_map.insert(inum, addr);
        }

        Ok(Self {
            block_size,
            blocks_per_segment,
            fs_size_hint,
            bucket_name,
            root_inode_id,
            segment_counter,
            inode_counter,
            inode_map,
            checkpoint_time,
        })
    }
}
