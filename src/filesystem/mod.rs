//! The integrator: implements directory and file operations, orchestrates
//! log writes, maintains the imap, triggers periodic checkpoints, and
//! performs roll-forward on mount.

mod data;
mod fuse_impl;
mod mkfs;
mod rollforward;

pub use mkfs::{format, FormatConfig};

use std::collections::HashMap;
use std::sync::Arc;

use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::inode::INode;
use crate::log::Log;
use crate::object_store::ObjectStore;

/// Runtime knobs not carried in the checkpoint itself.
#[derive(Clone, Debug)]
pub struct MountConfig {
    pub checkpoint_frequency_seconds: i64,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            checkpoint_frequency_seconds: 60,
        }
    }
}

/// The mounted filesystem. Owns the log, the current checkpoint (imap +
/// counters), and the per-inode lookup-count table used to decide when a
/// forgotten, unlinked inode can be dropped from the imap.
pub struct FileSystem {
    checkpoint: Checkpoint,
    log: Log,
    backend: Arc<dyn ObjectStore>,
    config: MountConfig,
    last_checkpoint_time: i64,
    lookup_counts: HashMap<u64, u64>,
}

impl FileSystem {
    /// Mounts a previously formatted filesystem: loads the checkpoint, rolls
    /// forward any segments written after it, and opens the log at the
    /// first empty segment id.
    pub fn mount(backend: Arc<dyn ObjectStore>, config: MountConfig) -> Result<Self> {
        let bytes = backend.get_checkpoint()?;
        let mut checkpoint = Checkpoint::from_bytes(&bytes)?;
        let next_segment_id = rollforward::roll_forward(&backend, &mut checkpoint)?;

        let log = Log::new(
            next_segment_id,
            backend.clone(),
            checkpoint.block_size as usize,
            checkpoint.blocks_per_segment as usize,
        );

        Ok(Self {
            checkpoint,
            log,
            backend,
            config,
            last_checkpoint_time: now_secs(),
            lookup_counts: HashMap::new(),
        })
    }

    fn load_inode(&self, inode_number: u64) -> Result<INode> {
        let addr = *self
            .checkpoint
            .inode_map
            .get(&inode_number)
            .ok_or(Error::NotFound)?;
        let bytes = self.log.read_block(addr)?;
        INode::from_bytes(&bytes)
    }

    fn store_inode(&mut self, inode: &INode) -> Result<()> {
        let bytes = inode.to_bytes();
        let addr = self.log.write_inode(&bytes, inode.inode_number)?;
        self.checkpoint.inode_map.insert(inode.inode_number, addr);
        Ok(())
    }

    fn alloc_inode_number(&mut self) -> u64 {
        self.checkpoint.inode_counter += 1;
        self.checkpoint.inode_counter
    }

    /// Drops an inode from the imap once it has no hard links and no
    /// outstanding FUSE lookups.
    fn maybe_forget(&mut self, inode_number: u64) {
        let links = self
            .lookup_counts
            .get(&inode_number)
            .copied()
            .unwrap_or(0);
        if links > 0 {
            return;
        }
        if let Ok(inode) = self.load_inode(inode_number) {
            if inode.hard_links == 0 {
                self.checkpoint.inode_map.remove(&inode_number);
            }
        }
    }

    /// Writes a checkpoint if the configured interval has elapsed.
    fn checkpoint_if_necessary(&mut self) -> Result<()> {
        let now = now_secs();
        if now - self.last_checkpoint_time < self.config.checkpoint_frequency_seconds {
            return Ok(());
        }
        self.write_checkpoint(now)
    }

    fn write_checkpoint(&mut self, now: i64) -> Result<()> {
        self.log.flush()?;
        self.checkpoint.segment_counter = self.log.current_segment_id().saturating_sub(1);
        self.checkpoint.checkpoint_time = now;
        self.backend.put_checkpoint(&self.checkpoint.to_bytes())?;
        self.last_checkpoint_time = now;
        log::info!(
            "checkpoint written: segment_counter={} inode_counter={}",
            self.checkpoint.segment_counter,
            self.checkpoint.inode_counter
        );
        Ok(())
    }
}

pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
