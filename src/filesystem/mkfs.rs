//! Mount-time formatting: creates the bucket, writes a fresh root inode, and
//! persists the initial checkpoint.

use std::sync::Arc;

use crate::checkpoint::Checkpoint;
use crate::directory::ChildTable;
use crate::error::{Error, Result};
use crate::inode::{INode, MIN_BLOCK_SIZE};
use crate::log::Log;
use crate::object_store::ObjectStore;

pub const ROOT_INODE_NUMBER: u64 = 1;

pub struct FormatConfig {
    pub bucket_name: String,
    pub block_size: u32,
    pub blocks_per_segment: u32,
    pub fs_size_hint: u64,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            block_size: 4096,
            blocks_per_segment: 512,
            fs_size_hint: 1 << 15,
        }
    }
}

/// Formats a fresh filesystem: root inode `mode = S_IFDIR | 0o777`,
/// `hard_links = 2` (for `.` and `..`), parented to itself.
///
/// Rejects a `block_size` too small to hold a single inode image
/// (`inode::MIN_BLOCK_SIZE`) up front, as a clear config error the `mkfs`
/// CLI can surface, rather than failing deep inside `Segment::write_raw`
/// the first time the root inode is written.
pub fn format(backend: Arc<dyn ObjectStore>, config: FormatConfig) -> Result<()> {
    if (config.block_size as usize) < MIN_BLOCK_SIZE {
        return Err(Error::Invariant(format!(
            "block_size {} is too small to hold an inode image (minimum {MIN_BLOCK_SIZE})",
            config.block_size
        )));
    }
    backend.create()?;

    let mut checkpoint = Checkpoint::new(
        config.bucket_name,
        config.block_size,
        config.blocks_per_segment,
        config.fs_size_hint,
    );
    checkpoint.root_inode_id = ROOT_INODE_NUMBER;
    checkpoint.inode_counter = ROOT_INODE_NUMBER;

    // Segment id 0 is never used: it would let a real block's address collide
    // with `BlockAddress::NONE` (see block_address.rs).
    let mut log = Log::new(1, backend.clone(), config.block_size as usize, config.blocks_per_segment as usize);

    let mut root = INode::new(
        ROOT_INODE_NUMBER,
        ROOT_INODE_NUMBER,
        libc::S_IFDIR | 0o777,
        0,
        0,
        config.block_size,
    );
    root.hard_links = 2;

    let mut children = ChildTable::new();
    children.insert(".".to_string(), ROOT_INODE_NUMBER);
    children.insert("..".to_string(), ROOT_INODE_NUMBER);
    let encoded = crate::directory::encode(&children);
    super::data::write_bytes_at(&mut log, &mut root, 0, &encoded)?;

    let addr = log.write_inode(&root.to_bytes(), root.inode_number)?;
    checkpoint.inode_map.insert(root.inode_number, addr);

    log.flush()?;
    checkpoint.segment_counter = log.current_segment_id().saturating_sub(1);
    checkpoint.checkpoint_time = super::now_secs();
    backend.put_checkpoint(&checkpoint.to_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryStore;

    #[test]
    fn rejects_block_size_below_inode_minimum() {
        let backend: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let config = FormatConfig {
            bucket_name: "t1".into(),
            block_size: 64,
            blocks_per_segment: 4,
            ..FormatConfig::default()
        };
        assert!(matches!(format(backend, config), Err(Error::Invariant(_))));
    }

    #[test]
    fn accepts_block_size_at_inode_minimum() {
        let backend: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let config = FormatConfig {
            bucket_name: "t1".into(),
            block_size: MIN_BLOCK_SIZE as u32,
            blocks_per_segment: 4,
            ..FormatConfig::default()
        };
        assert!(format(backend, config).is_ok());
    }
}
