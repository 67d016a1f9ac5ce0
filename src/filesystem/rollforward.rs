//! Mount-time recovery: replays segments written after the last checkpoint.

use std::sync::Arc;

use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::object_store::ObjectStore;
use crate::segment::ReadOnlySegment;

/// Replays every segment past the checkpoint's `segment_counter`, applying
/// each one's summary to the imap, and returns the first empty segment id
/// the log should open at.
///
/// `segment_counter`'s exact meaning (last sealed segment included vs. next
/// id) has shifted across writers historically, so this tolerates both
/// readings by probing `segment_counter` and `segment_counter + 1` and
/// starting roll-forward at whichever is the first one actually present.
pub(crate) fn roll_forward(backend: &Arc<dyn ObjectStore>, checkpoint: &mut Checkpoint) -> Result<u64> {
    let block_size = checkpoint.block_size as usize;
    let blocks_per_segment = checkpoint.blocks_per_segment as usize;

    let mut next_id = probe_start(backend, checkpoint.segment_counter)?;
    let mut last_applied = checkpoint.segment_counter;

    loop {
        match backend.get_segment(next_id) {
            Ok(bytes) => {
                let segment = ReadOnlySegment::from_bytes(next_id, block_size, blocks_per_segment, bytes)?;
                for (inum, bidx) in segment.inode_block_numbers() {
                    checkpoint
                        .inode_map
                        .insert(*inum, crate::block_address::BlockAddress::new(next_id, *bidx as u16));
                    // The checkpoint's inode_counter predates every inode
                    // created after it was written; without this, a fresh
                    // allocation after recovery could reuse a number an
                    // uncheckpointed create already claimed.
                    checkpoint.inode_counter = checkpoint.inode_counter.max(*inum);
                }
                log::info!("roll-forward: applied segment {next_id}");
                last_applied = next_id;
                next_id += 1;
            }
            Err(Error::NotFound) => break,
            Err(e) => return Err(e),
        }
    }

    checkpoint.segment_counter = last_applied;
    Ok(last_applied + 1)
}

/// Returns `segment_counter` if it is itself present in the store (meaning
/// the checkpoint recorded the *next* free id and roll-forward should
/// re-examine it), otherwise `segment_counter + 1` (the conventional
/// "last sealed segment included" reading).
fn probe_start(backend: &Arc<dyn ObjectStore>, segment_counter: u64) -> Result<u64> {
    match backend.get_segment(segment_counter) {
        Ok(_) => Ok(segment_counter),
        Err(Error::NotFound) => Ok(segment_counter + 1),
        Err(e) => Err(e),
    }
}
