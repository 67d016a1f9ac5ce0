//! A log-structured filesystem backed by an opaque, eventually-local object
//! store and bridged to the kernel over FUSE.
//!
//! Writes are batched into append-only segments, each sealed segment is
//! handed to the object store through a chain of caching/async decorators,
//! and mount-time recovery replays any segment written after the last
//! checkpoint (`filesystem::rollforward`).

pub mod address_block;
pub mod block_address;
pub mod cache;
pub mod checkpoint;
pub mod directory;
pub mod error;
pub mod filesystem;
pub mod indirect;
pub mod inode;
pub mod log;
pub mod object_store;
pub mod segment;

pub use error::{Error, Result};
pub use filesystem::{format, FileSystem, MountConfig};
pub use object_store::ObjectStore;
