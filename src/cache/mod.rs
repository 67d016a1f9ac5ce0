//! Composable `ObjectStore` decorators: each layer wraps an
//! inner store behind `Arc<dyn ObjectStore>` and implements the same trait,
//! forwarding checkpoint operations unchanged and intercepting segment
//! operations for caching/async upload.

mod async_writer;
mod disk_cache;
mod memory_cache;

pub use async_writer::AsyncWriter;
pub use disk_cache::DiskCache;
pub use memory_cache::MemoryCache;
