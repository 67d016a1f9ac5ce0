//! In-process test double standing in for a real object store, used by the
//! unit tests throughout this crate and by the caching layers' own tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::object_store::ObjectStore;

#[derive(Default)]
pub struct MemoryStore {
    checkpoint: Mutex<Option<Vec<u8>>>,
    segments: Mutex<HashMap<u64, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segment puts received so far; used by tests asserting on
    /// upload counts.
    pub fn segment_count(&self) -> usize {
        self.segments.lock().unwrap().len()
    }
}

impl ObjectStore for MemoryStore {
    fn create(&self) -> Result<()> {
        Ok(())
    }

    fn get_checkpoint(&self) -> Result<Vec<u8>> {
        self.checkpoint.lock().unwrap().clone().ok_or(Error::NotFound)
    }

    fn put_checkpoint(&self, bytes: &[u8]) -> Result<()> {
        *self.checkpoint.lock().unwrap() = Some(bytes.to_vec());
        Ok(())
    }

    fn get_segment(&self, segment_id: u64) -> Result<Vec<u8>> {
        self.segments
            .lock()
            .unwrap()
            .get(&segment_id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    fn put_segment(&self, segment_id: u64, bytes: &[u8]) -> Result<()> {
        self.segments.lock().unwrap().insert(segment_id, bytes.to_vec());
        Ok(())
    }
}
