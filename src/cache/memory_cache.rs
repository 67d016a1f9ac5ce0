//! In-process LRU of segment bytes.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::error::Result;
use crate::object_store::ObjectStore;

pub struct MemoryCache {
    inner: Arc<dyn ObjectStore>,
    segments: Mutex<LruCache<u64, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new(inner: Arc<dyn ObjectStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner,
            segments: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl ObjectStore for MemoryCache {
    fn create(&self) -> Result<()> {
        self.inner.create()
    }

    fn get_checkpoint(&self) -> Result<Vec<u8>> {
        self.inner.get_checkpoint()
    }

    fn put_checkpoint(&self, bytes: &[u8]) -> Result<()> {
        self.inner.put_checkpoint(bytes)
    }

    fn get_segment(&self, segment_id: u64) -> Result<Vec<u8>> {
        if let Some(bytes) = self.segments.lock().unwrap().get(&segment_id) {
            return Ok(bytes.clone());
        }
        let bytes = self.inner.get_segment(segment_id)?;
        self.segments.lock().unwrap().put(segment_id, bytes.clone());
        Ok(bytes)
    }

    fn put_segment(&self, segment_id: u64, bytes: &[u8]) -> Result<()> {
        self.segments.lock().unwrap().put(segment_id, bytes.to_vec());
        self.inner.put_segment(segment_id, bytes)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryStore;

    #[test]
    fn transparent_round_trip() {
        let backend = Arc::new(MemoryStore::new());
        let cache = MemoryCache::new(backend, 2);
        cache.put_segment(1, b"one").unwrap();
        assert_eq!(cache.get_segment(1).unwrap(), b"one");
    }

    #[test]
    fn miss_delegates_and_fills_cache() {
        let backend = Arc::new(MemoryStore::new());
        backend.put_segment(5, b"five").unwrap();
        let cache = MemoryCache::new(backend, 2);
        assert_eq!(cache.get_segment(5).unwrap(), b"five");
    }
}
