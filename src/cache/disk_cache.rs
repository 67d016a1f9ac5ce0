//! LRU of recently read/written segment bytes kept as files under a scratch
//! directory.

use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::error::{Error, Result};
use crate::object_store::ObjectStore;

/// Directory name created under the configured parent to hold cached
/// segment files.
const CACHE_DIR_TAG: &str = "logfs_cache";

pub struct DiskCache {
    inner: Arc<dyn ObjectStore>,
    directory: PathBuf,
    // Values are unused; only insertion/access order matters for eviction.
    entries: Mutex<LruCache<u64, ()>>,
}

impl DiskCache {
    pub fn new(inner: Arc<dyn ObjectStore>, parent_directory: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let directory = parent_directory.into().join(CACHE_DIR_TAG);
        fs::create_dir_all(&directory).map_err(|e| Error::BackendUnavailable(e.to_string()))?;
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Ok(Self {
            inner,
            directory,
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    fn path_for(&self, segment_id: u64) -> PathBuf {
        self.directory.join(format!("seg_{segment_id}"))
    }

    fn cache_read(&self, segment_id: u64) -> Result<Vec<u8>> {
        let bytes = fs::read(self.path_for(segment_id)).map_err(|e| Error::BackendUnavailable(e.to_string()))?;
        self.entries.lock().unwrap().promote(&segment_id);
        Ok(bytes)
    }

    fn cache_insert(&self, segment_id: u64, bytes: &[u8]) -> Result<()> {
        fs::write(self.path_for(segment_id), bytes).map_err(|e| Error::BackendUnavailable(e.to_string()))?;
        if let Some((evicted, _)) = self.entries.lock().unwrap().push(segment_id, ()) {
            if evicted != segment_id {
                let _ = fs::remove_file(self.path_for(evicted));
            }
        }
        Ok(())
    }
}

impl Drop for DiskCache {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.directory);
    }
}

impl ObjectStore for DiskCache {
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
        let cached = self.entries.lock().unwrap().contains(&segment_id);
        if cached {
            self.cache_read(segment_id)
        } else {
            let bytes = self.inner.get_segment(segment_id)?;
            self.cache_insert(segment_id, &bytes)?;
            Ok(bytes)
        }
    }

    fn put_segment(&self, segment_id: u64, bytes: &[u8]) -> Result<()> {
        self.cache_insert(segment_id, bytes)?;
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
    fn transparent_round_trip_and_teardown() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryStore::new());
        let directory;
        {
            let cache = DiskCache::new(backend.clone(), tmp.path(), 2).unwrap();
            directory = tmp.path().join(CACHE_DIR_TAG);
            assert!(directory.exists());
            cache.put_segment(1, b"one").unwrap();
            assert_eq!(cache.get_segment(1).unwrap(), b"one");
        }
        assert!(!directory.exists());
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryStore::new());
        let cache = DiskCache::new(backend, tmp.path(), 1).unwrap();
        cache.put_segment(1, b"one").unwrap();
        cache.put_segment(2, b"two").unwrap();
        assert!(!cache.path_for(1).exists());
        assert!(cache.path_for(2).exists());
    }
}
