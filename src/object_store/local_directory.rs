//! Stores checkpoint and segment objects as files under a directory.
//!
//! Each object is a plain file named by its key (`checkpoint`, `seg_<id>`)
//! inside a directory named after the bucket. Useful for local testing and
//! single-machine deployments; stands in for a concrete remote object-store
//! SDK.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::object_store::{segment_key, ObjectStore, CHECKPOINT_KEY};

pub struct LocalDirectoryStore {
    directory: PathBuf,
}

impl LocalDirectoryStore {
    pub fn new(parent_directory: impl AsRef<Path>, bucket_name: &str) -> Self {
        Self {
            directory: parent_directory.as_ref().join(bucket_name),
        }
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        match fs::read(self.directory.join(key)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound),
            Err(e) => Err(Error::BackendUnavailable(e.to_string())),
        }
    }

    fn put_object(&self, key: &str, body: &[u8]) -> Result<()> {
        fs::write(self.directory.join(key), body).map_err(|e| Error::BackendUnavailable(e.to_string()))
    }
}

impl ObjectStore for LocalDirectoryStore {
    fn create(&self) -> Result<()> {
        if !self.directory.exists() {
            fs::create_dir_all(&self.directory)
                .map_err(|e| Error::BackendUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    fn get_checkpoint(&self) -> Result<Vec<u8>> {
        self.get_object(CHECKPOINT_KEY)
    }

    fn put_checkpoint(&self, bytes: &[u8]) -> Result<()> {
        self.put_object(CHECKPOINT_KEY, bytes)
    }

    fn get_segment(&self, segment_id: u64) -> Result<Vec<u8>> {
        self.get_object(&segment_key(segment_id))
    }

    fn put_segment(&self, segment_id: u64, bytes: &[u8]) -> Result<()> {
        self.put_object(&segment_key(segment_id), bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_segments_and_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectoryStore::new(dir.path(), "t1");
        store.create().unwrap();

        store.put_checkpoint(b"checkpoint-bytes").unwrap();
        assert_eq!(store.get_checkpoint().unwrap(), b"checkpoint-bytes");

        store.put_segment(3, b"segment-bytes").unwrap();
        assert_eq!(store.get_segment(3).unwrap(), b"segment-bytes");

        assert!(matches!(store.get_segment(4), Err(Error::NotFound)));
    }
}
