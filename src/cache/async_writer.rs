//! Bounded worker pool performing segment uploads, with an in-flight cache
//! so reads can observe not-yet-durable segments.
//!
//! The in-flight table is a monitor: a `Mutex` guarding the map plus two
//! condition variables, `not_full` (producers wait on it in `put_segment`)
//! and `empty` (`flush` waits on it). Uploads themselves run on a fixed pool
//! of OS threads fed by an unbounded `crossbeam-channel`; the bound on
//! concurrency comes from the in-flight table's capacity, not the channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::Result;
use crate::object_store::ObjectStore;

enum Job {
    Segment(u64, Vec<u8>),
    Checkpoint(Vec<u8>),
    Shutdown,
}

struct InFlight {
    segments: Mutex<HashMap<u64, Vec<u8>>>,
    not_full: Condvar,
    empty: Condvar,
    capacity: usize,
}

pub struct AsyncWriter {
    inner: Arc<dyn ObjectStore>,
    in_flight: Arc<InFlight>,
    sender: Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncWriter {
    /// `capacity` is `Q`, the in-flight table's bound; `worker_count` is `W`.
    pub fn new(inner: Arc<dyn ObjectStore>, capacity: usize, worker_count: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let in_flight = Arc::new(InFlight {
            segments: Mutex::new(HashMap::new()),
            not_full: Condvar::new(),
            empty: Condvar::new(),
            capacity: capacity.max(1),
        });

        let mut workers = Vec::with_capacity(worker_count.max(1));
        for _ in 0..worker_count.max(1) {
            let backend = inner.clone();
            let in_flight = in_flight.clone();
            let receiver: Receiver<Job> = receiver.clone();
            workers.push(std::thread::spawn(move || {
                worker_loop(backend, in_flight, receiver);
            }));
        }

        Self {
            inner,
            in_flight,
            sender,
            workers: Mutex::new(workers),
        }
    }

    /// Current number of segments not yet acknowledged by the wrapped
    /// store. Never exceeds the configured capacity.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.segments.lock().len()
    }
}

fn worker_loop(backend: Arc<dyn ObjectStore>, in_flight: Arc<InFlight>, receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        match job {
            Job::Segment(id, bytes) => {
                if let Err(e) = backend.put_segment(id, &bytes) {
                    log::error!("segment {id} upload failed: {e}");
                }
                let mut segments = in_flight.segments.lock();
                segments.remove(&id);
                in_flight.not_full.notify_all();
                if segments.is_empty() {
                    in_flight.empty.notify_all();
                }
            }
            Job::Checkpoint(bytes) => {
                if let Err(e) = backend.put_checkpoint(&bytes) {
                    log::error!("checkpoint upload failed: {e}");
                }
            }
            Job::Shutdown => break,
        }
    }
}

impl ObjectStore for AsyncWriter {
    fn create(&self) -> Result<()> {
        self.inner.create()
    }

    fn get_checkpoint(&self) -> Result<Vec<u8>> {
        self.inner.get_checkpoint()
    }

    /// Submitted asynchronously; ordering relative to segment puts is the
    /// caller's responsibility (call `flush()` first for crash consistency).
    fn put_checkpoint(&self, bytes: &[u8]) -> Result<()> {
        let _ = self.sender.send(Job::Checkpoint(bytes.to_vec()));
        Ok(())
    }

    fn get_segment(&self, segment_id: u64) -> Result<Vec<u8>> {
        if let Some(bytes) = self.in_flight.segments.lock().get(&segment_id) {
            return Ok(bytes.clone());
        }
        self.inner.get_segment(segment_id)
    }

    fn put_segment(&self, segment_id: u64, bytes: &[u8]) -> Result<()> {
        {
            let mut segments = self.in_flight.segments.lock();
            while segments.len() >= self.in_flight.capacity {
                self.in_flight.not_full.wait(&mut segments);
            }
            segments.insert(segment_id, bytes.to_vec());
        }
        let _ = self.sender.send(Job::Segment(segment_id, bytes.to_vec()));
        Ok(())
    }

    /// Blocks until the in-flight table is empty, i.e. every segment
    /// submitted so far has reached the wrapped store.
    fn flush(&self) -> Result<()> {
        {
            let mut segments = self.in_flight.segments.lock();
            while !segments.is_empty() {
                self.in_flight.empty.wait(&mut segments);
            }
        }
        self.inner.flush()
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        let workers = self.workers.lock().len();
        for _ in 0..workers {
            let _ = self.sender.send(Job::Shutdown);
        }
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryStore;
    use std::time::Duration;

    #[test]
    fn transparent_round_trip() {
        let backend = Arc::new(MemoryStore::new());
        let writer = AsyncWriter::new(backend, 4, 2);
        writer.put_segment(1, b"one").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.get_segment(1).unwrap(), b"one");
    }

    #[test]
    fn backpressure_never_exceeds_capacity() {
        let backend = Arc::new(MemoryStore::new());
        let writer = AsyncWriter::new(backend.clone(), 3, 2);
        for i in 0..5u64 {
            writer.put_segment(i, b"payload").unwrap();
            assert!(writer.in_flight_count() <= 3);
        }
        writer.flush().unwrap();
        assert_eq!(writer.in_flight_count(), 0);
        assert_eq!(backend.segment_count(), 5);
        std::thread::sleep(Duration::from_millis(1));
    }
}
