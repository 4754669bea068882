//! Chunk queue between the reader and the workers.
//!
//! An unbounded FIFO built on `crossbeam_channel`. The reader owns the single
//! `ChunkSender`; dropping it closes the queue, after which `ChunkReceiver::pop`
//! drains what is left and then returns `None`. Each pop hands a chunk to
//! exactly one receiver.

use crate::error::HashError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A numbered, immutable slice of the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    sequence: u64,
    payload: Box<[u8]>,
}

impl Chunk {
    pub fn new(sequence: u64, payload: Box<[u8]>) -> Self {
        Self { sequence, payload }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Create a connected sender/receiver pair.
pub fn chunk_queue() -> (ChunkSender, ChunkReceiver) {
    let (tx, rx) = unbounded();
    let consumers = Arc::new(AtomicUsize::new(1));
    (
        ChunkSender {
            tx,
            consumers: Arc::clone(&consumers),
        },
        ChunkReceiver { rx, consumers },
    )
}

/// Producing half. Not `Clone`: there is exactly one reader.
#[derive(Debug)]
pub struct ChunkSender {
    tx: Sender<Chunk>,
    consumers: Arc<AtomicUsize>,
}

impl ChunkSender {
    pub fn push(&self, chunk: Chunk) -> Result<(), HashError> {
        self.tx.send(chunk).map_err(|_| HashError::QueueClosed)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Block until every queued chunk has been taken.
    ///
    /// Returns `false` if all receivers went away with chunks still queued.
    pub fn wait_drained(&self, poll: Duration) -> bool {
        while !self.tx.is_empty() {
            if self.consumers.load(Ordering::Acquire) == 0 {
                return false;
            }
            thread::sleep(poll);
        }
        true
    }
}

/// Consuming half, cloned once per worker.
#[derive(Debug)]
pub struct ChunkReceiver {
    rx: Receiver<Chunk>,
    consumers: Arc<AtomicUsize>,
}

impl ChunkReceiver {
    /// Take the next chunk, blocking while the queue is empty but still open.
    ///
    /// Returns `None` only once the sender is dropped and nothing is left.
    pub fn pop(&self) -> Option<Chunk> {
        self.rx.recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Clone for ChunkReceiver {
    fn clone(&self) -> Self {
        self.consumers.fetch_add(1, Ordering::AcqRel);
        Self {
            rx: self.rx.clone(),
            consumers: Arc::clone(&self.consumers),
        }
    }
}

impl Drop for ChunkReceiver {
    fn drop(&mut self) {
        self.consumers.fetch_sub(1, Ordering::AcqRel);
    }
}
