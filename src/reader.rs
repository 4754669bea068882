//! Sequential, memory-aware file reader.
//!
//! The reader is the only producer of chunks. Before every read it asks the
//! memory monitor whether there is room for more in-flight data and backs off
//! while there is not. Chunk buffers are allocated fallibly so an exhausted
//! heap gets one round of relief (allocator trim, then waiting for the
//! workers to drain the queue) before the run fails.

use crate::config::ThrottlePolicy;
use crate::error::HashError;
use crate::memory::MemoryMonitor;
use crate::queue::{Chunk, ChunkSender};
use log::{debug, info, warn};
use std::collections::TryReserveError;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::thread;

/// Counters reported by a finished reader.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReaderStats {
    pub chunks: u64,
    pub bytes: u64,
    pub throttle_pauses: u64,
    pub reclaims: u64,
}

/// Provides the right-sized buffer each chunk is copied into.
pub trait ChunkAllocator: Send + Sync {
    fn allocate(&self, bytes: &[u8]) -> Result<Box<[u8]>, TryReserveError>;
}

/// Allocates chunk buffers on the global heap, failing instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl ChunkAllocator for HeapAllocator {
    fn allocate(&self, bytes: &[u8]) -> Result<Box<[u8]>, TryReserveError> {
        let mut payload = Vec::new();
        payload.try_reserve_exact(bytes.len())?;
        payload.extend_from_slice(bytes);
        Ok(payload.into_boxed_slice())
    }
}

pub struct Reader<R> {
    source: R,
    remaining: Option<u64>,
    chunk_size: usize,
    workers: usize,
    policy: ThrottlePolicy,
    monitor: Arc<dyn MemoryMonitor>,
    allocator: Arc<dyn ChunkAllocator>,
}

impl<R: Read> Reader<R> {
    pub fn new(
        source: R,
        chunk_size: usize,
        workers: usize,
        policy: ThrottlePolicy,
        monitor: Arc<dyn MemoryMonitor>,
    ) -> Self {
        Self {
            source,
            remaining: None,
            chunk_size: chunk_size.max(1),
            workers,
            policy,
            monitor,
            allocator: Arc::new(HeapAllocator),
        }
    }

    /// Stop after `len` bytes without consulting the memory monitor again.
    ///
    /// Without a length the reader runs until a read returns nothing.
    pub fn with_length(mut self, len: u64) -> Self {
        self.remaining = Some(len);
        self
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn ChunkAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Stream the source to EOF, pushing numbered chunks onto `queue`.
    ///
    /// The queue is not closed here; the caller drops the sender after
    /// recording completion so workers see both at once.
    pub fn run(mut self, queue: &ChunkSender) -> Result<ReaderStats, HashError> {
        let total = self.monitor.total_bytes();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut stats = ReaderStats::default();

        while self.remaining != Some(0) {
            let available = self.monitor.available_bytes()?;
            if self
                .policy
                .should_throttle(available, total, self.chunk_size, self.workers)
            {
                if stats.throttle_pauses % 100 == 0 {
                    warn!(
                        "Low memory ({} bytes free), pausing reads with {} chunks queued",
                        available,
                        queue.len()
                    );
                }
                stats.throttle_pauses += 1;
                thread::sleep(self.policy.pause);
                if queue.is_empty() {
                    self.monitor.reclaim();
                    stats.reclaims += 1;
                }
                continue;
            }

            let want = match self.remaining {
                Some(left) => buffer.len().min(usize::try_from(left).unwrap_or(usize::MAX)),
                None => buffer.len(),
            };
            let read = self.fill(&mut buffer[..want])?;
            if read == 0 {
                if let Some(left) = self.remaining {
                    warn!("Source ended {} bytes short of its expected length", left);
                }
                break;
            }
            if let Some(left) = self.remaining.as_mut() {
                *left -= read as u64;
            }

            let payload = self.allocate(&buffer[..read], queue, &mut stats)?;
            queue.push(Chunk::new(stats.chunks, payload))?;
            debug!("Queued chunk #{} ({} bytes)", stats.chunks, read);
            stats.chunks += 1;
            stats.bytes += read as u64;
        }

        info!(
            "Reader finished: {} chunks, {} bytes, {} throttle pauses",
            stats.chunks, stats.bytes, stats.throttle_pauses
        );
        Ok(stats)
    }

    /// Read until `buf` is full or the source is exhausted.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, HashError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn allocate(
        &self,
        bytes: &[u8],
        queue: &ChunkSender,
        stats: &mut ReaderStats,
    ) -> Result<Box<[u8]>, HashError> {
        match self.allocator.allocate(bytes) {
            Ok(payload) => return Ok(payload),
            Err(e) => warn!("Allocating {} bytes failed ({}), reclaiming memory", bytes.len(), e),
        }

        self.monitor.reclaim();
        stats.reclaims += 1;
        if !queue.is_empty() && !queue.wait_drained(self.policy.drain_poll) {
            return Err(HashError::QueueClosed);
        }

        self.allocator
            .allocate(bytes)
            .map_err(|_| HashError::OutOfMemory {
                requested: bytes.len(),
            })
    }
}
