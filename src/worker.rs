use crate::digest::Algorithm;
use crate::error::HashError;
use crate::queue::ChunkReceiver;
use crate::sink::{ChunkDigest, ResultSink};
use indicatif::ProgressBar;
use log::{debug, error, info};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub id: usize,
    pub chunks: u64,
    pub bytes: u64,
}

/// One hashing thread. Pops chunks until the queue is closed and empty.
pub struct Worker {
    id: usize,
    queue: ChunkReceiver,
    algorithm: Algorithm,
    sink: Arc<dyn ResultSink>,
    progress: Option<ProgressBar>,
    errors: Arc<Mutex<Vec<HashError>>>,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: ChunkReceiver,
        algorithm: Algorithm,
        sink: Arc<dyn ResultSink>,
        errors: Arc<Mutex<Vec<HashError>>>,
    ) -> Self {
        Self {
            id,
            queue,
            algorithm,
            sink,
            progress: None,
            errors,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressBar>) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(self) -> WorkerStats {
        let mut stats = WorkerStats {
            id: self.id,
            ..WorkerStats::default()
        };

        // The queue only lends out a chunk once; hashing happens with no lock held.
        while let Some(chunk) = self.queue.pop() {
            let digest = self.algorithm.digest_hex(chunk.payload());
            debug!("Worker {} hashed part #{}", self.id, chunk.sequence());

            let result = ChunkDigest {
                sequence: chunk.sequence(),
                digest,
            };
            if let Err(e) = self.sink.emit(result) {
                error!("Worker {}: {}", self.id, e);
                self.errors
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(e);
            }

            stats.chunks += 1;
            stats.bytes += chunk.len() as u64;
            if let Some(pb) = self.progress.as_ref() {
                pb.inc(chunk.len() as u64);
            }
        }

        info!("Worker {} exiting after {} chunks", self.id, stats.chunks);
        stats
    }
}
