//! Project overview:
//! - Hashes successive fixed-size chunks of a large file in parallel
//! - One reader thread feeds numbered chunks into a shared queue; N workers hash them
//! - The reader watches free physical memory and pauses before the machine starts swapping
//! - Results carry the chunk's sequence number; they may arrive out of order unless an
//!   `OrderedSink` is used
//!
//! Key behaviors:
//! - Every chunk is hashed exactly once; chunk count is ceil(file size / chunk size)
//! - Allocation failure for a chunk buffer trims the allocator, waits for the queue to drain
//!   and retries once before failing the run
//! - A reader that stops with an error still closes the queue, so workers drain and exit
//!
//! Logging goes through `log`; the binary installs `env_logger` reading `PARHASH_LOG`.
pub mod completion;
pub mod config;
pub mod digest;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod reader;
pub mod sink;
pub mod utils;
pub mod worker;

pub use config::{HashConfig, ThreadCount, ThrottlePolicy};
pub use digest::Algorithm;
pub use error::HashError;
pub use memory::{MemoryMonitor, SystemMemory};
pub use pipeline::{Pipeline, RunSummary, RunningPipeline};
pub use sink::{ChunkDigest, MemorySink, OrderedSink, ResultSink, WriterSink};

use std::sync::Arc;

/// Hash `config.path()` chunk by chunk, sending every digest to `sink`.
///
/// Uses the operating system's memory figures for back-pressure and blocks
/// until the whole file has been processed.
pub fn hash_file(config: HashConfig, sink: Arc<dyn ResultSink>) -> Result<RunSummary, HashError> {
    let monitor = Arc::new(SystemMemory::new()?);
    Pipeline::new(config, sink, monitor).start()?.wait()
}
