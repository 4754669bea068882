//! Result sinks.
//!
//! Workers hand every finished digest to a shared `ResultSink`. Sinks are
//! called concurrently from all workers, so each one serializes internally.

use crate::error::HashError;
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Digest of one chunk, identified by its position in the file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChunkDigest {
    pub sequence: u64,
    pub digest: String,
}

pub trait ResultSink: Send + Sync {
    fn emit(&self, result: ChunkDigest) -> Result<(), HashError>;

    /// Called once after every worker has stopped.
    fn finish(&self) -> Result<(), HashError> {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Writes `Part #<n>` followed by the digest line for every result.
pub struct WriterSink<W: Write + Send> {
    out: Mutex<W>,
    progress: Option<ProgressBar>,
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            progress: None,
        }
    }

    /// Hide `progress` while writing so result lines do not tear the bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, result: &ChunkDigest) -> io::Result<()> {
        let mut out = lock(&self.out);
        writeln!(out, "Part #{}\n{}", result.sequence, result.digest)
    }
}

impl<W: Write + Send> ResultSink for WriterSink<W> {
    fn emit(&self, result: ChunkDigest) -> Result<(), HashError> {
        let written = match &self.progress {
            Some(pb) => pb.suspend(|| self.write(&result)),
            None => self.write(&result),
        };
        written.map_err(|e| HashError::Sink(format!("part #{}: {}", result.sequence, e)))
    }

    fn finish(&self) -> Result<(), HashError> {
        lock(&self.out)
            .flush()
            .map_err(|e| HashError::Sink(e.to_string()))
    }
}

struct Reorder {
    next: u64,
    pending: BTreeMap<u64, ChunkDigest>,
}

/// Buffers out-of-order results and forwards them to `inner` by sequence number.
pub struct OrderedSink<S> {
    inner: S,
    state: Mutex<Reorder>,
}

impl<S: ResultSink> OrderedSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: Mutex::new(Reorder {
                next: 0,
                pending: BTreeMap::new(),
            }),
        }
    }

    /// Results held back waiting for an earlier sequence number.
    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ResultSink> ResultSink for OrderedSink<S> {
    fn emit(&self, result: ChunkDigest) -> Result<(), HashError> {
        let mut state = lock(&self.state);
        state.pending.insert(result.sequence, result);
        loop {
            let next = state.next;
            let Some(ready) = state.pending.remove(&next) else {
                break;
            };
            state.next += 1;
            self.inner.emit(ready)?;
        }
        Ok(())
    }

    fn finish(&self) -> Result<(), HashError> {
        let mut state = lock(&self.state);
        if let Some((&missing, _)) = state.pending.first_key_value() {
            log::error!(
                "Results missing before part #{}, flushing {} out of order",
                missing,
                state.pending.len()
            );
        }
        for (_, result) in std::mem::take(&mut state.pending) {
            self.inner.emit(result)?;
        }
        self.inner.finish()
    }
}

/// Keeps every result in memory.
#[derive(Default)]
pub struct MemorySink {
    results: Mutex<Vec<ChunkDigest>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results in emission order.
    pub fn results(&self) -> Vec<ChunkDigest> {
        lock(&self.results).clone()
    }

    /// Results ordered by sequence number.
    pub fn sorted(&self) -> Vec<ChunkDigest> {
        let mut results = self.results();
        results.sort();
        results
    }
}

impl ResultSink for MemorySink {
    fn emit(&self, result: ChunkDigest) -> Result<(), HashError> {
        lock(&self.results).push(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(sequence: u64) -> ChunkDigest {
        ChunkDigest {
            sequence,
            digest: format!("{:064x}", sequence),
        }
    }

    #[test]
    fn test_writer_sink_format() {
        let sink = WriterSink::new(Vec::new());
        sink.emit(ChunkDigest {
            sequence: 7,
            digest: "abc123".to_string(),
        })
        .unwrap();
        sink.finish().unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "Part #7\nabc123\n");
    }

    #[test]
    fn test_ordered_sink_releases_in_sequence() {
        let sink = OrderedSink::new(MemorySink::new());
        sink.emit(digest(2)).unwrap();
        sink.emit(digest(1)).unwrap();
        assert!(sink.inner().results().is_empty());
        assert_eq!(sink.pending(), 2);

        sink.emit(digest(0)).unwrap();
        assert_eq!(sink.pending(), 0);
        sink.emit(digest(3)).unwrap();
        sink.finish().unwrap();

        let order: Vec<u64> = sink.inner().results().iter().map(|r| r.sequence).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_ordered_sink_flushes_gaps_on_finish() {
        let sink = OrderedSink::new(MemorySink::new());
        sink.emit(digest(1)).unwrap();
        sink.emit(digest(3)).unwrap();
        sink.finish().unwrap();
        let order: Vec<u64> = sink.inner().results().iter().map(|r| r.sequence).collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn test_memory_sink_sorted() {
        let sink = MemorySink::new();
        for n in [4, 0, 2] {
            sink.emit(digest(n)).unwrap();
        }
        let sorted: Vec<u64> = sink.sorted().iter().map(|r| r.sequence).collect();
        assert_eq!(sorted, vec![0, 2, 4]);
    }
}
