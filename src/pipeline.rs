//! Wires the reader, the chunk queue and the worker pool together.
//!
//! `Pipeline::start` spawns one reader thread and `workers` hashing threads
//! and returns immediately; `RunningPipeline::wait` is the single blocking
//! call that returns once every thread has completed.

use crate::completion::{Completion, TaskKind};
use crate::config::HashConfig;
use crate::error::HashError;
use crate::memory::MemoryMonitor;
use crate::queue::chunk_queue;
use crate::reader::{Reader, ReaderStats};
use crate::sink::ResultSink;
use crate::worker::{Worker, WorkerStats};
use indicatif::ProgressBar;
use log::{error, info};
use std::fs::File;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub file_size: u64,
    pub chunks: u64,
    pub bytes_hashed: u64,
    pub throttle_pauses: u64,
    pub reclaims: u64,
    pub workers: Vec<WorkerStats>,
    pub elapsed: Duration,
}

pub struct Pipeline {
    config: HashConfig,
    sink: Arc<dyn ResultSink>,
    monitor: Arc<dyn MemoryMonitor>,
    progress: Option<ProgressBar>,
}

impl Pipeline {
    pub fn new(
        config: HashConfig,
        sink: Arc<dyn ResultSink>,
        monitor: Arc<dyn MemoryMonitor>,
    ) -> Self {
        Self {
            config,
            sink,
            monitor,
            progress: None,
        }
    }

    /// Advance `progress` by each hashed chunk; its length is set to the file size.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn start(self) -> Result<RunningPipeline, HashError> {
        let started = Instant::now();
        let file = File::open(self.config.path())?;
        let file_size = file.metadata()?.len();
        if let Some(pb) = self.progress.as_ref() {
            pb.set_length(file_size);
        }
        info!(
            "Hashing {} ({} bytes) in {} byte chunks with {} workers",
            self.config.path().display(),
            file_size,
            self.config.chunk_size(),
            self.config.workers()
        );

        // Register every task up front so the wait cannot miss one.
        let completion = Completion::new();
        let reader_task = completion.register(TaskKind::Reader);
        let worker_tasks: Vec<_> = (0..self.config.workers())
            .map(|id| completion.register(TaskKind::Worker(id)))
            .collect();

        let (tx, rx) = chunk_queue();
        let errors: Arc<Mutex<Vec<HashError>>> = Arc::new(Mutex::new(Vec::new()));

        let mut workers = Vec::with_capacity(worker_tasks.len());
        for (id, task) in worker_tasks.into_iter().enumerate() {
            let worker = Worker::new(
                id,
                rx.clone(),
                self.config.algorithm(),
                Arc::clone(&self.sink),
                Arc::clone(&errors),
            )
            .with_progress(self.progress.clone());
            let handle = thread::Builder::new()
                .name(format!("parhash-worker-{}", id))
                .spawn(move || {
                    let stats = worker.run();
                    task.complete();
                    stats
                })?;
            workers.push(handle);
        }
        drop(rx);

        let reader = Reader::new(
            file,
            self.config.chunk_size(),
            self.config.workers(),
            *self.config.throttle(),
            Arc::clone(&self.monitor),
        )
        .with_length(file_size);
        let reader = thread::Builder::new()
            .name("parhash-reader".to_string())
            .spawn(move || {
                let result = reader.run(&tx);
                if let Err(e) = &result {
                    error!("Reader stopped: {}", e);
                }
                // Completion must be recorded before the queue closes.
                reader_task.complete();
                drop(tx);
                result
            })?;

        Ok(RunningPipeline {
            completion,
            reader,
            workers,
            errors,
            sink: self.sink,
            progress: self.progress,
            file_size,
            started,
        })
    }
}

pub struct RunningPipeline {
    completion: Arc<Completion>,
    reader: JoinHandle<Result<ReaderStats, HashError>>,
    workers: Vec<JoinHandle<WorkerStats>>,
    errors: Arc<Mutex<Vec<HashError>>>,
    sink: Arc<dyn ResultSink>,
    progress: Option<ProgressBar>,
    file_size: u64,
    started: Instant,
}

impl RunningPipeline {
    /// Threads that have not completed yet.
    pub fn running(&self) -> usize {
        self.completion.running()
    }

    /// Block until the reader and every worker have completed.
    pub fn wait(self) -> Result<RunSummary, HashError> {
        self.completion.wait_all();

        let mut workers = Vec::with_capacity(self.workers.len());
        let mut panicked = None;
        for (id, handle) in self.workers.into_iter().enumerate() {
            match handle.join() {
                Ok(stats) => workers.push(stats),
                Err(_) => panicked = Some(HashError::TaskPanicked(TaskKind::Worker(id).to_string())),
            }
        }
        let reader = self
            .reader
            .join()
            .map_err(|_| HashError::TaskPanicked(TaskKind::Reader.to_string()))
            .and_then(|result| result);

        let reader = match (reader, panicked) {
            (Ok(stats), None) => stats,
            (Err(e), _) | (Ok(_), Some(e)) => {
                if let Some(pb) = self.progress.as_ref() {
                    pb.abandon_with_message("Hashing failed");
                }
                return Err(e);
            }
        };

        self.sink.finish()?;
        if let Some(pb) = self.progress.as_ref() {
            pb.finish_with_message("Hashing complete");
        }

        let errors = std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner));
        if !errors.is_empty() {
            return Err(HashError::Other(format!(
                "{} errors occurred during hashing",
                errors.len()
            )));
        }

        let summary = RunSummary {
            file_size: self.file_size,
            chunks: reader.chunks,
            bytes_hashed: workers.iter().map(|w| w.bytes).sum(),
            throttle_pauses: reader.throttle_pauses,
            reclaims: reader.reclaims,
            workers,
            elapsed: self.started.elapsed(),
        };
        info!(
            "Hashed {} chunks in {:.2?}",
            summary.chunks, summary.elapsed
        );
        Ok(summary)
    }
}
