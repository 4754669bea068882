//! Validated run configuration.
//!
//! A `HashConfig` is built once, checked against the bounds below and the
//! memory available at startup, and then handed read-only to the pipeline.

use crate::digest::Algorithm;
use crate::error::HashError;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const MIN_CHUNK_SIZE: usize = 5_000;
pub const MAX_CHUNK_SIZE: usize = 5_000_000;
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 20;

/// Free memory (percent of total) below which the OS is assumed to start swapping.
pub const DEFAULT_SWAP_BOUNDARY_PERCENT: u8 = 16;
pub const DEFAULT_THROTTLE_PAUSE: Duration = Duration::from_millis(10);
pub const DEFAULT_DRAIN_POLL: Duration = Duration::from_millis(100);

/// Requested worker count: an explicit number or one per logical core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadCount {
    Auto,
    Fixed(usize),
}

impl ThreadCount {
    pub fn resolve(self) -> usize {
        match self {
            ThreadCount::Auto => num_cpus::get(),
            ThreadCount::Fixed(n) => n,
        }
    }
}

impl FromStr for ThreadCount {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(ThreadCount::Auto);
        }
        s.trim().parse::<usize>().map(ThreadCount::Fixed).map_err(|_| {
            HashError::InvalidConfig(format!(
                "thread count must be \"auto\" or a whole number, got {:?}",
                s
            ))
        })
    }
}

/// When the reader should stop producing chunks and wait for memory.
///
/// Both checks are heuristics: the working-set check keeps room for one chunk
/// per worker, the swap boundary keeps a share of physical memory free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub swap_boundary_percent: u8,
    pub reserve_working_set: bool,
    pub pause: Duration,
    pub drain_poll: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            swap_boundary_percent: DEFAULT_SWAP_BOUNDARY_PERCENT,
            reserve_working_set: true,
            pause: DEFAULT_THROTTLE_PAUSE,
            drain_poll: DEFAULT_DRAIN_POLL,
        }
    }
}

impl ThrottlePolicy {
    /// Returns true when `available` bytes is too little to read another chunk.
    pub fn should_throttle(&self, available: u64, total: u64, chunk_size: usize, workers: usize) -> bool {
        if self.reserve_working_set {
            let working_set = (chunk_size as u64).saturating_mul(workers as u64);
            if available < working_set {
                return true;
            }
        }
        let swap_floor = (total as u128 * self.swap_boundary_percent.min(100) as u128 / 100) as u64;
        available < swap_floor
    }
}

/// Immutable pipeline configuration.
#[derive(Debug, Clone)]
pub struct HashConfig {
    chunk_size: usize,
    workers: usize,
    path: PathBuf,
    algorithm: Algorithm,
    throttle: ThrottlePolicy,
}

impl HashConfig {
    /// Validate the raw settings.
    ///
    /// `available_memory` is the free physical memory at startup; a chunk
    /// larger than that is rejected outright.
    pub fn new(
        chunk_size: usize,
        threads: ThreadCount,
        path: impl Into<PathBuf>,
        available_memory: u64,
    ) -> Result<Self, HashError> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(HashError::InvalidConfig(format!(
                "chunk size must be between {} and {} bytes",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        if chunk_size as u64 > available_memory {
            return Err(HashError::InvalidConfig(
                "chunk size exceeds the free physical memory".to_string(),
            ));
        }

        let workers = threads.resolve();
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(HashError::InvalidConfig(format!(
                "thread count must be between {} and {}",
                MIN_WORKERS, MAX_WORKERS
            )));
        }

        let path = path.into();
        if !path.is_file() {
            return Err(HashError::InvalidConfig(format!(
                "file {} does not exist",
                path.display()
            )));
        }

        Ok(Self {
            chunk_size,
            workers,
            path,
            algorithm: Algorithm::default(),
            throttle: ThrottlePolicy::default(),
        })
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottlePolicy) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn throttle(&self) -> &ThrottlePolicy {
        &self.throttle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    #[test]
    fn test_thread_count_parse() {
        assert_eq!("auto".parse::<ThreadCount>().unwrap(), ThreadCount::Auto);
        assert_eq!("AUTO".parse::<ThreadCount>().unwrap(), ThreadCount::Auto);
        assert_eq!("4".parse::<ThreadCount>().unwrap(), ThreadCount::Fixed(4));
        assert!("-1".parse::<ThreadCount>().is_err());
        assert!("four".parse::<ThreadCount>().is_err());
    }

    #[test]
    fn test_auto_resolves_to_core_count() {
        assert_eq!(ThreadCount::Auto.resolve(), num_cpus::get());
    }

    #[test]
    fn test_working_set_check() {
        let policy = ThrottlePolicy {
            swap_boundary_percent: 0,
            ..ThrottlePolicy::default()
        };
        assert!(policy.should_throttle(399, GIB, 100, 4));
        assert!(!policy.should_throttle(400, GIB, 100, 4));

        let off = ThrottlePolicy {
            reserve_working_set: false,
            ..policy
        };
        assert!(!off.should_throttle(0, GIB, 100, 4));
    }

    #[test]
    fn test_swap_boundary_check() {
        let policy = ThrottlePolicy {
            reserve_working_set: false,
            ..ThrottlePolicy::default()
        };
        // 16% of 1000 is 160
        assert!(policy.should_throttle(159, 1000, 1, 1));
        assert!(!policy.should_throttle(160, 1000, 1, 1));
    }

    #[test]
    fn test_config_rejects_out_of_range() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = HashConfig::new(0, ThreadCount::Fixed(4), file.path(), GIB).unwrap_err();
        assert!(matches!(err, HashError::InvalidConfig(_)));
        assert!(HashConfig::new(MAX_CHUNK_SIZE + 1, ThreadCount::Fixed(4), file.path(), GIB).is_err());
        assert!(HashConfig::new(MIN_CHUNK_SIZE, ThreadCount::Fixed(0), file.path(), GIB).is_err());
        assert!(HashConfig::new(MIN_CHUNK_SIZE, ThreadCount::Fixed(MAX_WORKERS + 1), file.path(), GIB).is_err());
    }

    #[test]
    fn test_config_rejects_chunk_larger_than_free_memory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = HashConfig::new(10_000, ThreadCount::Fixed(2), file.path(), 9_999).unwrap_err();
        assert!(err.to_string().contains("free physical memory"));
    }

    #[test]
    fn test_config_accepts_valid() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = HashConfig::new(MIN_CHUNK_SIZE, ThreadCount::Fixed(3), file.path(), GIB)
            .unwrap()
            .with_algorithm(Algorithm::Blake3);
        assert_eq!(config.chunk_size(), MIN_CHUNK_SIZE);
        assert_eq!(config.workers(), 3);
        assert_eq!(config.path(), file.path());
        assert_eq!(config.algorithm(), Algorithm::Blake3);
        assert_eq!(config.throttle().swap_boundary_percent, DEFAULT_SWAP_BOUNDARY_PERCENT);
    }
}
