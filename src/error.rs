//! Error types for parhash.

use std::fmt;

/// Errors surfaced by the hashing pipeline and its configuration layer.
#[derive(Debug)]
pub enum HashError {
    /// Reading the input file failed.
    Io(std::io::Error),
    /// A configuration value was rejected before the pipeline started.
    InvalidConfig(String),
    /// The operating system could not report physical memory.
    MemoryQuery(String),
    /// A chunk buffer could not be allocated, even after relief.
    OutOfMemory { requested: usize },
    /// Every consumer of the chunk queue is gone.
    QueueClosed,
    /// A reader or worker thread panicked.
    TaskPanicked(String),
    /// The output sink refused a result.
    Sink(String),
    Other(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashError::Io(e) => write!(f, "io error: {}", e),
            HashError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            HashError::MemoryQuery(msg) => write!(f, "cannot query system memory: {}", msg),
            HashError::OutOfMemory { requested } => {
                write!(f, "out of memory allocating a {} byte chunk", requested)
            }
            HashError::QueueClosed => write!(f, "chunk queue has no remaining consumers"),
            HashError::TaskPanicked(task) => write!(f, "{} thread panicked", task),
            HashError::Sink(msg) => write!(f, "output error: {}", msg),
            HashError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for HashError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HashError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HashError {
    fn from(e: std::io::Error) -> Self {
        HashError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HashError = io_err.into();
        assert!(matches!(err, HashError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_display() {
        let err = HashError::OutOfMemory { requested: 4096 };
        assert_eq!(err.to_string(), "out of memory allocating a 4096 byte chunk");
        let err = HashError::InvalidConfig("chunk size too small".into());
        assert!(err.to_string().contains("chunk size too small"));
    }
}
