use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BenchError {
    /// The run finished in under one millisecond, so allocations-per-millisecond would divide by
    /// zero.
    #[error("elapsed time rounded to 0 ms; throughput is undefined")]
    SubMillisecond,

    #[error("failed to obtain a page of {words} words from the system")]
    AllocFailed { words: usize },

    #[error("object on page {page} at word {offset} holds {found}, expected {expected}")]
    CorruptObject { page: u32, offset: u32, expected: usize, found: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("could not start a thread with a {bytes} byte stack: {reason}")]
    ThreadSpawn { bytes: usize, reason: String },
}
