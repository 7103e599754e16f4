use std::time::Duration;

use thiserror::Error;

use crate::counters::Layout;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    #[error("slot {slot} out of range for a collection of {slots} slots")]
    IndexOutOfRange { slot: usize, slots: usize },
    #[error("a counter collection needs at least one slot")]
    NoSlots,
    #[error("stride of {0} bytes is not a multiple of 8 between 8 and 4096")]
    InvalidStride(usize),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("iteration count must be at least 1")]
    NoIterations,
    #[error("trial count must be at least 1")]
    NoTrials,
    #[error("stride of {0} bytes is not a multiple of 8 between 8 and 4096")]
    InvalidStride(usize),
    #[error("{workers} workers plus {readers} readers exceeds the limit of {max} threads")]
    TooManyThreads {
        workers: usize,
        readers: usize,
        max: usize,
    },
    #[error("tolerance {0} must lie in [0, 1)")]
    InvalidTolerance(f64),
    #[error("timeout must be at least one second")]
    NoTimeout,
}

// Every way a single trial can abort. None of these carry timing data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrialError {
    #[error("could not build {layout} counters: {source}")]
    Build {
        layout: Layout,
        #[source]
        source: CounterError,
    },
    #[error("failed to spawn thread {name}: {reason}")]
    Spawn { name: String, reason: String },
    #[error("worker {worker} (slot {slot}) failed: {reason}")]
    WorkerFailed {
        worker: usize,
        slot: usize,
        reason: String,
    },
    #[error("reader {reader} failed: {reason}")]
    ReaderFailed { reader: usize, reason: String },
    #[error("trial exceeded the {0:?} wall-clock ceiling")]
    TimedOut(Duration),
    #[error("trial interrupted by signal")]
    Interrupted,
    #[error("could not read back slot values: {0}")]
    Readback(#[source] CounterError),
    #[error("slot {slot} holds {actual}, expected {expected}")]
    LostUpdates {
        slot: usize,
        expected: u64,
        actual: u64,
    },
}

impl TrialError {
    // A timed-out or interrupted trial leaves threads behind, so nothing after it can be trusted.
    pub fn halts_session(&self) -> bool {
        matches!(self, TrialError::TimedOut(_) | TrialError::Interrupted)
    }
}
