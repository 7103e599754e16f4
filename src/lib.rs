//! Cache-line contention benchmark: times counters packed into shared cache
//! lines against the same counters spread one per line, with one writer
//! thread per counter.

pub mod config;
pub mod counters;
pub mod driver;
pub mod error;
pub mod report;
pub mod session;
pub mod util;

pub use config::GlobalConfig;
pub use counters::{Counter, CounterSpec, Layout, PackedCounters, PaddedCounters};
pub use driver::{run_trial, TrialResult, TrialSpec};
pub use error::{ConfigError, CounterError, TrialError};
pub use report::{Summary, TrialOutcome, TrialRecord, Verdict};
pub use session::{run_layout, Session};
