use std::time::Duration;

use clap::Parser;

use crate::counters::{DEFAULT_STRIDE, MAX_STRIDE, WORD_BYTES};
use crate::error::ConfigError;

/// Times packed counters against cache-line padded counters, one writer
/// thread per counter.
#[derive(Debug, Clone, Parser)]
#[command(name = "linebench", version, about)]
pub struct GlobalConfig {
    /// Worker threads, one counter slot each
    #[arg(short = 't', long, default_value_t = num_cpus::get())]
    pub workers: usize,

    /// Increments per worker per trial
    #[arg(short = 'i', long, default_value_t = 50_000_000)]
    pub iterations: u64,

    /// A/B rounds to average
    #[arg(short = 'n', long, default_value_t = 3)]
    pub trials: usize,

    /// Bytes reserved per slot in the padded layout
    #[arg(short = 's', long, default_value_t = DEFAULT_STRIDE)]
    pub stride: usize,

    /// Extra threads sweeping every slot with reads while workers run
    #[arg(long, default_value_t = 0)]
    pub readers: usize,

    /// Untimed A/B rounds before measuring
    #[arg(long, default_value_t = 1)]
    pub warmup_rounds: usize,

    /// Increments per worker in each warm-up trial
    #[arg(long, default_value_t = 1_000_000)]
    pub warmup_iterations: u64,

    /// Wall-clock ceiling for a single trial, in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Ratio band around 1.0 treated as no significant difference
    #[arg(long, default_value_t = 0.10)]
    pub tolerance: f64,

    /// Randomise which layout runs first in each round
    #[arg(long)]
    pub shuffle: bool,

    /// Seed for --shuffle
    #[arg(long)]
    pub seed: Option<u64>,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Workers and readers together; each is an OS thread with its own stack.
pub const MAX_THREADS: usize = 1024;

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            workers: num_cpus::get(),
            iterations: 50_000_000,
            trials: 3,
            stride: DEFAULT_STRIDE,
            readers: 0,
            warmup_rounds: 1,
            warmup_iterations: 1_000_000,
            timeout_secs: 300,
            tolerance: 0.10,
            shuffle: false,
            seed: None,
            verbose: false,
        }
    }
}

impl GlobalConfig {
    /// Rejects settings that would make every trial meaningless. Called
    /// before anything is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        if self.trials == 0 {
            return Err(ConfigError::NoTrials);
        }
        if self.stride == 0 || self.stride > MAX_STRIDE || self.stride % WORD_BYTES != 0 {
            return Err(ConfigError::InvalidStride(self.stride));
        }
        let threads = self.workers.checked_add(self.readers);
        if threads.map_or(true, |threads| threads > MAX_THREADS) {
            return Err(ConfigError::TooManyThreads {
                workers: self.workers,
                readers: self.readers,
                max: MAX_THREADS,
            });
        }
        if !(0.0..1.0).contains(&self.tolerance) {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::NoTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn total_ops_per_trial(&self) -> u128 {
        self.workers as u128 * self.iterations as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> GlobalConfig {
        GlobalConfig::try_parse_from(std::iter::once("linebench").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]);
        assert_eq!(config.workers, num_cpus::get());
        assert_eq!(config.stride, 64);
        assert_eq!(config.trials, 3);
        assert!(config.validate().is_ok());
        assert!(GlobalConfig::default().validate().is_ok());
    }

    #[test]
    fn short_flags_parse() {
        let config = parse(&["-t", "8", "-i", "1000", "-n", "5", "-s", "128", "-v"]);
        assert_eq!(config.workers, 8);
        assert_eq!(config.iterations, 1000);
        assert_eq!(config.trials, 5);
        assert_eq!(config.stride, 128);
        assert!(config.verbose);
        assert_eq!(config.total_ops_per_trial(), 8000);
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert_eq!(parse(&["-t", "0"]).validate(), Err(ConfigError::NoWorkers));
        assert_eq!(parse(&["-i", "0"]).validate(), Err(ConfigError::NoIterations));
        assert_eq!(parse(&["-n", "0"]).validate(), Err(ConfigError::NoTrials));
        assert_eq!(
            parse(&["--timeout-secs", "0"]).validate(),
            Err(ConfigError::NoTimeout)
        );
    }

    #[test]
    fn negative_worker_count_fails_to_parse() {
        assert!(GlobalConfig::try_parse_from(["linebench", "-t", "-2"]).is_err());
    }

    #[test]
    fn stride_and_tolerance_bounds() {
        assert_eq!(
            parse(&["-s", "60"]).validate(),
            Err(ConfigError::InvalidStride(60))
        );
        assert_eq!(
            parse(&["-s", "0"]).validate(),
            Err(ConfigError::InvalidStride(0))
        );
        assert_eq!(
            parse(&["--tolerance", "1.5"]).validate(),
            Err(ConfigError::InvalidTolerance(1.5))
        );
        assert!(parse(&["--tolerance", "0"]).validate().is_ok());
    }

    #[test]
    fn oversized_settings_are_config_errors() {
        let huge_stride = GlobalConfig {
            workers: 8,
            stride: 1 << 40,
            ..GlobalConfig::default()
        };
        assert_eq!(
            huge_stride.validate(),
            Err(ConfigError::InvalidStride(1 << 40))
        );
        assert_eq!(
            parse(&["-s", "4104"]).validate(),
            Err(ConfigError::InvalidStride(4104))
        );
        assert!(parse(&["-t", "2", "-s", "4096"]).validate().is_ok());

        assert_eq!(
            parse(&["-t", "1025"]).validate(),
            Err(ConfigError::TooManyThreads {
                workers: 1025,
                readers: 0,
                max: MAX_THREADS,
            })
        );
        assert_eq!(
            parse(&["-t", "4", "--readers", "1021"]).validate(),
            Err(ConfigError::TooManyThreads {
                workers: 4,
                readers: 1021,
                max: MAX_THREADS,
            })
        );
        let overflowing = GlobalConfig {
            workers: 2,
            readers: usize::MAX,
            ..GlobalConfig::default()
        };
        assert!(matches!(
            overflowing.validate(),
            Err(ConfigError::TooManyThreads { .. })
        ));
        assert!(parse(&["-t", "4", "--readers", "1020"]).validate().is_ok());
    }
}
