// The A/B loop: warm-up rounds, then `trials` rounds of packed vs padded,
// each trial on a freshly built collection.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::GlobalConfig;
use crate::counters::{CounterSpec, Layout, PackedCounters, PaddedCounters};
use crate::driver::{run_trial, TrialResult, TrialSpec};
use crate::error::{CounterError, TrialError};
use crate::report::{render_trial, TrialOutcome, TrialRecord};

/// Builds the requested layout and runs one trial on it. The collection is
/// dropped when the trial ends; nothing is reused between trials.
pub fn run_layout(
    counters: CounterSpec,
    trial: &TrialSpec,
    interrupt: &AtomicBool,
) -> Result<TrialResult, TrialError> {
    let layout = counters.layout;
    let build_err = |source: CounterError| TrialError::Build { layout, source };
    match layout {
        Layout::Packed => {
            let counter = PackedCounters::new(counters.slots).map_err(build_err)?;
            run_trial(Arc::new(counter), trial, interrupt)
        }
        Layout::Padded => {
            let counter = PaddedCounters::new(counters.slots, counters.stride).map_err(build_err)?;
            run_trial(Arc::new(counter), trial, interrupt)
        }
    }
}

pub struct Session {
    config: GlobalConfig,
    interrupt: Arc<AtomicBool>,
    rng: StdRng,
}

impl Session {
    pub fn new(config: GlobalConfig, interrupt: Arc<AtomicBool>) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Session {
            config,
            interrupt,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn counter_spec(&self, layout: Layout) -> CounterSpec {
        CounterSpec::new(layout, self.config.workers, self.config.stride)
    }

    fn trial_spec(&self, iterations: u64) -> TrialSpec {
        TrialSpec {
            iterations,
            readers: self.config.readers,
            timeout: self.config.timeout(),
        }
    }

    fn round_order(&mut self) -> [Layout; 2] {
        if self.config.shuffle && self.rng.random_bool(0.5) {
            [Layout::Padded, Layout::Packed]
        } else {
            [Layout::Packed, Layout::Padded]
        }
    }

    // Returns the error that halted warm-up, if any.
    fn warm_up(&mut self) -> Option<TrialError> {
        let trial = self.trial_spec(self.config.warmup_iterations);
        for round in 1..=self.config.warmup_rounds {
            for layout in self.round_order() {
                match run_layout(self.counter_spec(layout), &trial, &self.interrupt) {
                    Ok(result) => info!(
                        "warm-up {round}/{} {layout}: {:?}",
                        self.config.warmup_rounds, result.elapsed
                    ),
                    Err(err) if err.halts_session() => return Some(err),
                    Err(err) => warn!("warm-up {round} {layout} failed: {err}"),
                }
            }
        }
        None
    }

    /// Runs every scheduled trial and returns one record per trial, in the
    /// order they ran. After a timeout or interruption the remaining trials
    /// are recorded as skipped: threads left running would skew them.
    pub fn run(&mut self) -> Vec<TrialRecord> {
        let mut records = Vec::with_capacity(self.config.trials * 2);
        let mut halted = false;

        if self.config.warmup_rounds > 0 && self.config.warmup_iterations > 0 {
            if let Some(err) = self.warm_up() {
                warn!("warm-up halted: {err}; no trials will run");
                halted = true;
            }
        }

        let trial = self.trial_spec(self.config.iterations);
        for round in 1..=self.config.trials {
            for layout in self.round_order() {
                let outcome = if halted {
                    TrialOutcome::Skipped
                } else {
                    match run_layout(self.counter_spec(layout), &trial, &self.interrupt) {
                        Ok(result) => TrialOutcome::Completed(result),
                        Err(err) => {
                            halted = err.halts_session();
                            TrialOutcome::Failed(err)
                        }
                    }
                };
                let record = TrialRecord {
                    round,
                    layout,
                    outcome,
                };
                match record.outcome {
                    TrialOutcome::Failed(_) => warn!("{}", render_trial(&record)),
                    _ => info!("{}", render_trial(&record)),
                }
                records.push(record);
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn small_config() -> GlobalConfig {
        GlobalConfig {
            workers: 3,
            iterations: 2_000,
            trials: 2,
            warmup_rounds: 1,
            warmup_iterations: 100,
            seed: Some(7),
            ..GlobalConfig::default()
        }
    }

    #[test]
    fn runs_every_round_for_both_layouts() {
        let mut session = Session::new(small_config(), Arc::new(AtomicBool::new(false)));
        let records = session.run();
        assert_eq!(records.len(), 4);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.round, i / 2 + 1);
            let result = record.result().expect("trial should complete");
            assert_eq!(result.slot_values, vec![2_000; 3]);
        }
        assert_eq!(records[0].layout, Layout::Packed);
        assert_eq!(records[1].layout, Layout::Padded);
    }

    #[test]
    fn shuffled_rounds_still_pair_both_layouts() {
        let config = GlobalConfig {
            shuffle: true,
            trials: 6,
            iterations: 100,
            ..small_config()
        };
        let records = Session::new(config, Arc::new(AtomicBool::new(false))).run();
        for pair in records.chunks(2) {
            assert_eq!(pair[0].round, pair[1].round);
            assert_eq!(pair[0].layout.other(), pair[1].layout);
        }
    }

    #[test]
    fn interrupt_skips_everything_after_the_first_failure() {
        let config = GlobalConfig {
            warmup_rounds: 0,
            ..small_config()
        };
        let interrupt = Arc::new(AtomicBool::new(false));
        interrupt.store(true, Ordering::SeqCst);
        let records = Session::new(config, interrupt).run();
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[0].outcome,
            TrialOutcome::Failed(TrialError::Interrupted)
        );
        assert!(records[1..]
            .iter()
            .all(|record| record.outcome == TrialOutcome::Skipped));
    }

    #[test]
    fn interrupted_warm_up_skips_all_trials() {
        let interrupt = Arc::new(AtomicBool::new(true));
        let records = Session::new(small_config(), interrupt).run();
        assert!(records
            .iter()
            .all(|record| record.outcome == TrialOutcome::Skipped));
    }

    #[test]
    fn bad_stride_surfaces_as_build_failure() {
        let trial = TrialSpec {
            iterations: 10,
            readers: 0,
            timeout: Duration::from_secs(10),
        };
        let never = AtomicBool::new(false);
        let err = run_layout(CounterSpec::new(Layout::Padded, 2, 12), &trial, &never).unwrap_err();
        assert_eq!(
            err,
            TrialError::Build {
                layout: Layout::Padded,
                source: CounterError::InvalidStride(12),
            }
        );
        assert!(!err.halts_session());
    }
}
