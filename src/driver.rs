// One timed trial: N writers, each bound to its own slot, released together
// and timed from gate release to the last writer checking out.

use std::any::Any;
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::counters::{Counter, Layout};
use crate::error::{CounterError, TrialError};
use crate::util::sync_primitives::{deadline_after, CompletionLatch, StartGate, WaitOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialSpec {
    pub iterations: u64,
    pub readers: usize,
    /// Wall-clock ceiling for the whole trial, rendezvous included.
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub layout: Layout,
    pub workers: usize,
    pub iterations: u64,
    pub elapsed: Duration,
    pub footprint_bytes: usize,
    pub slot_values: Vec<u64>,
}

impl TrialResult {
    pub fn total_ops(&self) -> u128 {
        self.workers as u128 * self.iterations as u128
    }

    pub fn ops_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return f64::INFINITY;
        }
        self.total_ops() as f64 / secs
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panicked".to_string()
    }
}

struct Crew {
    workers: Vec<JoinHandle<Result<(), CounterError>>>,
    readers: Vec<JoinHandle<Result<(), CounterError>>>,
}

fn spawn_crew<C: Counter + 'static>(
    counter: &Arc<C>,
    spec: &TrialSpec,
    gate: &Arc<StartGate>,
    latch: &Arc<CompletionLatch>,
    stop_readers: &Arc<AtomicBool>,
) -> Result<Crew, (Crew, TrialError)> {
    let slots = counter.slots();
    let mut crew = Crew {
        workers: Vec::with_capacity(slots),
        readers: Vec::new(),
    };

    for slot in 0..slots {
        let counter = Arc::clone(counter);
        let gate = Arc::clone(gate);
        let latch = Arc::clone(latch);
        let iterations = spec.iterations;
        let name = format!("worker-{slot}");

        let spawned = thread::Builder::new().name(name.clone()).spawn(
            move || -> Result<(), CounterError> {
                let _done = latch.guard();
                if !gate.arrive() {
                    return Ok(());
                }
                for _ in 0..iterations {
                    counter.increment(slot)?;
                }
                Ok(())
            },
        );
        match spawned {
            Ok(handle) => crew.workers.push(handle),
            Err(err) => {
                let reason = err.to_string();
                return Err((crew, TrialError::Spawn { name, reason }));
            }
        }
    }

    for reader in 0..spec.readers {
        let counter = Arc::clone(counter);
        let gate = Arc::clone(gate);
        let stop = Arc::clone(stop_readers);
        let name = format!("reader-{reader}");

        let spawned = thread::Builder::new().name(name.clone()).spawn(
            move || -> Result<(), CounterError> {
                if !gate.arrive() {
                    return Ok(());
                }
                // at least one full sweep, even if the writers beat us
                let mut sum = 0u64;
                loop {
                    for slot in 0..counter.slots() {
                        sum = sum.wrapping_add(counter.read(slot)?);
                    }
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                }
                black_box(sum);
                Ok(())
            },
        );
        match spawned {
            Ok(handle) => crew.readers.push(handle),
            Err(err) => {
                let reason = err.to_string();
                return Err((crew, TrialError::Spawn { name, reason }));
            }
        }
    }

    Ok(crew)
}

fn halted(outcome: WaitOutcome, timeout: Duration) -> TrialError {
    match outcome {
        WaitOutcome::Interrupted => TrialError::Interrupted,
        _ => TrialError::TimedOut(timeout),
    }
}

// Joins everything; the first failure, if any, wins.
fn join_crew(crew: Crew) -> Result<(), TrialError> {
    let mut first = None;

    for (worker, handle) in crew.workers.into_iter().enumerate() {
        let reason = match handle.join() {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        error!("worker {worker} on slot {worker} failed: {reason}");
        first.get_or_insert(TrialError::WorkerFailed {
            worker,
            slot: worker,
            reason,
        });
    }

    for (reader, handle) in crew.readers.into_iter().enumerate() {
        let reason = match handle.join() {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        error!("reader {reader} failed: {reason}");
        first.get_or_insert(TrialError::ReaderFailed { reader, reason });
    }

    first.map_or(Ok(()), Err)
}

/// Runs one trial on a freshly built collection.
///
/// On timeout or interruption the threads are left to finish on their own;
/// they are never joined, so a wedged worker cannot hang the caller.
pub fn run_trial<C: Counter + 'static>(
    counter: Arc<C>,
    spec: &TrialSpec,
    interrupt: &AtomicBool,
) -> Result<TrialResult, TrialError> {
    let deadline = deadline_after(spec.timeout);
    let layout = counter.layout();
    let workers = counter.slots();

    let gate = Arc::new(StartGate::new(workers.saturating_add(spec.readers)));
    let latch = Arc::new(CompletionLatch::new(workers));
    let stop_readers = Arc::new(AtomicBool::new(false));

    let crew = match spawn_crew(&counter, spec, &gate, &latch, &stop_readers) {
        Ok(crew) => crew,
        Err((partial, err)) => {
            gate.abandon();
            stop_readers.store(true, Ordering::Relaxed);
            // everyone spawned so far is released by the abandoned gate
            if let Err(straggler) = join_crew(partial) {
                warn!("{layout} trial: after spawn failure, {straggler}");
            }
            return Err(err);
        }
    };

    let started = match gate.open_when_full(deadline, interrupt) {
        Ok(started) => started,
        Err(outcome) => {
            stop_readers.store(true, Ordering::Relaxed);
            return Err(halted(outcome, spec.timeout));
        }
    };

    let outcome = latch.wait(deadline, interrupt);
    let finished = latch.finished_at().unwrap_or_else(Instant::now);
    stop_readers.store(true, Ordering::Relaxed);
    if outcome != WaitOutcome::Completed {
        error!(
            "{layout} trial abandoned after {:?} with {} of {workers} workers still running",
            started.elapsed(),
            latch.remaining()
        );
        return Err(halted(outcome, spec.timeout));
    }
    let elapsed = finished.saturating_duration_since(started);

    join_crew(crew)?;

    let slot_values = counter.snapshot().map_err(TrialError::Readback)?;
    for (slot, &actual) in slot_values.iter().enumerate() {
        if actual != spec.iterations {
            return Err(TrialError::LostUpdates {
                slot,
                expected: spec.iterations,
                actual,
            });
        }
    }

    debug!(
        "{layout}: {workers} workers x {} increments in {elapsed:?}",
        spec.iterations
    );

    Ok(TrialResult {
        layout,
        workers,
        iterations: spec.iterations,
        elapsed,
        footprint_bytes: counter.footprint_bytes(),
        slot_values,
    })
}
