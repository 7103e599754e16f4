// Rendezvous points shared by the driver and its threads.
//
// The start gate holds every thread until all of them have arrived and the
// driver opens it. The completion latch counts workers down and remembers
// when the last one finished. Neither is touched inside the timed loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

// How often a blocked driver re-checks the interrupt flag.
const POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    TimedOut,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open,
    Abandoned,
}

struct Gate {
    arrived: usize,
    state: GateState,
}

pub struct StartGate {
    parties: usize,
    gate: Mutex<Gate>,
    cond: Condvar,
}

// None of these locks are held across user code, so poisoning cannot happen;
// recover the guard rather than propagate a panic that never occurred.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The instant `timeout` from now. A timeout too large to represent is
/// clamped to roughly a century.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(Duration::from_secs(100 * 365 * 24 * 3600)))
        .unwrap_or(now)
}

fn wait_slice<'a, T>(
    cond: &Condvar,
    guard: MutexGuard<'a, T>,
    deadline: Instant,
) -> MutexGuard<'a, T> {
    let left = deadline
        .saturating_duration_since(Instant::now())
        .min(POLL_SLICE);
    let (guard, _) = cond
        .wait_timeout(guard, left)
        .unwrap_or_else(PoisonError::into_inner);
    guard
}

impl StartGate {
    pub fn new(parties: usize) -> Self {
        StartGate {
            parties,
            gate: Mutex::new(Gate {
                arrived: 0,
                state: GateState::Closed,
            }),
            cond: Condvar::new(),
        }
    }

    /// Called by a worker or reader. Blocks until the driver opens or
    /// abandons the gate; returns `false` when abandoned.
    pub fn arrive(&self) -> bool {
        let mut gate = lock(&self.gate);
        gate.arrived += 1;
        self.cond.notify_all();
        while gate.state == GateState::Closed {
            gate = self
                .cond
                .wait(gate)
                .unwrap_or_else(PoisonError::into_inner);
        }
        gate.state == GateState::Open
    }

    /// Called by the driver. Waits for every party to arrive, then opens the
    /// gate and returns the release instant.
    pub fn open_when_full(
        &self,
        deadline: Instant,
        interrupt: &AtomicBool,
    ) -> Result<Instant, WaitOutcome> {
        let mut gate = lock(&self.gate);
        loop {
            if interrupt.load(Ordering::SeqCst) {
                gate.state = GateState::Abandoned;
                self.cond.notify_all();
                return Err(WaitOutcome::Interrupted);
            }
            if gate.arrived >= self.parties {
                gate.state = GateState::Open;
                let released = Instant::now();
                self.cond.notify_all();
                return Ok(released);
            }
            if Instant::now() >= deadline {
                gate.state = GateState::Abandoned;
                self.cond.notify_all();
                return Err(WaitOutcome::TimedOut);
            }
            gate = wait_slice(&self.cond, gate, deadline);
        }
    }

    /// Releases every waiting thread without starting the run.
    pub fn abandon(&self) {
        let mut gate = lock(&self.gate);
        gate.state = GateState::Abandoned;
        self.cond.notify_all();
    }
}

struct Latch {
    remaining: usize,
    finished_at: Option<Instant>,
}

pub struct CompletionLatch {
    latch: Mutex<Latch>,
    cond: Condvar,
}

impl CompletionLatch {
    pub fn new(count: usize) -> Self {
        CompletionLatch {
            latch: Mutex::new(Latch {
                remaining: count,
                finished_at: if count == 0 { Some(Instant::now()) } else { None },
            }),
            cond: Condvar::new(),
        }
    }

    pub fn count_down(&self) {
        let now = Instant::now();
        let mut latch = lock(&self.latch);
        if latch.remaining == 0 {
            return;
        }
        latch.remaining -= 1;
        if latch.remaining == 0 {
            latch.finished_at = Some(now);
            self.cond.notify_all();
        }
    }

    pub fn remaining(&self) -> usize {
        lock(&self.latch).remaining
    }

    /// Instant the count reached zero, if it has.
    pub fn finished_at(&self) -> Option<Instant> {
        lock(&self.latch).finished_at
    }

    pub fn wait(&self, deadline: Instant, interrupt: &AtomicBool) -> WaitOutcome {
        let mut latch = lock(&self.latch);
        loop {
            if latch.remaining == 0 {
                return WaitOutcome::Completed;
            }
            if interrupt.load(Ordering::SeqCst) {
                return WaitOutcome::Interrupted;
            }
            if Instant::now() >= deadline {
                return WaitOutcome::TimedOut;
            }
            latch = wait_slice(&self.cond, latch, deadline);
        }
    }

    /// Counts down when dropped, so a panicking worker still checks out.
    pub fn guard(&self) -> CountDownGuard<'_> {
        CountDownGuard { latch: self }
    }
}

pub struct CountDownGuard<'a> {
    latch: &'a CompletionLatch,
}

impl Drop for CountDownGuard<'_> {
    fn drop(&mut self) {
        self.latch.count_down();
    }
}
