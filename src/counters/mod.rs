//! Counter collections under test.
//!
//! Both layouts are the same flat arena of 64-bit words; they differ only in
//! how far apart consecutive slots sit. Nothing else about them is allowed
//! to differ, otherwise the comparison measures something other than
//! cache-line sharing.

mod arena;
mod packed;
mod padded;

use std::fmt;

pub use arena::{SlotArena, MAX_STRIDE, WORD_BYTES};
pub use packed::PackedCounters;
pub use padded::PaddedCounters;

use crate::error::CounterError;

/// Conventional hardware cache-line size, in bytes.
pub const DEFAULT_STRIDE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layout {
    /// Slots contiguous, neighbours share cache lines.
    Packed,
    /// Each slot alone on its own stride-sized line.
    Padded,
}

impl Layout {
    pub const ALL: [Layout; 2] = [Layout::Packed, Layout::Padded];

    pub fn label(self) -> &'static str {
        match self {
            Layout::Packed => "packed",
            Layout::Padded => "padded",
        }
    }

    pub fn other(self) -> Layout {
        match self {
            Layout::Packed => Layout::Padded,
            Layout::Padded => Layout::Packed,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Uniform operations over a fixed-size set of counter slots.
///
/// `increment` is a plain read-modify-write: callers must guarantee a slot
/// has a single writer. `read` may be called from any thread and may return
/// a stale value while that writer is running.
pub trait Counter: Send + Sync {
    fn layout(&self) -> Layout;

    fn slots(&self) -> usize;

    fn increment(&self, slot: usize) -> Result<(), CounterError>;

    fn read(&self, slot: usize) -> Result<u64, CounterError>;

    /// Bytes of backing storage, padding included.
    fn footprint_bytes(&self) -> usize;

    /// Every slot value in slot order.
    fn snapshot(&self) -> Result<Vec<u64>, CounterError> {
        (0..self.slots()).map(|slot| self.read(slot)).collect()
    }
}

/// Describes one collection to build: which layout, how many slots, and the
/// stride the padded layout should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSpec {
    pub layout: Layout,
    pub slots: usize,
    pub stride: usize,
}

impl CounterSpec {
    pub fn new(layout: Layout, slots: usize, stride: usize) -> Self {
        CounterSpec {
            layout,
            slots,
            stride,
        }
    }

    // Padding only ever applies to the padded layout.
    pub fn expected_footprint(&self) -> usize {
        match self.layout {
            Layout::Packed => self.slots * WORD_BYTES,
            Layout::Padded => self.slots * self.stride,
        }
    }
}
