use std::sync::atomic::Ordering;

use portable_atomic::AtomicU64;

use crate::error::CounterError;

pub const WORD_BYTES: usize = std::mem::size_of::<u64>();

/// Widest stride accepted: one 4 KiB page per slot.
pub const MAX_STRIDE: usize = 4096;

// Flat block of words; slot i lives at word i * stride_words.
//
// Cells are atomics only so that a concurrent reader is not a data race and
// so the increment loop cannot be folded into one add. Every access is
// Relaxed: no fences, no locked instructions.
pub struct SlotArena {
    cells: Box<[AtomicU64]>,
    stride_words: usize,
    slots: usize,
}

impl SlotArena {
    pub fn new(slots: usize, stride_bytes: usize) -> Result<Self, CounterError> {
        if slots == 0 {
            return Err(CounterError::NoSlots);
        }
        if stride_bytes == 0 || stride_bytes > MAX_STRIDE || stride_bytes % WORD_BYTES != 0 {
            return Err(CounterError::InvalidStride(stride_bytes));
        }
        let stride_words = stride_bytes / WORD_BYTES;
        let len = slots
            .checked_mul(stride_words)
            .ok_or(CounterError::InvalidStride(stride_bytes))?;

        let cells = (0..len)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(SlotArena {
            cells,
            stride_words,
            slots,
        })
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn stride_bytes(&self) -> usize {
        self.stride_words * WORD_BYTES
    }

    pub fn footprint_bytes(&self) -> usize {
        self.cells.len() * WORD_BYTES
    }

    #[inline(always)]
    fn cell(&self, slot: usize) -> Result<&AtomicU64, CounterError> {
        if slot >= self.slots {
            return Err(CounterError::IndexOutOfRange {
                slot,
                slots: self.slots,
            });
        }
        Ok(&self.cells[slot * self.stride_words])
    }

    // Load then store, not fetch_add: the owning thread is the only writer.
    #[inline(always)]
    pub fn increment(&self, slot: usize) -> Result<(), CounterError> {
        let cell = self.cell(slot)?;
        let value = cell.load(Ordering::Relaxed);
        cell.store(value.wrapping_add(1), Ordering::Relaxed);
        Ok(())
    }

    #[inline(always)]
    pub fn read(&self, slot: usize) -> Result<u64, CounterError> {
        Ok(self.cell(slot)?.load(Ordering::Relaxed))
    }

    // Address of a slot, for reporting which lines slots land on.
    pub fn slot_addr(&self, slot: usize) -> Result<usize, CounterError> {
        Ok(self.cell(slot)? as *const AtomicU64 as usize)
    }
}
