use super::{Counter, Layout, SlotArena, WORD_BYTES};
use crate::error::CounterError;

// Adjacent words: eight slots fit in one 64-byte line.
pub struct PackedCounters {
    arena: SlotArena,
}

impl PackedCounters {
    pub fn new(slots: usize) -> Result<Self, CounterError> {
        Ok(PackedCounters {
            arena: SlotArena::new(slots, WORD_BYTES)?,
        })
    }

    pub fn arena(&self) -> &SlotArena {
        &self.arena
    }
}

impl Counter for PackedCounters {
    fn layout(&self) -> Layout {
        Layout::Packed
    }

    fn slots(&self) -> usize {
        self.arena.slots()
    }

    #[inline(always)]
    fn increment(&self, slot: usize) -> Result<(), CounterError> {
        self.arena.increment(slot)
    }

    #[inline(always)]
    fn read(&self, slot: usize) -> Result<u64, CounterError> {
        self.arena.read(slot)
    }

    fn footprint_bytes(&self) -> usize {
        self.arena.footprint_bytes()
    }
}
