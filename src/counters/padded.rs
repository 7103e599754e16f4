use super::{Counter, Layout, SlotArena};
use crate::error::CounterError;

/// One slot per stride. With a stride at least the hardware line size no two
/// slots can share a line, whatever alignment the allocator hands back,
/// since consecutive slots are a full stride apart.
///
/// The price is `(stride / 8 - 1) * slots` unused words.
pub struct PaddedCounters {
    arena: SlotArena,
}

impl PaddedCounters {
    pub fn new(slots: usize, stride: usize) -> Result<Self, CounterError> {
        Ok(PaddedCounters {
            arena: SlotArena::new(slots, stride)?,
        })
    }

    pub fn stride(&self) -> usize {
        self.arena.stride_bytes()
    }

    pub fn arena(&self) -> &SlotArena {
        &self.arena
    }
}

impl Counter for PaddedCounters {
    fn layout(&self) -> Layout {
        Layout::Padded
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footprint_is_one_stride_per_slot() {
        for stride in [64, 128, 256] {
            let counters = PaddedCounters::new(6, stride).unwrap();
            assert_eq!(counters.footprint_bytes(), 6 * stride);
            assert_eq!(counters.stride(), stride);
        }
    }

    #[test]
    fn no_two_slots_share_a_line() {
        let line = 64;
        let counters = PaddedCounters::new(8, line).unwrap();
        let lines: Vec<usize> = (0..8)
            .map(|slot| counters.arena().slot_addr(slot).unwrap() / line)
            .collect();
        for (i, a) in lines.iter().enumerate() {
            for b in &lines[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn rejects_stride_that_is_not_word_multiple() {
        assert_eq!(
            PaddedCounters::new(2, 100).err(),
            Some(CounterError::InvalidStride(100))
        );
    }
}
