//! Test RNGs: deterministic `DeterministicRng` implementations for tests.

use troupe_core::rng::DeterministicRng;

/// A no-op RNG that always returns `min`. Every session ID it produces is the
/// same, so only one session can be started with it.
#[derive(Debug)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }
}

/// An RNG that returns values from a predetermined sequence. Panics if the
/// sequence is exhausted.
#[derive(Debug)]
pub struct SequenceRng {
    values: Vec<u32>,
    index: usize,
}

impl SequenceRng {
    /// Create a new `SequenceRng` with the given values.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self { values, index: 0 }
    }
}

impl DeterministicRng for SequenceRng {
    fn next_u32_range(&mut self, _min: u32, _max: u32) -> u32 {
        let val = self.values[self.index];
        self.index += 1;
        val
    }
}

/// An RNG that returns `min + 0`, `min + 1`, ... capped at `max`. Produces a
/// fresh session ID for every start.
#[derive(Debug, Default)]
pub struct CountingRng {
    next: u32,
}

impl DeterministicRng for CountingRng {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        let val = min.saturating_add(self.next).min(max);
        self.next += 1;
        val
    }
}
