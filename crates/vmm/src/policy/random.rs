use alloc::vec::Vec;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{PageUsage, ReplacementPolicy, evictable};
use crate::{Frame, FrameNumber};

/// Uniform random replacement among evictable frames.
///
/// The generator is seeded from the configuration so runs are reproducible.
pub struct RandomPolicy {
    rng: SmallRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl ReplacementPolicy for RandomPolicy {
    fn select(&mut self, frames: &[Frame], _usage: &mut dyn PageUsage) -> Option<FrameNumber> {
        let candidates: Vec<usize> = frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| evictable(frame).is_some())
            .map(|(index, _)| index)
            .collect();

        if candidates.is_empty() {
            return None;
        }
        let pick = self.rng.gen_range(0..candidates.len());
        Some(FrameNumber::new(candidates[pick]))
    }
}
