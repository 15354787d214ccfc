use super::{PageBits, PageUsage, ReplacementPolicy, evictable};
use crate::{Frame, FrameNumber};

/// Second-chance (enhanced CLOCK) replacement.
///
/// Sweeps circularly from a cursor:
///
/// 1. the first page that is neither referenced nor dirty;
/// 2. the first unreferenced page, clearing the referenced bit of every page passed over;
/// 3. pass 1 again, now that reference bits have been cleared;
/// 4. pass 2 again, for when every remaining page is dirty.
///
/// The cursor moves just past the chosen frame.
pub struct ClockPolicy {
    hand: usize,
}

impl ClockPolicy {
    pub const fn new() -> Self {
        Self { hand: 0 }
    }

    fn sweep(
        &mut self,
        frames: &[Frame],
        usage: &mut dyn PageUsage,
        accept: fn(PageBits) -> bool,
        second_chance: bool,
    ) -> Option<FrameNumber> {
        let count = frames.len();
        for step in 0..count {
            let index = (self.hand + step) % count;
            let Some(owner) = evictable(&frames[index]) else {
                continue;
            };

            let bits = usage.bits(owner);
            if accept(bits) {
                self.hand = (index + 1) % count;
                return Some(FrameNumber::new(index));
            }
            if second_chance && bits.referenced {
                usage.clear_referenced(owner);
            }
        }
        None
    }
}

impl Default for ClockPolicy {
    fn default() -> Self {
        Self::new()
    }
}

fn clean_and_unreferenced(bits: PageBits) -> bool {
    !bits.referenced && !bits.dirty
}

fn unreferenced(bits: PageBits) -> bool {
    !bits.referenced
}

impl ReplacementPolicy for ClockPolicy {
    fn select(&mut self, frames: &[Frame], usage: &mut dyn PageUsage) -> Option<FrameNumber> {
        if frames.is_empty() {
            return None;
        }

        self.sweep(frames, usage, clean_and_unreferenced, false)
            .or_else(|| self.sweep(frames, usage, unreferenced, true))
            .or_else(|| self.sweep(frames, usage, clean_and_unreferenced, false))
            .or_else(|| self.sweep(frames, usage, unreferenced, false))
    }
}
