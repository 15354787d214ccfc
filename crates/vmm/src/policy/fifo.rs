use alloc::collections::VecDeque;

use super::{PageUsage, ReplacementPolicy, evictable};
use crate::{Frame, FrameNumber};

/// First-in, first-out replacement.
///
/// Keeps frames in the order they were marked; the victim is the oldest one still
/// resident and not pinned.
pub struct FifoPolicy {
    queue: VecDeque<FrameNumber>,
}

impl FifoPolicy {
    pub fn with_capacity(frame_count: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(frame_count),
        }
    }

    fn remove(&mut self, frame: FrameNumber) {
        if let Some(position) = self.queue.iter().position(|&queued| queued == frame) {
            self.queue.remove(position);
        }
    }
}

impl ReplacementPolicy for FifoPolicy {
    fn on_mark(&mut self, frame: FrameNumber) {
        // Re-marking an occupied frame restarts its age.
        self.remove(frame);
        self.queue.push_back(frame);
    }

    fn on_clear(&mut self, frame: FrameNumber) {
        self.remove(frame);
    }

    fn select(&mut self, frames: &[Frame], _usage: &mut dyn PageUsage) -> Option<FrameNumber> {
        self.queue
            .iter()
            .copied()
            .find(|frame| evictable(&frames[frame.as_usize()]).is_some())
    }
}
