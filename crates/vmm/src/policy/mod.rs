//! Page-replacement policies.
//!
//! The frame table delegates victim selection to one [`ReplacementPolicy`], chosen from
//! [`PolicyKind`] when the manager is built. Policies only ever see the frame array and
//! a [`PageUsage`] view of reference/dirty bits; they never free frames themselves.

mod clock;
mod fifo;
mod random;

use alloc::boxed::Box;

use crate::{Frame, FrameNumber, FrameOwner, PolicyKind};

pub use clock::ClockPolicy;
pub use fifo::FifoPolicy;
pub use random::RandomPolicy;

/// Reference and dirty bits of one resident page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageBits {
    pub referenced: bool,
    pub dirty: bool,
}

/// Access to the usage bits of whichever page occupies a frame.
///
/// Implemented by the manager, which consults the translation cache before the owning
/// page table since the cache may hold fresher bits.
pub trait PageUsage {
    /// Returns the current bits of `owner`'s page.
    fn bits(&mut self, owner: FrameOwner) -> PageBits;

    /// Clears the referenced bit of `owner`'s page.
    fn clear_referenced(&mut self, owner: FrameOwner);
}

/// A victim-selection strategy.
pub trait ReplacementPolicy: Send {
    /// Called after `frame` has been marked occupied.
    fn on_mark(&mut self, _frame: FrameNumber) {}

    /// Called after `frame` has been cleared.
    fn on_clear(&mut self, _frame: FrameNumber) {}

    /// Chooses an occupied, unpinned frame to evict, or `None` if there is none.
    fn select(&mut self, frames: &[Frame], usage: &mut dyn PageUsage) -> Option<FrameNumber>;
}

/// Builds the policy selected by `kind` for a table of `frame_count` frames.
pub(crate) fn build(kind: PolicyKind, frame_count: usize, seed: u64) -> Box<dyn ReplacementPolicy> {
    match kind {
        PolicyKind::Fifo => Box::new(FifoPolicy::with_capacity(frame_count)),
        PolicyKind::Clock => Box::new(ClockPolicy::new()),
        PolicyKind::Random => Box::new(RandomPolicy::new(seed)),
    }
}

/// Returns the owner of `frame` if it may be evicted.
fn evictable(frame: &Frame) -> Option<FrameOwner> {
    if frame.is_occupied() && !frame.is_pinned() {
        frame.owner()
    } else {
        None
    }
}
