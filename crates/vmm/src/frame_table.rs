//! The frame table: occupancy and ownership of every physical frame.
//!
//! There is exactly one [`FrameTable`] per simulated machine. All of its state lives in a
//! [`FrameMap`] behind a single lock; any sequence that tests occupancy and then marks or
//! clears a frame must run under one [`FrameTable::lock`] guard, otherwise two faults can
//! claim the same frame.

use alloc::boxed::Box;
use alloc::vec::Vec;

use spin::{Mutex, MutexGuard};

use crate::policy::{self, PageUsage, ReplacementPolicy};
use crate::{AddressSpaceId, Frame, FrameFlag, FrameNumber, FrameOwner, PolicyKind};

/// Frame metadata plus the replacement policy that orders it.
pub struct FrameMap {
    frames: Box<[Frame]>,
    policy: Box<dyn ReplacementPolicy>,
}

impl FrameMap {
    /// Creates a map of `frame_count` free frames.
    pub fn new(frame_count: usize, policy: Box<dyn ReplacementPolicy>) -> Self {
        assert!(frame_count > 0, "frame table needs at least one frame");
        let frames = (0..frame_count).map(|_| Frame::default()).collect();
        Self { frames, policy }
    }

    /// Returns the total number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Marks `frame` occupied by `owner`.
    ///
    /// # Panics
    /// Panics if `frame` is out of range.
    pub fn mark(&mut self, frame: FrameNumber, owner: FrameOwner) {
        let index = self.index(frame);
        self.frames[index].occupy(owner);
        self.policy.on_mark(frame);
        log::trace!("frame {} -> space {} page {}", frame, owner.space, owner.page);
    }

    /// Marks `frame` free, dropping its owner.
    ///
    /// # Panics
    /// Panics if `frame` is out of range.
    pub fn clear(&mut self, frame: FrameNumber) {
        let index = self.index(frame);
        self.frames[index].release();
        self.policy.on_clear(frame);
        log::trace!("frame {} freed", frame);
    }

    /// Returns true if `frame` is occupied.
    ///
    /// # Panics
    /// Panics if `frame` is out of range.
    pub fn test(&self, frame: FrameNumber) -> bool {
        self.frames[self.index(frame)].is_occupied()
    }

    /// Claims the first free frame for `owner`, or returns `None` if memory is full.
    pub fn find(&mut self, owner: FrameOwner) -> Option<FrameNumber> {
        let index = self.frames.iter().position(|frame| !frame.is_occupied())?;
        let frame = FrameNumber::new(index);
        self.mark(frame, owner);
        Some(frame)
    }

    /// Returns the number of free frames.
    pub fn count_clear(&self) -> usize {
        self.frames.iter().filter(|frame| !frame.is_occupied()).count()
    }

    /// Chooses an occupied, unpinned frame to evict. The frame is not freed.
    pub fn pick_victim(&mut self, usage: &mut dyn PageUsage) -> Option<FrameNumber> {
        self.policy.select(&self.frames, usage)
    }

    /// Returns the page held by `frame`.
    pub fn owner(&self, frame: FrameNumber) -> Option<FrameOwner> {
        self.frames.get(frame.as_usize()).and_then(Frame::owner)
    }

    /// Pins `frame` so that it cannot be chosen as a victim.
    pub fn pin(&mut self, frame: FrameNumber) {
        let index = self.index(frame);
        self.frames[index].flags.set(FrameFlag::Pinned);
    }

    pub fn unpin(&mut self, frame: FrameNumber) {
        let index = self.index(frame);
        self.frames[index].flags.clear(FrameFlag::Pinned);
    }

    /// Frees every frame owned by `space`, returning how many were released.
    pub fn release_space(&mut self, space: AddressSpaceId) -> usize {
        let owned: Vec<FrameNumber> = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.owner().is_some_and(|owner| owner.space == space))
            .map(|(index, _)| FrameNumber::new(index))
            .collect();
        for &frame in &owned {
            self.clear(frame);
        }
        owned.len()
    }

    /// Iterates over the occupied frames and their owners.
    pub fn occupied(&self) -> impl Iterator<Item = (FrameNumber, FrameOwner)> + '_ {
        self.frames
            .iter()
            .enumerate()
            .filter_map(|(index, frame)| {
                frame.owner().map(|owner| (FrameNumber::new(index), owner))
            })
    }

    /// Logs the occupied frames.
    pub fn dump(&self) {
        log::debug!(
            "frame table: {} of {} frames free",
            self.count_clear(),
            self.len()
        );
        for (frame, owner) in self.occupied() {
            log::debug!(
                "  frame {:>4}: space {} page {}",
                frame,
                owner.space,
                owner.page
            );
        }
    }

    fn index(&self, frame: FrameNumber) -> usize {
        assert!(
            frame.as_usize() < self.frames.len(),
            "frame number out of range"
        );
        frame.as_usize()
    }
}

/// The machine-wide frame table.
pub struct FrameTable {
    map: Mutex<FrameMap>,
}

impl FrameTable {
    /// Creates a table of `frame_count` free frames using the given policy.
    pub fn new(frame_count: usize, policy: PolicyKind, seed: u64) -> Self {
        Self {
            map: Mutex::new(FrameMap::new(
                frame_count,
                policy::build(policy, frame_count, seed),
            )),
        }
    }

    /// Acquires the frame-table lock.
    pub fn lock(&self) -> MutexGuard<'_, FrameMap> {
        self.map.lock()
    }

    /// Returns the number of free frames.
    pub fn count_clear(&self) -> usize {
        self.lock().count_clear()
    }

    /// Returns true if `frame` is occupied.
    pub fn test(&self, frame: FrameNumber) -> bool {
        self.lock().test(frame)
    }

    /// Returns the total number of frames.
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
