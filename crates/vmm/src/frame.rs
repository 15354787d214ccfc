use core::sync::atomic::{AtomicU64, Ordering};

use crate::{AddressSpaceId, PageNumber};

/// Identifies the virtual page currently held by a frame.
///
/// This is a lookup key, not a reference: the owning address space is resolved through
/// the manager's registry and may already be gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameOwner {
    pub space: AddressSpaceId,
    pub page: PageNumber,
}

impl FrameOwner {
    pub const fn new(space: AddressSpaceId, page: PageNumber) -> Self {
        Self { space, page }
    }
}

/// Holds metadata for a physical memory frame.
///
/// An unoccupied frame never carries an owner.
#[derive(Default)]
pub struct Frame {
    /// Flags identifying the state of this frame.
    pub flags: FrameFlags,
    owner: Option<FrameOwner>,
}

impl Frame {
    /// Returns true if the frame holds a page.
    pub fn is_occupied(&self) -> bool {
        self.flags.atomic_test(FrameFlag::Occupied)
    }

    /// Returns true if the frame is being filled and must not be evicted.
    pub fn is_pinned(&self) -> bool {
        self.flags.atomic_test(FrameFlag::Pinned)
    }

    /// Returns the page held by this frame, if any.
    pub fn owner(&self) -> Option<FrameOwner> {
        self.owner
    }

    /// Stamps the frame as holding `owner`.
    pub(crate) fn occupy(&mut self, owner: FrameOwner) {
        self.flags.set(FrameFlag::Occupied);
        self.owner = Some(owner);
    }

    /// Returns the frame to the free state, dropping its owner and pin.
    pub(crate) fn release(&mut self) {
        self.flags.clear(FrameFlag::Occupied);
        self.flags.clear(FrameFlag::Pinned);
        self.owner = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFlag {
    /// Frame holds a page.
    Occupied = 1 << 0,
    /// Frame content is in transit and the frame must not be chosen as a victim.
    Pinned = 1 << 1,
}

/// Flags for a physical memory frame.
///
/// Mutation goes through `&mut`, which the frame-table lock provides; reads are atomic
/// so that diagnostics can look at a frame through a shared reference.
#[derive(Default)]
pub struct FrameFlags(AtomicU64);

impl FrameFlags {
    /// Creates a new `FrameFlags` instance with all flags cleared.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Sets the given flag.
    pub fn set(&mut self, flag: FrameFlag) {
        *self.0.get_mut() |= flag as u64;
    }

    /// Clears the given flag.
    pub fn clear(&mut self, flag: FrameFlag) {
        *self.0.get_mut() &= !(flag as u64);
    }

    /// Tests if the given flag is set.
    pub fn test(&mut self, flag: FrameFlag) -> bool {
        (*self.0.get_mut() & flag as u64) != 0
    }

    /// Tests if the given flag is set, atomically.
    pub fn atomic_test(&self, flag: FrameFlag) -> bool {
        (self.0.load(Ordering::Acquire) & flag as u64) != 0
    }
}
