//! Simulated physical memory.
//!
//! Memory is an array of frame-sized buffers, each behind its own lock. Content copies
//! (zero-fill, program loads, swap I/O) lock only the frame they touch, so they can run
//! without holding the frame-table lock.

use alloc::boxed::Box;
use alloc::vec;

use spin::{Mutex, MutexGuard};

use crate::{FrameNumber, PhysicalAddress};

/// The machine's main memory.
pub struct PhysicalMemory {
    frames: Box<[Mutex<Box<[u8]>>]>,
    page_size: usize,
}

impl PhysicalMemory {
    /// Creates `frame_count` zeroed frames of `page_size` bytes each.
    pub fn new(frame_count: usize, page_size: usize) -> Self {
        let frames = (0..frame_count)
            .map(|_| Mutex::new(vec![0u8; page_size].into_boxed_slice()))
            .collect();
        Self { frames, page_size }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns the size of memory in bytes.
    pub fn size(&self) -> usize {
        self.frames.len() * self.page_size
    }

    /// Locks and returns the content of `frame`.
    ///
    /// # Panics
    /// Panics if `frame` is out of range.
    pub fn frame(&self, frame: FrameNumber) -> MutexGuard<'_, Box<[u8]>> {
        assert!(
            frame.as_usize() < self.frames.len(),
            "physical frame out of bounds"
        );
        self.frames[frame.as_usize()].lock()
    }

    /// Fills `frame` with zeroes.
    pub fn zero_frame(&self, frame: FrameNumber) {
        self.frame(frame).fill(0);
    }

    /// Copies `dst.len()` bytes starting at `addr` into `dst`.
    ///
    /// Returns `None` if the range is outside memory or crosses a frame boundary.
    pub fn read(&self, addr: PhysicalAddress, dst: &mut [u8]) -> Option<()> {
        let (frame, offset) = self.locate(addr, dst.len())?;
        dst.copy_from_slice(&self.frame(frame)[offset..offset + dst.len()]);
        Some(())
    }

    /// Copies `src` into memory starting at `addr`.
    ///
    /// Returns `None` if the range is outside memory or crosses a frame boundary.
    pub fn write(&self, addr: PhysicalAddress, src: &[u8]) -> Option<()> {
        let (frame, offset) = self.locate(addr, src.len())?;
        self.frame(frame)[offset..offset + src.len()].copy_from_slice(src);
        Some(())
    }

    fn locate(&self, addr: PhysicalAddress, len: usize) -> Option<(FrameNumber, usize)> {
        let frame = addr.frame_number(self.page_size);
        let offset = addr.page_offset(self.page_size);
        if frame.as_usize() >= self.frames.len() || offset + len > self.page_size {
            return None;
        }
        Some((frame, offset))
    }
}
