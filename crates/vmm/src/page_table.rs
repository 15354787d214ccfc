//! Linear per-address-space page tables.

use alloc::boxed::Box;

use crate::{FrameNumber, PageNumber};

/// Where a virtual page's content currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Residence {
    /// Never materialized; content comes from the executable (or zeroes).
    #[default]
    NotLoaded,
    /// Resident in the given physical frame.
    Resident(FrameNumber),
    /// Evicted; content lives in the address space's swap file at `page * page_size`.
    SwappedOut,
}

/// One entry of a page table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageTableEntry {
    pub residence: Residence,
    pub valid: bool,
    /// Set by the translation unit on every access ("use" bit).
    pub referenced: bool,
    /// Set by the translation unit on every write.
    pub dirty: bool,
    pub read_only: bool,
}

impl PageTableEntry {
    /// Returns the frame holding this page, if it is resident.
    pub fn frame(&self) -> Option<FrameNumber> {
        match self.residence {
            Residence::Resident(frame) => Some(frame),
            Residence::NotLoaded | Residence::SwappedOut => None,
        }
    }

    /// Points the entry at `frame` and marks it valid with fresh usage bits.
    pub fn map(&mut self, frame: FrameNumber, read_only: bool) {
        self.residence = Residence::Resident(frame);
        self.valid = true;
        self.referenced = false;
        self.dirty = false;
        self.read_only = read_only;
    }
}

/// A page table indexed by virtual page number.
pub struct PageTable {
    entries: Box<[PageTableEntry]>,
}

impl PageTable {
    /// Creates a table of `page_count` entries, all [`Residence::NotLoaded`].
    pub fn new(page_count: usize) -> Self {
        Self {
            entries: (0..page_count).map(|_| PageTableEntry::default()).collect(),
        }
    }

    /// Returns the number of pages covered by this table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry for `page`, or `None` if it is out of range.
    pub fn entry(&self, page: PageNumber) -> Option<&PageTableEntry> {
        self.entries.get(page.as_usize())
    }

    /// Returns the entry for `page` mutably, or `None` if it is out of range.
    pub fn entry_mut(&mut self, page: PageNumber) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(page.as_usize())
    }

    /// Iterates over the resident pages and their frames.
    pub fn resident(&self) -> impl Iterator<Item = (PageNumber, FrameNumber)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(page, entry)| entry.frame().map(|frame| (PageNumber::new(page), frame)))
    }
}
