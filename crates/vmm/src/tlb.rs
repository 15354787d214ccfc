//! The translation cache.
//!
//! The cache is not tagged with an address-space identifier. It remembers which address
//! space its entries belong to only so that eviction can tell whether a victim page may
//! be cached; switching address spaces always invalidates every slot.

use alloc::boxed::Box;

use crate::{AddressSpaceId, FrameNumber, PageNumber, PageTableEntry};

/// One translation-cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlbEntry {
    pub virtual_page: PageNumber,
    pub frame: FrameNumber,
    pub valid: bool,
    pub referenced: bool,
    pub dirty: bool,
    pub read_only: bool,
}

impl TlbEntry {
    /// Builds a slot from a resident page-table entry.
    pub fn from_page(page: PageNumber, frame: FrameNumber, entry: &PageTableEntry) -> Self {
        Self {
            virtual_page: page,
            frame,
            valid: true,
            referenced: entry.referenced,
            dirty: entry.dirty,
            read_only: entry.read_only,
        }
    }

    /// Copies the bits the cache may have updated back into `entry`.
    pub fn write_back(&self, entry: &mut PageTableEntry) {
        entry.referenced = self.referenced;
        entry.dirty = self.dirty;
        entry.read_only = self.read_only;
    }
}

/// The machine's translation cache.
pub struct Tlb {
    entries: Box<[TlbEntry]>,
    owner: Option<AddressSpaceId>,
    next_slot: usize,
}

impl Tlb {
    /// Creates a cache of `size` invalid slots.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "translation cache needs at least one slot");
        Self {
            entries: (0..size).map(|_| TlbEntry::default()).collect(),
            owner: None,
            next_slot: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the address space whose translations the cache may hold.
    pub fn owner(&self) -> Option<AddressSpaceId> {
        self.owner
    }

    /// Invalidates every slot and hands the cache to `owner`.
    pub fn flush(&mut self, owner: Option<AddressSpaceId>) {
        for entry in self.entries.iter_mut() {
            entry.valid = false;
        }
        self.owner = owner;
        self.next_slot = 0;
    }

    /// Returns the valid slot translating `page`.
    pub fn lookup(&self, page: PageNumber) -> Option<&TlbEntry> {
        self.entries
            .iter()
            .find(|entry| entry.valid && entry.virtual_page == page)
    }

    pub fn lookup_mut(&mut self, page: PageNumber) -> Option<&mut TlbEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.valid && entry.virtual_page == page)
    }

    /// Installs `entry`, replacing any slot for the same page, else the first invalid
    /// slot, else the next slot in round-robin order.
    ///
    /// Returns the translation pushed out of a reused slot. Its usage bits may be newer
    /// than the page table's and must be written back by the caller.
    pub fn insert(&mut self, entry: TlbEntry) -> Option<TlbEntry> {
        let slot = self
            .entries
            .iter()
            .position(|e| e.valid && e.virtual_page == entry.virtual_page)
            .or_else(|| self.entries.iter().position(|e| !e.valid))
            .unwrap_or_else(|| {
                let slot = self.next_slot;
                self.next_slot = (self.next_slot + 1) % self.entries.len();
                slot
            });
        let displaced = core::mem::replace(&mut self.entries[slot], entry);
        (displaced.valid && displaced.virtual_page != entry.virtual_page).then_some(displaced)
    }

    /// Invalidates the slot translating `page`, returning its last contents.
    pub fn invalidate(&mut self, page: PageNumber) -> Option<TlbEntry> {
        let entry = self.lookup_mut(page)?;
        let last = *entry;
        entry.valid = false;
        Some(last)
    }

    /// Iterates over the valid slots.
    pub fn valid_entries(&self) -> impl Iterator<Item = &TlbEntry> + '_ {
        self.entries.iter().filter(|entry| entry.valid)
    }
}
