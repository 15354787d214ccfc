//! The machine-wide memory manager.
//!
//! [`VirtualMemoryManager`] owns everything shared between address spaces: the frame
//! table, physical memory, the translation cache, and a registry resolving
//! [`AddressSpaceId`]s to the page tables and swap files that eviction must reach.
//!
//! Locks are always taken in this order:
//!
//! 1. an address space's fault lock,
//! 2. the frame table,
//! 3. the translation cache,
//! 4. an address space's page table,
//! 5. a frame's content.
//!
//! The registry lock is only ever held for a lookup.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::{Mutex, MutexGuard};

use crate::policy::{PageBits, PageUsage};
use crate::stats::StatCounters;
use crate::{
    AddressSpace, AddressSpaceId, FaultStats, FileSystem, FrameMap, FrameNumber, FrameOwner,
    FrameTable, PageNumber, PageTable, PhysicalMemory, Residence, SwapStore, Tlb, TlbEntry,
    VmConfig, VmError,
};

/// The parts of an address space that other address spaces' faults may touch.
pub(crate) struct SpaceState {
    pub id: AddressSpaceId,
    pub page_table: Mutex<PageTable>,
    pub swap: Option<SwapStore>,
}

impl SpaceState {
    /// Records that `page` now lives in swap.
    pub fn mark_swap(&self, page: PageNumber) {
        if let Some(entry) = self.page_table.lock().entry_mut(page) {
            entry.residence = Residence::SwappedOut;
            entry.valid = false;
        }
    }
}

/// The memory system of one simulated machine.
pub struct VirtualMemoryManager {
    config: VmConfig,
    frames: FrameTable,
    memory: PhysicalMemory,
    tlb: Mutex<Tlb>,
    spaces: Mutex<BTreeMap<AddressSpaceId, Arc<SpaceState>>>,
    fs: Arc<dyn FileSystem>,
    next_id: AtomicUsize,
    pub(crate) stats: StatCounters,
}

impl VirtualMemoryManager {
    /// Builds the memory system described by `config`, keeping swap files in `fs`.
    pub fn new(config: VmConfig, fs: Arc<dyn FileSystem>) -> Result<Arc<Self>, VmError> {
        config.validate()?;
        log::debug!(
            "memory: {} frames of {} bytes, {} TLB slots, {:?} replacement, {:?}, swap {}",
            config.frame_count,
            config.page_size,
            config.tlb_size,
            config.policy,
            config.load_mode,
            if config.swap { "on" } else { "off" }
        );

        Ok(Arc::new(Self {
            frames: FrameTable::new(config.frame_count, config.policy, config.random_seed),
            memory: PhysicalMemory::new(config.frame_count, config.page_size),
            tlb: Mutex::new(Tlb::new(config.tlb_size)),
            spaces: Mutex::new(BTreeMap::new()),
            fs,
            next_id: AtomicUsize::new(1),
            stats: StatCounters::default(),
            config,
        }))
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    /// Locks the translation cache.
    pub fn tlb(&self) -> MutexGuard<'_, Tlb> {
        self.tlb.lock()
    }

    /// Returns the address space whose translations are currently cached.
    pub fn current_space(&self) -> Option<AddressSpaceId> {
        self.tlb.lock().owner()
    }

    pub fn stats(&self) -> FaultStats {
        self.stats.snapshot()
    }

    /// Switches the translation cache from `from` (if any) to `to`.
    pub fn context_switch(&self, from: Option<&AddressSpace>, to: &AddressSpace) {
        if let Some(from) = from {
            from.save_state();
        }
        to.restore_state();
    }

    /// Returns the number of live address spaces.
    pub fn space_count(&self) -> usize {
        self.spaces.lock().len()
    }

    pub(crate) fn file_system(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    pub(crate) fn allocate_id(&self) -> AddressSpaceId {
        AddressSpaceId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register(&self, state: Arc<SpaceState>) {
        self.spaces.lock().insert(state.id, state);
    }

    fn lookup(&self, id: AddressSpaceId) -> Option<Arc<SpaceState>> {
        self.spaces.lock().get(&id).cloned()
    }

    /// Releases every frame of `id`, drops its cached translations and forgets it.
    pub(crate) fn release_space(&self, id: AddressSpaceId) {
        let mut frames = self.frames.lock();
        let released = frames.release_space(id);
        {
            let mut tlb = self.tlb.lock();
            if tlb.owner() == Some(id) {
                tlb.flush(None);
            }
        }
        drop(frames);

        let state = self.spaces.lock().remove(&id);
        log::debug!("released address space {} ({} frames)", id, released);
        drop(state);
    }

    /// Claims a free frame for `owner`, evicting a victim if memory is full.
    ///
    /// The frame comes back pinned; [`commit`](Self::commit) or
    /// [`abandon`](Self::abandon) must follow.
    pub(crate) fn reserve_frame(&self, owner: FrameOwner) -> Result<FrameNumber, VmError> {
        loop {
            let mut frames = self.frames.lock();
            if frames.count_clear() == 0 {
                if !self.config.swap {
                    log::error!(
                        "no free frame for space {} page {} and swap is disabled",
                        owner.space,
                        owner.page
                    );
                    return Err(VmError::ResourceExhausted);
                }
                if !self.evict(&mut frames)? {
                    // Every frame is pinned by an in-flight fault; let it finish.
                    drop(frames);
                    core::hint::spin_loop();
                    continue;
                }
            }

            let frame = frames.find(owner).ok_or(VmError::ResourceExhausted)?;
            frames.pin(frame);
            return Ok(frame);
        }
    }

    /// Evicts one victim frame to its owner's swap file and frees it.
    ///
    /// Runs entirely under the frame-table lock so that nothing can fault the victim
    /// back in, or claim its frame, halfway through. Returns false if every occupied
    /// frame is pinned.
    fn evict(&self, frames: &mut FrameMap) -> Result<bool, VmError> {
        let mut tlb = self.tlb.lock();
        let victim = {
            let mut usage = UsageView {
                manager: self,
                tlb: &mut tlb,
            };
            frames.pick_victim(&mut usage)
        };
        let Some(victim) = victim else {
            return Ok(false);
        };
        let Some(owner) = frames.owner(victim) else {
            return Ok(false);
        };

        let Some(state) = self.lookup(owner.space) else {
            log::error!("frame {} owned by unknown space {}", victim, owner.space);
            frames.clear(victim);
            return Ok(true);
        };

        // The cache may hold fresher bits than the page table; fold them in before the
        // entry goes stale.
        if tlb.owner() == Some(owner.space) {
            if let Some(cached) = tlb.invalidate(owner.page) {
                if let Some(entry) = state.page_table.lock().entry_mut(owner.page) {
                    cached.write_back(entry);
                }
            }
        }
        drop(tlb);

        let swap = state.swap.as_ref().ok_or(VmError::ResourceExhausted)?;
        swap.write_page(owner.page, &self.memory.frame(victim))?;
        state.mark_swap(owner.page);
        frames.clear(victim);
        self.stats.swap_out();

        log::debug!(
            "evicted space {} page {} from frame {}",
            owner.space,
            owner.page,
            victim
        );
        Ok(true)
    }

    /// Maps `page` of `state` to the freshly filled `frame`, unpins it, and installs the
    /// translation if `state` is the current address space.
    pub(crate) fn commit(
        &self,
        state: &SpaceState,
        page: PageNumber,
        frame: FrameNumber,
        read_only: bool,
    ) {
        let mut frames = self.frames.lock();
        let mut tlb = self.tlb.lock();
        let mut table = state.page_table.lock();
        if let Some(entry) = table.entry_mut(page) {
            entry.map(frame, read_only);
            if tlb.owner() == Some(state.id) {
                let cached = TlbEntry::from_page(page, frame, entry);
                if let Some(displaced) = tlb.insert(cached) {
                    write_back_displaced(&mut table, &displaced);
                }
            }
        }
        frames.unpin(frame);
    }

    /// Gives back a reserved frame whose fill failed.
    pub(crate) fn abandon(&self, frame: FrameNumber) {
        self.frames.lock().clear(frame);
    }

    /// Installs the translation of a resident `page`. Returns false if the page is no
    /// longer resident.
    pub(crate) fn refill(&self, state: &SpaceState, page: PageNumber) -> bool {
        let _frames = self.frames.lock();
        let mut tlb = self.tlb.lock();
        let mut table = state.page_table.lock();
        let Some(entry) = table.entry(page) else {
            return false;
        };
        let Some(frame) = entry.frame() else {
            return false;
        };
        if tlb.owner() == Some(state.id) {
            let cached = TlbEntry::from_page(page, frame, entry);
            if let Some(displaced) = tlb.insert(cached) {
                write_back_displaced(&mut table, &displaced);
            }
        }
        true
    }
}

/// Saves the usage bits of a translation pushed out of the cache. The cache only holds
/// translations of its owner, so the displaced page lives in the same table.
fn write_back_displaced(table: &mut PageTable, displaced: &TlbEntry) {
    if let Some(entry) = table.entry_mut(displaced.virtual_page) {
        displaced.write_back(entry);
    }
}

/// Reference/dirty bits as seen by the replacement policy.
///
/// Cached translations win over page-table entries for the current address space.
struct UsageView<'a> {
    manager: &'a VirtualMemoryManager,
    tlb: &'a mut Tlb,
}

impl PageUsage for UsageView<'_> {
    fn bits(&mut self, owner: FrameOwner) -> PageBits {
        if self.tlb.owner() == Some(owner.space) {
            if let Some(cached) = self.tlb.lookup(owner.page) {
                return PageBits {
                    referenced: cached.referenced,
                    dirty: cached.dirty,
                };
            }
        }
        self.manager
            .lookup(owner.space)
            .and_then(|state| {
                state
                    .page_table
                    .lock()
                    .entry(owner.page)
                    .map(|entry| PageBits {
                        referenced: entry.referenced,
                        dirty: entry.dirty,
                    })
            })
            .unwrap_or_default()
    }

    fn clear_referenced(&mut self, owner: FrameOwner) {
        if self.tlb.owner() == Some(owner.space) {
            if let Some(cached) = self.tlb.lookup_mut(owner.page) {
                cached.referenced = false;
            }
        }
        if let Some(state) = self.manager.lookup(owner.space) {
            if let Some(entry) = state.page_table.lock().entry_mut(owner.page) {
                entry.referenced = false;
            }
        }
    }
}
