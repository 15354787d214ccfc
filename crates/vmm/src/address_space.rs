//! User address spaces.
//!
//! An [`AddressSpace`] maps a program's virtual pages `[0, page_count)` onto physical
//! frames. Its page table and swap file are shared with the manager's registry so that
//! a fault in another address space can evict one of its pages; everything else is
//! private to the owning thread.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::manager::SpaceState;
use crate::{
    AddressSpaceId, Executable, FrameNumber, FrameOwner, LoadMode, PageNumber, PageTable,
    PageTableEntry, Residence, SwapStore, ThreadId, VirtualAddress, VirtualMemoryManager,
    VmError,
};

/// Bytes kept free above the initial stack pointer.
const STACK_RESERVE: usize = 16;

/// Initial user register values for a freshly loaded program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRegisters {
    pub pc: VirtualAddress,
    pub next_pc: VirtualAddress,
    pub sp: VirtualAddress,
}

/// The virtual address space of one user program.
pub struct AddressSpace {
    vmm: Arc<VirtualMemoryManager>,
    state: Arc<SpaceState>,
    executable: Box<dyn Executable>,
    owner: ThreadId,
    page_count: usize,
    args: Vec<String>,
    fault_lock: Mutex<()>,
}

/// The bytes of a segment falling inside one page.
struct Overlap {
    page_offset: usize,
    segment_offset: usize,
    len: usize,
}

fn overlap(
    page_start: usize,
    page_size: usize,
    segment_start: usize,
    segment_len: usize,
) -> Option<Overlap> {
    let lo = page_start.max(segment_start);
    let hi = (page_start + page_size).min(segment_start + segment_len);
    (lo < hi).then(|| Overlap {
        page_offset: lo - page_start,
        segment_offset: lo - segment_start,
        len: hi - lo,
    })
}

impl AddressSpace {
    /// Builds the address space of `executable` for thread `owner`.
    ///
    /// The space covers the program image plus the configured stack. With
    /// [`LoadMode::Eager`] every page is materialized before this returns; otherwise
    /// nothing is loaded until the first fault.
    pub fn new(
        vmm: &Arc<VirtualMemoryManager>,
        executable: Box<dyn Executable>,
        owner: ThreadId,
        args: Vec<String>,
    ) -> Result<Self, VmError> {
        if !executable.check_magic() {
            log::error!("thread {}: executable has a bad magic number", owner);
            return Err(VmError::InvalidExecutable);
        }

        let config = vmm.config();
        let page_count =
            (executable.size() + config.user_stack_size).div_ceil(config.page_size);

        if config.load_mode == LoadMode::Eager
            && !config.swap
            && vmm.frames().count_clear() < page_count
        {
            log::error!(
                "thread {}: {} pages do not fit in {} free frames",
                owner,
                page_count,
                vmm.frames().count_clear()
            );
            return Err(VmError::ResourceExhausted);
        }

        let id = vmm.allocate_id();
        let swap = if config.swap {
            Some(SwapStore::create(vmm.file_system(), id, page_count, config.page_size)?)
        } else {
            None
        };
        let state = Arc::new(SpaceState {
            id,
            page_table: Mutex::new(PageTable::new(page_count)),
            swap,
        });
        vmm.register(state.clone());

        let space = Self {
            vmm: vmm.clone(),
            state,
            executable,
            owner,
            page_count,
            args,
            fault_lock: Mutex::new(()),
        };
        log::debug!(
            "thread {}: address space {} with {} pages ({} bytes)",
            owner,
            id,
            page_count,
            page_count * config.page_size
        );

        if config.load_mode == LoadMode::Eager {
            for page in 0..page_count {
                space.allocate_page(PageNumber::new(page))?;
            }
        }
        Ok(space)
    }

    pub fn id(&self) -> AddressSpaceId {
        self.state.id
    }

    /// Returns the thread this address space belongs to.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn executable(&self) -> &dyn Executable {
        self.executable.as_ref()
    }

    pub fn manager(&self) -> &Arc<VirtualMemoryManager> {
        &self.vmm
    }

    /// Returns the name of this space's swap file, if swapping is enabled.
    pub fn swap_name(&self) -> Option<&str> {
        self.state.swap.as_ref().map(SwapStore::name)
    }

    /// Returns a copy of the page-table entry for `page`.
    pub fn entry(&self, page: PageNumber) -> Option<PageTableEntry> {
        self.state.page_table.lock().entry(page).copied()
    }

    /// Returns the resident pages and the frames holding them.
    pub fn resident_pages(&self) -> Vec<(PageNumber, FrameNumber)> {
        self.state.page_table.lock().resident().collect()
    }

    /// Register values for starting the program: execution begins at address 0 and
    /// the stack grows down from the top of the address space.
    pub fn initial_registers(&self) -> UserRegisters {
        UserRegisters {
            pc: VirtualAddress::new(0),
            next_pc: VirtualAddress::new(4),
            sp: VirtualAddress::new(self.page_count * self.vmm.page_size() - STACK_RESERVE),
        }
    }

    pub(crate) fn state(&self) -> &SpaceState {
        &self.state
    }

    pub(crate) fn lock_faults(&self) -> spin::MutexGuard<'_, ()> {
        self.fault_lock.lock()
    }

    pub(crate) fn check_page(&self, page: PageNumber) -> Result<(), VmError> {
        if page.as_usize() < self.page_count {
            Ok(())
        } else {
            Err(VmError::AddressOutOfRange {
                page,
                page_count: self.page_count,
            })
        }
    }

    /// Materializes `page` for the first time: zero-filled, then overlaid with whatever
    /// code and initialized data fall inside it.
    ///
    /// A page that is already resident is left alone, and one that has been evicted is
    /// restored from swap instead, so the call never discards written content.
    pub fn allocate_page(&self, page: PageNumber) -> Result<FrameNumber, VmError> {
        let _guard = self.lock_faults();
        self.check_page(page)?;
        match self.residence(page) {
            Residence::NotLoaded => self.load_page(page),
            Residence::Resident(frame) => Ok(frame),
            Residence::SwappedOut => self.swap_in(page),
        }
    }

    /// Records that `page` has been evicted to swap.
    pub fn mark_swap(&self, page: PageNumber) -> Result<(), VmError> {
        self.check_page(page)?;
        self.state.mark_swap(page);
        Ok(())
    }

    /// Brings an evicted `page` back from swap. A page that is not swapped out is
    /// materialized or left alone, as for [`allocate_page`](Self::allocate_page).
    pub fn return_swap(&self, page: PageNumber) -> Result<FrameNumber, VmError> {
        self.allocate_page(page)
    }

    /// Copies the translation cache's usage bits into the page table.
    ///
    /// Does nothing unless this space owns the cache.
    pub fn save_state(&self) {
        let tlb = self.vmm.tlb();
        if tlb.owner() != Some(self.id()) {
            return;
        }
        let mut table = self.state.page_table.lock();
        for cached in tlb.valid_entries() {
            if let Some(entry) = table.entry_mut(cached.virtual_page) {
                entry.residence = Residence::Resident(cached.frame);
                entry.valid = cached.valid;
                cached.write_back(entry);
            }
        }
    }

    /// Takes over the translation cache, invalidating every slot.
    pub fn restore_state(&self) {
        self.vmm.tlb().flush(Some(self.id()));
        log::trace!("address space {} now current", self.id());
    }

    /// Logs this space's page table.
    pub fn dump(&self) {
        let table = self.state.page_table.lock();
        log::debug!("address space {}: {} pages", self.id(), table.len());
        for page in 0..table.len() {
            let page = PageNumber::new(page);
            if let Some(entry) = table.entry(page) {
                log::debug!(
                    "  page {:>4}: {:?} ref={} dirty={} ro={}",
                    page,
                    entry.residence,
                    entry.referenced,
                    entry.dirty,
                    entry.read_only
                );
            }
        }
    }

    pub(crate) fn residence(&self, page: PageNumber) -> Residence {
        self.state
            .page_table
            .lock()
            .entry(page)
            .map(|entry| entry.residence)
            .unwrap_or_default()
    }

    /// Returns true if `page` lies entirely inside the code segment.
    fn is_code_page(&self, page: PageNumber) -> bool {
        let page_size = self.vmm.page_size();
        let code_start = self.executable.code_addr().as_usize();
        let code_end = code_start + self.executable.code_size();
        let start = page.start(page_size);
        self.executable.code_size() > 0 && start >= code_start && start + page_size <= code_end
    }

    /// Loads a never-materialized page. Callers hold the fault lock.
    pub(crate) fn load_page(&self, page: PageNumber) -> Result<FrameNumber, VmError> {
        let frame = self.vmm.reserve_frame(FrameOwner::new(self.id(), page))?;
        if let Err(err) = self.fill_from_executable(page, frame) {
            self.vmm.abandon(frame);
            return Err(err);
        }
        self.vmm.commit(&self.state, page, frame, self.is_code_page(page));
        self.vmm.stats.demand_load();
        log::trace!("space {}: loaded page {} into frame {}", self.id(), page, frame);
        Ok(frame)
    }

    /// Restores an evicted page. Callers hold the fault lock.
    pub(crate) fn swap_in(&self, page: PageNumber) -> Result<FrameNumber, VmError> {
        let swap = self.state.swap.as_ref().ok_or(VmError::ResourceExhausted)?;
        let frame = self.vmm.reserve_frame(FrameOwner::new(self.id(), page))?;
        let restored = swap.read_page(page, &mut self.vmm.memory().frame(frame));
        if let Err(err) = restored {
            self.vmm.abandon(frame);
            return Err(err);
        }
        self.vmm.commit(&self.state, page, frame, self.is_code_page(page));
        self.vmm.stats.swap_in();
        log::debug!("space {}: swapped page {} into frame {}", self.id(), page, frame);
        Ok(frame)
    }

    fn fill_from_executable(&self, page: PageNumber, frame: FrameNumber) -> Result<(), VmError> {
        let page_size = self.vmm.page_size();
        let start = page.start(page_size);
        let exe = self.executable.as_ref();
        self.vmm.memory().zero_frame(frame);
        let mut content = self.vmm.memory().frame(frame);

        if let Some(code) = overlap(start, page_size, exe.code_addr().as_usize(), exe.code_size()) {
            let dst = &mut content[code.page_offset..code.page_offset + code.len];
            exe.read_code_block(dst, code.segment_offset)
                .map_err(VmError::Executable)?;
        }
        if let Some(data) = overlap(
            start,
            page_size,
            exe.init_data_addr().as_usize(),
            exe.init_data_size(),
        ) {
            let dst = &mut content[data.page_offset..data.page_offset + data.len];
            exe.read_data_block(dst, data.segment_offset)
                .map_err(VmError::Executable)?;
        }
        Ok(())
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        self.vmm.release_space(self.id());
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use core::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::{FileSystem, IoError, MemFileSystem, OpenFile, PolicyKind, ProgramImage, VmConfig};

    const PAGE: usize = 16;

    fn machine(config: VmConfig) -> (Arc<VirtualMemoryManager>, Arc<MemFileSystem>) {
        let fs = Arc::new(MemFileSystem::new());
        let vmm = VirtualMemoryManager::new(config, fs.clone()).unwrap();
        (vmm, fs)
    }

    fn small() -> VmConfig {
        VmConfig::new()
            .with_page_size(PAGE)
            .with_frame_count(2)
            .with_user_stack_size(PAGE)
    }

    /// One page of code, one page of data, one page of stack.
    fn image() -> Box<dyn Executable> {
        let code = (0..PAGE as u8).collect();
        let data = (0..PAGE as u8).map(|b| 0x80 | b).collect();
        Box::new(ProgramImage::new(code, data, 0))
    }

    fn frame_content(space: &AddressSpace, page: usize) -> Vec<u8> {
        let frame = space.entry(PageNumber::new(page)).unwrap().frame().unwrap();
        space.manager().memory().frame(frame).to_vec()
    }

    /// Switches that make swap-file transfers fail.
    #[derive(Default)]
    struct Faults {
        reads: AtomicBool,
        writes: AtomicBool,
    }

    struct FailingFileSystem {
        inner: MemFileSystem,
        faults: Arc<Faults>,
    }

    impl FileSystem for FailingFileSystem {
        fn create(&self, name: &str, size: usize) -> Result<(), IoError> {
            self.inner.create(name, size)
        }

        fn open(&self, name: &str) -> Result<Box<dyn OpenFile>, IoError> {
            let inner = self.inner.open(name)?;
            Ok(Box::new(FailingFile {
                inner,
                faults: self.faults.clone(),
            }))
        }

        fn remove(&self, name: &str) -> Result<(), IoError> {
            self.inner.remove(name)
        }
    }

    struct FailingFile {
        inner: Box<dyn OpenFile>,
        faults: Arc<Faults>,
    }

    impl OpenFile for FailingFile {
        fn read_at(&self, dst: &mut [u8], offset: usize) -> Result<usize, IoError> {
            if self.faults.reads.load(Ordering::SeqCst) {
                return Err(IoError::Host);
            }
            self.inner.read_at(dst, offset)
        }

        fn write_at(&self, src: &[u8], offset: usize) -> Result<usize, IoError> {
            if self.faults.writes.load(Ordering::SeqCst) {
                return Err(IoError::Host);
            }
            self.inner.write_at(src, offset)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    fn failing_machine(config: VmConfig) -> (Arc<VirtualMemoryManager>, Arc<Faults>) {
        let faults = Arc::new(Faults::default());
        let fs = FailingFileSystem {
            inner: MemFileSystem::new(),
            faults: faults.clone(),
        };
        let vmm = VirtualMemoryManager::new(config, Arc::new(fs)).unwrap();
        (vmm, faults)
    }

    /// An image whose code segment cannot be read.
    struct UnreadableCode(ProgramImage);

    impl Executable for UnreadableCode {
        fn check_magic(&self) -> bool {
            self.0.check_magic()
        }

        fn size(&self) -> usize {
            self.0.size()
        }

        fn code_size(&self) -> usize {
            self.0.code_size()
        }

        fn init_data_size(&self) -> usize {
            self.0.init_data_size()
        }

        fn code_addr(&self) -> VirtualAddress {
            self.0.code_addr()
        }

        fn init_data_addr(&self) -> VirtualAddress {
            self.0.init_data_addr()
        }

        fn read_code_block(&self, _dst: &mut [u8], _offset: usize) -> Result<(), IoError> {
            Err(IoError::Host)
        }

        fn read_data_block(&self, dst: &mut [u8], offset: usize) -> Result<(), IoError> {
            self.0.read_data_block(dst, offset)
        }
    }

    /// Resident pages own their frames and every other frame is free.
    fn check_frames(space: &AddressSpace) {
        let frames = space.manager().frames().lock();
        let resident = space.resident_pages();
        for &(page, frame) in &resident {
            assert_eq!(frames.owner(frame), Some(FrameOwner::new(space.id(), page)));
        }
        assert_eq!(frames.occupied().count(), resident.len());
        assert_eq!(frames.count_clear() + resident.len(), frames.len());
    }

    #[test]
    fn sizes_space_from_image_and_stack() {
        let (vmm, fs) = machine(small());
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        assert_eq!(space.page_count(), 3);
        assert_eq!(space.swap_name(), Some("SWAP.1"));
        assert!(fs.exists("SWAP.1"));

        let regs = space.initial_registers();
        assert_eq!(regs.pc, VirtualAddress::new(0));
        assert_eq!(regs.next_pc, VirtualAddress::new(4));
        assert_eq!(regs.sp, VirtualAddress::new(3 * PAGE - 16));
    }

    #[test]
    fn demand_paging_loads_nothing_up_front() {
        let (vmm, _fs) = machine(small());
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        assert_eq!(vmm.frames().count_clear(), 2);
        for page in 0..3 {
            assert_eq!(
                space.entry(PageNumber::new(page)).unwrap().residence,
                Residence::NotLoaded
            );
        }
    }

    #[test]
    fn allocate_page_copies_segments() {
        let (vmm, _fs) = machine(small().with_frame_count(4));
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();

        space.allocate_page(PageNumber::new(0)).unwrap();
        space.allocate_page(PageNumber::new(1)).unwrap();
        space.allocate_page(PageNumber::new(2)).unwrap();

        assert_eq!(frame_content(&space, 0), (0..PAGE as u8).collect::<Vec<_>>());
        assert_eq!(frame_content(&space, 1)[3], 0x83);
        assert_eq!(frame_content(&space, 2), vec![0; PAGE]);

        assert!(space.entry(PageNumber::new(0)).unwrap().read_only);
        assert!(!space.entry(PageNumber::new(1)).unwrap().read_only);
        assert_eq!(vmm.stats().demand_loads, 3);
    }

    #[test]
    fn straddling_segments_share_a_page() {
        let (vmm, _fs) = machine(small().with_frame_count(4));
        let exe = ProgramImage::new(vec![1; 10], vec![2; 10], 0);
        let space = AddressSpace::new(&vmm, Box::new(exe), ThreadId::new(1), vec![]).unwrap();

        space.allocate_page(PageNumber::new(0)).unwrap();
        space.allocate_page(PageNumber::new(1)).unwrap();

        let mut expected = vec![1u8; 10];
        expected.extend([2; 6]);
        assert_eq!(frame_content(&space, 0), expected);
        assert_eq!(&frame_content(&space, 1)[..4], &[2, 2, 2, 2]);
        assert!(!space.entry(PageNumber::new(0)).unwrap().read_only);
    }

    #[test]
    fn allocate_page_is_idempotent() {
        let (vmm, _fs) = machine(small());
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        let first = space.allocate_page(PageNumber::new(1)).unwrap();
        let again = space.allocate_page(PageNumber::new(1)).unwrap();
        assert_eq!(first, again);
        assert_eq!(vmm.frames().count_clear(), 1);
    }

    #[test]
    fn eager_loading_fills_every_page() {
        let (vmm, _fs) = machine(small().with_frame_count(4).with_load_mode(LoadMode::Eager));
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        assert_eq!(vmm.frames().count_clear(), 1);
        assert_eq!(space.resident_pages().len(), 3);
    }

    #[test]
    fn eager_without_swap_needs_enough_frames() {
        let (vmm, fs) = machine(small().with_load_mode(LoadMode::Eager).with_swap(false));
        let result = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]);
        assert!(matches!(result, Err(VmError::ResourceExhausted)));
        assert_eq!(vmm.frames().count_clear(), 2);
        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn eager_with_swap_spills_to_swap() {
        let (vmm, _fs) = machine(small().with_load_mode(LoadMode::Eager));
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        assert_eq!(space.resident_pages().len(), 2);
        assert_eq!(
            space.entry(PageNumber::new(0)).unwrap().residence,
            Residence::SwappedOut
        );
    }

    #[test]
    fn bad_magic_is_rejected() {
        let (vmm, fs) = machine(small());
        let exe = ProgramImage::new(vec![0; 4], vec![], 0).with_bad_magic();
        let result = AddressSpace::new(&vmm, Box::new(exe), ThreadId::new(1), vec![]);
        assert!(matches!(result, Err(VmError::InvalidExecutable)));
        assert_eq!(fs.file_count(), 0);
        assert_eq!(vmm.space_count(), 0);
    }

    #[test]
    fn demand_paging_without_swap_runs_out() {
        let (vmm, _fs) = machine(small().with_swap(false));
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        space.allocate_page(PageNumber::new(0)).unwrap();
        space.allocate_page(PageNumber::new(1)).unwrap();
        assert_eq!(
            space.allocate_page(PageNumber::new(2)),
            Err(VmError::ResourceExhausted)
        );
        assert_eq!(space.entry(PageNumber::new(2)).unwrap().residence, Residence::NotLoaded);
        assert_eq!(space.swap_name(), None);
    }

    #[test]
    fn out_of_range_page() {
        let (vmm, _fs) = machine(small());
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        assert_eq!(
            space.allocate_page(PageNumber::new(3)),
            Err(VmError::AddressOutOfRange {
                page: PageNumber::new(3),
                page_count: 3
            })
        );
    }

    #[test]
    fn evicted_page_round_trips_through_swap() {
        for policy in [PolicyKind::Fifo, PolicyKind::Clock, PolicyKind::Random] {
            let (vmm, _fs) = machine(small().with_frame_count(1).with_policy(policy));
            let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();

            let frame = space.allocate_page(PageNumber::new(2)).unwrap();
            vmm.memory().frame(frame).copy_from_slice(&[0xC3; PAGE]);

            space.allocate_page(PageNumber::new(1)).unwrap();
            assert_eq!(
                space.entry(PageNumber::new(2)).unwrap().residence,
                Residence::SwappedOut
            );

            space.return_swap(PageNumber::new(2)).unwrap();
            assert_eq!(frame_content(&space, 2), vec![0xC3; PAGE]);
            assert_eq!(vmm.stats().swap_ins, 1);
        }
    }

    #[test]
    fn three_pages_in_two_frames() {
        let (vmm, _fs) = machine(small());
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        let page = PageNumber::new;

        let a = space.allocate_page(page(0)).unwrap();
        let b = space.allocate_page(page(1)).unwrap();
        assert_ne!(a, b);

        // FIFO evicts page 0, the oldest.
        let c = space.allocate_page(page(2)).unwrap();
        assert_eq!(c, a);
        assert_eq!(space.entry(page(0)).unwrap().residence, Residence::SwappedOut);
        assert_eq!(space.entry(page(1)).unwrap().residence, Residence::Resident(b));

        // Faulting page 0 back in evicts page 1 and restores the original code.
        let d = space.return_swap(page(0)).unwrap();
        assert_eq!(d, b);
        assert_eq!(space.entry(page(1)).unwrap().residence, Residence::SwappedOut);
        assert_eq!(frame_content(&space, 0), (0..PAGE as u8).collect::<Vec<_>>());
        assert!(space.entry(page(0)).unwrap().read_only);

        let frames = vmm.frames().lock();
        assert_eq!(frames.owner(a), Some(FrameOwner::new(space.id(), page(2))));
        assert_eq!(frames.owner(b), Some(FrameOwner::new(space.id(), page(0))));
    }

    #[test]
    fn save_state_copies_cached_bits() {
        let (vmm, _fs) = machine(small());
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        vmm.context_switch(None, &space);
        space.allocate_page(PageNumber::new(1)).unwrap();

        vmm.write_mem(VirtualAddress::new(PAGE), 4, 7).unwrap();
        assert!(!space.entry(PageNumber::new(1)).unwrap().dirty);

        space.save_state();
        let entry = space.entry(PageNumber::new(1)).unwrap();
        assert!(entry.dirty);
        assert!(entry.referenced);
    }

    #[test]
    fn restore_state_flushes_cache() {
        let (vmm, _fs) = machine(small().with_frame_count(4));
        let first = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        let second = AddressSpace::new(&vmm, image(), ThreadId::new(2), vec![]).unwrap();

        vmm.context_switch(None, &first);
        first.allocate_page(PageNumber::new(0)).unwrap();
        assert_eq!(vmm.tlb().valid_entries().count(), 1);

        vmm.context_switch(Some(&first), &second);
        assert_eq!(vmm.current_space(), Some(second.id()));
        assert_eq!(vmm.tlb().valid_entries().count(), 0);
        assert!(vmm.read_mem(VirtualAddress::new(0), 1).is_err());
    }

    #[test]
    fn eviction_reaches_other_spaces() {
        let (vmm, _fs) = machine(small());
        let first = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        let second = AddressSpace::new(&vmm, image(), ThreadId::new(2), vec![]).unwrap();

        vmm.context_switch(None, &first);
        first.allocate_page(PageNumber::new(2)).unwrap();
        vmm.write_mem(VirtualAddress::new(2 * PAGE), 4, 0xDEAD_BEEF).unwrap();
        first.allocate_page(PageNumber::new(1)).unwrap();

        // The dirty bit only lives in the cache until the victim's entry is dropped.
        second.allocate_page(PageNumber::new(0)).unwrap();
        let entry = first.entry(PageNumber::new(2)).unwrap();
        assert_eq!(entry.residence, Residence::SwappedOut);
        assert!(entry.dirty);
        assert!(vmm.tlb().lookup(PageNumber::new(2)).is_none());

        first.return_swap(PageNumber::new(2)).unwrap();
        assert_eq!(vmm.read_mem(VirtualAddress::new(2 * PAGE), 4), Ok(0xDEAD_BEEF));
    }

    #[test]
    fn drop_releases_frames_and_swap() {
        let (vmm, fs) = machine(small());
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        vmm.context_switch(None, &space);
        space.allocate_page(PageNumber::new(0)).unwrap();
        space.allocate_page(PageNumber::new(1)).unwrap();

        drop(space);
        assert_eq!(vmm.frames().count_clear(), 2);
        assert_eq!(fs.file_count(), 0);
        assert_eq!(vmm.current_space(), None);
        assert_eq!(vmm.space_count(), 0);
    }

    #[test]
    fn failed_swap_write_keeps_victim_resident() {
        let (vmm, faults) = failing_machine(small().with_frame_count(1));
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        let frame = space.allocate_page(PageNumber::new(0)).unwrap();

        faults.writes.store(true, Ordering::SeqCst);
        assert_eq!(
            space.allocate_page(PageNumber::new(1)),
            Err(VmError::BackingStore(IoError::Host))
        );
        assert_eq!(
            space.entry(PageNumber::new(0)).unwrap().residence,
            Residence::Resident(frame)
        );
        assert_eq!(
            space.entry(PageNumber::new(1)).unwrap().residence,
            Residence::NotLoaded
        );
        check_frames(&space);

        faults.writes.store(false, Ordering::SeqCst);
        space.allocate_page(PageNumber::new(1)).unwrap();
        check_frames(&space);
    }

    #[test]
    fn failed_swap_read_frees_the_frame() {
        let (vmm, faults) = failing_machine(small().with_frame_count(1));
        let space = AddressSpace::new(&vmm, image(), ThreadId::new(1), vec![]).unwrap();
        space.allocate_page(PageNumber::new(0)).unwrap();
        space.allocate_page(PageNumber::new(1)).unwrap();

        faults.reads.store(true, Ordering::SeqCst);
        assert_eq!(
            space.return_swap(PageNumber::new(0)),
            Err(VmError::BackingStore(IoError::Host))
        );
        assert_eq!(vmm.frames().count_clear(), 1);
        assert_eq!(
            space.entry(PageNumber::new(0)).unwrap().residence,
            Residence::SwappedOut
        );
        check_frames(&space);

        faults.reads.store(false, Ordering::SeqCst);
        space.return_swap(PageNumber::new(0)).unwrap();
        assert_eq!(frame_content(&space, 0), (0..PAGE as u8).collect::<Vec<_>>());
    }

    #[test]
    fn failed_code_read_releases_the_frame() {
        let (vmm, _fs) = machine(small());
        let image = UnreadableCode(ProgramImage::new(vec![0x11; PAGE], vec![0x22; PAGE], 0));
        let space = AddressSpace::new(&vmm, Box::new(image), ThreadId::new(1), vec![]).unwrap();

        assert_eq!(
            space.allocate_page(PageNumber::new(0)),
            Err(VmError::Executable(IoError::Host))
        );
        assert_eq!(vmm.frames().count_clear(), 2);
        assert_eq!(
            space.entry(PageNumber::new(0)).unwrap().residence,
            Residence::NotLoaded
        );
        check_frames(&space);

        let frame = space.allocate_page(PageNumber::new(1)).unwrap();
        assert_eq!(vmm.memory().frame(frame)[0], 0x22);
    }
}
