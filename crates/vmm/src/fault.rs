//! Page-fault resolution.
//!
//! A translation-cache miss lands here with the faulting address. The resolver finds
//! the page's residence and either installs the existing translation (a capacity miss),
//! materializes the page from the executable, or restores it from swap. Afterwards the
//! faulting access can simply be retried.

use crate::{AddressSpace, PageNumber, Residence, VirtualAddress, VmError};

/// Resolves faults raised by accesses to one address space.
pub struct PageFaultResolver<'a> {
    space: &'a AddressSpace,
}

impl<'a> PageFaultResolver<'a> {
    pub fn new(space: &'a AddressSpace) -> Self {
        Self { space }
    }

    /// Resolves a fault on `address`.
    pub fn resolve(&self, address: VirtualAddress) -> Result<(), VmError> {
        let page = address.page_number(self.space.manager().page_size());
        self.resolve_page(page).inspect_err(|err| {
            log::error!(
                "space {}: unresolvable fault at {}: {}",
                self.space.id(),
                address,
                err
            );
        })
    }

    /// Resolves a fault on `page`.
    pub fn resolve_page(&self, page: PageNumber) -> Result<(), VmError> {
        let space = self.space;
        let vmm = space.manager();
        let _guard = space.lock_faults();
        vmm.stats.page_fault();
        space.check_page(page)?;

        loop {
            match space.residence(page) {
                Residence::NotLoaded => {
                    space.load_page(page)?;
                    return Ok(());
                }
                Residence::SwappedOut => {
                    space.swap_in(page)?;
                    return Ok(());
                }
                Residence::Resident(_) => {
                    if vmm.refill(space.state(), page) {
                        vmm.stats.tlb_refill();
                        return Ok(());
                    }
                    // Evicted by another space since we looked; go again.
                }
            }
        }
    }
}
