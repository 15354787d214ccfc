//! User-mode memory accesses through the translation cache.
//!
//! The simulated MMU only consults the cache; a miss raises [`Exception::PageFault`]
//! and leaves resolving it to the kernel. Hits set the referenced bit, and writes also
//! set the dirty bit, on the cached entry. The cache lock is held across the memory
//! access so the frame cannot be evicted underneath it.

use core::fmt;

use crate::{PhysicalAddress, Tlb, VirtualAddress, VirtualMemoryManager, VmError};

/// A fault raised by a user-mode access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    /// No cached translation for the page.
    PageFault { address: VirtualAddress },
    /// Write to a read-only page.
    ReadOnly { address: VirtualAddress },
    /// Misaligned access or unsupported access size.
    AddressError { address: VirtualAddress },
    /// The translation points outside physical memory.
    BusError { address: VirtualAddress },
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageFault { address } => write!(f, "page fault at {address}"),
            Self::ReadOnly { address } => write!(f, "read-only fault at {address}"),
            Self::AddressError { address } => write!(f, "address error at {address}"),
            Self::BusError { address } => write!(f, "bus error at {address}"),
        }
    }
}

impl From<Exception> for VmError {
    fn from(exception: Exception) -> Self {
        match exception {
            Exception::PageFault { address } => VmError::FaultRetriesExhausted { address },
            Exception::ReadOnly { address } => VmError::ReadOnly { address },
            Exception::AddressError { address } => VmError::Misaligned { address },
            Exception::BusError { address } => VmError::BusError { address },
        }
    }
}

fn translate_locked(
    tlb: &mut Tlb,
    address: VirtualAddress,
    size: usize,
    writing: bool,
    page_size: usize,
    memory_size: usize,
) -> Result<PhysicalAddress, Exception> {
    if !matches!(size, 1 | 2 | 4) || !address.is_aligned(size) {
        return Err(Exception::AddressError { address });
    }

    let page = address.page_number(page_size);
    let entry = tlb
        .lookup_mut(page)
        .ok_or(Exception::PageFault { address })?;
    if writing && entry.read_only {
        return Err(Exception::ReadOnly { address });
    }
    entry.referenced = true;
    if writing {
        entry.dirty = true;
    }

    let offset = address.page_offset(page_size);
    let physical = PhysicalAddress::from_frame(entry.frame, offset, page_size);
    if physical.as_usize() + size > memory_size {
        return Err(Exception::BusError { address });
    }
    Ok(physical)
}

impl VirtualMemoryManager {
    /// Translates a `size`-byte access at `address` for the current address space.
    pub fn translate(
        &self,
        address: VirtualAddress,
        size: usize,
        writing: bool,
    ) -> Result<PhysicalAddress, Exception> {
        translate_locked(
            &mut self.tlb(),
            address,
            size,
            writing,
            self.page_size(),
            self.memory().size(),
        )
    }

    /// Reads a little-endian value of `size` bytes (1, 2 or 4) at `address`.
    pub fn read_mem(&self, address: VirtualAddress, size: usize) -> Result<u32, Exception> {
        let mut tlb = self.tlb();
        let physical = translate_locked(
            &mut tlb,
            address,
            size,
            false,
            self.page_size(),
            self.memory().size(),
        )?;

        let mut bytes = [0u8; 4];
        self.memory()
            .read(physical, &mut bytes[..size])
            .ok_or(Exception::BusError { address })?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Writes the low `size` bytes (1, 2 or 4) of `value` at `address`, little-endian.
    pub fn write_mem(
        &self,
        address: VirtualAddress,
        size: usize,
        value: u32,
    ) -> Result<(), Exception> {
        let mut tlb = self.tlb();
        let physical = translate_locked(
            &mut tlb,
            address,
            size,
            true,
            self.page_size(),
            self.memory().size(),
        )?;

        let bytes = value.to_le_bytes();
        self.memory()
            .write(physical, &bytes[..size])
            .ok_or(Exception::BusError { address })
    }
}
