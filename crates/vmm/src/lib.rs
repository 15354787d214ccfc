#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! # Virtual Memory Manager (VMM)
//!
//! The Virtual Memory Manager gives each user program an address space backed by a
//! bounded pool of physical frames. It provides:
//!
//! - A shared, lock-protected frame table with pluggable replacement policies
//!   (FIFO, CLOCK, random).
//! - Demand loading of program pages from an executable image.
//! - Eviction to and restoration from a per-address-space swap file.
//! - A translation cache (TLB) kept consistent across context switches.
//! - Page-fault resolution and kernel/user memory transfer on top of it all.
//!
//! Everything hangs off a [`VirtualMemoryManager`], which is built once at boot from a
//! [`VmConfig`] and shared by every [`AddressSpace`].

extern crate alloc;

mod address;
mod address_space;
mod config;
mod error;
mod executable;
mod fault;
mod frame;
mod frame_table;
mod manager;
mod memory;
mod mmu;
mod numbers;
mod page_table;
mod policy;
mod stats;
mod storage;
mod swap;
mod tlb;
mod transfer;

pub use address::{PhysicalAddress, VirtualAddress};
pub use address_space::{AddressSpace, UserRegisters};
pub use config::{ConfigError, LoadMode, PolicyKind, VmConfig};
pub use error::VmError;
pub use executable::{Executable, ProgramImage};
pub use fault::PageFaultResolver;
pub use frame::{Frame, FrameFlag, FrameFlags, FrameOwner};
pub use frame_table::{FrameMap, FrameTable};
pub use manager::VirtualMemoryManager;
pub use memory::PhysicalMemory;
pub use mmu::Exception;
pub use numbers::{AddressSpaceId, FrameNumber, PageNumber, ThreadId};
pub use page_table::{PageTable, PageTableEntry, Residence};
pub use policy::{PageBits, PageUsage, ReplacementPolicy};
pub use stats::FaultStats;
pub use storage::{FileSystem, IoError, MemFileSystem, OpenFile};
pub use swap::SwapStore;
pub use tlb::{Tlb, TlbEntry};
pub use transfer::{
    read_buffer_from_user, read_string_from_user, write_args, write_buffer_to_user,
    write_string_to_user,
};

#[cfg(any(test, feature = "std"))]
pub use storage::HostFileSystem;
