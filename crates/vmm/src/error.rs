//! Errors surfaced by the memory system.
//!
//! Every failure here is terminal for the operation in progress. The caller decides
//! whether that means killing the offending process or halting the kernel.

use core::fmt;

use crate::{AddressSpaceId, ConfigError, IoError, PageNumber, VirtualAddress};

/// Errors that can occur while building address spaces or resolving faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The machine configuration was rejected.
    Config(ConfigError),
    /// The executable's magic marker is wrong.
    InvalidExecutable,
    /// No free frame exists and nothing may be evicted.
    ResourceExhausted,
    /// A page outside `[0, page_count)` was referenced.
    AddressOutOfRange { page: PageNumber, page_count: usize },
    /// Reading or writing the swap file failed.
    BackingStore(IoError),
    /// Reading a block from the executable failed.
    Executable(IoError),
    /// A write hit a read-only page.
    ReadOnly { address: VirtualAddress },
    /// An access was not aligned to its size.
    Misaligned { address: VirtualAddress },
    /// A translation produced a physical address outside memory.
    BusError { address: VirtualAddress },
    /// An access kept faulting after its page was brought in.
    FaultRetriesExhausted { address: VirtualAddress },
    /// User memory was accessed for a space that does not own the translation cache.
    NotCurrent { space: AddressSpaceId },
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::InvalidExecutable => write!(f, "executable has a bad magic number"),
            Self::ResourceExhausted => write!(f, "no free physical frame and swap is disabled"),
            Self::AddressOutOfRange { page, page_count } => {
                write!(f, "page {page} outside address space of {page_count} pages")
            }
            Self::BackingStore(err) => write!(f, "swap I/O failed: {err}"),
            Self::Executable(err) => write!(f, "executable read failed: {err}"),
            Self::ReadOnly { address } => write!(f, "write to read-only page at {address}"),
            Self::Misaligned { address } => write!(f, "misaligned access at {address}"),
            Self::BusError { address } => write!(f, "bus error at {address}"),
            Self::FaultRetriesExhausted { address } => {
                write!(f, "access at {address} still faults after retrying")
            }
            Self::NotCurrent { space } => {
                write!(f, "space {space} is not the current address space")
            }
        }
    }
}

impl core::error::Error for VmError {}

impl From<ConfigError> for VmError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}
