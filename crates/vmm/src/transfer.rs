//! Copying between kernel buffers and user memory.
//!
//! Every user byte goes through the MMU of the current address space, so `space` must
//! have been switched in. An access that page-faults has the fault resolved and is
//! retried, a bounded number of times.

use alloc::string::String;
use alloc::vec::Vec;

use crate::{AddressSpace, Exception, PageFaultResolver, PageNumber, VirtualAddress, VmError};

/// Attempts per access before giving up on a page that keeps faulting.
const MAX_TRIES: usize = 3;

/// Bytes the calling convention leaves below the argument vector.
const ARGS_RESERVE: usize = 16;

const WORD: usize = 4;

/// Fails unless `space` owns the translation cache. Otherwise the MMU would read
/// through another space's translations.
fn check_current(space: &AddressSpace) -> Result<(), VmError> {
    if space.manager().current_space() == Some(space.id()) {
        return Ok(());
    }
    log::error!("space {}: user memory accessed while not current", space.id());
    Err(VmError::NotCurrent { space: space.id() })
}

/// Runs `op`, resolving page faults on `address` between attempts.
fn with_retries<T>(
    space: &AddressSpace,
    address: VirtualAddress,
    mut op: impl FnMut() -> Result<T, Exception>,
) -> Result<T, VmError> {
    check_current(space)?;
    let resolver = PageFaultResolver::new(space);
    for _ in 0..MAX_TRIES {
        match op() {
            Ok(value) => return Ok(value),
            Err(Exception::PageFault { address }) => resolver.resolve(address)?,
            Err(other) => return Err(other.into()),
        }
    }
    log::error!("space {}: access at {} keeps faulting", space.id(), address);
    Err(VmError::FaultRetriesExhausted { address })
}

fn read_byte(space: &AddressSpace, address: VirtualAddress) -> Result<u8, VmError> {
    let vmm = space.manager();
    with_retries(space, address, || vmm.read_mem(address, 1)).map(|value| value as u8)
}

fn write_value(
    space: &AddressSpace,
    address: VirtualAddress,
    size: usize,
    value: u32,
) -> Result<(), VmError> {
    let vmm = space.manager();
    with_retries(space, address, || vmm.write_mem(address, size, value))
}

/// Fills `buffer` from user memory starting at `address`.
///
/// `space` must be the current address space, else this fails with
/// [`VmError::NotCurrent`]. The same holds for every function in this module.
pub fn read_buffer_from_user(
    space: &AddressSpace,
    address: VirtualAddress,
    buffer: &mut [u8],
) -> Result<(), VmError> {
    for (offset, byte) in buffer.iter_mut().enumerate() {
        *byte = read_byte(space, address + offset)?;
    }
    Ok(())
}

/// Reads a NUL-terminated string of at most `max_len` bytes (terminator included).
///
/// Returns `None` if no terminator was found within `max_len` bytes.
pub fn read_string_from_user(
    space: &AddressSpace,
    address: VirtualAddress,
    max_len: usize,
) -> Result<Option<String>, VmError> {
    let mut bytes = Vec::new();
    for offset in 0..max_len {
        match read_byte(space, address + offset)? {
            0 => return Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            byte => bytes.push(byte),
        }
    }
    Ok(None)
}

/// Copies `buffer` into user memory starting at `address`.
pub fn write_buffer_to_user(
    space: &AddressSpace,
    address: VirtualAddress,
    buffer: &[u8],
) -> Result<(), VmError> {
    for (offset, &byte) in buffer.iter().enumerate() {
        write_value(space, address + offset, 1, byte as u32)?;
    }
    Ok(())
}

/// Copies `string` and a NUL terminator into user memory starting at `address`.
pub fn write_string_to_user(
    space: &AddressSpace,
    address: VirtualAddress,
    string: &str,
) -> Result<(), VmError> {
    write_buffer_to_user(space, address, string.as_bytes())?;
    write_value(space, address + string.len(), 1, 0)
}

/// Lays the space's arguments out on the user stack below `sp`.
///
/// The strings are copied first, then a word-aligned, NULL-terminated array of
/// pointers to them. Returns `(argc, argv, new_sp)`.
pub fn write_args(
    space: &AddressSpace,
    sp: VirtualAddress,
) -> Result<(usize, VirtualAddress, VirtualAddress), VmError> {
    check_current(space)?;
    let args = space.args();
    let overflow = || VmError::AddressOutOfRange {
        page: PageNumber::new(0),
        page_count: space.page_count(),
    };

    let mut sp = sp.as_usize();
    let mut pointers = Vec::with_capacity(args.len());
    for arg in args {
        sp = sp.checked_sub(arg.len() + 1).ok_or_else(overflow)?;
        write_string_to_user(space, VirtualAddress::new(sp), arg)?;
        pointers.push(sp);
    }

    sp -= sp % WORD;
    sp = sp
        .checked_sub((args.len() + 1) * WORD)
        .ok_or_else(overflow)?;
    let argv = VirtualAddress::new(sp);
    for (index, &pointer) in pointers.iter().enumerate() {
        write_value(space, argv + index * WORD, WORD, pointer as u32)?;
    }
    write_value(space, argv + args.len() * WORD, WORD, 0)?;

    let sp = sp.checked_sub(ARGS_RESERVE).ok_or_else(overflow)?;
    log::debug!(
        "space {}: {} arguments at {}, stack at {:#x}",
        space.id(),
        args.len(),
        argv,
        sp
    );
    Ok((args.len(), argv, VirtualAddress::new(sp)))
}
