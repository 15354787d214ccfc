//! The executable-loader collaborator.
//!
//! Address spaces only need to know where the code and initialized-data segments go and
//! how to copy bytes out of them; the on-disk format belongs to the loader.

use alloc::vec::Vec;

use crate::{IoError, VirtualAddress};

/// Read-only view of a loaded program.
pub trait Executable: Send + Sync {
    /// Returns true if the image carries the expected magic marker.
    fn check_magic(&self) -> bool;

    /// Bytes of code, initialized data and uninitialized data together.
    fn size(&self) -> usize;

    fn code_size(&self) -> usize;

    fn init_data_size(&self) -> usize;

    /// Virtual address where the code segment starts.
    fn code_addr(&self) -> VirtualAddress;

    /// Virtual address where the initialized-data segment starts.
    fn init_data_addr(&self) -> VirtualAddress;

    /// Copies `dst.len()` bytes of code starting `offset` bytes into the segment.
    fn read_code_block(&self, dst: &mut [u8], offset: usize) -> Result<(), IoError>;

    /// Copies `dst.len()` bytes of initialized data starting `offset` bytes into the
    /// segment.
    fn read_data_block(&self, dst: &mut [u8], offset: usize) -> Result<(), IoError>;
}

/// An executable held entirely in memory.
///
/// By default code is placed at address 0 and initialized data immediately after it,
/// followed by the uninitialized data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    code: Vec<u8>,
    code_addr: VirtualAddress,
    data: Vec<u8>,
    data_addr: VirtualAddress,
    uninit_data_size: usize,
    valid_magic: bool,
}

impl ProgramImage {
    pub fn new(code: Vec<u8>, data: Vec<u8>, uninit_data_size: usize) -> Self {
        let data_addr = VirtualAddress::new(code.len());
        Self {
            code,
            code_addr: VirtualAddress::new(0),
            data,
            data_addr,
            uninit_data_size,
            valid_magic: true,
        }
    }

    /// Moves the initialized-data segment to `addr`.
    pub fn with_data_addr(mut self, addr: VirtualAddress) -> Self {
        self.data_addr = addr;
        self
    }

    /// Moves the code segment to `addr`.
    pub fn with_code_addr(mut self, addr: VirtualAddress) -> Self {
        self.code_addr = addr;
        self
    }

    /// Marks the image as carrying a bad magic number.
    pub fn with_bad_magic(mut self) -> Self {
        self.valid_magic = false;
        self
    }

    pub fn uninit_data_size(&self) -> usize {
        self.uninit_data_size
    }
}

fn copy_block(segment: &[u8], dst: &mut [u8], offset: usize) -> Result<(), IoError> {
    let end = offset.checked_add(dst.len()).ok_or(IoError::OutOfBounds)?;
    let src = segment.get(offset..end).ok_or(IoError::OutOfBounds)?;
    dst.copy_from_slice(src);
    Ok(())
}

impl Executable for ProgramImage {
    fn check_magic(&self) -> bool {
        self.valid_magic
    }

    fn size(&self) -> usize {
        self.code.len() + self.data.len() + self.uninit_data_size
    }

    fn code_size(&self) -> usize {
        self.code.len()
    }

    fn init_data_size(&self) -> usize {
        self.data.len()
    }

    fn code_addr(&self) -> VirtualAddress {
        self.code_addr
    }

    fn init_data_addr(&self) -> VirtualAddress {
        self.data_addr
    }

    fn read_code_block(&self, dst: &mut [u8], offset: usize) -> Result<(), IoError> {
        copy_block(&self.code, dst, offset)
    }

    fn read_data_block(&self, dst: &mut [u8], offset: usize) -> Result<(), IoError> {
        copy_block(&self.data, dst, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_contiguous() {
        let image = ProgramImage::new(vec![1; 10], vec![2; 6], 20);
        assert!(image.check_magic());
        assert_eq!(image.size(), 36);
        assert_eq!(image.code_addr(), VirtualAddress::new(0));
        assert_eq!(image.init_data_addr(), VirtualAddress::new(10));
    }

    #[test]
    fn reads_blocks() {
        let image = ProgramImage::new(vec![0, 1, 2, 3], vec![9, 8, 7], 0);
        let mut buf = [0u8; 2];
        image.read_code_block(&mut buf, 2).unwrap();
        assert_eq!(buf, [2, 3]);
        image.read_data_block(&mut buf, 1).unwrap();
        assert_eq!(buf, [8, 7]);
    }

    #[test]
    fn rejects_reads_past_segment() {
        let image = ProgramImage::new(vec![0; 4], vec![], 0);
        let mut buf = [0u8; 2];
        assert_eq!(image.read_code_block(&mut buf, 3), Err(IoError::OutOfBounds));
        assert_eq!(image.read_data_block(&mut buf, 0), Err(IoError::OutOfBounds));
    }

    #[test]
    fn bad_magic() {
        assert!(!ProgramImage::new(vec![], vec![], 0).with_bad_magic().check_magic());
    }
}
