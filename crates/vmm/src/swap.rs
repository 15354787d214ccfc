//! Per-address-space swap files.
//!
//! Each address space owns one swap file holding a slot for every virtual page; page `n`
//! lives at byte offset `n * page_size`. The file is removed when the store is dropped.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;

use crate::{AddressSpaceId, FileSystem, IoError, OpenFile, PageNumber, VmError};

/// Returns the swap file name for `space`.
pub fn swap_file_name(space: AddressSpaceId) -> String {
    format!("SWAP.{space}")
}

/// Backing storage for the evicted pages of one address space.
pub struct SwapStore {
    name: String,
    file: Box<dyn OpenFile>,
    fs: Arc<dyn FileSystem>,
    page_size: usize,
}

impl SwapStore {
    /// Creates and opens a swap file large enough for `page_count` pages.
    ///
    /// A leftover file with the same name is replaced.
    pub fn create(
        fs: Arc<dyn FileSystem>,
        space: AddressSpaceId,
        page_count: usize,
        page_size: usize,
    ) -> Result<Self, VmError> {
        let name = swap_file_name(space);
        let size = page_count * page_size;

        match fs.create(&name, size) {
            Err(IoError::AlreadyExists) => {
                log::debug!("replacing stale swap file {}", name);
                fs.remove(&name).map_err(VmError::BackingStore)?;
                fs.create(&name, size).map_err(VmError::BackingStore)?;
            }
            result => result.map_err(VmError::BackingStore)?,
        }
        let file = fs.open(&name).map_err(VmError::BackingStore)?;

        log::debug!("created swap file {} ({} bytes)", name, size);
        Ok(Self {
            name,
            file,
            fs,
            page_size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes one page of content into `page`'s slot.
    pub fn write_page(&self, page: PageNumber, src: &[u8]) -> Result<(), VmError> {
        debug_assert_eq!(src.len(), self.page_size);
        let written = self
            .file
            .write_at(src, page.start(self.page_size))
            .map_err(VmError::BackingStore)?;
        if written != src.len() {
            log::error!("short swap write for page {} in {}", page, self.name);
            return Err(VmError::BackingStore(IoError::ShortTransfer));
        }
        Ok(())
    }

    /// Reads `page`'s slot into `dst`.
    pub fn read_page(&self, page: PageNumber, dst: &mut [u8]) -> Result<(), VmError> {
        debug_assert_eq!(dst.len(), self.page_size);
        let read = self
            .file
            .read_at(dst, page.start(self.page_size))
            .map_err(VmError::BackingStore)?;
        if read != dst.len() {
            log::error!("short swap read for page {} in {}", page, self.name);
            return Err(VmError::BackingStore(IoError::ShortTransfer));
        }
        Ok(())
    }
}

impl Drop for SwapStore {
    fn drop(&mut self) {
        match self.fs.remove(&self.name) {
            Ok(()) => log::debug!("removed swap file {}", self.name),
            Err(err) => log::error!("failed to remove swap file {}: {}", self.name, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemFileSystem;

    fn store(fs: &Arc<MemFileSystem>, space: usize, pages: usize) -> SwapStore {
        SwapStore::create(fs.clone(), AddressSpaceId::new(space), pages, 8).unwrap()
    }

    #[test]
    fn names_follow_space_id() {
        assert_eq!(swap_file_name(AddressSpaceId::new(12)), "SWAP.12");
    }

    #[test]
    fn pages_round_trip() {
        let fs = Arc::new(MemFileSystem::new());
        let swap = store(&fs, 1, 3);
        swap.write_page(PageNumber::new(2), &[7; 8]).unwrap();
        swap.write_page(PageNumber::new(0), &[1; 8]).unwrap();

        let mut buf = [0u8; 8];
        swap.read_page(PageNumber::new(2), &mut buf).unwrap();
        assert_eq!(buf, [7; 8]);
        swap.read_page(PageNumber::new(1), &mut buf).unwrap();
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    fn page_past_end_is_short() {
        let fs = Arc::new(MemFileSystem::new());
        let swap = store(&fs, 1, 2);
        assert_eq!(
            swap.write_page(PageNumber::new(2), &[0; 8]),
            Err(VmError::BackingStore(IoError::ShortTransfer))
        );
    }

    #[test]
    fn drop_removes_file() {
        let fs = Arc::new(MemFileSystem::new());
        let swap = store(&fs, 4, 1);
        assert!(fs.exists("SWAP.4"));
        drop(swap);
        assert!(!fs.exists("SWAP.4"));
    }

    #[test]
    fn replaces_stale_file() {
        let fs = Arc::new(MemFileSystem::new());
        fs.create("SWAP.5", 1).unwrap();
        let swap = store(&fs, 5, 2);
        swap.write_page(PageNumber::new(1), &[3; 8]).unwrap();
    }
}
