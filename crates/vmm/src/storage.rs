//! Backing-store collaborators.
//!
//! Swap files are reached through the narrow [`FileSystem`] / [`OpenFile`] interface so
//! that the kernel can plug in its own file system. Files have a fixed length set at
//! creation; reads and writes past the end are clipped, and the byte count returned
//! tells the caller how much was transferred.
//!
//! Two implementations ship with the crate: [`MemFileSystem`], which keeps files in
//! memory, and (with the `std` feature) [`HostFileSystem`], which keeps them in a host
//! directory.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

/// Errors reported by storage collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// No file with that name exists.
    NotFound,
    /// A file with that name already exists.
    AlreadyExists,
    /// The offset lies past the end of the file or block.
    OutOfBounds,
    /// Fewer bytes were transferred than requested.
    ShortTransfer,
    /// The host reported an error.
    Host,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::AlreadyExists => write!(f, "file already exists"),
            Self::OutOfBounds => write!(f, "offset out of bounds"),
            Self::ShortTransfer => write!(f, "short transfer"),
            Self::Host => write!(f, "host I/O error"),
        }
    }
}

impl core::error::Error for IoError {}

/// An open, fixed-length file.
pub trait OpenFile: Send + Sync {
    /// Reads up to `dst.len()` bytes at `offset`, returning how many were read.
    fn read_at(&self, dst: &mut [u8], offset: usize) -> Result<usize, IoError>;

    /// Writes up to `src.len()` bytes at `offset`, returning how many were written.
    fn write_at(&self, src: &[u8], offset: usize) -> Result<usize, IoError>;

    /// Returns the file length in bytes.
    fn len(&self) -> usize;
}

/// A flat namespace of fixed-length files.
pub trait FileSystem: Send + Sync {
    /// Creates a zero-filled file of `size` bytes.
    fn create(&self, name: &str, size: usize) -> Result<(), IoError>;

    /// Opens an existing file.
    fn open(&self, name: &str) -> Result<Box<dyn OpenFile>, IoError>;

    /// Removes a file. Handles that are already open stay usable.
    fn remove(&self, name: &str) -> Result<(), IoError>;
}

/// Returns how many of `want` bytes at `offset` fit in a file of `len` bytes.
fn clip(len: usize, offset: usize, want: usize) -> usize {
    if offset >= len { 0 } else { want.min(len - offset) }
}

/// A file system that keeps every file in memory.
#[derive(Default)]
pub struct MemFileSystem {
    files: Mutex<BTreeMap<String, Arc<Mutex<Vec<u8>>>>>,
}

impl MemFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a file named `name` exists.
    pub fn exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    /// Returns the number of files.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }
}

impl FileSystem for MemFileSystem {
    fn create(&self, name: &str, size: usize) -> Result<(), IoError> {
        let mut files = self.files.lock();
        if files.contains_key(name) {
            return Err(IoError::AlreadyExists);
        }
        files.insert(name.to_string(), Arc::new(Mutex::new(vec![0u8; size])));
        Ok(())
    }

    fn open(&self, name: &str) -> Result<Box<dyn OpenFile>, IoError> {
        let data = self.files.lock().get(name).cloned().ok_or(IoError::NotFound)?;
        Ok(Box::new(MemFile { data }))
    }

    fn remove(&self, name: &str) -> Result<(), IoError> {
        self.files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or(IoError::NotFound)
    }
}

struct MemFile {
    data: Arc<Mutex<Vec<u8>>>,
}

impl OpenFile for MemFile {
    fn read_at(&self, dst: &mut [u8], offset: usize) -> Result<usize, IoError> {
        let data = self.data.lock();
        let count = clip(data.len(), offset, dst.len());
        dst[..count].copy_from_slice(&data[offset..offset + count]);
        Ok(count)
    }

    fn write_at(&self, src: &[u8], offset: usize) -> Result<usize, IoError> {
        let mut data = self.data.lock();
        let count = clip(data.len(), offset, src.len());
        data[offset..offset + count].copy_from_slice(&src[..count]);
        Ok(count)
    }

    fn len(&self) -> usize {
        self.data.lock().len()
    }
}

#[cfg(any(test, feature = "std"))]
mod host {
    use std::fs::{self, File, OpenOptions};
    use std::io::{self, Read, Seek, SeekFrom, Write};
    use std::path::{Path, PathBuf};

    use super::*;

    impl From<io::Error> for IoError {
        fn from(err: io::Error) -> Self {
            match err.kind() {
                io::ErrorKind::NotFound => IoError::NotFound,
                io::ErrorKind::AlreadyExists => IoError::AlreadyExists,
                _ => IoError::Host,
            }
        }
    }

    /// A file system rooted at a host directory.
    pub struct HostFileSystem {
        root: PathBuf,
    }

    impl HostFileSystem {
        /// Uses `root` (which must exist) as the directory holding all files.
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        pub fn root(&self) -> &Path {
            &self.root
        }

        fn path(&self, name: &str) -> PathBuf {
            self.root.join(name)
        }
    }

    impl FileSystem for HostFileSystem {
        fn create(&self, name: &str, size: usize) -> Result<(), IoError> {
            let file = File::create_new(self.path(name))?;
            file.set_len(size as u64)?;
            Ok(())
        }

        fn open(&self, name: &str) -> Result<Box<dyn OpenFile>, IoError> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(self.path(name))?;
            let len = file.metadata()?.len() as usize;
            Ok(Box::new(HostFile {
                file: Mutex::new(file),
                len,
            }))
        }

        fn remove(&self, name: &str) -> Result<(), IoError> {
            fs::remove_file(self.path(name))?;
            Ok(())
        }
    }

    struct HostFile {
        file: Mutex<File>,
        len: usize,
    }

    impl OpenFile for HostFile {
        fn read_at(&self, dst: &mut [u8], offset: usize) -> Result<usize, IoError> {
            let count = clip(self.len, offset, dst.len());
            if count == 0 {
                return Ok(0);
            }
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset as u64))?;
            file.read_exact(&mut dst[..count])?;
            Ok(count)
        }

        fn write_at(&self, src: &[u8], offset: usize) -> Result<usize, IoError> {
            let count = clip(self.len, offset, src.len());
            if count == 0 {
                return Ok(0);
            }
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset as u64))?;
            file.write_all(&src[..count])?;
            Ok(count)
        }

        fn len(&self) -> usize {
            self.len
        }
    }
}

#[cfg(any(test, feature = "std"))]
pub use host::HostFileSystem;

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(fs: &dyn FileSystem) {
        fs.create("SWAP.1", 8).unwrap();
        assert_eq!(fs.create("SWAP.1", 8), Err(IoError::AlreadyExists));

        let file = fs.open("SWAP.1").unwrap();
        assert_eq!(file.len(), 8);
        assert_eq!(file.write_at(&[1, 2, 3], 2).unwrap(), 3);

        let mut buf = [0xFFu8; 5];
        assert_eq!(file.read_at(&mut buf, 0).unwrap(), 5);
        assert_eq!(buf, [0, 0, 1, 2, 3]);

        // Transfers past the end are clipped.
        assert_eq!(file.write_at(&[9; 4], 6).unwrap(), 2);
        assert_eq!(file.read_at(&mut buf, 8).unwrap(), 0);

        fs.remove("SWAP.1").unwrap();
        assert!(fs.open("SWAP.1").is_err());
        assert_eq!(fs.remove("SWAP.1"), Err(IoError::NotFound));
    }

    #[test]
    fn memory_file_system() {
        let fs = MemFileSystem::new();
        exercise(&fs);
        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn open_handle_outlives_remove() {
        let fs = MemFileSystem::new();
        fs.create("a", 4).unwrap();
        let file = fs.open("a").unwrap();
        fs.remove("a").unwrap();
        assert!(!fs.exists("a"));
        assert_eq!(file.write_at(&[7], 0).unwrap(), 1);
    }

    #[test]
    fn host_file_system() {
        let root = std::env::temp_dir().join(format!("vmm-storage-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        let fs = HostFileSystem::new(&root);
        exercise(&fs);
        std::fs::remove_dir_all(&root).unwrap();
    }
}
