//! Physical file backend for memory-mapped I/O.
//!
//! Delta bundles are shipped as a single deployable archive that is read once at startup.
//! The [`crate::file::physical::Physical`] backend maps such files read-only into the address
//! space, so decompression streams straight from the page cache instead of first copying the
//! whole archive onto the heap.
//!
//! # Integration
//!
//! - [`crate::file`] - Provides the [`crate::file::Backend`] trait implementation
//! - [`crate::delta::DeltaBundle::from_file`] - Reads archives through this backend

use super::Backend;
use crate::{
    Error::{Error, FileError, OutOfBounds},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A file backend that uses memory-mapped I/O for efficient access to files on disk.
///
/// All access operations include bounds checking to ensure memory safety.
///
/// # Examples
///
/// ```rust,ignore
/// use classweave::file::{Physical, Backend};
/// use std::path::Path;
///
/// let physical = Physical::new(Path::new("patches.cwb"))?;
/// println!("Bundle size: {} bytes", physical.len());
/// # Ok::<(), classweave::Error>(())
/// ```
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data
    data: Mmap,
}

impl Physical {
    /// Create a new physical file backend by memory-mapping the specified file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or
    /// [`crate::Error::Error`] if memory mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        // Safety: the mapping is read-only and the bundle is not expected to change while
        // it is being read
        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if offset_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn physical() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00]).unwrap();
        file.flush().unwrap();

        let physical = Physical::new(file.path()).unwrap();
        assert_eq!(physical.len(), 5);
        assert_eq!(physical.data_slice(0, 4).unwrap(), &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert!(physical.data_slice(4, 2).is_err());
        assert!(physical.data_slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn missing_file() {
        let result = Physical::new("/nonexistent/classweave/bundle.cwb");
        assert!(matches!(result, Err(FileError(_))));
    }
}
