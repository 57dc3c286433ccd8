//! Bundles that are already in memory, e.g. downloaded by a launcher.

use std::ops::Range;

use super::Backend;
use crate::{Error, Result};

/// Owned bundle bytes behind the [`Backend`] interface.
///
/// [`DeltaBundle::from_mem`](crate::delta::DeltaBundle::from_mem) wraps its input in one of
/// these so the in-memory and memory-mapped paths read the archive the same way.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    /// Wraps owned bundle bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Buffer { bytes }
    }

    /// Gives the bytes back, e.g. to cache a bundle that parsed cleanly.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }

    fn range(&self, offset: usize, len: usize) -> Option<Range<usize>> {
        let end = offset.checked_add(len)?;
        (end <= self.bytes.len()).then_some(offset..end)
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Buffer::new(bytes)
    }
}

impl Backend for Buffer {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        match self.range(offset, len) {
            Some(range) => Ok(&self.bytes[range]),
            None => Err(Error::OutOfBounds),
        }
    }

    fn data(&self) -> &[u8] {
        &self.bytes
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaBundle;

    fn archive() -> Vec<u8> {
        let mut bytes = Vec::new();
        DeltaBundle::new().write_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn slices_stay_inside_the_archive() {
        let bytes = archive();
        let buffer = Buffer::from(bytes.clone());

        assert_eq!(buffer.len(), bytes.len());
        assert_eq!(buffer.data_slice(0, 4).unwrap(), &bytes[..4]);
        assert_eq!(buffer.data_slice(bytes.len(), 0).unwrap(), &[] as &[u8]);
        assert!(matches!(buffer.data_slice(bytes.len() - 1, 2), Err(Error::OutOfBounds)));
        assert!(matches!(buffer.data_slice(usize::MAX, 2), Err(Error::OutOfBounds)));
    }

    #[test]
    fn parses_like_the_mapped_file() {
        let bytes = archive();
        let buffer = Buffer::new(bytes.clone());
        let bundle = DeltaBundle::from_backend(&buffer).unwrap();
        assert!(bundle.is_empty());
        assert_eq!(buffer.into_inner(), bytes);
    }

    #[test]
    fn empty_buffer_is_not_a_bundle() {
        let buffer = Buffer::default();
        assert!(buffer.data_slice(0, 1).is_err());
        assert!(DeltaBundle::from_backend(&buffer).is_err());
    }
}
