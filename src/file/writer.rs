//! Growable big-endian output buffer, the write-side counterpart of [`crate::Parser`].

use crate::{
    file::{
        io::{write_be_at, BeIO},
        mutf8,
    },
    Result,
};

/// Big-endian byte sink used by the class-file encoder and the bundle archive writer.
///
/// # Examples
///
/// ```rust
/// use classweave::file::Writer;
///
/// let mut writer = Writer::new();
/// writer.write_be(0xCAFE_BABEu32);
/// let length_at = writer.reserve_u32();
/// writer.write_bytes(b"body");
/// writer.patch_length_u32(length_at)?;
/// assert_eq!(writer.as_slice()[4..8], [0, 0, 0, 4]);
/// # Ok::<(), classweave::Error>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Writer { buffer: Vec::new() }
    }

    /// Create an empty writer with preallocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Writer {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The bytes written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the buffer.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Append a value in big-endian order.
    pub fn write_be<T: BeIO>(&mut self, value: T) {
        self.buffer.extend_from_slice(value.to_be_bytes().as_ref());
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Append an unsigned LEB128 integer.
    pub fn write_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buffer.push(byte);
                return;
            }
            self.buffer.push(byte | 0x80);
        }
    }

    /// Append a `u16` length-prefixed modified UTF-8 string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the encoded form exceeds 65535 bytes.
    pub fn write_mutf8(&mut self, value: &str) -> Result<()> {
        let bytes = mutf8::encode(value);
        let len = u16::try_from(bytes.len())
            .map_err(|_| malformed_error!("String of {} bytes exceeds u16 length", bytes.len()))?;
        self.write_be(len);
        self.write_bytes(&bytes);
        Ok(())
    }

    /// Reserve four bytes for a length that is patched later, returning their position.
    pub fn reserve_u32(&mut self) -> usize {
        let at = self.buffer.len();
        self.write_be(0u32);
        at
    }

    /// Reserve two bytes for a count that is patched later, returning their position.
    pub fn reserve_u16(&mut self) -> usize {
        let at = self.buffer.len();
        self.write_be(0u16);
        at
    }

    /// Overwrite a reserved `u16` slot.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `at` was not reserved.
    pub fn patch_u16(&mut self, at: usize, value: u16) -> Result<()> {
        let mut offset = at;
        write_be_at(&mut self.buffer, &mut offset, value)
    }

    /// Fill a reserved `u32` slot with the number of bytes written after it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `at` was not reserved, or
    /// [`crate::Error::Malformed`] if the length does not fit into `u32`.
    pub fn patch_length_u32(&mut self, at: usize) -> Result<()> {
        let length = self.buffer.len() - at - 4;
        let length = u32::try_from(length)
            .map_err(|_| malformed_error!("Section of {} bytes exceeds u32 length", length))?;
        let mut offset = at;
        write_be_at(&mut self.buffer, &mut offset, length)
    }
}
