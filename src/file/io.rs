//! Low-level byte order and safe reading/writing utilities for class-file parsing.
//!
//! Class files store every multi-byte quantity in big-endian order. This module provides the
//! [`crate::file::io::BeIO`] trait and bounds-checked helpers built on it, so that the
//! [`crate::file::parser::Parser`] and the encoders never index raw slices directly.
//!
//! # Key Components
//!
//! - [`crate::file::io::BeIO`] - Trait defining big-endian conversion for primitive types
//! - [`crate::file::io::read_be`] - Read a value from the start of a buffer
//! - [`crate::file::io::read_be_at`] - Read a value at an offset, advancing the offset
//! - [`crate::file::io::write_be_at`] - Write a value at an offset, advancing the offset
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use classweave::file::io::{read_be_at, write_be_at};
//!
//! let mut data = [0u8; 6];
//! let mut offset = 0;
//! write_be_at(&mut data, &mut offset, 0xCAFEu16)?;
//! write_be_at(&mut data, &mut offset, 0xBABE_0034u32)?;
//!
//! offset = 0;
//! let magic: u16 = read_be_at(&data, &mut offset)?;
//! assert_eq!(magic, 0xCAFE);
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! All functions in this module are pure and operate only on the buffers passed in.

use crate::{Error::OutOfBounds, Result};

/// Trait for types that can be converted from and to big-endian byte arrays.
///
/// Implemented for all fixed-width integer types that occur in class files. Floating point
/// constants are carried as their raw bit patterns (`u32`/`u64`) so that re-encoding is
/// always bit exact, including NaN payloads.
pub trait BeIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_be_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl BeIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_be_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
}

/// Safely reads a value of type `T` in big-endian byte order from the start of a buffer.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be<T: BeIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_be_at(data, &mut offset)
}

/// Safely reads a value of type `T` in big-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes read.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be_at<T: BeIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_be_bytes(read))
}

/// Safely writes a value of type `T` in big-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes written.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too small.
pub fn write_be_at<T: BeIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_be_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_be_values() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34];
        let mut offset = 0;
        assert_eq!(read_be_at::<u32>(&data, &mut offset).unwrap(), 0xCAFE_BABE);
        assert_eq!(read_be_at::<u16>(&data, &mut offset).unwrap(), 0x34);
        assert_eq!(offset, 6);
        assert!(matches!(
            read_be_at::<u8>(&data, &mut offset),
            Err(OutOfBounds)
        ));
    }

    #[test]
    fn read_be_signed() {
        assert_eq!(read_be::<i16>(&[0xFF, 0xFE]).unwrap(), -2);
        assert_eq!(read_be::<i8>(&[0x80]).unwrap(), -128);
    }

    #[test]
    fn write_be_values() {
        let mut data = [0u8; 6];
        let mut offset = 0;
        write_be_at(&mut data, &mut offset, 0x0102u16).unwrap();
        write_be_at(&mut data, &mut offset, -1i32).unwrap();
        assert_eq!(data, [0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(write_be_at(&mut data, &mut offset, 1u8).is_err());
    }
}
