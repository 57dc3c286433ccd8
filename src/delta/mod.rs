//! Binary deltas between original and patched units, and the bundles that carry them.
//!
//! Build mode can record, for every unit it changes, a compact delta from the original bytes to
//! the emitted bytes. The deltas of a build are collected into a [`DeltaBundle`], which fast
//! mode replays with [`FastPatcher`] against a fresh copy of the same artifact, without decoding
//! anything.
//!
//! # Delta format
//!
//! ```text
//! "CWD1"  varint(original length)  varint(modified length)  op*
//! op := 0x00 varint(offset) varint(length)      copy from the original
//!     | 0x01 varint(length) byte[length]        add literal bytes
//! ```
//!
//! Varints are unsigned LEB128. Copy sources are found through an index of the original's
//! 16-byte blocks, and matches are extended in both directions byte by byte.
//!
//! # Key Components
//!
//! - [`crate::delta::create_delta`] / [`crate::delta::apply_delta`] - The delta codec
//! - [`crate::delta::DeltaCapture`] - Collects deltas during build mode
//! - [`crate::delta::DeltaBundle`] - The persisted, content-addressed archive
//! - [`crate::delta::FastPatcher`] - All-or-nothing replay of a bundle
//!
//! # Examples
//!
//! ```rust
//! use classweave::delta::{apply_delta, create_delta};
//!
//! let original = b"the quick brown fox jumps over the lazy dog".repeat(4);
//! let mut modified = original.clone();
//! modified[20..23].copy_from_slice(b"cat");
//!
//! let delta = create_delta(&original, &modified);
//! assert_eq!(apply_delta(&original, &delta)?, modified);
//! # Ok::<(), classweave::Error>(())
//! ```

mod bundle;
mod capture;
mod fastpatch;

pub use bundle::{BundleEntry, BundleMetadata, DeltaBundle};
pub use capture::DeltaCapture;
pub use fastpatch::{FastPatchConfig, FastPatcher};

use rustc_hash::FxHashMap;
use sha1::{Digest, Sha1};

use crate::{
    file::{Parser, Writer},
    Result,
};

/// Magic prefix of every delta.
pub const DELTA_MAGIC: &[u8; 4] = b"CWD1";

const BLOCK: usize = 16;
const OP_COPY: u8 = 0x00;
const OP_ADD: u8 = 0x01;

/// SHA-1 of `bytes`.
#[must_use]
pub fn sha1(bytes: &[u8]) -> [u8; 20] {
    Sha1::digest(bytes).into()
}

/// Lowercase hex rendering of a digest.
#[must_use]
pub fn hex(digest: &[u8]) -> String {
    use std::fmt::Write;

    digest.iter().fold(String::with_capacity(digest.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn flush_add(out: &mut Writer, pending: &[u8]) {
    if pending.is_empty() {
        return;
    }
    out.write_be::<u8>(OP_ADD);
    out.write_varint(pending.len() as u64);
    out.write_bytes(pending);
}

/// Computes the delta that turns `original` into `modified`.
///
/// The result is deterministic for a given pair of inputs.
#[must_use]
pub fn create_delta(original: &[u8], modified: &[u8]) -> Vec<u8> {
    let mut out = Writer::with_capacity(modified.len() / 4 + 16);
    out.write_bytes(DELTA_MAGIC);
    out.write_varint(original.len() as u64);
    out.write_varint(modified.len() as u64);

    let mut index: FxHashMap<&[u8], usize> = FxHashMap::default();
    for (block, chunk) in original.chunks_exact(BLOCK).enumerate() {
        index.entry(chunk).or_insert(block * BLOCK);
    }

    let mut pending_start = 0;
    let mut position = 0;
    while position + BLOCK <= modified.len() {
        let Some(&offset) = index.get(&modified[position..position + BLOCK]) else {
            position += 1;
            continue;
        };

        // grow the match backwards into the pending literals
        let mut start = position;
        let mut source = offset;
        while start > pending_start && source > 0 && modified[start - 1] == original[source - 1] {
            start -= 1;
            source -= 1;
        }
        let mut end = position + BLOCK;
        let mut source_end = offset + BLOCK;
        while end < modified.len() && source_end < original.len() && modified[end] == original[source_end] {
            end += 1;
            source_end += 1;
        }

        flush_add(&mut out, &modified[pending_start..start]);
        out.write_be::<u8>(OP_COPY);
        out.write_varint(source as u64);
        out.write_varint((end - start) as u64);

        position = end;
        pending_start = end;
    }
    flush_add(&mut out, &modified[pending_start..]);

    out.into_inner()
}

/// Applies a delta produced by [`create_delta`] to `original`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the delta has no valid header, was computed
/// against an original of another length, contains an unknown op or a copy outside the
/// original, or does not produce the declared length. Returns [`crate::Error::OutOfBounds`]
/// if it is truncated.
pub fn apply_delta(original: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut parser = Parser::new(delta);
    if parser.read_bytes(DELTA_MAGIC.len())? != DELTA_MAGIC {
        return Err(malformed_error!("Delta has no {:?} header", "CWD1"));
    }
    let original_len = parser.read_varint()?;
    if original_len != original.len() as u64 {
        return Err(malformed_error!(
            "Delta expects an original of {} bytes, got {}",
            original_len,
            original.len()
        ));
    }
    let modified_len = usize::try_from(parser.read_varint()?)
        .map_err(|_| malformed_error!("Delta output length does not fit in memory"))?;

    let mut out = Vec::with_capacity(modified_len.min(original.len().saturating_add(delta.len())));
    while parser.has_more_data() {
        match parser.read_be::<u8>()? {
            OP_COPY => {
                let offset = usize::try_from(parser.read_varint()?).unwrap_or(usize::MAX);
                let len = usize::try_from(parser.read_varint()?).unwrap_or(usize::MAX);
                let Some(range) = offset.checked_add(len).and_then(|end| original.get(offset..end)) else {
                    return Err(malformed_error!("Copy of {} bytes at {} leaves the original", len, offset));
                };
                out.extend_from_slice(range);
            }
            OP_ADD => {
                let len = usize::try_from(parser.read_varint()?).unwrap_or(usize::MAX);
                out.extend_from_slice(parser.read_bytes(len)?);
            }
            op => return Err(malformed_error!("Unknown delta op {:#04x}", op)),
        }
        if out.len() > modified_len {
            return Err(malformed_error!("Delta output exceeds its declared {} bytes", modified_len));
        }
    }

    if out.len() != modified_len {
        return Err(malformed_error!(
            "Delta produced {} bytes, declared {}",
            out.len(),
            modified_len
        ));
    }
    Ok(out)
}
