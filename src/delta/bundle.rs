//! The persisted delta bundle.
//!
//! A bundle is a gzip stream (`flate2`) over the following payload:
//!
//! ```text
//! "CWB1"
//! varint(metadata length) metadata-json
//! varint(entry count)  entry*
//! entry := u8(kind tag) u16-mutf8(unit name) sha1(original) sha1(modified) varint(blob id)
//! varint(blob count)   blob*
//! blob  := varint(length) byte[length]
//! ```
//!
//! Blobs are content-addressed by the SHA-1 of the delta, so units that changed in the
//! same way share one blob.

use std::{
    collections::BTreeMap,
    fs,
    io::{BufWriter, Read, Write},
    path::Path,
};

use chrono::{DateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    delta::sha1,
    file::{ArtifactKind, Backend, Buffer, Parser, Physical, Writer},
    Result,
};

/// Magic prefix of the decompressed bundle payload.
pub const BUNDLE_MAGIC: &[u8; 4] = b"CWB1";

/// Descriptive header of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// When the bundle was built
    pub generated: DateTime<Utc>,
    /// Entries for the host artifact
    pub host_units: usize,
    /// Entries for the target artifact
    pub target_units: usize,
    /// Sum of the distinct blob sizes
    pub total_delta_size: u64,
}

/// How to reproduce one modified unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleEntry {
    /// SHA-1 of the bytes the delta applies to
    pub original_sha1: [u8; 20],
    /// SHA-1 of the bytes the delta produces
    pub modified_sha1: [u8; 20],
    /// Index of the delta in the blob table
    pub blob: u32,
}

/// A set of unit deltas keyed by artifact kind and unit name.
#[derive(Debug, Clone)]
pub struct DeltaBundle {
    /// Header information
    pub metadata: BundleMetadata,
    entries: BTreeMap<(ArtifactKind, String), BundleEntry>,
    blobs: Vec<Vec<u8>>,
    blob_index: FxHashMap<[u8; 20], u32>,
}

impl Default for DeltaBundle {
    fn default() -> Self {
        DeltaBundle::new()
    }
}

impl DeltaBundle {
    /// An empty bundle stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        DeltaBundle {
            metadata: BundleMetadata {
                generated: Utc::now(),
                host_units: 0,
                target_units: 0,
                total_delta_size: 0,
            },
            entries: BTreeMap::new(),
            blobs: Vec::new(),
            blob_index: FxHashMap::default(),
        }
    }

    /// Adds or replaces the entry of one unit, storing `delta` once per distinct content.
    pub fn insert(
        &mut self,
        kind: ArtifactKind,
        unit: &str,
        original_sha1: [u8; 20],
        modified_sha1: [u8; 20],
        delta: Vec<u8>,
    ) {
        let digest = sha1(&delta);
        let blob = match self.blob_index.get(&digest) {
            Some(blob) => *blob,
            None => {
                let blob = self.blobs.len() as u32;
                self.metadata.total_delta_size += delta.len() as u64;
                self.blobs.push(delta);
                self.blob_index.insert(digest, blob);
                blob
            }
        };

        let entry = BundleEntry {
            original_sha1,
            modified_sha1,
            blob,
        };
        if self.entries.insert((kind, unit.to_string()), entry).is_none() {
            match kind {
                ArtifactKind::Host => self.metadata.host_units += 1,
                ArtifactKind::Target => self.metadata.target_units += 1,
            }
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the bundle has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct deltas.
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// The entry of one unit.
    #[must_use]
    pub fn entry(&self, kind: ArtifactKind, unit: &str) -> Option<&BundleEntry> {
        self.entries.get(&(kind, unit.to_string()))
    }

    /// Entries of one artifact kind, in unit name order.
    pub fn entries(&self, kind: ArtifactKind) -> impl Iterator<Item = (&str, &BundleEntry)> {
        self.entries
            .iter()
            .filter(move |((entry_kind, _), _)| *entry_kind == kind)
            .map(|((_, unit), entry)| (unit.as_str(), entry))
    }

    /// The delta stored under `blob`.
    #[must_use]
    pub fn blob(&self, blob: u32) -> Option<&[u8]> {
        self.blobs.get(blob as usize).map(Vec::as_slice)
    }

    /// Writes the compressed archive.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if writing fails and [`crate::Error::Json`] if the
    /// metadata cannot be serialized.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut payload = Writer::with_capacity(self.metadata.total_delta_size as usize + 1024);
        payload.write_bytes(BUNDLE_MAGIC);

        let metadata = serde_json::to_vec(&self.metadata)?;
        payload.write_varint(metadata.len() as u64);
        payload.write_bytes(&metadata);

        payload.write_varint(self.entries.len() as u64);
        for ((kind, unit), entry) in &self.entries {
            payload.write_be::<u8>(kind.tag());
            payload.write_mutf8(unit)?;
            payload.write_bytes(&entry.original_sha1);
            payload.write_bytes(&entry.modified_sha1);
            payload.write_varint(u64::from(entry.blob));
        }

        payload.write_varint(self.blobs.len() as u64);
        for blob in &self.blobs {
            payload.write_varint(blob.len() as u64);
            payload.write_bytes(blob);
        }

        let mut encoder = GzEncoder::new(writer, Compression::default());
        encoder.write_all(payload.as_slice())?;
        encoder.finish()?;
        Ok(())
    }

    /// Reads an archive written by [`DeltaBundle::write_to`].
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the data is not a gzip stream,
    /// [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] if the payload is
    /// inconsistent, and [`crate::Error::Json`] for invalid metadata.
    pub fn read_from(data: &[u8]) -> Result<Self> {
        let mut payload = Vec::new();
        GzDecoder::new(data).read_to_end(&mut payload)?;

        let mut parser = Parser::new(&payload);
        if parser.read_bytes(BUNDLE_MAGIC.len())? != BUNDLE_MAGIC {
            return Err(malformed_error!("Bundle payload has no CWB1 header"));
        }

        let metadata_len = parser.read_varint()? as usize;
        let metadata: BundleMetadata = serde_json::from_slice(parser.read_bytes(metadata_len)?)?;

        let entry_count = parser.read_varint()?;
        let mut entries = BTreeMap::new();
        for _ in 0..entry_count {
            let tag = parser.read_be::<u8>()?;
            let Some(kind) = ArtifactKind::from_tag(tag) else {
                return Err(malformed_error!("Unknown artifact tag {}", tag));
            };
            let unit = parser.read_mutf8()?;
            let original_sha1 = read_digest(&mut parser)?;
            let modified_sha1 = read_digest(&mut parser)?;
            let blob = u32::try_from(parser.read_varint()?)
                .map_err(|_| malformed_error!("Blob id of {} out of range", unit))?;
            entries.insert(
                (kind, unit),
                BundleEntry {
                    original_sha1,
                    modified_sha1,
                    blob,
                },
            );
        }

        let blob_count = parser.read_varint()?;
        let mut blobs = Vec::new();
        let mut blob_index = FxHashMap::default();
        for blob in 0..blob_count {
            let len = parser.read_varint()? as usize;
            let delta = parser.read_bytes(len)?.to_vec();
            blob_index.insert(sha1(&delta), blob as u32);
            blobs.push(delta);
        }

        if let Some(((kind, unit), _)) = entries
            .iter()
            .find(|(_, entry)| entry.blob as usize >= blobs.len())
        {
            return Err(malformed_error!("Entry {} {} refers to a missing blob", kind, unit));
        }

        log::debug!(
            "read bundle from {} with {} entries and {} blobs",
            metadata.generated,
            entries.len(),
            blobs.len()
        );
        Ok(DeltaBundle {
            metadata,
            entries,
            blobs,
            blob_index,
        })
    }

    /// Reads an archive from any [`Backend`].
    ///
    /// # Errors
    /// See [`DeltaBundle::read_from`].
    pub fn from_backend(backend: &dyn Backend) -> Result<Self> {
        DeltaBundle::read_from(backend.data())
    }

    /// Reads an archive from an owned buffer.
    ///
    /// # Errors
    /// See [`DeltaBundle::read_from`].
    pub fn from_mem(data: Vec<u8>) -> Result<Self> {
        DeltaBundle::from_backend(&Buffer::new(data))
    }

    /// Memory-maps and reads an archive file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened, otherwise see
    /// [`DeltaBundle::read_from`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let physical = Physical::new(path)?;
        DeltaBundle::from_backend(&physical)
    }

    /// Writes the archive to a file, replacing it.
    ///
    /// # Errors
    /// See [`DeltaBundle::write_to`].
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn read_digest(parser: &mut Parser) -> Result<[u8; 20]> {
    let bytes = parser.read_bytes(20)?;
    let mut digest = [0u8; 20];
    digest.copy_from_slice(bytes);
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::create_delta;

    fn bundle() -> DeltaBundle {
        let mut bundle = DeltaBundle::new();
        let delta = create_delta(b"original", b"modified");
        bundle.insert(ArtifactKind::Target, "a7", sha1(b"original"), sha1(b"modified"), delta.clone());
        bundle.insert(ArtifactKind::Target, "b2", sha1(b"original"), sha1(b"modified"), delta);
        bundle.insert(
            ArtifactKind::Host,
            "net/example/Loader",
            sha1(b"x"),
            sha1(b"y"),
            create_delta(b"x", b"y"),
        );
        bundle
    }

    #[test]
    fn blobs_are_shared() {
        let bundle = bundle();
        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle.blob_count(), 2);
        assert_eq!(bundle.metadata.target_units, 2);
        assert_eq!(bundle.metadata.host_units, 1);
        let names: Vec<_> = bundle.entries(ArtifactKind::Target).map(|(name, _)| name).collect();
        assert_eq!(names, ["a7", "b2"]);
    }

    #[test]
    fn archive_roundtrip() {
        let bundle = bundle();
        let mut archive = Vec::new();
        bundle.write_to(&mut archive).unwrap();

        let read = DeltaBundle::from_mem(archive).unwrap();
        assert_eq!(read.metadata, bundle.metadata);
        assert_eq!(read.len(), 3);
        assert_eq!(read.blob_count(), 2);
        let entry = read.entry(ArtifactKind::Host, "net/example/Loader").unwrap();
        assert_eq!(entry, bundle.entry(ArtifactKind::Host, "net/example/Loader").unwrap());
        assert_eq!(read.blob(entry.blob), bundle.blob(entry.blob));
    }

    #[test]
    fn archive_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patches.cwb");
        bundle().to_file(&path).unwrap();
        let read = DeltaBundle::from_file(&path).unwrap();
        assert_eq!(read.len(), 3);
    }

    #[test]
    fn rejects_garbage() {
        assert!(DeltaBundle::read_from(b"not a bundle").is_err());

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"CWB0").unwrap();
        let archive = encoder.finish().unwrap();
        assert!(DeltaBundle::read_from(&archive).is_err());
    }
}
