//! Byte-level input and output: cursors, writers, backends and artifacts.
//!
//! This module holds everything that touches raw bytes before they become structured code
//! units, and after they stop being structured again.
//!
//! # Key Components
//!
//! - [`crate::file::parser::Parser`] - Bounds-checked big-endian read cursor
//! - [`crate::file::writer::Writer`] - Big-endian output buffer
//! - [`crate::file::Backend`] - Abstraction over memory-mapped and in-memory data
//! - [`crate::file::Artifact`] - Named collection of code units (unit name to raw bytes)
//! - [`crate::file::ArtifactKind`] - Which of the two artifacts a collection belongs to
//!
//! # Artifact layout on disk
//!
//! An artifact directory is a tree of `*.class` files. The unit name of a file is its path
//! relative to the root, with `/` separators and without the extension, which is exactly the
//! JVM internal name of the class it contains.
//!
//! ```rust,no_run
//! use classweave::file::{Artifact, ArtifactKind};
//! use std::path::Path;
//!
//! let client = Artifact::from_dir(ArtifactKind::Target, Path::new("client"))?;
//! println!("{} units, {} bytes", client.len(), client.total_size());
//! client.write_dir(Path::new("client-patched"))?;
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod io;
pub mod mutf8;
pub mod parser;
pub mod writer;

mod memory;
mod physical;

pub use memory::Buffer;
pub use parser::Parser;
pub use physical::Physical;
pub use writer::Writer;

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::Result;

/// File extension of code units inside an artifact directory.
pub const UNIT_EXTENSION: &str = "class";

/// Backend trait for file data sources.
///
/// This trait abstracts over the source of bundle data, allowing for both in-memory and
/// on-disk representations. All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// Identifies one of the two artifacts that are patched independently.
///
/// The host runtime and the target client never share byte maps, mapping tables or decoded
/// state. The kind is part of every delta bundle key.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// The host runtime that loads the target
    Host,
    /// The obfuscated target client
    Target,
}

impl ArtifactKind {
    /// Stable single-byte tag used by the bundle archive format.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            ArtifactKind::Host => 0,
            ArtifactKind::Target => 1,
        }
    }

    /// Inverse of [`ArtifactKind::tag`].
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<ArtifactKind> {
        match tag {
            0 => Some(ArtifactKind::Host),
            1 => Some(ArtifactKind::Target),
            _ => None,
        }
    }
}

/// A named collection of code units: unit name to raw class-file bytes.
///
/// Units are kept in a `BTreeMap` so that every iteration, and therefore every pipeline run
/// and every bundle, is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    kind: ArtifactKind,
    units: BTreeMap<String, Vec<u8>>,
}

impl Artifact {
    /// Creates an empty artifact.
    #[must_use]
    pub fn new(kind: ArtifactKind) -> Self {
        Artifact {
            kind,
            units: BTreeMap::new(),
        }
    }

    /// Creates an artifact from an existing unit map.
    #[must_use]
    pub fn from_units(kind: ArtifactKind, units: BTreeMap<String, Vec<u8>>) -> Self {
        Artifact { kind, units }
    }

    /// Loads every `*.class` file below `root`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the tree cannot be read, or
    /// [`crate::Error::Empty`] if it contains no units.
    pub fn from_dir(kind: ArtifactKind, root: &Path) -> Result<Self> {
        let mut artifact = Artifact::new(kind);
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|ext| ext.to_str()) != Some(UNIT_EXTENSION) {
                    continue;
                }
                let Some(name) = unit_name(root, &path) else {
                    continue;
                };
                artifact.units.insert(name, fs::read(&path)?);
            }
        }

        if artifact.units.is_empty() {
            return Err(crate::Error::Empty);
        }

        log::debug!(
            "loaded {} {} units from {}",
            artifact.len(),
            kind,
            root.display()
        );
        Ok(artifact)
    }

    /// Writes every unit below `root`, creating package directories as needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] on any I/O failure.
    pub fn write_dir(&self, root: &Path) -> Result<()> {
        for (name, bytes) in &self.units {
            let path = unit_path(root, name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, bytes)?;
        }
        Ok(())
    }

    /// Which artifact this is.
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if the artifact holds no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Sum of all unit sizes in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.units.values().map(|bytes| bytes.len() as u64).sum()
    }

    /// Raw bytes of a unit.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.units.get(name).map(Vec::as_slice)
    }

    /// Returns `true` if the artifact contains the named unit.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Inserts or replaces a unit, returning the previous bytes.
    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.units.insert(name.into(), bytes)
    }

    /// Removes a unit, returning its bytes.
    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.units.remove(name)
    }

    /// Unit names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// Iterates `(name, bytes)` in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.units
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    /// Gives up ownership of the unit map.
    #[must_use]
    pub fn into_units(self) -> BTreeMap<String, Vec<u8>> {
        self.units
    }
}

fn unit_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<&str> = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

fn unit_path(root: &Path, name: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for part in name.split('/') {
        path.push(part);
    }
    path.set_extension(UNIT_EXTENSION);
    path
}
