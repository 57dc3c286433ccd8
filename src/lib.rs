// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a bundle into memory

//! # classweave
//!
//! Structural patching of compiled JVM class files.
//!
//! `classweave` extends a closed, obfuscated application by rewriting its class files before
//! they are loaded. Patch units are ordinary compiled classes written against readable,
//! *symbolic* names and annotated with directives (`@Inject`, `@Shadow`, `@Replace`,
//! `@Hook`, `@Insert`, `@Construct`, `@Disable`, `@FieldHook`, `@ClassMod`). A versioned
//! mapping table translates the symbolic names into the obfuscated ones of the current
//! revision, and the pipeline merges the patches into the target units.
//!
//! ## Features
//!
//! - **Faithful codec** - Minimally decoded units re-encode byte for byte, fully decoded
//!   units get `max_stack`, `max_locals` and stack map frames recomputed
//! - **Fail-fast resolution** - Every symbolic name is resolved before a single unit changes
//! - **Streaming emission** - Units are encoded and evicted one at a time
//! - **Fast deployment** - Build once, then replay compact binary deltas against fresh copies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use classweave::prelude::*;
//! use std::path::Path;
//!
//! let table = MappingTable::from_file(Path::new("mapping-r7.json"))?;
//! let host = Artifact::from_dir(ArtifactKind::Host, Path::new("host"))?;
//! let target = Artifact::from_dir(ArtifactKind::Target, Path::new("client"))?;
//! let host_patches = Artifact::from_dir(ArtifactKind::Host, Path::new("patches/host"))?;
//! let target_patches = Artifact::from_dir(ArtifactKind::Target, Path::new("patches/target"))?;
//!
//! let session = Session::new(table, PipelineConfig::new().capture_deltas(true));
//! let output = session.build(&host, &host_patches, &target, &target_patches)?;
//! println!("{}\n{}", output.host_report, output.target_report);
//!
//! if let Some(bundle) = output.bundle {
//!     bundle.to_file("patches.cwb")?;
//! }
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! ### Fast mode
//!
//! ```rust,no_run
//! use classweave::prelude::*;
//! use std::path::Path;
//!
//! let bundle = DeltaBundle::from_file("patches.cwb")?;
//! let mut target = Artifact::from_dir(ArtifactKind::Target, Path::new("client"))?;
//! FastPatcher::new(FastPatchConfig::new().parallel(true)).apply(&bundle, &mut target)?;
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - Byte cursors, writers, backends and on-disk artifacts
//! - [`unit`] - The code-unit model, decoder and encoder
//! - [`mapping`] - Mapping tables and symbolic name resolution
//! - [`patch`] - Directive extraction from patch units
//! - [`transform`] - One transformer per directive kind
//! - [`pipeline`] - `Load → Classify → Transform → Emit`
//! - [`delta`] - Binary deltas, bundles and the fast patcher
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Every error is fatal for the run it occurs
//! in, and the [`Error`] names the unit (and where useful the member) it was raised for.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use classweave::prelude::*;
///
/// let table = MappingTable::from_file(std::path::Path::new("mapping-r7.json"))?;
/// let pipeline = Pipeline::target(&table, PipelineConfig::default());
/// # Ok::<(), classweave::Error>(())
/// ```
pub mod prelude;

/// Byte-level input and output, and the on-disk artifact layout.
pub mod file;

/// The code-unit model: constant pool, members, instructions and the codec.
pub mod unit;

/// Versioned mapping tables and the symbol resolver.
pub mod mapping;

/// Patch units and the directive vocabulary.
pub mod patch;

/// Directive transformers and the patch-to-target remapper.
pub mod transform;

/// The build-mode pipeline.
pub mod pipeline;

/// Binary deltas, delta bundles and fast mode.
pub mod delta;

/// `classweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classweave` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::{file::{Artifact, ArtifactKind}, pipeline::{Pipeline, PipelineConfig}, Error};
/// use std::path::Path;
///
/// let host = Artifact::from_dir(ArtifactKind::Host, Path::new("host")).unwrap();
/// let patches = Artifact::from_dir(ArtifactKind::Host, Path::new("patches/host")).unwrap();
/// match Pipeline::host(PipelineConfig::default()).run(&host, &patches, None) {
///     Ok((_, report)) => println!("{report}"),
///     Err(Error::Resolution { symbol, .. }) => println!("unmapped: {symbol}"),
///     Err(Error::Encode { unit, listing, .. }) => println!("{unit} failed:\n{listing}"),
///     Err(error) => println!("Error: {error}"),
/// }
/// ```
pub use error::Error;

pub use file::{Artifact, ArtifactKind, Parser};
