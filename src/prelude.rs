//! # classweave Prelude
//!
//! The types needed to run the pipeline, build bundles and patch in fast mode, for a single
//! glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classweave operations
pub use crate::Error;

/// The result type used throughout classweave
pub use crate::Result;

// ================================================================================================
// Artifacts
// ================================================================================================

/// Code units by name, and which side they belong to
pub use crate::file::{Artifact, ArtifactKind};

// ================================================================================================
// Mapping
// ================================================================================================

/// Mapping tables and their entries
pub use crate::mapping::{ClassMapping, MappingTable, MemberMapping};

// ================================================================================================
// Build Mode
// ================================================================================================

/// Pipeline instances, settings and results
pub use crate::pipeline::{Pipeline, PipelineConfig, RunReport, Session, SessionOutput};

/// Directive kinds, as counted in reports
pub use crate::patch::DirectiveKind;

// ================================================================================================
// Fast Mode
// ================================================================================================

/// Capture, persistence and replay of deltas
pub use crate::delta::{DeltaBundle, DeltaCapture, FastPatchConfig, FastPatcher};

// ================================================================================================
// Code Units
// ================================================================================================

/// Decoding, encoding and inspection of single units
pub use crate::unit::{decode, encode, CodeUnit, DecodeMode, EncodeOptions, SymbolPool};
