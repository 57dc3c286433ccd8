use thiserror::Error;

use crate::file::ArtifactKind;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! transform_error {
    ($unit:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Transform {
            unit: $unit.to_string(),
            message: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant is fatal for the pipeline run it occurs in. There is no per-unit retry and
/// no partial output: a half patched artifact is unsafe to load, so callers are expected to
/// abort and either fix their inputs or fall back from fast-patch to build mode.
///
/// # Error Categories
///
/// ## Binary Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid class-file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a buffer
/// - [`Error::NotSupported`] - Unsupported format feature
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::Decode`] - A named unit failed to decode
///
/// ## Patching Errors
/// - [`Error::Resolution`] - A symbolic name could not be resolved
/// - [`Error::Directive`] - A patch member carries an invalid directive
/// - [`Error::TransformConflict`] - Two directives claim the same target member
/// - [`Error::Transform`] - A directive could not be applied
/// - [`Error::Encode`] - A unit could not be re-encoded after edits
///
/// ## Deployment Errors
/// - [`Error::DeltaApply`] - A stored delta does not reproduce the expected bytes
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Json`] - Mapping table or bundle metadata (de)serialization errors
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::{Error, file::{Artifact, ArtifactKind}};
/// use std::path::Path;
///
/// match Artifact::from_dir(ArtifactKind::Target, Path::new("client")) {
///     Ok(artifact) => println!("{} units", artifact.len()),
///     Err(Error::FileError(io_err)) => eprintln!("I/O error: {}", io_err),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type or feature is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// JSON (de)serialization failure for mapping tables, configs or bundle metadata.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// A unit of an artifact failed to decode.
    ///
    /// Wraps the underlying parser failure together with the name of the unit, because
    /// parser errors alone do not say which of tens of thousands of units was broken.
    #[error("Failed to decode unit '{unit}': {source}")]
    Decode {
        /// Name of the unit that failed to decode
        unit: String,
        /// The underlying parsing error
        source: Box<Error>,
    },

    /// A symbolic name is missing from the mapping table and no interface fallback matched.
    #[error("Unresolved symbol '{symbol}' ({context})")]
    Resolution {
        /// The symbolic name that could not be resolved
        symbol: String,
        /// Where the name was referenced from
        context: String,
    },

    /// A mapping table is inconsistent (append-only violation, revision mismatch).
    #[error("Mapping table error: {0}")]
    Mapping(String),

    /// A patch member carries no usable directive, or more than one.
    #[error("Invalid directive on {unit}.{member}: {message}")]
    Directive {
        /// The patch unit holding the member
        unit: String,
        /// The member name
        member: String,
        /// Description of the problem
        message: String,
    },

    /// Two directives claim the same target member.
    #[error("Conflicting directives on {target}.{member}: {first} and {second}")]
    TransformConflict {
        /// Obfuscated name of the target unit
        target: String,
        /// Target member name and descriptor
        member: String,
        /// Description of the first claim
        first: String,
        /// Description of the second claim
        second: String,
    },

    /// A directive could not be applied to its resolved target.
    #[error("Transform of '{unit}' failed: {message}")]
    Transform {
        /// Name of the unit being transformed
        unit: String,
        /// Description of the failure
        message: String,
    },

    /// A unit could not be validly re-encoded.
    ///
    /// The symbolic listing of the unit is attached so that the failure can be diagnosed from
    /// the log sink alone.
    #[error("Failed to encode unit '{unit}': {message}")]
    Encode {
        /// Name of the unit that failed to encode
        unit: String,
        /// Description of the failure
        message: String,
        /// Symbolic listing of the unit at the time of the failure
        listing: String,
    },

    /// A stored delta does not reproduce the expected bytes against the current original.
    #[error("Failed to apply delta for {kind} unit '{unit}': {message}")]
    DeltaApply {
        /// Artifact the unit belongs to
        kind: ArtifactKind,
        /// Unit name
        unit: String,
        /// Description of the failure
        message: String,
    },
}

impl Error {
    /// Wraps this error as a [`Error::Decode`] for the named unit.
    ///
    /// Errors that already carry unit context are returned unchanged.
    #[must_use]
    pub fn in_unit(self, unit: &str) -> Error {
        match self {
            Error::Decode { .. } | Error::Encode { .. } | Error::Transform { .. } => self,
            other => Error::Decode {
                unit: unit.to_string(),
                source: Box::new(other),
            },
        }
    }
}
