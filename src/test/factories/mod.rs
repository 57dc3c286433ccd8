//! Factories for class files, artifacts and patch units.

mod class;
mod patch;

pub use class::{minimal_class_bytes, ClassBytes};
pub use patch::{
    alpha_artifact, alpha_mapping, alpha_patch, alpha_patches, alpha_unit, directive, ALPHA_PATCH,
};
