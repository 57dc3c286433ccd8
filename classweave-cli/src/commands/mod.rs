pub mod build;
pub mod bundle_info;
pub mod common;
pub mod fastpatch;
pub mod listing;
