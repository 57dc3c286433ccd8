//! Shared test infrastructure.
//!
//! Factories in here build class files and artifacts without going through the encoder, so
//! that codec tests do not depend on the code they test.

pub mod factories;
