//! CLI command implementations.

pub mod common;
pub mod sample;
pub mod solvers;
pub mod version;
