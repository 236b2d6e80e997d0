//! Voice model lookup.

pub mod registry;

pub use registry::ModelRegistry;
