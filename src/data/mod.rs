//! Data sources.
//!
//! - deterministic synthetic power matrices (`sample`)

pub mod sample;

pub use sample::*;
