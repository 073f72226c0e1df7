//! Input/output helpers.
//!
//! - fit-state snapshot JSON read/write (`snapshot`)

pub mod snapshot;

pub use snapshot::*;
