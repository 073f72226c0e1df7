//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - fit hyperparameters and switches (`FitConfig` and friends)
//! - terminal outcomes (`FitOutcome`)
//! - residual-analysis metrics (`ResidualStats`)

pub mod types;

pub use types::*;
