//! `clearsky-fit` library crate.
//!
//! The binary (`csfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (e.g., ingestion services, notebooks, etc.)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod report;
pub mod solver;
