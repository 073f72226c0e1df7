//! Read/write fit-state snapshot JSON files.
//!
//! A snapshot is the complete `FitState`, so a fit can be inspected offline
//! or resumed later against the same input matrix. The schema is whatever
//! `FitState` serializes to; files written by one version are only promised
//! to load in the same version.

use std::fs::File;
use std::path::Path;

use crate::error::FitError;
use crate::fit::FitState;

/// Write a snapshot JSON file.
pub fn save_snapshot(path: &Path, state: &FitState) -> Result<(), FitError> {
    let file = File::create(path)
        .map_err(|e| FitError::Snapshot(format!("failed to create '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, state)
        .map_err(|e| FitError::Snapshot(format!("failed to write '{}': {e}", path.display())))?;
    Ok(())
}

/// Read a snapshot JSON file.
pub fn load_snapshot(path: &Path) -> Result<FitState, FitError> {
    let file = File::open(path)
        .map_err(|e| FitError::Snapshot(format!("failed to open '{}': {e}", path.display())))?;
    let state: FitState = serde_json::from_reader(file)
        .map_err(|e| FitError::Snapshot(format!("invalid snapshot '{}': {e}", path.display())))?;
    Ok(state)
}
