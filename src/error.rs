//! Error types for the fitting pipeline.

use thiserror::Error;

use crate::solver::SolverStatus;

/// Errors surfaced by configuration, input validation, preparation, and the
/// solver seam. Loop-stage solver failures are reported through
/// [`crate::domain::FitOutcome`] instead, so a fit that started iterating
/// always returns a definite outcome.
#[derive(Debug, Clone, Error)]
pub enum FitError {
    /// Configuration rejected before any numerical work.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input matrix rejected (shape, sign, or finiteness).
    #[error("invalid input data: {0}")]
    InvalidData(String),

    /// Data admits no meaningful fit (e.g. no clear days to anchor on).
    #[error("degenerate data: {0}")]
    DegenerateData(String),

    /// The backend could not produce a result at all.
    #[error("solver failure in {context}: {message}")]
    Solver { context: &'static str, message: String },

    /// The backend returned a definite but non-optimal status.
    #[error("solver reported {status} in {context}")]
    NonOptimalStatus {
        status: SolverStatus,
        context: &'static str,
    },

    /// Snapshot file could not be read, written, or parsed.
    #[error("snapshot i/o: {0}")]
    Snapshot(String),
}

impl FitError {
    /// Process exit code for the demo binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::InvalidConfig(_) => 2,
            FitError::InvalidData(_) => 3,
            FitError::DegenerateData(_) => 4,
            FitError::Solver { .. } => 5,
            FitError::NonOptimalStatus { .. } => 6,
            FitError::Snapshot(_) => 7,
        }
    }
}
