//! Convex-subproblem seam.
//!
//! The fitting loop never talks to a concrete optimizer. It describes one of
//! three convex program families (the 1-D envelope trend, the shape-basis
//! step, and the amplitude-basis step) and hands the description to a
//! [`SolverBackend`], which answers with a status and, when optimal, the
//! variable values. This keeps the iteration logic independent of how the
//! programs are solved; [`IrlsBackend`] is the reference implementation and
//! the default.

pub mod irls;
pub mod program;

pub use irls::*;
pub use program::*;

use nalgebra::{DMatrix, DVector};

/// Status of one backend solve.
///
/// Anything other than `Optimal` must be treated as an error by the caller;
/// values are never silently substituted. `Infeasible` and `Unbounded` are
/// reserved for backends that can certify them; the reference backend only
/// produces `Optimal`, `SolverError`, and `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Optimal,
    Infeasible,
    Unbounded,
    SolverError,
    Other,
}

impl SolverStatus {
    pub fn is_optimal(self) -> bool {
        self == SolverStatus::Optimal
    }
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::Infeasible => "infeasible",
            SolverStatus::Unbounded => "unbounded",
            SolverStatus::SolverError => "solver error",
            SolverStatus::Other => "other",
        };
        f.write_str(name)
    }
}

/// Outcome of one backend call: a status, values when the status allows
/// them, the inner iteration count, and an optional diagnostic message.
#[derive(Debug, Clone)]
pub struct SolverReport<T> {
    pub status: SolverStatus,
    pub values: Option<T>,
    pub iterations: usize,
    pub message: Option<String>,
}

impl<T> SolverReport<T> {
    pub fn optimal(values: T, iterations: usize) -> Self {
        Self {
            status: SolverStatus::Optimal,
            values: Some(values),
            iterations,
            message: None,
        }
    }

    pub fn failed(status: SolverStatus, iterations: usize, message: impl Into<String>) -> Self {
        Self {
            status,
            values: None,
            iterations,
            message: Some(message.into()),
        }
    }
}

/// Solution of the amplitude-side program: the right factor together with
/// the degradation rate (zero whenever the rate was not a decision variable).
#[derive(Debug, Clone)]
pub struct RightFactorSolution {
    pub right: DMatrix<f64>,
    pub beta: f64,
}

/// One way of solving all three program families.
///
/// Implementations may be internally parallel; from the caller's side each
/// method is a single blocking call.
pub trait SolverBackend {
    /// Solve the 1-D quantile-trend program.
    fn solve_trend(&self, program: &TrendProgram) -> SolverReport<DVector<f64>>;

    /// Solve the shape-basis program (left factor, right factor fixed).
    fn solve_left(&self, program: &LeftFactorProgram<'_>) -> SolverReport<DMatrix<f64>>;

    /// Solve the amplitude-basis program (right factor and degradation rate,
    /// left factor fixed).
    fn solve_right(&self, program: &RightFactorProgram<'_>) -> SolverReport<RightFactorSolution>;
}
