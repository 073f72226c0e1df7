//! Left half-step: re-fit the intraday shape basis with the amplitudes held
//! fixed.

use nalgebra::{DMatrix, DVector};

use crate::domain::FitConfig;
use crate::error::FitError;
use crate::fit::take_optimal;
use crate::solver::{LeftFactorProgram, SolverBackend};

/// Rows of the measurement matrix averaging at or below this are nighttime
/// cadence slots and contribute nothing to the shape basis.
pub const DARK_ROW_MEAN: f64 = 1e-5;

/// Indices of dark rows in `power`.
pub fn dark_rows(power: &DMatrix<f64>) -> Vec<usize> {
    let (m, n) = power.shape();
    (0..m)
        .filter(|&i| power.row(i).sum() / n as f64 <= DARK_ROW_MEAN)
        .collect()
}

/// Solve the shape-basis subproblem. Any non-optimal backend status is fatal
/// to the fit attempt.
pub fn minimize_left<B: SolverBackend>(
    backend: &B,
    power: &DMatrix<f64>,
    right: &DMatrix<f64>,
    weights: &DVector<f64>,
    initial: &DMatrix<f64>,
    config: &FitConfig,
    zero_rows: &[usize],
) -> Result<DMatrix<f64>, FitError> {
    let program = LeftFactorProgram {
        measurements: power,
        right,
        weights,
        initial_left: initial,
        tau: config.tau,
        smoothness: config.mu_left,
        zero_rows,
    };
    take_optimal(backend.solve_left(&program), "left factor step")
}
