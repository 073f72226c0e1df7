//! Right half-step: re-fit the amplitude basis, and the degradation rate
//! when the series is long enough, with the shape basis held fixed.

use nalgebra::{DMatrix, DVector};

use crate::domain::FitConfig;
use crate::error::FitError;
use crate::fit::take_optimal;
use crate::solver::{DegradationTerm, RightFactorProgram, SolverBackend, YEAR_LAG};

/// Result of one amplitude step. The reference trend is refreshed from the
/// new dominant row for the next iteration's degradation coupling.
#[derive(Debug, Clone)]
pub struct RightStep {
    pub right: DMatrix<f64>,
    pub beta: f64,
    pub reference_trend: DVector<f64>,
}

/// Year-lag handling for an `n`-day series under `config`: series no longer
/// than one year carry no coupling at all and the rate stays zero.
pub fn degradation_term(n: usize, config: &FitConfig) -> DegradationTerm {
    if n <= YEAR_LAG {
        DegradationTerm::Absent
    } else if config.degradation.enabled {
        DegradationTerm::Bounded {
            min: config.degradation.min_rate,
            max: config.degradation.max_rate,
        }
    } else {
        DegradationTerm::Zero
    }
}

/// Solve the amplitude subproblem. Any non-optimal backend status is fatal
/// to the fit attempt.
pub fn minimize_right<B: SolverBackend>(
    backend: &B,
    power: &DMatrix<f64>,
    left: &DMatrix<f64>,
    weights: &DVector<f64>,
    initial: &DMatrix<f64>,
    reference_trend: &DVector<f64>,
    config: &FitConfig,
) -> Result<RightStep, FitError> {
    let program = RightFactorProgram {
        measurements: power,
        left,
        weights,
        initial_right: initial,
        tau: config.tau,
        smoothness: config.mu_right,
        reference_trend,
        degradation: degradation_term(power.ncols(), config),
    };
    let solution = take_optimal(backend.solve_right(&program), "right factor step")?;
    let reference_trend = solution.right.row(0).transpose();

    Ok(RightStep {
        right: solution.right,
        beta: solution.beta,
        reference_trend,
    })
}
