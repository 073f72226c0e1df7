//! The clear-sky fitting engine.
//!
//! Pipeline, leaf-first:
//! - `timeshift`: realign a systematically rotated measurement matrix
//! - `seed`: SVD starting factors with deterministic sign normalization
//! - `linearize`: smoothed upper-quantile reference trend r0
//! - `weights`: per-day clear-sky confidence scores
//! - `left` / `right`: the two convex half-steps of the alternating fit
//! - `objective`: the joint objective split into named components
//! - `state`: the pure per-iteration snapshot value
//! - `engine`: the orchestrator driving all of the above to a terminal outcome

pub mod engine;
pub mod left;
pub mod linearize;
pub mod objective;
pub mod right;
pub mod seed;
pub mod state;
pub mod timeshift;
pub mod weights;

pub use engine::*;
pub use left::*;
pub use linearize::*;
pub use objective::*;
pub use right::*;
pub use seed::*;
pub use state::*;
pub use timeshift::*;
pub use weights::*;

use crate::error::FitError;
use crate::solver::{SolverReport, SolverStatus};

/// Unwrap a backend report, mapping anything non-optimal to the fatal error
/// taxonomy. Numerical breakdown and definite non-optimal statuses are kept
/// distinct so the orchestrator can report them as different outcomes.
pub(crate) fn take_optimal<T>(
    report: SolverReport<T>,
    context: &'static str,
) -> Result<T, FitError> {
    match report.status {
        SolverStatus::Optimal => report.values.ok_or(FitError::Solver {
            context,
            message: "optimal report carried no values".into(),
        }),
        SolverStatus::SolverError => Err(FitError::Solver {
            context,
            message: report
                .message
                .unwrap_or_else(|| "backend reported a numerical failure".into()),
        }),
        status => Err(FitError::NonOptimalStatus { status, context }),
    }
}
