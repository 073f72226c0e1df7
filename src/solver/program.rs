//! Typed descriptions of the three convex subproblems.
//!
//! A program struct carries everything a backend needs to pose the problem:
//! the data, the fixed factor, the loss/penalty coefficients, and the
//! constraint selections. It deliberately carries no solver state, so the
//! same description can be handed to different backends.

use nalgebra::{DMatrix, DVector};

/// Lag, in days, of the annual periodicity and degradation coupling.
pub const YEAR_LAG: usize = 365;

/// 1-D upper-envelope trend program:
///
/// ```text
/// minimize  sum_i rho_tau(target_i - x_i) + smoothness * ||second_diff(x)||_2
/// ```
///
/// With `tau` near 1 the optimum tracks the upper quantile of the target,
/// which approximates the unobstructed envelope of a signal that noise can
/// only pull downward.
#[derive(Debug, Clone)]
pub struct TrendProgram {
    pub target: DVector<f64>,
    pub tau: f64,
    pub smoothness: f64,
}

/// Shape-basis program: minimize over `L` (size m×k)
///
/// ```text
/// sum_j w_j sum_i rho_tau(D_ij - (L R)_ij) + smoothness * ||row_second_diff(L)||_F
/// s.t.  L R >= 0;  L[i, :] = 0 for i in zero_rows;  sum_i L[i, c] = 0 for c >= 1
/// ```
///
/// The zero-sum constraint on non-dominant columns removes the rotational
/// ambiguity between the factors: only column 0 may carry net energy.
#[derive(Debug)]
pub struct LeftFactorProgram<'a> {
    pub measurements: &'a DMatrix<f64>,
    pub right: &'a DMatrix<f64>,
    pub weights: &'a DVector<f64>,
    /// Warm start and linearization point.
    pub initial_left: &'a DMatrix<f64>,
    pub tau: f64,
    pub smoothness: f64,
    /// Rows of `L` pinned to zero (dark intraday slots).
    pub zero_rows: &'a [usize],
}

/// Year-lag coupling of the amplitude program's dominant row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DegradationTerm {
    /// The series does not span the lag; no coupling, the rate stays zero.
    Absent,
    /// Coupling enforced with zero drift (rate estimation disabled).
    Zero,
    /// Rate estimated inside the closed interval `[min, max]`.
    Bounded { min: f64, max: f64 },
}

/// Amplitude-basis program: minimize over `R` (size k×n) and, when the
/// degradation term is bounded, the scalar rate `beta`:
///
/// ```text
/// sum_j w_j sum_i rho_tau(D_ij - (L R)_ij)
///   + smoothness * ||col_second_diff(R)||_F
///   + smoothness * ||R[1:, :n-365] - R[1:, 365:]||_F      (when n > 365)
/// s.t.  L R >= 0;
///       R[0, j+365] - R[0, j] = beta * reference_trend[j]  (when coupled)
/// ```
///
/// The year-lag relation makes the dominant amplitude repeat annually up to
/// a single multiplicative drift; non-dominant rows are pulled toward exact
/// annual repetition by the penalty instead.
#[derive(Debug)]
pub struct RightFactorProgram<'a> {
    pub measurements: &'a DMatrix<f64>,
    pub left: &'a DMatrix<f64>,
    pub weights: &'a DVector<f64>,
    /// Warm start and linearization point.
    pub initial_right: &'a DMatrix<f64>,
    pub tau: f64,
    pub smoothness: f64,
    /// Reference dominant-amplitude trend (the previous iteration's r0).
    pub reference_trend: &'a DVector<f64>,
    pub degradation: DegradationTerm,
}
