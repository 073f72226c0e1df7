//! Second finite-difference kernels.
//!
//! Every smoothness penalty in the objective is a norm of a second
//! difference: along the intraday axis for the shape basis, along the day
//! axis for the amplitude basis, and along a 1-D trend in the envelope
//! subproblems. Inputs shorter than three samples have no interior window
//! and produce an empty difference (norm 0) rather than an error.

use nalgebra::{DMatrix, DVector};

/// Stencil of the 1-D second difference.
pub const SECOND_DIFF_STENCIL: [f64; 3] = [1.0, -2.0, 1.0];

/// Second difference down each column: row `i` of the output is
/// `x[i] - 2 x[i+1] + x[i+2]`. Shape `(m-2) x n`.
pub fn row_second_diff(x: &DMatrix<f64>) -> DMatrix<f64> {
    let (m, n) = x.shape();
    if m < 3 {
        return DMatrix::zeros(0, n);
    }
    let mut out = DMatrix::zeros(m - 2, n);
    for j in 0..n {
        for i in 0..m - 2 {
            out[(i, j)] = x[(i, j)] - 2.0 * x[(i + 1, j)] + x[(i + 2, j)];
        }
    }
    out
}

/// Second difference along each row: column `j` of the output is
/// `x[:,j] - 2 x[:,j+1] + x[:,j+2]`. Shape `m x (n-2)`.
pub fn col_second_diff(x: &DMatrix<f64>) -> DMatrix<f64> {
    let (m, n) = x.shape();
    if n < 3 {
        return DMatrix::zeros(m, 0);
    }
    let mut out = DMatrix::zeros(m, n - 2);
    for j in 0..n - 2 {
        for i in 0..m {
            out[(i, j)] = x[(i, j)] - 2.0 * x[(i, j + 1)] + x[(i, j + 2)];
        }
    }
    out
}

/// Second difference of a vector; length `n-2`.
pub fn vec_second_diff(x: &DVector<f64>) -> DVector<f64> {
    let n = x.len();
    if n < 3 {
        return DVector::zeros(0);
    }
    DVector::from_fn(n - 2, |i, _| x[i] - 2.0 * x[i + 1] + x[i + 2])
}
