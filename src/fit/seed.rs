//! SVD starting factors.
//!
//! The fit is seeded from a full singular value decomposition of the
//! measurement matrix: `L0 = U_k`, `R0 = diag(S_k) V_k`. The dominant
//! singular pair of a nonnegative matrix is determined only up to sign, so
//! the seed is normalized: when column 0 of `U` sums negative, that column
//! and the matching row of `V` are both negated, keeping the dominant shape
//! aligned with positive daytime power.

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;

/// Starting factors plus the dominant seed column retained as the baseline
/// for the drift-from-seed diagnostic.
#[derive(Debug, Clone)]
pub struct SeedFactors {
    pub left: DMatrix<f64>,
    pub right: DMatrix<f64>,
    pub dominant: DVector<f64>,
}

/// Compute rank-`rank` starting factors for `power`.
pub fn seed_factors(power: &DMatrix<f64>, rank: usize) -> Result<SeedFactors, FitError> {
    let (m, n) = power.shape();
    if rank == 0 || rank > m.min(n) {
        return Err(FitError::InvalidData(format!(
            "rank {rank} out of range for a {m}x{n} matrix"
        )));
    }

    let svd = power
        .clone_owned()
        .try_svd(true, true, f64::EPSILON, 0)
        .ok_or_else(|| {
            FitError::DegenerateData("singular value decomposition did not converge".into())
        })?;
    // Requested up front, so both are present.
    let mut u = svd.u.ok_or_else(|| {
        FitError::DegenerateData("singular value decomposition returned no left vectors".into())
    })?;
    let mut v_t = svd.v_t.ok_or_else(|| {
        FitError::DegenerateData("singular value decomposition returned no right vectors".into())
    })?;
    let sigma = svd.singular_values;

    if u.column(0).sum() < 0.0 {
        u.column_mut(0).neg_mut();
        v_t.row_mut(0).neg_mut();
    }

    let left = u.columns(0, rank).into_owned();
    let mut right = DMatrix::zeros(rank, n);
    for c in 0..rank {
        right.row_mut(c).copy_from(&(v_t.row(c) * sigma[c]));
    }
    let dominant = left.column(0).into_owned();

    Ok(SeedFactors {
        left,
        right,
        dominant,
    })
}
