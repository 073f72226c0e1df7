//! Asymmetric quantile (pinball) loss.
//!
//! Written as `0.5 |r| + (tau - 0.5) r`, which equals `tau * r` for positive
//! residuals and `(tau - 1) * r` for negative ones. With `tau` close to 1,
//! underestimating the data costs far more than overestimating it, so a
//! minimizer hugs the upper envelope; obstructions can only ever pull
//! measurements *down* from the clear-sky baseline.

use nalgebra::{DMatrix, DVector};

/// Pinball loss of a single residual.
#[inline]
pub fn quantile_loss(residual: f64, tau: f64) -> f64 {
    0.5 * residual.abs() + (tau - 0.5) * residual
}

/// Day-weighted pinball loss between an observed matrix and its fit:
/// `sum_j w_j * sum_i loss(observed_ij - fitted_ij)`.
pub fn weighted_quantile_sum(
    observed: &DMatrix<f64>,
    fitted: &DMatrix<f64>,
    weights: &DVector<f64>,
    tau: f64,
) -> f64 {
    debug_assert_eq!(observed.shape(), fitted.shape());
    debug_assert_eq!(observed.ncols(), weights.len());

    let mut total = 0.0;
    for j in 0..observed.ncols() {
        let w = weights[j];
        if w == 0.0 {
            continue;
        }
        let mut day = 0.0;
        for i in 0..observed.nrows() {
            day += quantile_loss(observed[(i, j)] - fitted[(i, j)], tau);
        }
        total += w * day;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_is_piecewise_linear_in_tau() {
        let tau = 0.9;
        assert!((quantile_loss(1.0, tau) - 0.9).abs() < 1e-12);
        assert!((quantile_loss(-1.0, tau) - 0.1).abs() < 1e-12);
        assert_eq!(quantile_loss(0.0, tau), 0.0);
    }

    #[test]
    fn high_tau_penalizes_underestimation() {
        // Positive residual = data above fit = fit underestimates.
        let tau = 0.95;
        assert!(quantile_loss(1.0, tau) > quantile_loss(-1.0, tau));
    }

    #[test]
    fn weighted_sum_skips_zero_weight_days() {
        let observed = DMatrix::from_row_slice(2, 2, &[1.0, 5.0, 2.0, 7.0]);
        let fitted = DMatrix::zeros(2, 2);
        let weights = DVector::from_row_slice(&[1.0, 0.0]);
        let total = weighted_quantile_sum(&observed, &fitted, &weights, 0.5);
        // tau = 0.5 degenerates to half the weighted L1 norm of day 0.
        assert!((total - 0.5 * 3.0).abs() < 1e-12);
    }
}
