//! The joint objective, split into its named components.
//!
//! Convergence is judged on the joint objective, never on the subproblem
//! objectives, so this evaluator is independent of which side was minimized
//! last.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::FitConfig;
use crate::math::{col_second_diff, row_second_diff, weighted_quantile_sum};
use crate::solver::YEAR_LAG;

/// Component terms of the joint objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveComponents {
    /// Day-weighted quantile loss between the measurements and `L R`.
    pub fit: f64,
    /// Shape-basis smoothness along the intraday axis.
    pub left_smoothness: f64,
    /// Amplitude-basis smoothness along the day axis.
    pub right_smoothness: f64,
    /// Annual repetition of the non-dominant amplitude rows; exactly zero for
    /// series shorter than two overlapping lag windows and for rank-1 fits.
    pub periodicity: f64,
}

impl ObjectiveComponents {
    pub fn total(&self) -> f64 {
        self.fit + self.left_smoothness + self.right_smoothness + self.periodicity
    }
}

/// Evaluate all four components for `(left, right)` under `weights`.
pub fn evaluate_objective(
    power: &DMatrix<f64>,
    left: &DMatrix<f64>,
    right: &DMatrix<f64>,
    weights: &DVector<f64>,
    config: &FitConfig,
) -> ObjectiveComponents {
    let reconstruction = left * right;
    let fit = weighted_quantile_sum(power, &reconstruction, weights, config.tau);
    let left_smoothness = config.mu_left * row_second_diff(left).norm();
    let right_smoothness = config.mu_right * col_second_diff(right).norm();
    let periodicity = config.mu_right * periodicity_norm(right);

    ObjectiveComponents {
        fit,
        left_smoothness,
        right_smoothness,
        periodicity,
    }
}

/// Frobenius norm of `R[1:, :n-365] - R[1:, 365:]`, zero when the overlap is
/// shorter than two days or there are no non-dominant rows.
fn periodicity_norm(right: &DMatrix<f64>) -> f64 {
    let (k, n) = right.shape();
    if k <= 1 || n < YEAR_LAG + 2 {
        return 0.0;
    }
    let mut ss = 0.0;
    for c in 1..k {
        for j in 0..n - YEAR_LAG {
            let v = right[(c, j)] - right[(c, j + YEAR_LAG)];
            ss += v * v;
        }
    }
    ss.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> FitConfig {
        FitConfig {
            mu_left: 2.0,
            mu_right: 3.0,
            tau: 0.8,
            ..FitConfig::default()
        }
    }

    #[test]
    fn components_match_hand_computed_values() {
        let power = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let left = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 4.0]);
        let right = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let weights = DVector::from_row_slice(&[1.0, 0.5]);
        let config = small_config();

        let obj = evaluate_objective(&power, &left, &right, &weights, &config);

        // Residuals col 0: 0, 1, 1; col 1: 1, 2, 2. rho_0.8(r) = 0.8 r for r > 0.
        let expected_fit = 1.0 * (0.8 + 0.8) + 0.5 * (0.8 + 1.6 + 1.6);
        assert!((obj.fit - expected_fit).abs() < 1e-12);
        // Second difference of [1, 2, 4] is [1]; scaled by mu_left = 2.
        assert!((obj.left_smoothness - 2.0).abs() < 1e-12);
        // Two columns: no day-axis second difference.
        assert_eq!(obj.right_smoothness, 0.0);
        assert_eq!(obj.periodicity, 0.0);
        assert!((obj.total() - (expected_fit + 2.0)).abs() < 1e-12);
    }

    #[test]
    fn periodicity_is_zero_for_short_series_and_rank_one() {
        let power = DMatrix::from_element(4, 366, 1.0);
        let left = DMatrix::from_element(4, 1, 0.5);
        let right = DMatrix::from_element(1, 366, 2.0);
        let weights = DVector::from_element(366, 1.0);
        let obj = evaluate_objective(&power, &left, &right, &weights, &small_config());
        assert_eq!(obj.periodicity, 0.0);

        let left2 = DMatrix::from_element(4, 2, 0.5);
        let right2 = DMatrix::from_element(2, 366, 2.0);
        let obj2 = evaluate_objective(&power, &left2, &right2, &weights, &small_config());
        assert_eq!(obj2.periodicity, 0.0);
    }

    #[test]
    fn periodicity_measures_the_year_lag_mismatch() {
        let n = YEAR_LAG + 3;
        let mut right = DMatrix::from_element(2, n, 1.0);
        // Row 1 drifts by 0.5 across the lag on two overlap days.
        right[(1, YEAR_LAG)] = 1.5;
        right[(1, YEAR_LAG + 1)] = 1.5;
        let power = DMatrix::from_element(4, n, 1.0);
        let left = DMatrix::from_element(4, 2, 0.5);
        let weights = DVector::from_element(n, 1.0);

        let obj = evaluate_objective(&power, &left, &right, &weights, &small_config());
        let expected = 3.0 * (0.25f64 + 0.25).sqrt();
        assert!((obj.periodicity - expected).abs() < 1e-9);
    }
}
