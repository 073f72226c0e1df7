//! The per-iteration fit snapshot.
//!
//! Every orchestrator step consumes one `FitState` and produces a new one;
//! nothing is mutated in place. The value serializes to JSON, which makes
//! iteration boundaries the safe pause/resume points. The measurement matrix
//! itself is deliberately not part of the snapshot; resuming requires the
//! same input.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::{FitConfig, ResidualStats};
use crate::error::FitError;
use crate::fit::objective::ObjectiveComponents;

/// Sticky anomaly flags; once set they stay set for the rest of the fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitFlags {
    /// The joint objective rose between two iterations.
    pub objective_increased: bool,
    /// The fit-loss component rose between two iterations.
    pub fit_term_increased: bool,
}

/// Complete state of a fit at an iteration boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitState {
    pub config: FitConfig,
    pub iteration: usize,
    pub left: DMatrix<f64>,
    pub right: DMatrix<f64>,
    pub beta: f64,
    /// Smoothed dominant-amplitude reference, refreshed each iteration.
    pub reference_trend: DVector<f64>,
    pub weights: DVector<f64>,
    pub objective: ObjectiveComponents,
    /// Fractional objective improvement of the last step, absolute-valued
    /// when the objective rose; `None` before the first step.
    pub improvement: Option<f64>,
    pub flags: FitFlags,
    /// Populated on successful terminal states only.
    pub residuals: Option<ResidualStats>,
}

impl FitState {
    /// The clear-sky reconstruction `L R`.
    pub fn clear_sky(&self) -> DMatrix<f64> {
        &self.left * &self.right
    }

    pub fn day_count(&self) -> usize {
        self.right.ncols()
    }

    pub fn sample_count(&self) -> usize {
        self.left.nrows()
    }

    /// Days carrying nonzero weight.
    pub fn clear_day_count(&self) -> usize {
        self.weights.iter().filter(|&&w| w > 0.0).count()
    }

    /// Check that this snapshot belongs to `power` before resuming.
    pub(crate) fn validate_against(&self, power: &DMatrix<f64>) -> Result<(), FitError> {
        let (m, n) = power.shape();
        let k = self.config.rank;
        if self.left.shape() != (m, k)
            || self.right.shape() != (k, n)
            || self.weights.len() != n
            || self.reference_trend.len() != n
        {
            return Err(FitError::InvalidData(format!(
                "snapshot factors ({}x{} / {}x{}) do not match a {m}x{n} input at rank {k}",
                self.left.nrows(),
                self.left.ncols(),
                self.right.nrows(),
                self.right.ncols(),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> FitState {
        FitState {
            config: FitConfig {
                rank: 2,
                ..FitConfig::default()
            },
            iteration: 3,
            left: DMatrix::from_row_slice(3, 2, &[0.1, 0.0, 0.9, 0.2, 0.4, -0.2]),
            right: DMatrix::from_row_slice(2, 4, &[2.0, 2.1, 2.2, 2.3, 0.1, 0.0, -0.1, 0.0]),
            beta: -0.05,
            reference_trend: DVector::from_row_slice(&[2.0, 2.1, 2.2, 2.3]),
            weights: DVector::from_row_slice(&[1.0, 0.0, 0.8, 1.0]),
            objective: ObjectiveComponents {
                fit: 1.5,
                left_smoothness: 0.2,
                right_smoothness: 0.3,
                periodicity: 0.0,
            },
            improvement: Some(2e-3),
            flags: FitFlags {
                objective_increased: true,
                fit_term_increased: false,
            },
            residuals: None,
        }
    }

    #[test]
    fn json_round_trip_preserves_the_snapshot() {
        let state = sample_state();
        let json = serde_json::to_string(&state).unwrap();
        let restored: FitState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.iteration, state.iteration);
        assert_eq!(restored.left, state.left);
        assert_eq!(restored.right, state.right);
        assert_eq!(restored.beta, state.beta);
        assert_eq!(restored.weights, state.weights);
        assert_eq!(restored.objective, state.objective);
        assert_eq!(restored.improvement, state.improvement);
        assert_eq!(restored.flags, state.flags);
    }

    #[test]
    fn clear_sky_is_the_factor_product() {
        let state = sample_state();
        let product = state.clear_sky();
        assert_eq!(product.shape(), (3, 4));
        let expected = &state.left * &state.right;
        assert_eq!(product, expected);
    }

    #[test]
    fn mismatched_input_is_rejected() {
        let state = sample_state();
        assert!(state.validate_against(&DMatrix::zeros(3, 4)).is_ok());
        assert!(state.validate_against(&DMatrix::zeros(4, 4)).is_err());
        assert!(state.validate_against(&DMatrix::zeros(3, 5)).is_err());
    }

    #[test]
    fn clear_day_census_skips_zero_weights() {
        assert_eq!(sample_state().clear_day_count(), 3);
    }
}
