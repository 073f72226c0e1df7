//! Smoothed upper-quantile reference trend.
//!
//! The dominant amplitude row of the seed is noisy: cloudy days pull it down,
//! never up. Denoising it with a biased-high quantile loss plus a
//! second-difference roughness penalty yields r0, an estimate of the
//! "almost certainly clear" amplitude envelope. r0 seeds the degradation
//! constraint and is refreshed from the fitted amplitude row each iteration.

use nalgebra::DVector;

use crate::error::FitError;
use crate::fit::take_optimal;
use crate::solver::{SolverBackend, TrendProgram};

/// Quantile level of the envelope subproblem.
pub(crate) const ENVELOPE_TAU: f64 = 0.9;
/// Roughness coefficient of the envelope subproblem.
pub(crate) const ENVELOPE_SMOOTHNESS: f64 = 1e3;

/// Fit the smoothed upper-quantile trend of `seed_row`.
pub fn reference_trend<B: SolverBackend>(
    backend: &B,
    seed_row: &DVector<f64>,
) -> Result<DVector<f64>, FitError> {
    let program = TrendProgram {
        target: seed_row.clone_owned(),
        tau: ENVELOPE_TAU,
        smoothness: ENVELOPE_SMOOTHNESS,
    };
    take_optimal(backend.solve_trend(&program), "reference trend")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::IrlsBackend;

    #[test]
    fn trend_of_a_constant_is_the_constant() {
        let seed = DVector::from_element(25, 4.0);
        let trend = reference_trend(&IrlsBackend::default(), &seed).unwrap();
        assert!((trend - seed).amax() < 1e-4);
    }

    #[test]
    fn trend_tracks_the_upper_envelope_of_dipped_data() {
        // Smooth ramp with cloudy-day dips; the trend should follow the ramp.
        let clear = DVector::from_fn(40, |j, _| 3.0 + 0.02 * j as f64);
        let mut seed = clear.clone();
        for &j in &[3usize, 9, 16, 24, 31, 37] {
            seed[j] *= 0.5;
        }
        let trend = reference_trend(&IrlsBackend::default(), &seed).unwrap();
        for j in 0..40 {
            assert!(
                (trend[j] - clear[j]).abs() < 0.15,
                "trend missed the envelope at day {j}: {} vs {}",
                trend[j],
                clear[j]
            );
        }
    }
}
