//! Per-day clear-sky confidence weights.
//!
//! Two signals per day:
//! - temporal consistency: the L1 norm of the intraday second difference.
//!   Clouds make a day jagged, so lower roughness means more likely clear.
//!   Scores are the gap below the median roughness, normalized to [0,1];
//!   days rougher than the median score 0.
//! - energy ratio: total daily energy over its smoothed upper-envelope fit,
//!   clipped to [0,1]. Attenuated days fall well short of the envelope.
//!
//! The signals combine as a weighted geometric mean (energy ratio dominates),
//! and anything below the hard threshold is zeroed outright rather than
//! merely down-weighted. Reserved test days are zeroed last, regardless of
//! score.

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;

use crate::domain::FitConfig;
use crate::error::FitError;
use crate::fit::linearize::{ENVELOPE_SMOOTHNESS, ENVELOPE_TAU};
use crate::fit::take_optimal;
use crate::math::{median_mut, row_second_diff};
use crate::solver::{SolverBackend, TrendProgram};

/// Compute the weight vector for `power` under `config`.
pub fn clear_day_weights<B: SolverBackend>(
    backend: &B,
    power: &DMatrix<f64>,
    config: &FitConfig,
) -> Result<DVector<f64>, FitError> {
    let n = power.ncols();

    let consistency = consistency_scores(power);
    let energy_ratio = energy_ratio_scores(backend, power)?;

    let mut weights = DVector::from_fn(n, |j, _| {
        let w = consistency[j].powf(config.weight_theta)
            * energy_ratio[j].powf(1.0 - config.weight_theta);
        if w < config.weight_threshold { 0.0 } else { w }
    });

    if let Some(holdout) = &config.holdout {
        let count = (holdout.fraction * n as f64).floor() as usize;
        if count > 0 {
            let mut rng = StdRng::seed_from_u64(holdout.seed);
            for j in sample(&mut rng, n, count) {
                weights[j] = 0.0;
            }
        }
    }

    Ok(weights)
}

/// Gap below the median intraday roughness, normalized to [0,1].
fn consistency_scores(power: &DMatrix<f64>) -> Vec<f64> {
    let n = power.ncols();
    let diffs = row_second_diff(power);
    let roughness: Vec<f64> = (0..n)
        .map(|j| diffs.column(j).iter().map(|v| v.abs()).sum())
        .collect();

    let median = median_mut(&mut roughness.clone()).unwrap_or(0.0);
    let gaps: Vec<f64> = roughness.iter().map(|&r| (median - r).max(0.0)).collect();
    let max_gap = gaps.iter().fold(0.0f64, |acc, &g| acc.max(g));
    if max_gap <= 1e-12 {
        // Every day is equally rough; consistency tells us nothing.
        return vec![1.0; n];
    }
    gaps.iter().map(|&g| g / max_gap).collect()
}

/// Daily energy over its smoothed upper envelope, clipped to [0,1].
fn energy_ratio_scores<B: SolverBackend>(
    backend: &B,
    power: &DMatrix<f64>,
) -> Result<Vec<f64>, FitError> {
    let n = power.ncols();
    let energy = DVector::from_fn(n, |j, _| power.column(j).sum());
    let program = TrendProgram {
        target: energy.clone_owned(),
        tau: ENVELOPE_TAU,
        smoothness: ENVELOPE_SMOOTHNESS,
    };
    let envelope = take_optimal(backend.solve_trend(&program), "daily energy envelope")?;

    Ok((0..n)
        .map(|j| {
            if envelope[j] > 1e-12 {
                (energy[j] / envelope[j]).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect())
}
