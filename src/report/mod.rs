//! Post-fit diagnostics: residual statistics and formatted terminal output.

pub mod format;

pub use format::*;

use nalgebra::{DMatrix, DVector};

use crate::domain::ResidualStats;
use crate::fit::FitState;
use crate::math::{mean, median_mut, population_variance};

/// Weighted-residual columns whose sum is this close to zero carry no
/// signal; those days are left out of the statistics.
const SILENT_DAY_TOL: f64 = 1e-8;

/// Entries at or below this power level are excluded. Residuals at dark
/// samples say nothing about fit quality.
const DARK_ENTRY_FLOOR: f64 = 1e-3;

const TINY_SCALE: f64 = 1e-12;

/// Summarize how the reconstruction deviates from the measurements on the
/// days that carried weight.
///
/// Residuals are weighted per day, restricted to days whose weighted
/// residual column is not identically zero, normalized by the mean measured
/// power over those days, and further restricted to daylight entries. The
/// seed distance measures how far the dominant shape moved from its SVD
/// starting point.
pub fn analyze_residuals(
    power: &DMatrix<f64>,
    state: &FitState,
    seed_dominant: &DVector<f64>,
) -> ResidualStats {
    let (m, n) = power.shape();
    let reconstruction = state.clear_sky();

    let mut moved = state.left.column(0).clone_owned();
    moved -= seed_dominant;
    let seed_distance = moved.norm();

    let mut kept_days: Vec<usize> = Vec::new();
    for j in 0..n {
        let weighted_sum: f64 = (0..m)
            .map(|i| (reconstruction[(i, j)] - power[(i, j)]) * state.weights[j])
            .sum();
        if weighted_sum.abs() > SILENT_DAY_TOL {
            kept_days.push(j);
        }
    }

    let mut kept_power: Vec<f64> = Vec::with_capacity(kept_days.len() * m);
    for &j in &kept_days {
        for i in 0..m {
            kept_power.push(power[(i, j)]);
        }
    }
    let scale = mean(&kept_power).unwrap_or(0.0);
    if scale.abs() <= TINY_SCALE {
        return ResidualStats {
            median: 0.0,
            variance: 0.0,
            seed_distance,
        };
    }

    let mut scaled: Vec<f64> = Vec::new();
    for &j in &kept_days {
        for i in 0..m {
            if power[(i, j)] > DARK_ENTRY_FLOOR {
                let weighted = (reconstruction[(i, j)] - power[(i, j)]) * state.weights[j];
                scaled.push(weighted / scale);
            }
        }
    }

    let variance = population_variance(&scaled).unwrap_or(0.0);
    let median = median_mut(&mut scaled).unwrap_or(0.0);
    ResidualStats {
        median,
        variance,
        seed_distance,
    }
}
