//! Detection and correction of a systematic intraday timestamp rotation.
//!
//! Clock drift or a misconfigured UTC offset shows up as every day's power
//! curve sitting off-center by the same number of sample slots. We locate each
//! day's energy centroid, take the median across days with nonzero energy, and
//! circularly rotate the rows when the median is at least one full slot away
//! from the grid center. A rotation that leaves the matrix numerically
//! indistinguishable from the input is discarded.

use nalgebra::DMatrix;

use crate::math::median_mut;

/// Elementwise closeness bounds for the "did the rotation change anything"
/// check.
const SHIFT_ABS_TOL: f64 = 1e-8;
const SHIFT_REL_TOL: f64 = 1e-5;

/// Returns the corrected matrix and whether a correction was applied.
pub fn correct_time_shift(power: &DMatrix<f64>) -> (DMatrix<f64>, bool) {
    let (m, n) = power.shape();
    if m < 2 || n == 0 {
        return (power.clone_owned(), false);
    }

    let mut centroids: Vec<f64> = Vec::with_capacity(n);
    for j in 0..n {
        let energy: f64 = power.column(j).sum();
        if energy > 0.0 {
            let moment: f64 = (0..m).map(|i| i as f64 * power[(i, j)]).sum();
            centroids.push(moment / energy);
        }
    }
    let Some(median) = median_mut(&mut centroids) else {
        return (power.clone_owned(), false);
    };

    let center = (m as f64 - 1.0) / 2.0;
    let shift = (center - median).round() as isize;
    if shift == 0 {
        return (power.clone_owned(), false);
    }

    let mut rotated = DMatrix::zeros(m, n);
    for i in 0..m {
        let src = (i as isize - shift).rem_euclid(m as isize) as usize;
        for j in 0..n {
            rotated[(i, j)] = power[(src, j)];
        }
    }

    if indistinguishable(&rotated, power) {
        return (power.clone_owned(), false);
    }
    (rotated, true)
}

fn indistinguishable(a: &DMatrix<f64>, b: &DMatrix<f64>) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(&x, &y)| (x - y).abs() <= SHIFT_ABS_TOL + SHIFT_REL_TOL * y.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bell-shaped day profile centered at `peak`, zero elsewhere.
    fn profile(m: usize, peak: f64, width: f64) -> Vec<f64> {
        (0..m)
            .map(|i| {
                let d = (i as f64 - peak) / width;
                (1.0 - d * d).max(0.0)
            })
            .collect()
    }

    fn matrix_from_profile(profile: &[f64], days: usize) -> DMatrix<f64> {
        DMatrix::from_fn(profile.len(), days, |i, j| {
            profile[i] * (2.0 + 0.1 * j as f64)
        })
    }

    #[test]
    fn centered_data_is_left_alone() {
        let m = 11;
        let d = matrix_from_profile(&profile(m, 5.0, 3.0), 6);
        let (out, corrected) = correct_time_shift(&d);
        assert!(!corrected);
        assert_eq!(out, d);
    }

    #[test]
    fn rotated_data_is_recentered() {
        let m = 12;
        let d = matrix_from_profile(&profile(m, 2.5, 2.0), 8);
        let (out, corrected) = correct_time_shift(&d);
        assert!(corrected);

        let mut centroids: Vec<f64> = (0..8)
            .map(|j| {
                let energy: f64 = out.column(j).sum();
                (0..m).map(|i| i as f64 * out[(i, j)]).sum::<f64>() / energy
            })
            .collect();
        let median = median_mut(&mut centroids).unwrap();
        assert!(
            (median - (m as f64 - 1.0) / 2.0).abs() < 1.0,
            "median centroid {median} still off-center"
        );
    }

    #[test]
    fn sub_slot_offsets_are_not_corrected() {
        let m = 11;
        // Centroid offset well under one slot.
        let d = matrix_from_profile(&profile(m, 5.3, 3.0), 5);
        let (_, corrected) = correct_time_shift(&d);
        assert!(!corrected);
    }

    #[test]
    fn all_zero_input_is_left_alone() {
        let d = DMatrix::zeros(10, 4);
        let (out, corrected) = correct_time_shift(&d);
        assert!(!corrected);
        assert_eq!(out, d);
    }
}
