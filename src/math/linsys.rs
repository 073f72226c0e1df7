//! Linear-system solvers used by the fitting backend.
//!
//! Two shapes of system show up:
//!
//! - dense symmetric systems from the factor subproblems (positive definite
//!   normal matrices, or indefinite KKT blocks when equality constraints are
//!   appended)
//! - pentadiagonal positive definite systems from the 1-D trend subproblem,
//!   where a banded factorization keeps the solve O(n)
//!
//! All solvers return `None` instead of panicking when a factorization
//! breaks down or produces non-finite values; the caller decides whether
//! that is a solver error or grounds for a fallback.

use nalgebra::{DMatrix, DVector};

/// Solve `a x = b` for symmetric positive definite `a`. Tries Cholesky
/// first, falls back to LU for semidefinite edge cases.
pub fn solve_spd(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = a.clone().cholesky() {
        let x = chol.solve(b);
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }
    a.clone()
        .lu()
        .solve(b)
        .filter(|x| x.iter().all(|v| v.is_finite()))
}

/// Solve `a x = b` for symmetric (possibly indefinite) `a`, e.g. KKT
/// systems. Partial-pivot LU first, full pivoting as the slow fallback.
pub fn solve_symmetric(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(x) = a.clone().lu().solve(b) {
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }
    a.clone()
        .full_piv_lu()
        .solve(b)
        .filter(|x| x.iter().all(|v| v.is_finite()))
}

/// Symmetric pentadiagonal system stored by diagonals.
#[derive(Debug, Clone)]
pub struct PentaSystem {
    /// Main diagonal, length `n`.
    pub diag: Vec<f64>,
    /// First off-diagonal, length `n - 1`.
    pub off1: Vec<f64>,
    /// Second off-diagonal, length `n - 2`.
    pub off2: Vec<f64>,
}

impl PentaSystem {
    pub fn len(&self) -> usize {
        self.diag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diag.is_empty()
    }
}

/// Banded Cholesky solve for a positive definite pentadiagonal system, O(n).
///
/// Returns `None` when the factorization breaks down (non-positive pivot) or
/// the band lengths are inconsistent.
pub fn solve_penta_spd(sys: &PentaSystem, rhs: &[f64]) -> Option<Vec<f64>> {
    let n = sys.len();
    if rhs.len() != n
        || sys.off1.len() != n.saturating_sub(1)
        || sys.off2.len() != n.saturating_sub(2)
    {
        return None;
    }
    if n == 0 {
        return Some(Vec::new());
    }

    // Lower factor L: d[i] = L[i][i], e[i] = L[i+1][i], f[i] = L[i+2][i].
    let mut d = vec![0.0; n];
    let mut e = vec![0.0; n.saturating_sub(1)];
    let mut f = vec![0.0; n.saturating_sub(2)];

    for i in 0..n {
        let mut pivot = sys.diag[i];
        if i >= 1 {
            pivot -= e[i - 1] * e[i - 1];
        }
        if i >= 2 {
            pivot -= f[i - 2] * f[i - 2];
        }
        if !(pivot > 0.0) || !pivot.is_finite() {
            return None;
        }
        d[i] = pivot.sqrt();
        if i + 1 < n {
            let mut v = sys.off1[i];
            if i >= 1 {
                v -= e[i - 1] * f[i - 1];
            }
            e[i] = v / d[i];
        }
        if i + 2 < n {
            f[i] = sys.off2[i] / d[i];
        }
    }

    // Forward substitution L y = rhs.
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut v = rhs[i];
        if i >= 1 {
            v -= e[i - 1] * y[i - 1];
        }
        if i >= 2 {
            v -= f[i - 2] * y[i - 2];
        }
        y[i] = v / d[i];
    }

    // Back substitution L^T x = y.
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut v = y[i];
        if i + 1 < n {
            v -= e[i] * x[i + 1];
        }
        if i + 2 < n {
            v -= f[i] * x[i + 2];
        }
        x[i] = v / d[i];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spd_solve_recovers_known_solution() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let x_true = DVector::from_row_slice(&[1.0, -2.0]);
        let b = &a * &x_true;
        let x = solve_spd(&a, &b).unwrap();
        assert!((x - x_true).amax() < 1e-10);
    }

    #[test]
    fn symmetric_solve_handles_indefinite_kkt_blocks() {
        // [[2, 1], [1, 0]] is indefinite but nonsingular.
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 0.0]);
        let b = DVector::from_row_slice(&[3.0, 1.0]);
        let x = solve_symmetric(&a, &b).unwrap();
        assert!(((&a * &x) - &b).amax() < 1e-10);
    }

    #[test]
    fn penta_solve_matches_dense_solve() {
        let n = 12;
        // Diagonally dominant bands: strictly positive definite.
        let sys = PentaSystem {
            diag: (0..n).map(|i| 8.0 + i as f64 * 0.1).collect(),
            off1: (0..n - 1).map(|i| -2.0 + 0.05 * i as f64).collect(),
            off2: (0..n - 2).map(|_| 1.0).collect(),
        };
        let mut dense = DMatrix::zeros(n, n);
        for i in 0..n {
            dense[(i, i)] = sys.diag[i];
            if i + 1 < n {
                dense[(i, i + 1)] = sys.off1[i];
                dense[(i + 1, i)] = sys.off1[i];
            }
            if i + 2 < n {
                dense[(i, i + 2)] = sys.off2[i];
                dense[(i + 2, i)] = sys.off2[i];
            }
        }
        let rhs: Vec<f64> = (0..n).map(|i| (i as f64).sin() + 1.0).collect();

        let banded = solve_penta_spd(&sys, &rhs).unwrap();
        let dense_x = solve_spd(&dense, &DVector::from_row_slice(&rhs)).unwrap();
        for i in 0..n {
            assert!((banded[i] - dense_x[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn penta_solve_rejects_indefinite_systems() {
        let sys = PentaSystem {
            diag: vec![1.0, -1.0, 1.0],
            off1: vec![0.0, 0.0],
            off2: vec![0.0],
        };
        assert!(solve_penta_spd(&sys, &[1.0, 1.0, 1.0]).is_none());
    }
}
