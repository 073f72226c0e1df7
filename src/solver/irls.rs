//! Reference solver backend: majorize-minimize with iteratively reweighted
//! least squares.
//!
//! Each program is solved by repeating two moves until the objective stalls:
//!
//! - majorize: replace every pinball term `rho_tau(r)` by the quadratic
//!   `r^2/(4a) + (tau - 0.5) r + a/4` at `a = max(|r_hat|, floor)`, and every
//!   unsquared norm penalty `||z||` by `||z||^2/(2b) + b/2` at
//!   `b = max(||z_hat||, floor)`; both touch the true term at the current
//!   iterate and never fall below it;
//! - minimize: solve the resulting linear system (banded Cholesky for the
//!   1-D trend, dense Cholesky/LU with KKT rows for the factor steps).
//!
//! Equality handling: zero-sum columns enter as KKT constraint rows; the
//! year-lag relation `r[j+365] = r[j] + beta * r0[j]` is eliminated affinely,
//! parameterizing the dominant row by its first 365 entries plus the rate.
//! The rate bound is enforced by clamp-and-resolve, which is exact for a
//! single box variable. `L R >= 0` uses a quadratic penalty on the active
//! violation set, escalated while violations persist.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::math::{
    PentaSystem, SECOND_DIFF_STENCIL, col_second_diff, quantile_loss, row_second_diff, solve_penta_spd,
    solve_spd, solve_symmetric, vec_second_diff, weighted_quantile_sum,
};
use crate::solver::program::{
    DegradationTerm, LeftFactorProgram, RightFactorProgram, TrendProgram, YEAR_LAG,
};
use crate::solver::{RightFactorSolution, SolverBackend, SolverReport, SolverStatus};

/// Inner-loop knobs.
#[derive(Debug, Clone)]
pub struct IrlsOptions {
    /// Cap on majorize-minimize iterations per solve.
    pub max_iterations: usize,
    /// Relative objective change below which the inner loop stops.
    pub tolerance: f64,
    /// A capped run still counts as optimal if its last relative change is
    /// below this looser bound.
    pub loose_tolerance: f64,
    /// Residual floor of the quadratic majorizer, relative to data scale.
    pub residual_floor: f64,
    /// Nonnegativity penalty weight, relative to data scale.
    pub nonneg_penalty: f64,
    /// Multiplier applied to the penalty while violations persist.
    pub penalty_growth: f64,
    /// Penalty escalation rounds allowed after the first converged solve.
    pub escalation_rounds: usize,
    /// Violation tolerance relative to data scale.
    pub violation_tol: f64,
    /// Relative ridge stabilizing near-semidefinite systems.
    pub ridge: f64,
}

impl Default for IrlsOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-9,
            loose_tolerance: 1e-5,
            residual_floor: 1e-6,
            nonneg_penalty: 1e6,
            penalty_growth: 32.0,
            escalation_rounds: 4,
            violation_tol: 1e-7,
            ridge: 1e-12,
        }
    }
}

/// The reference backend. Stateless across solves apart from its options.
#[derive(Debug, Clone, Default)]
pub struct IrlsBackend {
    options: IrlsOptions,
}

impl IrlsBackend {
    pub fn new(options: IrlsOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &IrlsOptions {
        &self.options
    }
}

/// Mean absolute value with a positive floor; the unit all relative knobs
/// are measured against.
fn data_scale<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v.abs();
        count += 1;
    }
    if count == 0 {
        return 1e-12;
    }
    (sum / count as f64).max(1e-12)
}

fn relative_change(old: f64, new: f64) -> f64 {
    (old - new).abs() / old.abs().max(1e-12)
}

/// Sum of squared negative parts; zero iff the matrix is elementwise
/// nonnegative.
fn negative_part_sq(m: &DMatrix<f64>) -> f64 {
    m.iter().map(|&v| v.min(0.0)).map(|v| v * v).sum()
}

fn worst_violation(m: &DMatrix<f64>) -> f64 {
    m.iter().fold(0.0f64, |acc, &v| acc.max(-v))
}

/// Pentadiagonal bands of the second-difference normal matrix.
fn trend_gram_bands(n: usize) -> PentaSystem {
    let mut sys = PentaSystem {
        diag: vec![0.0; n],
        off1: vec![0.0; n.saturating_sub(1)],
        off2: vec![0.0; n.saturating_sub(2)],
    };
    if n < 3 {
        return sys;
    }
    for r in 0..n - 2 {
        for (a, &ca) in SECOND_DIFF_STENCIL.iter().enumerate() {
            for (b, &cb) in SECOND_DIFF_STENCIL.iter().enumerate() {
                match b as isize - a as isize {
                    0 => sys.diag[r + a] += ca * cb,
                    1 => sys.off1[r + a] += ca * cb,
                    2 => sys.off2[r + a] += ca * cb,
                    _ => {}
                }
            }
        }
    }
    sys
}

/// Sparse coefficient list for one scalar term, merging duplicate indices
/// (wrapped year-lag windows can hit the same head entry more than once).
struct CoefBuffer {
    entries: Vec<(usize, f64)>,
}

impl CoefBuffer {
    fn new() -> Self {
        Self {
            entries: Vec::with_capacity(8),
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn push(&mut self, index: usize, coef: f64) {
        if coef == 0.0 {
            return;
        }
        for entry in &mut self.entries {
            if entry.0 == index {
                entry.1 += coef;
                return;
            }
        }
        self.entries.push((index, coef));
    }

    fn as_slice(&self) -> &[(usize, f64)] {
        &self.entries
    }
}

/// Dense quadratic model `min 0.5-ish x^T H x - rhs^T x` accumulated from
/// scalar terms; solved as `H x = rhs`.
struct QuadraticModel {
    h: DMatrix<f64>,
    rhs: DVector<f64>,
}

impl QuadraticModel {
    fn new(size: usize) -> Self {
        Self {
            h: DMatrix::zeros(size, size),
            rhs: DVector::zeros(size),
        }
    }

    /// Add `q (target - a^T x)^2 + l (target - a^T x)`.
    fn add_loss_term(&mut self, coefs: &[(usize, f64)], target: f64, q: f64, l: f64) {
        for &(i, ci) in coefs {
            self.rhs[i] += (2.0 * q * target + l) * ci;
            for &(j, cj) in coefs {
                self.h[(i, j)] += 2.0 * q * ci * cj;
            }
        }
    }

    /// Add `c (a^T x - target)^2`.
    fn add_quadratic_term(&mut self, coefs: &[(usize, f64)], target: f64, c: f64) {
        for &(i, ci) in coefs {
            self.rhs[i] += 2.0 * c * target * ci;
            for &(j, cj) in coefs {
                self.h[(i, j)] += 2.0 * c * ci * cj;
            }
        }
    }

    fn add_ridge(&mut self, relative: f64) {
        let bound = self.h.diagonal().amax();
        if !(bound > 0.0) {
            return;
        }
        let ridge = relative * bound;
        for i in 0..self.h.nrows() {
            self.h[(i, i)] += ridge;
        }
    }

    fn solve(&self) -> Option<DVector<f64>> {
        solve_spd(&self.h, &self.rhs)
    }

    /// Solve with zero-sum equality constraints appended as KKT rows; each
    /// group is a set of unknown indices whose values must sum to zero.
    fn solve_with_zero_sums(&self, groups: &[Vec<usize>]) -> Option<DVector<f64>> {
        if groups.is_empty() {
            return self.solve();
        }
        let p = self.h.nrows();
        let c = groups.len();
        let mut kkt = DMatrix::zeros(p + c, p + c);
        kkt.view_mut((0, 0), (p, p)).copy_from(&self.h);
        for (row, group) in groups.iter().enumerate() {
            for &i in group {
                kkt[(p + row, i)] = 1.0;
                kkt[(i, p + row)] = 1.0;
            }
        }
        let mut rhs = DVector::zeros(p + c);
        rhs.rows_mut(0, p).copy_from(&self.rhs);
        let solution = solve_symmetric(&kkt, &rhs)?;
        Some(solution.rows(0, p).into_owned())
    }

    /// Solve with one unknown pinned to a fixed value.
    fn solve_with_pinned(&self, pin: usize, value: f64) -> Option<DVector<f64>> {
        let p = self.h.nrows();
        let keep: Vec<usize> = (0..p).filter(|&i| i != pin).collect();
        let mut h = DMatrix::zeros(p - 1, p - 1);
        let mut rhs = DVector::zeros(p - 1);
        for (a, &i) in keep.iter().enumerate() {
            rhs[a] = self.rhs[i] - self.h[(i, pin)] * value;
            for (b, &j) in keep.iter().enumerate() {
                h[(a, b)] = self.h[(i, j)];
            }
        }
        let reduced = solve_spd(&h, &rhs)?;
        let mut full = DVector::zeros(p);
        for (a, &i) in keep.iter().enumerate() {
            full[i] = reduced[a];
        }
        full[pin] = value;
        Some(full)
    }
}

/// Unknown layout of the amplitude program after the year-lag elimination.
///
/// Row 0 is parameterized by `head` free entries plus (optionally) the rate:
/// `R[0, j] = x[head_index[j]] + beta * drift[j]`, where `drift` accumulates
/// the reference trend across whole-year hops. Rows 1..k are stored densely
/// after the head block; the rate, when present, is the last unknown.
struct RightLayout {
    head: usize,
    n: usize,
    free_rows: usize,
    beta_index: Option<usize>,
    head_index: Vec<usize>,
    drift: Vec<f64>,
}

impl RightLayout {
    fn new(n: usize, k: usize, degradation: DegradationTerm, reference: &DVector<f64>) -> Self {
        let coupled = !matches!(degradation, DegradationTerm::Absent);
        let head = if coupled { YEAR_LAG.min(n) } else { n };
        let has_beta = matches!(degradation, DegradationTerm::Bounded { .. });

        let mut head_index = vec![0usize; n];
        let mut drift = vec![0.0f64; n];
        for j in 0..n {
            if j < head {
                head_index[j] = j;
            } else {
                head_index[j] = head_index[j - YEAR_LAG];
                drift[j] = drift[j - YEAR_LAG] + reference[j - YEAR_LAG];
            }
        }

        let free_rows = k - 1;
        Self {
            head,
            n,
            free_rows,
            beta_index: has_beta.then_some(head + free_rows * n),
            head_index,
            drift,
        }
    }

    fn size(&self) -> usize {
        self.head + self.free_rows * self.n + usize::from(self.beta_index.is_some())
    }

    fn push_entry(&self, buf: &mut CoefBuffer, row: usize, day: usize, coef: f64) {
        if row == 0 {
            buf.push(self.head_index[day], coef);
            if let Some(beta) = self.beta_index {
                if self.drift[day] != 0.0 {
                    buf.push(beta, coef * self.drift[day]);
                }
            }
        } else {
            buf.push(self.head + (row - 1) * self.n + day, coef);
        }
    }

    fn reconstruct(&self, x: &DVector<f64>, k: usize) -> (DMatrix<f64>, f64) {
        let beta = self.beta_index.map_or(0.0, |b| x[b]);
        let mut right = DMatrix::zeros(k, self.n);
        for j in 0..self.n {
            right[(0, j)] = x[self.head_index[j]] + beta * self.drift[j];
            for c in 1..k {
                right[(c, j)] = x[self.head + (c - 1) * self.n + j];
            }
        }
        (right, beta)
    }
}

/// Frobenius norm of the year-lag mismatch of the non-dominant rows.
fn lag_mismatch_norm(right: &DMatrix<f64>) -> f64 {
    let (k, n) = right.shape();
    if k <= 1 || n <= YEAR_LAG {
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

impl SolverBackend for IrlsBackend {
    fn solve_trend(&self, program: &TrendProgram) -> SolverReport<DVector<f64>> {
        let y = &program.target;
        let n = y.len();
        if !(program.tau > 0.0 && program.tau < 1.0)
            || !program.smoothness.is_finite()
            || program.smoothness < 0.0
        {
            return SolverReport::failed(
                SolverStatus::SolverError,
                0,
                "trend program parameters out of range",
            );
        }
        if y.iter().any(|v| !v.is_finite()) {
            return SolverReport::failed(SolverStatus::SolverError, 0, "non-finite trend target");
        }
        if n < 3 {
            // No interior second difference; the loss alone is minimized by
            // the target itself.
            return SolverReport::optimal(y.clone_owned(), 0);
        }

        let opts = &self.options;
        let scale = data_scale(y.iter());
        let floor = opts.residual_floor * scale;
        let norm_floor = 1e-9 * scale;
        let gram = trend_gram_bands(n);
        let linear = program.tau - 0.5;

        let objective_of = |x: &DVector<f64>| {
            let fit: f64 = (0..n).map(|i| quantile_loss(y[i] - x[i], program.tau)).sum();
            fit + program.smoothness * vec_second_diff(x).norm()
        };

        let mut x = y.clone_owned();
        let mut objective = objective_of(&x);
        let mut last_change = f64::INFINITY;

        for iteration in 1..=opts.max_iterations {
            let rough = vec_second_diff(&x).norm().max(norm_floor);
            let two_c = program.smoothness / rough;

            let mut sys = PentaSystem {
                diag: gram.diag.iter().map(|g| two_c * g).collect(),
                off1: gram.off1.iter().map(|g| two_c * g).collect(),
                off2: gram.off2.iter().map(|g| two_c * g).collect(),
            };
            let mut rhs = vec![0.0; n];
            for i in 0..n {
                let a = (y[i] - x[i]).abs().max(floor);
                let two_q = 1.0 / (2.0 * a);
                sys.diag[i] += two_q;
                rhs[i] = two_q * y[i] + linear;
            }

            let Some(next) = solve_penta_spd(&sys, &rhs) else {
                return SolverReport::failed(
                    SolverStatus::SolverError,
                    iteration,
                    "trend system factorization failed",
                );
            };
            let next = DVector::from_vec(next);
            let new_objective = objective_of(&next);
            last_change = relative_change(objective, new_objective);
            x = next;
            objective = new_objective;

            if last_change < opts.tolerance {
                return SolverReport::optimal(x, iteration);
            }
        }

        if last_change < opts.loose_tolerance {
            return SolverReport::optimal(x, opts.max_iterations);
        }
        SolverReport::failed(
            SolverStatus::Other,
            opts.max_iterations,
            "trend solve did not converge within the iteration cap",
        )
    }

    fn solve_left(&self, program: &LeftFactorProgram<'_>) -> SolverReport<DMatrix<f64>> {
        let d = program.measurements;
        let r = program.right;
        let w = program.weights;
        let (m, n) = d.shape();
        let k = r.nrows();

        if r.ncols() != n || w.len() != n || program.initial_left.shape() != (m, k) || k == 0 {
            return SolverReport::failed(
                SolverStatus::SolverError,
                0,
                "left program dimension mismatch",
            );
        }
        if !(program.tau > 0.0 && program.tau < 1.0) || program.smoothness < 0.0 {
            return SolverReport::failed(
                SolverStatus::SolverError,
                0,
                "left program parameters out of range",
            );
        }
        let mut pinned = vec![false; m];
        for &i in program.zero_rows {
            if i >= m {
                return SolverReport::failed(
                    SolverStatus::SolverError,
                    0,
                    "zero row index out of range",
                );
            }
            pinned[i] = true;
        }

        let active: Vec<usize> = (0..m).filter(|&i| !pinned[i]).collect();
        if active.is_empty() {
            // Every intraday slot is dark; the only feasible shape basis is 0.
            return SolverReport::optimal(DMatrix::zeros(m, k), 0);
        }
        let mut position = vec![usize::MAX; m];
        for (pos, &i) in active.iter().enumerate() {
            position[i] = pos;
        }
        let p = active.len() * k;
        let index = |pos: usize, c: usize| pos * k + c;

        let groups: Vec<Vec<usize>> = (1..k)
            .map(|c| (0..active.len()).map(|pos| index(pos, c)).collect())
            .collect();

        let opts = &self.options;
        let scale = data_scale(d.iter());
        let floor = opts.residual_floor * scale;
        let norm_floor = 1e-9 * scale;
        let viol_tol = opts.violation_tol * scale;
        let mut penalty = opts.nonneg_penalty / scale;

        let mut current = program.initial_left.clone_owned();
        for &i in program.zero_rows {
            current.fill_row(i, 0.0);
        }

        let penalized_of = |l: &DMatrix<f64>, fit: &DMatrix<f64>, penalty: f64| {
            weighted_quantile_sum(d, fit, w, program.tau)
                + program.smoothness * row_second_diff(l).norm()
                + penalty * negative_part_sq(fit)
        };

        let mut fit = &current * r;
        let mut objective = penalized_of(&current, &fit, penalty);
        let mut last_change = f64::INFINITY;
        let mut worst = worst_violation(&fit);
        let mut rounds = 0usize;

        for iteration in 1..=opts.max_iterations {
            let mut model = QuadraticModel::new(p);
            let mut buf = CoefBuffer::new();

            // Curvatures of the majorized loss, one list per day.
            let day_terms: Vec<Vec<(usize, f64)>> = (0..n)
                .into_par_iter()
                .map(|j| {
                    if w[j] == 0.0 {
                        return Vec::new();
                    }
                    active
                        .iter()
                        .map(|&i| {
                            let a = (d[(i, j)] - fit[(i, j)]).abs().max(floor);
                            (i, w[j] / (4.0 * a))
                        })
                        .collect()
                })
                .collect();

            for (j, terms) in day_terms.iter().enumerate() {
                let linear = w[j] * (program.tau - 0.5);
                for &(i, q) in terms {
                    buf.clear();
                    for c in 0..k {
                        buf.push(index(position[i], c), r[(c, j)]);
                    }
                    model.add_loss_term(buf.as_slice(), d[(i, j)], q, linear);
                }
            }

            if program.smoothness > 0.0 && m >= 3 {
                let curve =
                    program.smoothness / (2.0 * row_second_diff(&current).norm().max(norm_floor));
                for c in 0..k {
                    for i in 0..m - 2 {
                        buf.clear();
                        for (offset, &stencil) in SECOND_DIFF_STENCIL.iter().enumerate() {
                            let row = i + offset;
                            if !pinned[row] {
                                buf.push(index(position[row], c), stencil);
                            }
                        }
                        model.add_quadratic_term(buf.as_slice(), 0.0, curve);
                    }
                }
            }

            for j in 0..n {
                for &i in &active {
                    if fit[(i, j)] < 0.0 {
                        buf.clear();
                        for c in 0..k {
                            buf.push(index(position[i], c), r[(c, j)]);
                        }
                        model.add_quadratic_term(buf.as_slice(), 0.0, penalty);
                    }
                }
            }

            model.add_ridge(opts.ridge);
            let Some(x) = model.solve_with_zero_sums(&groups) else {
                return SolverReport::failed(
                    SolverStatus::SolverError,
                    iteration,
                    "left factor system factorization failed",
                );
            };

            let mut next = DMatrix::zeros(m, k);
            for (pos, &i) in active.iter().enumerate() {
                for c in 0..k {
                    next[(i, c)] = x[index(pos, c)];
                }
            }
            if next.iter().any(|v| !v.is_finite()) {
                return SolverReport::failed(
                    SolverStatus::SolverError,
                    iteration,
                    "left factor solve produced non-finite values",
                );
            }

            fit = &next * r;
            let new_objective = penalized_of(&next, &fit, penalty);
            last_change = relative_change(objective, new_objective);
            current = next;
            objective = new_objective;
            worst = worst_violation(&fit);

            if last_change < opts.tolerance {
                if worst <= viol_tol {
                    return SolverReport::optimal(current, iteration);
                }
                rounds += 1;
                if rounds > opts.escalation_rounds {
                    return SolverReport::failed(
                        SolverStatus::Other,
                        iteration,
                        "nonnegativity violations persisted through penalty escalation",
                    );
                }
                penalty *= opts.penalty_growth;
                objective = penalized_of(&current, &fit, penalty);
                last_change = f64::INFINITY;
            }
        }

        if last_change < opts.loose_tolerance && worst <= viol_tol {
            return SolverReport::optimal(current, opts.max_iterations);
        }
        SolverReport::failed(
            SolverStatus::Other,
            opts.max_iterations,
            "left factor solve did not converge within the iteration cap",
        )
    }

    fn solve_right(&self, program: &RightFactorProgram<'_>) -> SolverReport<RightFactorSolution> {
        let d = program.measurements;
        let l = program.left;
        let w = program.weights;
        let r0 = program.reference_trend;
        let (m, n) = d.shape();
        let k = l.ncols();

        if l.nrows() != m || w.len() != n || program.initial_right.shape() != (k, n) || k == 0 {
            return SolverReport::failed(
                SolverStatus::SolverError,
                0,
                "right program dimension mismatch",
            );
        }
        if r0.len() != n || r0.iter().any(|v| !v.is_finite()) {
            return SolverReport::failed(
                SolverStatus::SolverError,
                0,
                "reference trend malformed",
            );
        }
        if !(program.tau > 0.0 && program.tau < 1.0) || program.smoothness < 0.0 {
            return SolverReport::failed(
                SolverStatus::SolverError,
                0,
                "right program parameters out of range",
            );
        }
        let coupled = !matches!(program.degradation, DegradationTerm::Absent);
        if coupled && n <= YEAR_LAG {
            return SolverReport::failed(
                SolverStatus::SolverError,
                0,
                "year-lag coupling requires more than 365 days",
            );
        }
        if let DegradationTerm::Bounded { min, max } = program.degradation {
            if !min.is_finite() || !max.is_finite() || min > max {
                return SolverReport::failed(
                    SolverStatus::SolverError,
                    0,
                    "degradation bounds malformed",
                );
            }
        }

        let layout = RightLayout::new(n, k, program.degradation, r0);
        let p = layout.size();

        let opts = &self.options;
        let scale = data_scale(d.iter());
        let floor = opts.residual_floor * scale;
        let norm_floor = 1e-9 * scale;
        let viol_tol = opts.violation_tol * scale;
        let mut penalty = opts.nonneg_penalty / scale;

        let penalized_of = |right: &DMatrix<f64>, fit: &DMatrix<f64>, penalty: f64| {
            weighted_quantile_sum(d, fit, w, program.tau)
                + program.smoothness * col_second_diff(right).norm()
                + program.smoothness * lag_mismatch_norm(right)
                + penalty * negative_part_sq(fit)
        };

        let mut current = program.initial_right.clone_owned();
        let mut beta = 0.0;
        let mut fit = l * &current;
        let mut objective = penalized_of(&current, &fit, penalty);
        let mut last_change = f64::INFINITY;
        let mut worst = worst_violation(&fit);
        let mut rounds = 0usize;

        for iteration in 1..=opts.max_iterations {
            let mut model = QuadraticModel::new(p);
            let mut buf = CoefBuffer::new();

            let day_terms: Vec<Vec<(usize, f64)>> = (0..n)
                .into_par_iter()
                .map(|j| {
                    if w[j] == 0.0 {
                        return Vec::new();
                    }
                    (0..m)
                        .map(|i| {
                            let a = (d[(i, j)] - fit[(i, j)]).abs().max(floor);
                            (i, w[j] / (4.0 * a))
                        })
                        .collect()
                })
                .collect();

            for (j, terms) in day_terms.iter().enumerate() {
                let linear = w[j] * (program.tau - 0.5);
                for &(i, q) in terms {
                    buf.clear();
                    for c in 0..k {
                        layout.push_entry(&mut buf, c, j, l[(i, c)]);
                    }
                    model.add_loss_term(buf.as_slice(), d[(i, j)], q, linear);
                }
            }

            if program.smoothness > 0.0 && n >= 3 {
                let curve =
                    program.smoothness / (2.0 * col_second_diff(&current).norm().max(norm_floor));
                for c in 0..k {
                    for j in 0..n - 2 {
                        buf.clear();
                        for (offset, &stencil) in SECOND_DIFF_STENCIL.iter().enumerate() {
                            layout.push_entry(&mut buf, c, j + offset, stencil);
                        }
                        model.add_quadratic_term(buf.as_slice(), 0.0, curve);
                    }
                }
            }

            if program.smoothness > 0.0 && coupled && k > 1 {
                let curve =
                    program.smoothness / (2.0 * lag_mismatch_norm(&current).max(norm_floor));
                for c in 1..k {
                    for j in 0..n - YEAR_LAG {
                        buf.clear();
                        layout.push_entry(&mut buf, c, j, 1.0);
                        layout.push_entry(&mut buf, c, j + YEAR_LAG, -1.0);
                        model.add_quadratic_term(buf.as_slice(), 0.0, curve);
                    }
                }
            }

            for j in 0..n {
                for i in 0..m {
                    if fit[(i, j)] < 0.0 {
                        buf.clear();
                        for c in 0..k {
                            layout.push_entry(&mut buf, c, j, l[(i, c)]);
                        }
                        model.add_quadratic_term(buf.as_slice(), 0.0, penalty);
                    }
                }
            }

            model.add_ridge(opts.ridge);
            let mut x = match model.solve() {
                Some(x) => x,
                None => {
                    return SolverReport::failed(
                        SolverStatus::SolverError,
                        iteration,
                        "right factor system factorization failed",
                    );
                }
            };

            if let (Some(beta_index), DegradationTerm::Bounded { min, max }) =
                (layout.beta_index, program.degradation)
            {
                let unconstrained = x[beta_index];
                if unconstrained < min || unconstrained > max {
                    let pinned_value = unconstrained.clamp(min, max);
                    x = match model.solve_with_pinned(beta_index, pinned_value) {
                        Some(x) => x,
                        None => {
                            return SolverReport::failed(
                                SolverStatus::SolverError,
                                iteration,
                                "rate-pinned right factor solve failed",
                            );
                        }
                    };
                }
            }

            let (next, next_beta) = layout.reconstruct(&x, k);
            if next.iter().any(|v| !v.is_finite()) || !next_beta.is_finite() {
                return SolverReport::failed(
                    SolverStatus::SolverError,
                    iteration,
                    "right factor solve produced non-finite values",
                );
            }

            fit = l * &next;
            let new_objective = penalized_of(&next, &fit, penalty);
            last_change = relative_change(objective, new_objective);
            current = next;
            beta = next_beta;
            objective = new_objective;
            worst = worst_violation(&fit);

            if last_change < opts.tolerance {
                if worst <= viol_tol {
                    return SolverReport::optimal(
                        RightFactorSolution {
                            right: current,
                            beta,
                        },
                        iteration,
                    );
                }
                rounds += 1;
                if rounds > opts.escalation_rounds {
                    return SolverReport::failed(
                        SolverStatus::Other,
                        iteration,
                        "nonnegativity violations persisted through penalty escalation",
                    );
                }
                penalty *= opts.penalty_growth;
                objective = penalized_of(&current, &fit, penalty);
                last_change = f64::INFINITY;
            }
        }

        if last_change < opts.loose_tolerance && worst <= viol_tol {
            return SolverReport::optimal(
                RightFactorSolution {
                    right: current,
                    beta,
                },
                opts.max_iterations,
            );
        }
        SolverReport::failed(
            SolverStatus::Other,
            opts.max_iterations,
            "right factor solve did not converge within the iteration cap",
        )
    }
}
