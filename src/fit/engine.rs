//! The fitting orchestrator.
//!
//! Drives the alternating minimization: prepare (validate, realign, seed) →
//! initialize (weights, reference trend, starting objective) → step
//! repeatedly (left half-step, right half-step, joint objective) → terminal
//! outcome → residual analysis. Steps are pure: each consumes a `FitState`
//! and returns the next one, so iteration boundaries double as pause/resume
//! points and every intermediate state stays inspectable.
//!
//! Failure policy: anything wrong before the loop starts (bad input, no
//! clear days, seed breakdown) is an `Err`. Once iterating, solver failures
//! become a failure outcome on the returned report, preserving the last
//! valid state.

use log::{error, info, warn};
use nalgebra::DMatrix;

use crate::domain::{FitConfig, FitOutcome};
use crate::error::FitError;
use crate::fit::left::{dark_rows, minimize_left};
use crate::fit::linearize::reference_trend;
use crate::fit::objective::evaluate_objective;
use crate::fit::right::minimize_right;
use crate::fit::seed::{SeedFactors, seed_factors};
use crate::fit::state::{FitFlags, FitState};
use crate::fit::timeshift::correct_time_shift;
use crate::fit::weights::clear_day_weights;
use crate::report::analyze_residuals;
use crate::solver::{IrlsBackend, SolverBackend};

/// A validated, realigned, seeded input, ready to iterate on.
#[derive(Debug, Clone)]
pub struct PreparedSeries {
    power: DMatrix<f64>,
    time_shift_applied: bool,
    dark_rows: Vec<usize>,
    seed: SeedFactors,
}

impl PreparedSeries {
    pub fn power(&self) -> &DMatrix<f64> {
        &self.power
    }

    pub fn time_shift_applied(&self) -> bool {
        self.time_shift_applied
    }

    pub fn dark_rows(&self) -> &[usize] {
        &self.dark_rows
    }

    pub fn seed(&self) -> &SeedFactors {
        &self.seed
    }
}

/// Final product of a fit: the terminal outcome plus the state it ended in.
#[derive(Debug, Clone)]
pub struct FitReport {
    pub outcome: FitOutcome,
    pub state: FitState,
    /// Failure description when the outcome is a failure.
    pub failure: Option<String>,
    pub time_shift_applied: bool,
}

impl FitReport {
    /// The clear-sky reconstruction `L R`.
    pub fn clear_sky(&self) -> DMatrix<f64> {
        self.state.clear_sky()
    }

    /// Annualized fractional degradation rate.
    pub fn degradation_rate(&self) -> f64 {
        self.state.beta
    }

    pub fn iterations(&self) -> usize {
        self.state.iteration
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// The clear-sky fitting engine, generic over the solver seam.
#[derive(Debug, Clone)]
pub struct ClearSkyFitter<B = IrlsBackend> {
    config: FitConfig,
    backend: B,
}

impl ClearSkyFitter<IrlsBackend> {
    /// Build a fitter with the reference backend.
    pub fn new(config: FitConfig) -> Result<Self, FitError> {
        Self::with_backend(config, IrlsBackend::default())
    }
}

impl<B: SolverBackend> ClearSkyFitter<B> {
    pub fn with_backend(config: FitConfig, backend: B) -> Result<Self, FitError> {
        config.validate()?;
        Ok(Self { config, backend })
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Run a complete fit from raw measurements.
    pub fn fit(&self, power: &DMatrix<f64>) -> Result<FitReport, FitError> {
        let series = self.prepare(power)?;
        let state = self.initialize(&series)?;
        self.run(&series, state)
    }

    /// Continue a fit from a deserialized snapshot of the same input matrix.
    /// Weights are taken from the snapshot, not recomputed.
    pub fn resume(&self, power: &DMatrix<f64>, snapshot: FitState) -> Result<FitReport, FitError> {
        let series = self.prepare(power)?;
        snapshot.validate_against(&series.power)?;
        let state = FitState {
            config: self.config.clone(),
            ..snapshot
        };
        info!("resuming fit at iteration {}", state.iteration);
        self.run(&series, state)
    }

    /// Validate and realign the input, and compute the SVD seed.
    pub fn prepare(&self, power: &DMatrix<f64>) -> Result<PreparedSeries, FitError> {
        validate_power(power)?;
        let (m, n) = power.shape();
        if self.config.rank > m.min(n) {
            return Err(FitError::InvalidData(format!(
                "rank {} exceeds a {m}x{n} input",
                self.config.rank
            )));
        }

        let (power, time_shift_applied) = if self.config.auto_time_shift {
            correct_time_shift(power)
        } else {
            (power.clone_owned(), false)
        };
        if time_shift_applied {
            info!("applied intraday time-shift correction");
        }

        let dark_rows = dark_rows(&power);
        let seed = seed_factors(&power, self.config.rank)?;
        Ok(PreparedSeries {
            power,
            time_shift_applied,
            dark_rows,
            seed,
        })
    }

    /// Weights, reference trend, and the starting objective.
    pub fn initialize(&self, series: &PreparedSeries) -> Result<FitState, FitError> {
        let weights = clear_day_weights(&self.backend, &series.power, &self.config)?;
        if weights.sum() <= 0.0 {
            return Err(FitError::DegenerateData(
                "no clear days to anchor the baseline".into(),
            ));
        }

        let seed_row = series.seed.right.row(0).transpose();
        let reference = reference_trend(&self.backend, &seed_row)?;
        let objective = evaluate_objective(
            &series.power,
            &series.seed.left,
            &series.seed.right,
            &weights,
            &self.config,
        );
        info!(
            "starting objective {:.6e}, {} of {} days clear",
            objective.total(),
            weights.iter().filter(|&&w| w > 0.0).count(),
            weights.len()
        );

        Ok(FitState {
            config: self.config.clone(),
            iteration: 0,
            left: series.seed.left.clone(),
            right: series.seed.right.clone(),
            beta: 0.0,
            reference_trend: reference,
            weights,
            objective,
            improvement: None,
            flags: FitFlags::default(),
            residuals: None,
        })
    }

    /// One full alternating iteration. Pure: the input state is untouched.
    pub fn step(&self, series: &PreparedSeries, state: &FitState) -> Result<FitState, FitError> {
        let left = minimize_left(
            &self.backend,
            &series.power,
            &state.right,
            &state.weights,
            &state.left,
            &self.config,
            &series.dark_rows,
        )?;
        let right_step = minimize_right(
            &self.backend,
            &series.power,
            &left,
            &state.weights,
            &state.right,
            &state.reference_trend,
            &self.config,
        )?;
        let objective = evaluate_objective(
            &series.power,
            &left,
            &right_step.right,
            &state.weights,
            &self.config,
        );

        let iteration = state.iteration + 1;
        let old = state.objective.total();
        let new = objective.total();
        let mut fractional = if old != 0.0 { (old - new) / old } else { 0.0 };
        if !fractional.is_finite() {
            fractional = 0.0;
        }

        let mut flags = state.flags;
        if fractional < 0.0 {
            flags.objective_increased = true;
            warn!("objective rose at iteration {iteration}: {old:.6e} -> {new:.6e}");
        }
        if objective.fit > state.objective.fit {
            flags.fit_term_increased = true;
            warn!(
                "fit term rose at iteration {iteration}: {:.6e} -> {:.6e}",
                state.objective.fit, objective.fit
            );
        }

        // The exit test runs on the magnitude; the sign anomaly is recorded
        // on the flag above.
        let improvement = fractional.abs();
        info!("iteration {iteration}: objective {new:.6e}, improvement {improvement:.3e}");

        Ok(FitState {
            config: state.config.clone(),
            iteration,
            left,
            right: right_step.right,
            beta: right_step.beta,
            reference_trend: right_step.reference_trend,
            weights: state.weights.clone(),
            objective,
            improvement: Some(improvement),
            flags,
            residuals: None,
        })
    }

    /// Iterate from `state` to a terminal outcome.
    pub fn run(&self, series: &PreparedSeries, state: FitState) -> Result<FitReport, FitError> {
        let mut state = state;
        let outcome = loop {
            // Convergence wins over the cap when both hold at once.
            if let Some(improvement) = state.improvement {
                if improvement < self.config.exit_epsilon {
                    break FitOutcome::Converged;
                }
            }
            if state.iteration >= self.config.max_iterations {
                break FitOutcome::MaxIterationsReached;
            }

            match self.step(series, &state) {
                Ok(next) => state = next,
                Err(err) => {
                    let outcome = match &err {
                        FitError::Solver { .. } => FitOutcome::SolverFailed,
                        FitError::NonOptimalStatus { .. } => FitOutcome::StatusError,
                        _ => return Err(err),
                    };
                    error!("fit aborted at iteration {}: {err}", state.iteration + 1);
                    return Ok(FitReport {
                        outcome,
                        state,
                        failure: Some(err.to_string()),
                        time_shift_applied: series.time_shift_applied,
                    });
                }
            }
        };

        state.residuals = Some(analyze_residuals(
            &series.power,
            &state,
            &series.seed.dominant,
        ));
        info!(
            "fit finished: {} after {} iterations",
            outcome.display_name(),
            state.iteration
        );
        Ok(FitReport {
            outcome,
            state,
            failure: None,
            time_shift_applied: series.time_shift_applied,
        })
    }
}

fn validate_power(power: &DMatrix<f64>) -> Result<(), FitError> {
    if power.is_empty() {
        return Err(FitError::InvalidData("empty measurement matrix".into()));
    }
    if power.iter().any(|v| !v.is_finite()) {
        return Err(FitError::InvalidData(
            "measurement matrix contains non-finite entries".into(),
        ));
    }
    if power.iter().any(|&v| v < 0.0) {
        return Err(FitError::InvalidData(
            "measurement matrix contains negative entries".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{
        LeftFactorProgram, RightFactorProgram, RightFactorSolution, SolverReport, SolverStatus,
        TrendProgram, YEAR_LAG,
    };
    use nalgebra::DVector;

    fn bell(m: usize, i: usize) -> f64 {
        let t = (i as f64 + 0.5) / m as f64;
        (std::f64::consts::PI * t).sin()
    }

    /// Exactly rank-1 series: strictly positive sine profile times a smooth
    /// amplitude trend.
    fn sine_series(m: usize, n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(m, n, |i, j| {
            let shape = 0.2 + bell(m, i);
            let amplitude = 3.0 + 0.3 * (2.0 * std::f64::consts::PI * j as f64 / n as f64).cos();
            shape * amplitude
        })
    }

    #[test]
    fn inputs_are_validated_before_any_work() {
        let fitter = ClearSkyFitter::new(FitConfig::default()).unwrap();

        let negative = DMatrix::from_row_slice(2, 2, &[1.0, -0.5, 1.0, 1.0]);
        assert!(matches!(
            fitter.fit(&negative),
            Err(FitError::InvalidData(_))
        ));

        let nan = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, 1.0, 1.0]);
        assert!(matches!(fitter.fit(&nan), Err(FitError::InvalidData(_))));

        let tiny = DMatrix::from_element(2, 3, 1.0);
        let wide_rank = ClearSkyFitter::new(FitConfig {
            rank: 3,
            ..FitConfig::default()
        })
        .unwrap();
        assert!(matches!(
            wide_rank.fit(&tiny),
            Err(FitError::InvalidData(_))
        ));
    }

    #[test]
    fn all_zero_data_is_degenerate() {
        let fitter = ClearSkyFitter::new(FitConfig {
            rank: 1,
            ..FitConfig::default()
        })
        .unwrap();
        let dark = DMatrix::zeros(8, 12);
        assert!(matches!(
            fitter.fit(&dark),
            Err(FitError::DegenerateData(_))
        ));
    }

    #[test]
    fn sine_scenario_recovers_the_clear_sky() {
        let d = sine_series(10, 40);
        let config = FitConfig {
            rank: 1,
            tau: 0.9,
            max_iterations: 30,
            ..FitConfig::default()
        };
        let fitter = ClearSkyFitter::new(config.clone()).unwrap();
        let report = fitter.fit(&d).unwrap();

        assert_eq!(report.outcome, FitOutcome::Converged);
        assert!(report.state.improvement.unwrap() < config.exit_epsilon);
        // Short series: no year-lag coupling, the rate never moves.
        assert_eq!(report.degradation_rate(), 0.0);
        assert_eq!(report.state.objective.periodicity, 0.0);

        let stats = report.state.residuals.unwrap();
        assert!(stats.median.abs() < 1e-3, "median {}", stats.median);
        assert!(stats.variance < 1e-4, "variance {}", stats.variance);
        assert!(stats.seed_distance.is_finite());

        // The reconstruction matches the data on every clear day.
        let sky = report.clear_sky();
        let scale = d.iter().sum::<f64>() / (d.nrows() * d.ncols()) as f64;
        for j in 0..40 {
            if report.state.weights[j] > 0.0 {
                for i in 0..10 {
                    assert!(
                        (sky[(i, j)] - d[(i, j)]).abs() < 0.05 * scale,
                        "poor reconstruction at ({i}, {j})"
                    );
                }
            }
        }
    }

    #[test]
    fn left_invariants_hold_after_a_step() {
        let m = 9;
        let n = 14;
        // Dark first and last rows; two genuine shape modes for the rank-2
        // fit.
        let d = DMatrix::from_fn(m, n, |i, j| {
            if i == 0 || i == m - 1 {
                0.0
            } else {
                let base = bell(m - 2, i - 1);
                let wobble = 2.0 * std::f64::consts::PI * j as f64 / n as f64;
                base * (2.0 + 0.05 * j as f64) + base * base * 0.3 * wobble.sin()
            }
        });
        let fitter = ClearSkyFitter::new(FitConfig {
            rank: 2,
            ..FitConfig::default()
        })
        .unwrap();

        let series = fitter.prepare(&d).unwrap();
        assert_eq!(series.dark_rows(), &[0, m - 1]);
        let initial = fitter.initialize(&series).unwrap();
        let stepped = fitter.step(&series, &initial).unwrap();

        assert_eq!(stepped.iteration, 1);
        assert!(stepped.improvement.unwrap() >= 0.0);
        assert_eq!(stepped.weights, initial.weights);

        let col_sum: f64 = stepped.left.column(1).sum();
        assert!(col_sum.abs() < 1e-7, "zero-sum violated: {col_sum}");
        for &row in series.dark_rows() {
            assert_eq!(stepped.left[(row, 0)], 0.0);
            assert_eq!(stepped.left[(row, 1)], 0.0);
        }
        let sky = stepped.clear_sky();
        let floor = sky.iter().fold(0.0f64, |acc, &v| acc.min(v));
        assert!(floor > -1e-5, "reconstruction went negative: {floor}");
    }

    #[test]
    fn two_year_series_recovers_an_injected_degradation_rate() {
        let m = 6;
        let n = 2 * YEAR_LAG;
        let rate = -0.10;
        let d = DMatrix::from_fn(m, n, |i, j| {
            let seasonal =
                3.0 + 0.5 * (2.0 * std::f64::consts::PI * j as f64 / YEAR_LAG as f64).cos();
            let drift = 1.0 + rate * j as f64 / YEAR_LAG as f64;
            bell(m, i) * seasonal * drift
        });
        let config = FitConfig {
            rank: 1,
            max_iterations: 15,
            ..FitConfig::default()
        };
        let fitter = ClearSkyFitter::new(config).unwrap();
        let report = fitter.fit(&d).unwrap();

        assert!(report.is_success(), "{:?}", report.failure);
        assert!(
            (report.degradation_rate() - rate).abs() < 0.02,
            "recovered rate {} too far from {rate}",
            report.degradation_rate()
        );
    }

    #[test]
    fn dropout_day_is_unweighted_and_dark_rows_stay_dark() {
        let m = 12;
        let n = 20;
        let dropout = 7usize;
        let d = DMatrix::from_fn(m, n, |i, j| {
            if j == dropout || i == 0 || i == m - 1 {
                0.0
            } else {
                bell(m - 2, i - 1) * (2.5 + 0.05 * j as f64)
            }
        });
        let fitter = ClearSkyFitter::new(FitConfig {
            rank: 1,
            ..FitConfig::default()
        })
        .unwrap();
        let report = fitter.fit(&d).unwrap();

        assert!(report.is_success());
        assert_eq!(report.state.weights[dropout], 0.0);
        assert_eq!(report.state.left[(0, 0)], 0.0);
        assert_eq!(report.state.left[(m - 1, 0)], 0.0);
    }

    #[test]
    fn snapshot_resume_matches_the_uninterrupted_run() {
        let d = sine_series(8, 30);
        let config = FitConfig {
            rank: 1,
            tau: 0.9,
            max_iterations: 30,
            ..FitConfig::default()
        };
        let fitter = ClearSkyFitter::new(config).unwrap();

        let uninterrupted = fitter.fit(&d).unwrap();

        let series = fitter.prepare(&d).unwrap();
        let mut state = fitter.initialize(&series).unwrap();
        state = fitter.step(&series, &state).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let restored: FitState = serde_json::from_str(&json).unwrap();
        let resumed = fitter.resume(&d, restored).unwrap();

        assert_eq!(resumed.outcome, uninterrupted.outcome);
        assert_eq!(resumed.iterations(), uninterrupted.iterations());
        assert!((resumed.state.left.clone() - uninterrupted.state.left.clone()).amax() < 1e-9);
        assert!((resumed.state.right.clone() - uninterrupted.state.right.clone()).amax() < 1e-9);
        assert_eq!(resumed.degradation_rate(), uninterrupted.degradation_rate());

        // A snapshot from a different series is refused.
        let other = sine_series(9, 30);
        let json = serde_json::to_string(&resumed.state).unwrap();
        let stale: FitState = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            fitter.resume(&other, stale),
            Err(FitError::InvalidData(_))
        ));
    }

    #[test]
    fn iteration_cap_forces_exit() {
        let d = sine_series(8, 25);
        let fitter = ClearSkyFitter::new(FitConfig {
            rank: 1,
            max_iterations: 1,
            exit_epsilon: 1e-12,
            ..FitConfig::default()
        })
        .unwrap();
        let report = fitter.fit(&d).unwrap();
        assert_eq!(report.outcome, FitOutcome::MaxIterationsReached);
        assert_eq!(report.iterations(), 1);
        assert!(report.state.residuals.is_some());
    }

    #[test]
    fn time_shift_flag_propagates_to_the_report() {
        let m = 12;
        // Power peaking well before the grid center.
        let d = DMatrix::from_fn(m, 10, |i, j| {
            let x = (i as f64 - 2.5) / 2.0;
            (1.0 - x * x).max(0.0) * (2.0 + 0.05 * j as f64)
        });
        let fitter = ClearSkyFitter::new(FitConfig {
            rank: 1,
            auto_time_shift: true,
            ..FitConfig::default()
        })
        .unwrap();

        let series = fitter.prepare(&d).unwrap();
        assert!(series.time_shift_applied());
        let report = fitter.run(&series, fitter.initialize(&series).unwrap()).unwrap();
        assert!(report.time_shift_applied);
        assert!(report.is_success());
    }

    /// Backend that fails one program family, for failure-path tests.
    struct SabotagedBackend {
        inner: IrlsBackend,
        status: SolverStatus,
    }

    impl SolverBackend for SabotagedBackend {
        fn solve_trend(&self, program: &TrendProgram) -> SolverReport<DVector<f64>> {
            self.inner.solve_trend(program)
        }

        fn solve_left(&self, _: &LeftFactorProgram<'_>) -> SolverReport<DMatrix<f64>> {
            SolverReport::failed(self.status, 0, "sabotaged")
        }

        fn solve_right(&self, program: &RightFactorProgram<'_>) -> SolverReport<RightFactorSolution> {
            self.inner.solve_right(program)
        }
    }

    #[test]
    fn solver_failures_preserve_the_last_valid_state() {
        let d = sine_series(8, 20);
        let config = FitConfig {
            rank: 1,
            ..FitConfig::default()
        };

        for (status, outcome) in [
            (SolverStatus::SolverError, FitOutcome::SolverFailed),
            (SolverStatus::Infeasible, FitOutcome::StatusError),
        ] {
            let backend = SabotagedBackend {
                inner: IrlsBackend::default(),
                status,
            };
            let fitter = ClearSkyFitter::with_backend(config.clone(), backend).unwrap();
            let report = fitter.fit(&d).unwrap();

            assert_eq!(report.outcome, outcome);
            assert!(!report.is_success());
            assert!(report.failure.is_some());
            // The loop never completed a step; the seed state survives.
            assert_eq!(report.iterations(), 0);
            assert!(report.state.residuals.is_none());
        }
    }
}
