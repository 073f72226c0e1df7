//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - embedded in state snapshots for pause/resume
//! - reloaded later for comparisons across runs

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Degradation-rate estimation settings.
///
/// The rate `beta` is the fractional change of the dominant amplitude over a
/// 365-day lag. Panels are expected to lose output over time, so the default
/// bounds only admit decline, and not faster than 25% per year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationConfig {
    /// Estimate the rate jointly with the amplitude basis. When `false` and
    /// the series spans more than a year, the year-over-year relation is held
    /// at zero drift instead.
    pub enabled: bool,
    /// Lower bound on the annualized rate (e.g. `-0.25` = -25%/year).
    pub min_rate: f64,
    /// Upper bound on the annualized rate.
    pub max_rate: f64,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_rate: -0.25,
            max_rate: 0.0,
        }
    }
}

/// Held-out evaluation days.
///
/// A fraction of day indices is sampled uniformly without replacement and
/// forced to weight zero, so those days never influence the fit and can serve
/// as an out-of-sample check. The seed is explicit: two runs with the same
/// seed hold out the same days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldoutConfig {
    /// Fraction of days to reserve, in `[0, 1)`.
    pub fraction: f64,
    /// RNG seed for the day selection.
    pub seed: u64,
}

/// Fit hyperparameters and switches.
///
/// Carried inside every state snapshot so a resumed fit runs under the exact
/// settings it was started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Factorization rank `k`: number of canonical intraday shapes.
    pub rank: usize,

    /// Smoothness penalty on the shape basis (second difference along the
    /// intraday axis).
    pub mu_left: f64,

    /// Smoothness penalty on the amplitude basis (second difference along the
    /// day axis); also scales the annual-periodicity penalty.
    pub mu_right: f64,

    /// Quantile parameter of the asymmetric fit loss.
    ///
    /// Clouds only ever *reduce* power, so the fit should hug the upper
    /// envelope of the data rather than its mean; `tau` close to 1 biases the
    /// loss to sit above the measurements.
    pub tau: f64,

    /// Relative objective improvement below which the loop stops.
    pub exit_epsilon: f64,

    /// Hard cap on alternating iterations.
    pub max_iterations: usize,

    /// Year-over-year degradation handling.
    pub degradation: DegradationConfig,

    /// Optional held-out test days.
    pub holdout: Option<HoldoutConfig>,

    /// Detect and undo a systematic intraday timestamp rotation before
    /// fitting. Off by default; enable for data whose clock provenance is
    /// unknown.
    pub auto_time_shift: bool,

    /// Days scoring below this weight are excluded outright rather than
    /// down-weighted. Partially cloudy days would otherwise leak their
    /// roughness into the baseline.
    pub weight_threshold: f64,

    /// Geometric-mean exponent on the temporal-consistency score; the
    /// energy-ratio score gets `1 - weight_theta`.
    pub weight_theta: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            rank: 4,
            mu_left: 1.0,
            mu_right: 20.0,
            tau: 0.8,
            exit_epsilon: 1e-3,
            max_iterations: 100,
            degradation: DegradationConfig::default(),
            holdout: None,
            auto_time_shift: false,
            weight_threshold: 0.6,
            weight_theta: 0.1,
        }
    }
}

impl FitConfig {
    /// Validate ranges before any numerical work.
    pub fn validate(&self) -> Result<(), FitError> {
        if self.rank == 0 {
            return Err(FitError::InvalidConfig("rank must be at least 1".into()));
        }
        if !(self.tau > 0.0 && self.tau < 1.0) {
            return Err(FitError::InvalidConfig(format!(
                "tau must lie strictly inside (0, 1), got {}",
                self.tau
            )));
        }
        if !self.mu_left.is_finite() || self.mu_left < 0.0 {
            return Err(FitError::InvalidConfig(format!(
                "mu_left must be finite and nonnegative, got {}",
                self.mu_left
            )));
        }
        if !self.mu_right.is_finite() || self.mu_right < 0.0 {
            return Err(FitError::InvalidConfig(format!(
                "mu_right must be finite and nonnegative, got {}",
                self.mu_right
            )));
        }
        if !(self.exit_epsilon > 0.0 && self.exit_epsilon.is_finite()) {
            return Err(FitError::InvalidConfig(format!(
                "exit_epsilon must be finite and positive, got {}",
                self.exit_epsilon
            )));
        }
        if self.max_iterations == 0 {
            return Err(FitError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        let deg = &self.degradation;
        if !deg.min_rate.is_finite() || !deg.max_rate.is_finite() || deg.min_rate > deg.max_rate {
            return Err(FitError::InvalidConfig(format!(
                "degradation bounds must satisfy min <= max, got [{}, {}]",
                deg.min_rate, deg.max_rate
            )));
        }
        if let Some(holdout) = &self.holdout {
            if !(0.0..1.0).contains(&holdout.fraction) {
                return Err(FitError::InvalidConfig(format!(
                    "holdout fraction must lie in [0, 1), got {}",
                    holdout.fraction
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.weight_threshold) {
            return Err(FitError::InvalidConfig(format!(
                "weight_threshold must lie in [0, 1], got {}",
                self.weight_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.weight_theta) {
            return Err(FitError::InvalidConfig(format!(
                "weight_theta must lie in [0, 1], got {}",
                self.weight_theta
            )));
        }
        Ok(())
    }
}

/// Terminal outcome of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitOutcome {
    /// Relative improvement dropped below `exit_epsilon`.
    Converged,
    /// Iteration cap hit before the improvement test passed.
    MaxIterationsReached,
    /// A solver backend failed outright; the last valid state is preserved.
    SolverFailed,
    /// A solver returned a definite but non-optimal status.
    StatusError,
}

impl FitOutcome {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            FitOutcome::Converged => "converged",
            FitOutcome::MaxIterationsReached => "iteration cap reached",
            FitOutcome::SolverFailed => "solver failed",
            FitOutcome::StatusError => "non-optimal solver status",
        }
    }

    /// Whether the fit produced a usable baseline (converged or capped).
    pub fn is_success(self) -> bool {
        matches!(
            self,
            FitOutcome::Converged | FitOutcome::MaxIterationsReached
        )
    }
}

/// Fit-quality metrics from the final residual analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualStats {
    /// Median of the scaled, day-filtered residual population.
    pub median: f64,
    /// Population variance of the same residuals.
    pub variance: f64,
    /// L2 distance between the seed's dominant shape column and the fitted
    /// one; large drift means the fit moved far from its starting point.
    pub seed_distance: f64,
}
