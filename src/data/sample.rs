//! Synthetic power-matrix generation.
//!
//! Builds a plant with a known ground truth: a fixed intraday daylight bell,
//! a calendar-driven seasonal amplitude, and an optional linear degradation
//! trend. Cloudy days attenuate and roughen the curve, sensor noise perturbs
//! every lit sample, and dropout days lose their whole column. The same
//! configuration always produces the same matrices.

use chrono::{Datelike, Duration, NaiveDate};
use nalgebra::DMatrix;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::error::FitError;

/// Fraction of the day at sunrise and sunset. Samples outside the window are
/// zero, which matches how real inverters report overnight.
const DAYLIGHT_SPAN: (f64, f64) = (0.2, 0.8);

/// Calendar day on which the seasonal amplitude peaks (June 21).
const PEAK_ORDINAL: f64 = 172.0;

const DAYS_PER_YEAR: f64 = 365.25;

/// Attenuation range for cloudy days.
const CLOUD_ATTENUATION: (f64, f64) = (0.15, 0.6);

/// Relative intraday jitter clouds add on top of the attenuation, so cloudy
/// curves are rough as well as low.
const CLOUD_JITTER: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub samples_per_day: usize,
    pub days: usize,
    pub start: NaiveDate,
    /// Clear-sky output at the seasonal and daily peak, in the unit of the
    /// generated matrix.
    pub peak_power: f64,
    /// Relative seasonal amplitude swing, in [0, 1).
    pub seasonal_swing: f64,
    /// Annualized fractional output drift; negative values degrade.
    pub degradation_rate: f64,
    pub cloudy_fraction: f64,
    /// Relative standard deviation of per-sample sensor noise.
    pub noise_level: f64,
    /// Number of days whose measurements are lost entirely.
    pub dropout_days: usize,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            samples_per_day: 96,
            days: 365,
            start: NaiveDate::default(),
            peak_power: 5.0,
            seasonal_swing: 0.25,
            degradation_rate: -0.02,
            cloudy_fraction: 0.4,
            noise_level: 0.02,
            dropout_days: 2,
            seed: 42,
        }
    }
}

/// A generated series together with its ground truth.
#[derive(Debug, Clone)]
pub struct SyntheticSeries {
    pub power: DMatrix<f64>,
    pub clear_sky: DMatrix<f64>,
    pub cloudy_days: Vec<bool>,
    pub dropout_days: Vec<usize>,
}

pub fn generate_series(config: &SyntheticConfig) -> Result<SyntheticSeries, FitError> {
    if config.samples_per_day < 2 || config.days == 0 {
        return Err(FitError::InvalidConfig(
            "synthetic grid needs at least 2 samples per day and 1 day".into(),
        ));
    }
    if !(config.peak_power.is_finite() && config.peak_power > 0.0) {
        return Err(FitError::InvalidConfig("peak power must be positive".into()));
    }
    if !(0.0..1.0).contains(&config.seasonal_swing) {
        return Err(FitError::InvalidConfig(
            "seasonal swing must lie in [0, 1)".into(),
        ));
    }
    if !config.degradation_rate.is_finite() || config.degradation_rate < -1.0 {
        return Err(FitError::InvalidConfig(
            "degradation rate must be finite and above -1/yr".into(),
        ));
    }
    if !(0.0..=1.0).contains(&config.cloudy_fraction) {
        return Err(FitError::InvalidConfig(
            "cloudy fraction must lie in [0, 1]".into(),
        ));
    }
    if !(config.noise_level.is_finite() && config.noise_level >= 0.0) {
        return Err(FitError::InvalidConfig(
            "noise level must be nonnegative".into(),
        ));
    }
    if config.dropout_days > config.days {
        return Err(FitError::InvalidConfig(
            "more dropout days than days".into(),
        ));
    }

    let m = config.samples_per_day;
    let n = config.days;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, 1.0)
        .map_err(|e| FitError::InvalidConfig(format!("noise distribution: {e}")))?;

    let mut dropout: Vec<usize> =
        rand::seq::index::sample(&mut rng, n, config.dropout_days).into_vec();
    dropout.sort_unstable();

    let shape: Vec<f64> = (0..m)
        .map(|i| daylight_shape((i as f64 + 0.5) / m as f64))
        .collect();

    let mut clear_sky = DMatrix::zeros(m, n);
    let mut power = DMatrix::zeros(m, n);
    let mut cloudy_days = vec![false; n];

    for j in 0..n {
        let date = config
            .start
            .checked_add_signed(Duration::days(j as i64))
            .unwrap_or(config.start);
        let seasonal = 1.0 + config.seasonal_swing * seasonal_phase(date).cos();
        let aged = 1.0 + config.degradation_rate * j as f64 / DAYS_PER_YEAR;
        let amplitude = config.peak_power * seasonal * aged.max(0.0);

        let cloudy = rng.r#gen::<f64>() < config.cloudy_fraction;
        cloudy_days[j] = cloudy;
        let attenuation = if cloudy {
            rng.gen_range(CLOUD_ATTENUATION.0..CLOUD_ATTENUATION.1)
        } else {
            1.0
        };

        for i in 0..m {
            let ideal = amplitude * shape[i];
            clear_sky[(i, j)] = ideal;
            if ideal == 0.0 {
                continue;
            }
            let mut observed = ideal * attenuation;
            if cloudy {
                observed *= 1.0 + CLOUD_JITTER * noise.sample(&mut rng);
            }
            observed *= 1.0 + config.noise_level * noise.sample(&mut rng);
            power[(i, j)] = observed.max(0.0);
        }
    }

    for &j in &dropout {
        power.column_mut(j).fill(0.0);
    }

    Ok(SyntheticSeries {
        power,
        clear_sky,
        cloudy_days,
        dropout_days: dropout,
    })
}

fn daylight_shape(x: f64) -> f64 {
    let (sunrise, sunset) = DAYLIGHT_SPAN;
    if x <= sunrise || x >= sunset {
        return 0.0;
    }
    let u = (x - sunrise) / (sunset - sunrise);
    (std::f64::consts::PI * u).sin()
}

fn seasonal_phase(date: NaiveDate) -> f64 {
    2.0 * std::f64::consts::PI * (date.ordinal() as f64 - PEAK_ORDINAL) / DAYS_PER_YEAR
}
