//! Shared demo-pipeline logic used by the binary and the benches.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! synthetic series -> fit -> ground-truth comparison
//!
//! The binary can then focus on presentation and snapshot output.

use log::info;

use crate::data::{SyntheticConfig, SyntheticSeries, generate_series};
use crate::domain::FitConfig;
use crate::error::FitError;
use crate::fit::{ClearSkyFitter, FitReport};

/// All computed outputs of a single demo run.
#[derive(Debug, Clone)]
pub struct DemoOutput {
    pub series: SyntheticSeries,
    pub report: FitReport,
    /// Aggregate relative deviation of the reconstruction from the known
    /// clear sky.
    pub ground_truth_error: f64,
}

/// Execute the full demo pipeline and return the computed outputs.
pub fn run_demo(data: &SyntheticConfig, fit: &FitConfig) -> Result<DemoOutput, FitError> {
    // 1) Generate the synthetic plant.
    let series = generate_series(data)?;
    info!(
        "generated {} samples/day x {} days, {} cloudy, {} dropped",
        data.samples_per_day,
        data.days,
        series.cloudy_days.iter().filter(|&&c| c).count(),
        series.dropout_days.len()
    );

    // 2) Fit the clear sky.
    let fitter = ClearSkyFitter::new(fit.clone())?;
    let report = fitter.fit(&series.power)?;

    // 3) Score against the ground truth the generator knows.
    let ground_truth_error = reconstruction_error(&series, &report);

    Ok(DemoOutput {
        series,
        report,
        ground_truth_error,
    })
}

/// Total absolute deviation from the true clear sky over its lit samples,
/// normalized by the total true output.
pub fn reconstruction_error(series: &SyntheticSeries, report: &FitReport) -> f64 {
    let sky = report.clear_sky();
    let truth = &series.clear_sky;

    let mut deviation = 0.0;
    let mut total = 0.0;
    for j in 0..truth.ncols() {
        for i in 0..truth.nrows() {
            let ideal = truth[(i, j)];
            if ideal > 0.0 {
                deviation += (sky[(i, j)] - ideal).abs();
                total += ideal;
            }
        }
    }
    if total <= 0.0 {
        return 0.0;
    }
    deviation / total
}
