//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - installs the logger
//! - generates the synthetic demo plant
//! - runs the clear-sky fit
//! - prints the summary and the ground-truth score
//! - writes an optional snapshot JSON

use std::path::PathBuf;

use crate::data::SyntheticConfig;
use crate::domain::FitConfig;
use crate::error::FitError;

pub mod pipeline;

/// Entry point for the `csfit` binary.
///
/// The first argument, when present, is a path the final fit state is
/// written to as JSON.
pub fn run() -> Result<(), FitError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let snapshot_path: Option<PathBuf> = std::env::args().nth(1).map(PathBuf::from);

    let output = pipeline::run_demo(&demo_data_config(), &demo_fit_config())?;

    println!("{}", crate::report::format_fit_summary(&output.report));
    println!(
        "Ground-truth clear-sky error: {:.2}%",
        100.0 * output.ground_truth_error
    );

    if let Some(path) = snapshot_path {
        crate::io::save_snapshot(&path, &output.report.state)?;
        println!("Snapshot written to {}", path.display());
    }

    Ok(())
}

/// Two simulated years with clouds, sensor noise, dropouts, and a -8%/yr
/// drift, so the year-over-year coupling has something to find.
fn demo_data_config() -> SyntheticConfig {
    SyntheticConfig {
        samples_per_day: 48,
        days: 730,
        degradation_rate: -0.08,
        cloudy_fraction: 0.35,
        dropout_days: 3,
        ..SyntheticConfig::default()
    }
}

fn demo_fit_config() -> FitConfig {
    FitConfig {
        rank: 1,
        max_iterations: 10,
        auto_time_shift: true,
        ..FitConfig::default()
    }
}
