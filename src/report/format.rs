//! Formatted terminal output for a finished fit.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized (important for future snapshot tests)

use crate::fit::FitReport;

/// Format the full fit summary (problem shape + outcome + diagnostics).
pub fn format_fit_summary(report: &FitReport) -> String {
    let mut out = String::new();
    let state = &report.state;
    let (m, k) = state.left.shape();
    let n = state.right.ncols();

    out.push_str("=== csfit - Statistical Clear-Sky Fit ===\n");
    out.push_str(&format!("Outcome: {}\n", report.outcome.display_name()));
    out.push_str(&format!("Grid: {m} samples/day x {n} days | rank {k}\n"));
    out.push_str(&format!("Clear days: {} of {n}\n", state.clear_day_count()));
    if report.time_shift_applied {
        out.push_str("Time shift: corrected\n");
    }
    out.push_str(&format!("Iterations: {}\n", state.iteration));
    if let Some(improvement) = state.improvement {
        out.push_str(&format!("Last improvement: {improvement:.3e}\n"));
    }

    out.push_str("\nObjective terms:\n");
    let objective = &state.objective;
    out.push_str(&format!("- quantile fit : {:.6e}\n", objective.fit));
    out.push_str(&format!(
        "- smoothness L : {:.6e}\n",
        objective.left_smoothness
    ));
    out.push_str(&format!(
        "- smoothness R : {:.6e}\n",
        objective.right_smoothness
    ));
    out.push_str(&format!("- periodicity  : {:.6e}\n", objective.periodicity));
    out.push_str(&format!("- total        : {:.6e}\n", objective.total()));

    out.push_str(&format!(
        "\nDegradation rate: {:+.3}%/yr\n",
        100.0 * state.beta
    ));
    if let Some(stats) = &state.residuals {
        out.push_str(&format!(
            "Residuals: median={:.4e} variance={:.4e} seed distance={:.4e}\n",
            stats.median, stats.variance, stats.seed_distance
        ));
    }

    if state.flags.objective_increased {
        out.push_str("Warning: objective increased during at least one iteration\n");
    }
    if state.flags.fit_term_increased {
        out.push_str("Warning: fit term increased during at least one iteration\n");
    }
    if let Some(failure) = &report.failure {
        out.push_str(&format!("Failure: {failure}\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitConfig, FitOutcome, ResidualStats};
    use crate::fit::{FitFlags, FitState, ObjectiveComponents};
    use nalgebra::{DMatrix, DVector};

    fn sample_report() -> FitReport {
        let state = FitState {
            config: FitConfig::default(),
            iteration: 7,
            left: DMatrix::from_element(4, 2, 0.5),
            right: DMatrix::from_element(2, 3, 1.0),
            beta: -0.0125,
            reference_trend: DVector::zeros(3),
            weights: DVector::from_column_slice(&[1.0, 0.0, 0.8]),
            objective: ObjectiveComponents {
                fit: 10.0,
                left_smoothness: 1.0,
                right_smoothness: 2.0,
                periodicity: 0.5,
            },
            improvement: Some(5e-4),
            flags: FitFlags::default(),
            residuals: Some(ResidualStats {
                median: 0.01,
                variance: 0.002,
                seed_distance: 0.3,
            }),
        };
        FitReport {
            outcome: FitOutcome::Converged,
            state,
            failure: None,
            time_shift_applied: true,
        }
    }

    #[test]
    fn summary_carries_the_headline_numbers() {
        let text = format_fit_summary(&sample_report());
        assert!(text.contains("Outcome: converged"));
        assert!(text.contains("Grid: 4 samples/day x 3 days | rank 2"));
        assert!(text.contains("Clear days: 2 of 3"));
        assert!(text.contains("Time shift: corrected"));
        assert!(text.contains("Iterations: 7"));
        assert!(text.contains("- total        : 1.350000e1"));
        assert!(text.contains("Degradation rate: -1.250%/yr"));
        assert!(text.contains("seed distance=3.0000e-1"));
        assert!(!text.contains("Warning"));
        assert!(!text.contains("Failure"));
    }

    #[test]
    fn failures_and_flags_are_called_out() {
        let mut report = sample_report();
        report.outcome = FitOutcome::SolverFailed;
        report.failure = Some("left factor step: sabotaged".to_string());
        report.state.flags.objective_increased = true;

        let text = format_fit_summary(&report);
        assert!(text.contains("Outcome: solver failed"));
        assert!(text.contains("Warning: objective increased"));
        assert!(text.contains("Failure: left factor step: sabotaged"));
    }
}
