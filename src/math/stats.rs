//! Order statistics and moments.
//!
//! Deterministic tie handling: NaN comparisons fall back to `Equal`, so the
//! sort order (and therefore the median) never depends on input ordering
//! games. Callers are expected to filter non-finite values first.

/// Median, sorting in place. Returns `None` for an empty slice.
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        Some(values[n / 2])
    } else {
        Some(0.5 * (values[n / 2 - 1] + values[n / 2]))
    }
}

/// Arithmetic mean. Returns `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (denominator `n`, not `n - 1`).
pub fn population_variance(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let ss = values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>();
    Some(ss / values.len() as f64)
}
