//! Descriptive statistics over Monte Carlo samples

use serde::{Deserialize, Serialize};

/// Arithmetic mean; None for an empty sample
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator); None below two values
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Percentile with linear interpolation between closest ranks
///
/// `p` is in percent and clamped to [0, 100]. The input need not be sorted.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let sorted = sorted_copy(values);
    percentile_sorted(&sorted, p)
}

/// Same as [`percentile`] for an already sorted sample
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let weight = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Summary statistics for one metric across runs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; 0 for a single value
    pub std_dev: f64,
}

impl MetricSummary {
    /// Summarize a sample; None when it is empty
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let sorted = sorted_copy(values);
        let (&min, &max) = (sorted.first()?, sorted.last()?);

        Some(Self {
            count: sorted.len(),
            mean: mean(&sorted)?,
            median: percentile_sorted(&sorted, 50.0)?,
            min,
            max,
            std_dev: std_dev(&sorted).unwrap_or(0.0),
        })
    }
}

/// Percentile band of a quantity at one period
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PercentileBand {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

impl PercentileBand {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let sorted = sorted_copy(values);
        Some(Self {
            p5: percentile_sorted(&sorted, 5.0)?,
            p25: percentile_sorted(&sorted, 25.0)?,
            p50: percentile_sorted(&sorted, 50.0)?,
            p75: percentile_sorted(&sorted, 75.0)?,
            p95: percentile_sorted(&sorted, 95.0)?,
        })
    }
}
