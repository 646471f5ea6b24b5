//! Risk and return measures for a single run and across runs

use serde::{Deserialize, Serialize};

use super::stats::{mean, percentile, std_dev};

/// Sum of inflows over sum of outflows; 1.0 when nothing was invested
pub fn equity_multiple(cashflows: &[f64]) -> f64 {
    let invested: f64 = cashflows.iter().filter(|cf| **cf < 0.0).map(|cf| cf.abs()).sum();
    if invested <= 0.0 {
        return 1.0;
    }
    let returned: f64 = cashflows.iter().filter(|cf| **cf > 0.0).sum();
    returned / invested
}

/// Period-over-period returns of a value series
///
/// Periods starting from a non-positive value have no defined return and are skipped.
pub fn period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Sharpe ratio of periodic returns against a risk-free rate
///
/// A zero standard deviation gives positive or negative infinity with the sign
/// of the excess return (0 when there is no excess). None for fewer than two returns.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> Option<f64> {
    let sd = std_dev(returns)?;
    let excess = mean(returns)? - risk_free_rate;

    if sd == 0.0 {
        return Some(if excess > 0.0 {
            f64::INFINITY
        } else if excess < 0.0 {
            f64::NEG_INFINITY
        } else {
            0.0
        });
    }
    Some(excess / sd)
}

/// Largest peak-to-trough decline as a fraction of the peak, in [0, 1]
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst: f64 = 0.0;

    for &v in values {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst.clamp(0.0, 1.0)
}

/// Value-at-Risk: the (1 - confidence) quantile of the sample
pub fn value_at_risk(sample: &[f64], confidence: f64) -> Option<f64> {
    percentile(sample, (1.0 - confidence) * 100.0)
}

/// Pearson correlation; 0 when undefined (fewer than two points or no variance)
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }

    let denom = (vx * vy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    cov / denom
}

/// Cross-run correlations between return and risk
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlations {
    pub irr_vs_equity_multiple: f64,
    pub irr_vs_risk: f64,
    pub equity_multiple_vs_risk: f64,
}

impl Correlations {
    /// Risk proxy is the negated final value; IRR pairs use runs with a convergent IRR
    pub fn compute(irrs: &[Option<f64>], multiples: &[f64], final_values: &[f64]) -> Self {
        let risk: Vec<f64> = final_values.iter().map(|v| -v).collect();

        let mut irr = Vec::new();
        let mut irr_multiple = Vec::new();
        let mut irr_risk = Vec::new();
        for ((r, m), k) in irrs.iter().zip(multiples).zip(&risk) {
            if let Some(r) = r {
                irr.push(*r);
                irr_multiple.push(*m);
                irr_risk.push(*k);
            }
        }

        Self {
            irr_vs_equity_multiple: pearson(&irr, &irr_multiple),
            irr_vs_risk: pearson(&irr, &irr_risk),
            equity_multiple_vs_risk: pearson(multiples, &risk),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_equity_multiple() {
        assert_relative_eq!(equity_multiple(&[-100.0, 30.0, 90.0]), 1.2);
        assert_eq!(equity_multiple(&[0.0, 10.0]), 1.0);
        assert_eq!(equity_multiple(&[]), 1.0);
    }

    #[test]
    fn test_equity_multiple_scaling() {
        let flows = [-100.0, 30.0, -20.0, 150.0];
        let scaled: Vec<f64> = flows.iter().map(|f| f * 3.5).collect();
        assert_relative_eq!(equity_multiple(&flows), equity_multiple(&scaled), epsilon = 1e-12);

        let inflows_doubled: Vec<f64> = flows.iter().map(|f| if *f > 0.0 { f * 2.0 } else { *f }).collect();
        assert_relative_eq!(equity_multiple(&inflows_doubled), 2.0 * equity_multiple(&flows), epsilon = 1e-12);
    }

    #[test]
    fn test_sharpe() {
        let returns = [0.05, 0.07, 0.03, 0.09];
        let expected = (0.06 - 0.02) / std_dev(&returns).unwrap();
        assert_relative_eq!(sharpe_ratio(&returns, 0.02).unwrap(), expected, epsilon = 1e-12);

        assert_eq!(sharpe_ratio(&[0.05, 0.05], 0.02), Some(f64::INFINITY));
        assert_eq!(sharpe_ratio(&[0.01, 0.01], 0.02), Some(f64::NEG_INFINITY));
        assert_eq!(sharpe_ratio(&[0.05], 0.02), None);
    }

    #[test]
    fn test_drawdown() {
        assert_eq!(max_drawdown(&[100.0, 110.0, 120.0, 120.0]), 0.0);
        assert_relative_eq!(max_drawdown(&[100.0, 120.0, 90.0, 130.0, 117.0]), 0.25);
        assert_eq!(max_drawdown(&[100.0, -50.0]), 1.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_period_returns_skip_nonpositive_base() {
        let r = period_returns(&[0.0, 100.0, 110.0]);
        assert_eq!(r.len(), 1);
        assert_relative_eq!(r[0], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_value_at_risk() {
        let sample: Vec<f64> = (0..=100).map(|v| v as f64 / 100.0).collect();
        assert_relative_eq!(value_at_risk(&sample, 0.95).unwrap(), 0.05, epsilon = 1e-12);
        assert_relative_eq!(value_at_risk(&sample, 0.99).unwrap(), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_correlations() {
        let irrs = [Some(0.05), Some(0.07), None, Some(0.09)];
        let multiples = [1.2, 1.4, 0.9, 1.6];
        let finals = [60.0, 70.0, 45.0, 80.0];
        let c = Correlations::compute(&irrs, &multiples, &finals);

        assert_relative_eq!(c.irr_vs_equity_multiple, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.irr_vs_risk, -1.0, epsilon = 1e-12);
        assert!(c.equity_multiple_vs_risk < -0.99);

        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[2.0, 3.0, 4.0]), 0.0);
        assert_eq!(pearson(&[1.0], &[2.0]), 0.0);
    }
}
