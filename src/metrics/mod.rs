//! Risk/return metrics: IRR, equity multiple, Sharpe, drawdown, VaR and
//! descriptive statistics

pub mod irr;
pub mod risk;
pub mod stats;

pub use irr::{calculate_irr, irr_by_period, npv_at_rate};
pub use risk::{equity_multiple, max_drawdown, pearson, period_returns, sharpe_ratio, value_at_risk, Correlations};
pub use stats::{mean, median, percentile, std_dev, MetricSummary, PercentileBand};
