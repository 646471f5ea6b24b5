//! Roll-up of committed runs into Monte Carlo statistics and time series

use serde::{Deserialize, Serialize};

use super::cache::CacheStats;
use super::run::{RunMetrics, SimulationRun};
use crate::metrics::{mean, value_at_risk, Correlations, MetricSummary, PercentileBand};
use crate::projection::{CapitalMetrics, LoanOutcomes};
use crate::waterfall::RevenueStreams;

/// What the aggregator keeps from each run
#[derive(Debug, Clone)]
pub struct RunSample {
    pub metrics: RunMetrics,
    pub fund_cash_flows: Vec<f64>,
    pub lp_cash_flows: Vec<f64>,
    pub gp_cash_flows: Vec<f64>,
    pub management_fees: Vec<f64>,
    pub upfront_fees: Vec<f64>,
    pub performance_fees: Vec<f64>,
    pub portfolio_values: Vec<f64>,
    pub capital: Vec<CapitalMetrics>,
    pub revenue: RevenueStreams,
    pub outcomes: LoanOutcomes,
}

impl From<SimulationRun> for RunSample {
    fn from(run: SimulationRun) -> Self {
        Self {
            fund_cash_flows: run.series.fund_cash_flows(),
            lp_cash_flows: run.distribution.lp_cash_flows,
            gp_cash_flows: run.distribution.gp_cash_flows,
            management_fees: run.distribution.management_fees,
            upfront_fees: run.distribution.upfront_fees,
            performance_fees: run.distribution.performance_fees,
            portfolio_values: run.series.portfolio_values(),
            capital: run.series.capital_metrics(),
            revenue: run.distribution.revenue,
            outcomes: run.outcomes,
            metrics: run.metrics,
        }
    }
}

/// Per-metric summaries across runs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub final_value: Option<MetricSummary>,
    /// Over runs with a convergent IRR
    pub irr: Option<MetricSummary>,
    /// Runs whose fund IRR had no solution
    pub non_convergent_irr: u32,
    pub lp_irr: Option<MetricSummary>,
    pub gp_irr: Option<MetricSummary>,
    pub equity_multiple: Option<MetricSummary>,
    /// Over runs with a finite Sharpe ratio
    pub sharpe_ratio: Option<MetricSummary>,
    pub max_drawdown: Option<MetricSummary>,
    pub early_repayment_rate: Option<MetricSummary>,
}

/// Mean yearly series across runs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    pub fund_cash_flows: Vec<f64>,
    pub lp_cash_flows: Vec<f64>,
    pub gp_cash_flows: Vec<f64>,
    /// Mean manager revenue per period, by source
    pub management_fees: Vec<f64>,
    pub upfront_fees: Vec<f64>,
    pub performance_fees: Vec<f64>,
    pub portfolio_values: Vec<f64>,
    pub capital_metrics: Vec<CapitalMetrics>,
    /// Mean truncated IRR per year 1..=horizon; None where no run converged
    pub irr_by_year: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    /// Value-at-Risk of the net return multiple
    pub var_95: Option<f64>,
    pub var_99: Option<f64>,
    pub irr_var_95: Option<f64>,
    pub correlations: Correlations,
}

/// Average loan outcome counts per run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeanLoanOutcomes {
    pub funded: f64,
    pub defaulted: f64,
    pub early_exit: f64,
    pub scheduled_exit: f64,
    pub matured: f64,
    pub settled_at_horizon: f64,
}

/// Final output of a Monte Carlo session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResult {
    pub num_simulations: u32,
    pub seed: Option<u64>,
    pub statistics: Statistics,
    /// Portfolio value bands per period
    pub percentile_bands: Vec<PercentileBand>,
    pub time_series: TimeSeries,
    /// Raw convergent fund IRRs in run order
    pub irr_samples: Vec<f64>,
    pub revenue_streams: RevenueStreams,
    pub risk_metrics: RiskMetrics,
    pub loan_outcomes: MeanLoanOutcomes,
    pub cache: CacheStats,
}

/// Accumulates committed runs
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    samples: Vec<RunSample>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a completed chunk of runs
    pub fn commit(&mut self, chunk: Vec<RunSample>) {
        self.samples.extend(chunk);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[RunSample] {
        &self.samples
    }

    /// Build the result from everything committed so far
    pub fn finish(&self, seed: Option<u64>, cache: CacheStats) -> MonteCarloResult {
        let runs = &self.samples;
        let metric = |f: fn(&RunMetrics) -> f64| -> Vec<f64> { runs.iter().map(|s| f(&s.metrics)).collect() };
        let optional = |f: fn(&RunMetrics) -> Option<f64>| -> Vec<f64> {
            runs.iter().filter_map(|s| f(&s.metrics)).collect()
        };

        let final_values = metric(|m| m.final_value);
        let multiples = metric(|m| m.equity_multiple);
        let net_returns = metric(|m| m.net_return_multiple);
        let irr_samples = optional(|m| m.irr);
        let irrs: Vec<Option<f64>> = runs.iter().map(|s| s.metrics.irr).collect();
        let sharpes: Vec<f64> = optional(|m| m.sharpe_ratio)
            .into_iter()
            .filter(|s| s.is_finite())
            .collect();

        let statistics = Statistics {
            final_value: MetricSummary::from_values(&final_values),
            irr: MetricSummary::from_values(&irr_samples),
            non_convergent_irr: (runs.len() - irr_samples.len()) as u32,
            lp_irr: MetricSummary::from_values(&optional(|m| m.lp_irr)),
            gp_irr: MetricSummary::from_values(&optional(|m| m.gp_irr)),
            equity_multiple: MetricSummary::from_values(&multiples),
            sharpe_ratio: MetricSummary::from_values(&sharpes),
            max_drawdown: MetricSummary::from_values(&metric(|m| m.max_drawdown)),
            early_repayment_rate: MetricSummary::from_values(&metric(|m| m.early_repayment_rate)),
        };

        let periods = runs.first().map_or(0, |s| s.portfolio_values.len());
        let percentile_bands = (0..periods)
            .filter_map(|t| {
                let values: Vec<f64> = runs.iter().filter_map(|s| s.portfolio_values.get(t).copied()).collect();
                PercentileBand::from_values(&values)
            })
            .collect();

        let risk_metrics = RiskMetrics {
            var_95: value_at_risk(&net_returns, 0.95),
            var_99: value_at_risk(&net_returns, 0.99),
            irr_var_95: value_at_risk(&irr_samples, 0.95),
            correlations: Correlations::compute(&irrs, &multiples, &final_values),
        };

        MonteCarloResult {
            num_simulations: runs.len() as u32,
            seed,
            statistics,
            percentile_bands,
            time_series: self.time_series(periods),
            irr_samples,
            revenue_streams: RevenueStreams::mean(&runs.iter().map(|s| s.revenue).collect::<Vec<_>>()),
            risk_metrics,
            loan_outcomes: self.mean_outcomes(),
            cache,
        }
    }

    fn time_series(&self, periods: usize) -> TimeSeries {
        let runs = &self.samples;
        let mean_of = |pick: fn(&RunSample) -> &Vec<f64>| -> Vec<f64> {
            (0..periods)
                .map(|t| {
                    let values: Vec<f64> = runs.iter().filter_map(|s| pick(s).get(t).copied()).collect();
                    mean(&values).unwrap_or(0.0)
                })
                .collect()
        };

        let capital_metrics = (0..periods)
            .map(|t| {
                let at: Vec<CapitalMetrics> = runs.iter().filter_map(|s| s.capital.get(t).copied()).collect();
                let avg = |f: fn(&CapitalMetrics) -> f64| {
                    mean(&at.iter().map(f).collect::<Vec<_>>()).unwrap_or(0.0)
                };
                CapitalMetrics {
                    invested: avg(|c| c.invested),
                    available: avg(|c| c.available),
                    total: avg(|c| c.total),
                    cumulative_invested: avg(|c| c.cumulative_invested),
                }
            })
            .collect();

        let years = periods.saturating_sub(1);
        let irr_by_year = (0..years)
            .map(|y| {
                let values: Vec<f64> = runs
                    .iter()
                    .filter_map(|s| s.metrics.irr_by_year.get(y).copied().flatten())
                    .collect();
                mean(&values)
            })
            .collect();

        TimeSeries {
            fund_cash_flows: mean_of(|s| &s.fund_cash_flows),
            lp_cash_flows: mean_of(|s| &s.lp_cash_flows),
            gp_cash_flows: mean_of(|s| &s.gp_cash_flows),
            management_fees: mean_of(|s| &s.management_fees),
            upfront_fees: mean_of(|s| &s.upfront_fees),
            performance_fees: mean_of(|s| &s.performance_fees),
            portfolio_values: mean_of(|s| &s.portfolio_values),
            capital_metrics,
            irr_by_year,
        }
    }

    fn mean_outcomes(&self) -> MeanLoanOutcomes {
        let runs = &self.samples;
        let avg = |f: fn(&LoanOutcomes) -> u32| {
            mean(&runs.iter().map(|s| f(&s.outcomes) as f64).collect::<Vec<_>>()).unwrap_or(0.0)
        };
        MeanLoanOutcomes {
            funded: avg(|o| o.funded),
            defaulted: avg(|o| o.defaulted),
            early_exit: avg(|o| o.early_exit),
            scheduled_exit: avg(|o| o.scheduled_exit),
            matured: avg(|o| o.matured),
            settled_at_horizon: avg(|o| o.settled_at_horizon),
        }
    }
}
