//! Waterfall distribution of fund cash flows between investors (LP) and the
//! manager (GP)
//!
//! Management and upfront fees come off first; the remaining distributable
//! amount is split by the performance fee policy chosen in the parameters.

mod carry;

use serde::{Deserialize, Serialize};

use crate::params::{SimulationParameters, WaterfallType};
use crate::projection::CashFlowSeries;

pub use carry::{performance_fees, CarryTerms};

/// Manager revenue by source
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueStreams {
    pub management_fees: f64,
    pub upfront_fees: f64,
    pub performance_fees: f64,
    pub total: f64,
}

impl RevenueStreams {
    fn new(management_fees: f64, upfront_fees: f64, performance_fees: f64) -> Self {
        Self {
            management_fees,
            upfront_fees,
            performance_fees,
            total: management_fees + upfront_fees + performance_fees,
        }
    }

    /// Element-wise mean of several runs' revenue
    pub fn mean(streams: &[RevenueStreams]) -> RevenueStreams {
        if streams.is_empty() {
            return RevenueStreams::default();
        }
        let n = streams.len() as f64;
        let sum = |f: fn(&RevenueStreams) -> f64| streams.iter().map(f).sum::<f64>() / n;
        RevenueStreams::new(
            sum(|s| s.management_fees),
            sum(|s| s.upfront_fees),
            sum(|s| s.performance_fees),
        )
    }
}

/// Result of running a cash-flow series through the waterfall
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub waterfall_type: WaterfallType,
    /// Fund cash flow net of management and upfront fees
    pub distributable: Vec<f64>,
    pub lp_cash_flows: Vec<f64>,
    /// All manager fees per period
    pub gp_cash_flows: Vec<f64>,
    pub management_fees: Vec<f64>,
    pub upfront_fees: Vec<f64>,
    pub performance_fees: Vec<f64>,
    pub revenue: RevenueStreams,
}

/// Applies fees and the carried-interest policy to a simulated series
#[derive(Debug, Clone)]
pub struct Distributor {
    waterfall: WaterfallType,
    management_rate: f64,
    upfront_rate: f64,
    terms: CarryTerms,
}

impl Distributor {
    pub fn new(params: &SimulationParameters) -> Self {
        Self {
            waterfall: params.waterfall_type,
            management_rate: params.management(),
            upfront_rate: params.upfront(),
            terms: CarryTerms {
                hurdle_rate: params.hurdle(),
                fee_rate: params.performance(),
            },
        }
    }

    pub fn distribute(&self, series: &CashFlowSeries) -> Distribution {
        let rows = &series.rows;

        let management_fees: Vec<f64> = rows
            .iter()
            .map(|r| if r.period == 0 { 0.0 } else { r.aum * self.management_rate })
            .collect();
        let upfront_fees: Vec<f64> = rows.iter().map(|r| r.deployed * self.upfront_rate).collect();

        let distributable: Vec<f64> = rows
            .iter()
            .zip(management_fees.iter().zip(&upfront_fees))
            .map(|(r, (m, u))| r.fund_cash_flow - m - u)
            .collect();

        let performance_fees = performance_fees(self.waterfall, &distributable, self.terms);

        let lp_cash_flows = distributable
            .iter()
            .zip(&performance_fees)
            .map(|(d, p)| d - p)
            .collect();
        let gp_cash_flows = management_fees
            .iter()
            .zip(&upfront_fees)
            .zip(&performance_fees)
            .map(|((m, u), p)| m + u + p)
            .collect();

        let revenue = RevenueStreams::new(
            management_fees.iter().sum(),
            upfront_fees.iter().sum(),
            performance_fees.iter().sum(),
        );

        Distribution {
            waterfall_type: self.waterfall,
            distributable,
            lp_cash_flows,
            gp_cash_flows,
            management_fees,
            upfront_fees,
            performance_fees,
            revenue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::PeriodRow;
    use approx::assert_relative_eq;

    fn series(flows: &[f64], aum: &[f64], deployed: &[f64]) -> CashFlowSeries {
        CashFlowSeries {
            rows: flows
                .iter()
                .enumerate()
                .map(|(t, &cf)| PeriodRow {
                    period: t as u32,
                    fund_cash_flow: cf,
                    aum: aum[t],
                    deployed: deployed[t],
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn sample() -> CashFlowSeries {
        series(
            &[-1000.0, 50.0, 300.0, 1200.0],
            &[1000.0, 1000.0, 950.0, 700.0],
            &[0.0, 600.0, 400.0, 0.0],
        )
    }

    #[test]
    fn test_fees_come_off_first() {
        let params = SimulationParameters::default();
        let dist = Distributor::new(&params).distribute(&sample());

        assert_eq!(dist.management_fees[0], 0.0);
        assert_relative_eq!(dist.management_fees[2], 19.0, epsilon = 1e-9);
        assert_relative_eq!(dist.upfront_fees[1], 18.0, epsilon = 1e-9);
        assert_relative_eq!(dist.distributable[1], 50.0 - 20.0 - 18.0, epsilon = 1e-9);
        assert_relative_eq!(dist.revenue.management_fees, 20.0 + 19.0 + 14.0, epsilon = 1e-9);
        assert_relative_eq!(dist.revenue.upfront_fees, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_conservation_for_every_waterfall() {
        for waterfall in [WaterfallType::European, WaterfallType::American, WaterfallType::Hybrid] {
            let params = SimulationParameters {
                waterfall_type: waterfall,
                ..Default::default()
            };
            let flows = sample();
            let dist = Distributor::new(&params).distribute(&flows);

            for t in 0..flows.len() {
                assert_relative_eq!(
                    dist.lp_cash_flows[t] + dist.performance_fees[t],
                    dist.distributable[t],
                    epsilon = 1e-9
                );
                assert_relative_eq!(
                    dist.lp_cash_flows[t] + dist.gp_cash_flows[t],
                    flows.rows[t].fund_cash_flow,
                    epsilon = 1e-9
                );
            }
            assert!(dist.revenue.performance_fees > 0.0, "{:?}", waterfall);
            assert_relative_eq!(
                dist.revenue.total,
                dist.gp_cash_flows.iter().sum::<f64>(),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_conservation_when_fee_cap_binds() {
        // most of the gain arrives early, the final period is too small for the owed fee
        let flows = series(
            &[-1000.0, 2000.0, 100.0, 40.0],
            &[1000.0, 1000.0, 500.0, 100.0],
            &[0.0, 0.0, 0.0, 0.0],
        );
        let params = SimulationParameters::default();
        let dist = Distributor::new(&params).distribute(&flows);

        let last = dist.distributable[3];
        assert_relative_eq!(last, 40.0 - 2.0, epsilon = 1e-9);
        assert_relative_eq!(dist.performance_fees[3], last, epsilon = 1e-9);
        assert_relative_eq!(dist.lp_cash_flows[3], 0.0, epsilon = 1e-9);
        for t in 0..flows.len() {
            assert_relative_eq!(
                dist.lp_cash_flows[t] + dist.performance_fees[t],
                dist.distributable[t],
                epsilon = 1e-9
            );
            assert!(dist.performance_fees[t] <= dist.distributable[t].max(0.0) + 1e-12);
        }
    }

    #[test]
    fn test_revenue_mean() {
        let a = RevenueStreams::new(10.0, 2.0, 0.0);
        let b = RevenueStreams::new(20.0, 4.0, 6.0);
        let m = RevenueStreams::mean(&[a, b]);
        assert_eq!(m, RevenueStreams::new(15.0, 3.0, 3.0));
        assert_eq!(m.total, 21.0);
        assert_eq!(RevenueStreams::mean(&[]), RevenueStreams::default());
    }
}
