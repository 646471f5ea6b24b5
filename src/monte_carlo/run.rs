//! One simulation run: perturb, project, distribute, measure

use serde::{Deserialize, Serialize};

use super::cache::IrrCache;
use crate::error::EngineResult;
use crate::metrics::{equity_multiple, max_drawdown, period_returns, sharpe_ratio};
use crate::params::SimulationParameters;
use crate::portfolio::Loan;
use crate::projection::{CashFlowSeries, LoanOutcomes, ProjectionConfig, ProjectionEngine};
use crate::rng::RandomSource;
use crate::waterfall::{Distribution, Distributor};

/// Return and risk measures of a single run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    /// Fund IRR before fees
    pub irr: Option<f64>,
    pub lp_irr: Option<f64>,
    pub gp_irr: Option<f64>,
    /// IRR of the fund cash flows truncated at each year (years 1..=horizon)
    pub irr_by_year: Vec<Option<f64>>,
    pub equity_multiple: f64,
    pub lp_equity_multiple: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
    /// Sum of positive fund cash flows
    pub final_value: f64,
    /// Net fund cash flow after the capital call, per dollar committed
    pub net_return_multiple: f64,
    pub early_repayment_rate: f64,
}

impl RunMetrics {
    pub fn compute(
        params: &SimulationParameters,
        series: &CashFlowSeries,
        distribution: &Distribution,
        early_repayment_rate: f64,
        cache: &mut IrrCache,
    ) -> Self {
        let fund = series.fund_cash_flows();
        let values = series.portfolio_values();

        let irr_by_year = (1..fund.len()).map(|t| cache.irr(&fund[..=t])).collect();
        let net_return: f64 = fund.iter().skip(1).sum();

        Self {
            irr: cache.irr(&fund),
            lp_irr: cache.irr(&distribution.lp_cash_flows),
            gp_irr: cache.irr(&distribution.gp_cash_flows),
            irr_by_year,
            equity_multiple: equity_multiple(&fund),
            lp_equity_multiple: equity_multiple(&distribution.lp_cash_flows),
            sharpe_ratio: sharpe_ratio(&period_returns(&values), params.risk_free()),
            max_drawdown: max_drawdown(&values),
            final_value: series.total_distributions(),
            net_return_multiple: if params.initial_investment > 0.0 {
                net_return / params.initial_investment
            } else {
                0.0
            },
            early_repayment_rate,
        }
    }
}

/// Complete record of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRun {
    /// Parameters the run used, after any perturbation
    pub params: SimulationParameters,
    pub loans: Vec<Loan>,
    pub series: CashFlowSeries,
    pub distribution: Distribution,
    pub outcomes: LoanOutcomes,
    pub metrics: RunMetrics,
}

impl SimulationRun {
    /// Run one pass with the given parameters as they are
    pub fn execute<R: RandomSource>(
        params: SimulationParameters,
        config: ProjectionConfig,
        rng: &mut R,
        cache: &mut IrrCache,
    ) -> EngineResult<Self> {
        let engine = ProjectionEngine::new(params, config);
        let projection = engine.project(rng)?;
        let params = engine.params().clone();

        let distribution = Distributor::new(&params).distribute(&projection.series);
        let metrics = RunMetrics::compute(
            &params,
            &projection.series,
            &distribution,
            projection.early_repayment_rate,
            cache,
        );

        Ok(Self {
            params,
            loans: projection.loans,
            series: projection.series,
            distribution,
            outcomes: projection.outcomes,
            metrics,
        })
    }
}

/// Draw one run's market parameters around the base case
///
/// Interest rate, appreciation and default rate are each scaled by
/// `1 + N(0, volatility)` and floored at zero.
pub fn perturb<R: RandomSource>(base: &SimulationParameters, rng: &mut R) -> SimulationParameters {
    let vol = base.vol();
    let mut shock = |value: f64| (value * (1.0 + rng.normal(0.0, vol))).max(0.0);

    SimulationParameters {
        interest_rate: shock(base.interest_rate),
        property_appreciation: shock(base.property_appreciation),
        default_rate: shock(base.default_rate),
        ..base.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;
    use approx::assert_relative_eq;

    #[test]
    fn test_execute_default_run() {
        let mut rng = SimRng::seeded(21);
        let mut cache = IrrCache::new();
        let run = SimulationRun::execute(
            SimulationParameters::default(),
            ProjectionConfig::default(),
            &mut rng,
            &mut cache,
        )
        .unwrap();

        assert_eq!(run.series.len(), 11);
        assert_eq!(run.metrics.irr_by_year.len(), 10);
        assert!(run.metrics.irr.is_some());
        // manager flows are all inflows
        assert_eq!(run.metrics.gp_irr, None);
        assert!((0.0..=1.0).contains(&run.metrics.max_drawdown));
        assert_relative_eq!(run.metrics.final_value, run.series.total_distributions());
        assert!(run.metrics.equity_multiple > run.metrics.lp_equity_multiple);
        assert!(!run.loans.is_empty());
    }

    #[test]
    fn test_perturb_touches_market_rates_only() {
        let base = SimulationParameters::default();
        let mut rng = SimRng::seeded(4);
        let drawn = perturb(&base, &mut rng);

        assert_ne!(drawn.interest_rate, base.interest_rate);
        assert_ne!(drawn.default_rate, base.default_rate);
        assert_eq!(drawn.early_repayment_rate, base.early_repayment_rate);
        assert_eq!(drawn.initial_investment, base.initial_investment);
    }

    #[test]
    fn test_perturb_floors_at_zero() {
        let base = SimulationParameters {
            volatility: 100.0,
            ..Default::default()
        };
        let mut rng = SimRng::seeded(8);
        for _ in 0..200 {
            let drawn = perturb(&base, &mut rng);
            assert!(drawn.interest_rate >= 0.0);
            assert!(drawn.property_appreciation >= 0.0);
            assert!(drawn.default_rate >= 0.0);
        }
    }

    #[test]
    fn test_zero_volatility_leaves_base() {
        let base = SimulationParameters {
            volatility: 0.0,
            ..Default::default()
        };
        let drawn = perturb(&base, &mut SimRng::seeded(1));
        assert_eq!(drawn, base);
    }
}
