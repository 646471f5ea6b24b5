//! Scenario runner for projections, sensitivity analysis and scenario comparison
//!
//! Holds a validated base parameter set and derives the parameter sets for
//! each study from it.

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::monte_carlo::{
    IrrCache, MonteCarloConfig, MonteCarloResult, MonteCarloSession, RiskMetrics, RunMetrics, SimulationRun,
    Statistics,
};
use crate::params::SimulationParameters;
use crate::portfolio::BookSummary;
use crate::projection::{CashFlowSeries, LoanOutcomes, ProjectionConfig};
use crate::rng::SimRng;
use crate::waterfall::{Distribution, RevenueStreams};

/// Relative variations used when a sensitivity request names none
pub const DEFAULT_VARIATIONS: [f64; 4] = [-0.2, -0.1, 0.1, 0.2];

/// Parameters a sensitivity analysis can vary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SensitivityParameter {
    InterestRate,
    PropertyAppreciation,
    DefaultRate,
    EarlyRepaymentRate,
    ReinvestmentRate,
    TargetLtv,
    AvgTermLength,
    ManagementFee,
    PerformanceFee,
    HurdleRate,
    UpfrontFee,
    Volatility,
    RecoveryRate,
}

impl SensitivityParameter {
    /// Parameters varied when a request names none
    pub const DEFAULTS: [SensitivityParameter; 4] = [
        SensitivityParameter::InterestRate,
        SensitivityParameter::PropertyAppreciation,
        SensitivityParameter::DefaultRate,
        SensitivityParameter::EarlyRepaymentRate,
    ];

    fn field<'a>(&self, params: &'a mut SimulationParameters) -> &'a mut f64 {
        match self {
            SensitivityParameter::InterestRate => &mut params.interest_rate,
            SensitivityParameter::PropertyAppreciation => &mut params.property_appreciation,
            SensitivityParameter::DefaultRate => &mut params.default_rate,
            SensitivityParameter::EarlyRepaymentRate => &mut params.early_repayment_rate,
            SensitivityParameter::ReinvestmentRate => &mut params.reinvestment_rate,
            SensitivityParameter::TargetLtv => &mut params.target_ltv,
            SensitivityParameter::AvgTermLength => &mut params.avg_term_length,
            SensitivityParameter::ManagementFee => &mut params.management_fee,
            SensitivityParameter::PerformanceFee => &mut params.performance_fee,
            SensitivityParameter::HurdleRate => &mut params.hurdle_rate,
            SensitivityParameter::UpfrontFee => &mut params.upfront_fee,
            SensitivityParameter::Volatility => &mut params.volatility,
            SensitivityParameter::RecoveryRate => &mut params.recovery_rate,
        }
    }

    /// Base value of this parameter
    pub fn value(&self, params: &SimulationParameters) -> f64 {
        let mut copy = params.clone();
        *self.field(&mut copy)
    }

    /// Copy of `params` with this parameter scaled by `1 + variation`
    pub fn apply(&self, params: &SimulationParameters, variation: f64) -> SimulationParameters {
        let mut varied = params.clone();
        *self.field(&mut varied) *= 1.0 + variation;
        varied
    }
}

/// Single expected-path projection of the base case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioProjection {
    pub book: BookSummary,
    pub series: CashFlowSeries,
    pub distribution: Distribution,
    pub metrics: RunMetrics,
    pub outcomes: LoanOutcomes,
}

/// One point of a sensitivity analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityPoint {
    /// None for the base case
    pub parameter: Option<SensitivityParameter>,
    pub variation: f64,
    pub value: Option<f64>,
    pub mean_irr: Option<f64>,
    pub mean_equity_multiple: Option<f64>,
    pub mean_final_value: Option<f64>,
    /// Set when the varied parameters are invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SensitivityPoint {
    pub fn from_result(
        parameter: Option<SensitivityParameter>,
        variation: f64,
        value: Option<f64>,
        result: &MonteCarloResult,
    ) -> Self {
        let stats = &result.statistics;
        Self {
            parameter,
            variation,
            value,
            mean_irr: stats.irr.map(|s| s.mean),
            mean_equity_multiple: stats.equity_multiple.map(|s| s.mean),
            mean_final_value: stats.final_value.map(|s| s.mean),
            error: None,
        }
    }

    pub fn invalid(parameter: SensitivityParameter, variation: f64, value: f64, message: String) -> Self {
        Self {
            parameter: Some(parameter),
            variation,
            value: Some(value),
            mean_irr: None,
            mean_equity_multiple: None,
            mean_final_value: None,
            error: Some(message),
        }
    }
}

/// A parameter set to run under a variation
#[derive(Debug, Clone)]
pub struct SensitivityCase {
    pub parameter: SensitivityParameter,
    pub variation: f64,
    pub params: SimulationParameters,
}

impl SensitivityCase {
    pub fn value(&self) -> f64 {
        self.parameter.value(&self.params)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityReport {
    pub base: SensitivityPoint,
    pub points: Vec<SensitivityPoint>,
}

/// A named parameter set for comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedScenario {
    pub name: String,
    #[serde(default)]
    pub params: SimulationParameters,
}

/// Headline results of one compared scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub name: String,
    pub statistics: Statistics,
    pub risk_metrics: RiskMetrics,
    pub revenue_streams: RevenueStreams,
}

impl ScenarioSummary {
    pub fn from_result(name: impl Into<String>, result: &MonteCarloResult) -> Self {
        Self {
            name: name.into(),
            statistics: result.statistics.clone(),
            risk_metrics: result.risk_metrics,
            revenue_streams: result.revenue_streams,
        }
    }
}

/// Runs studies around a validated base case
///
/// # Example
/// ```ignore
/// let runner = ScenarioRunner::new(params)?;
/// let projection = runner.project()?;
/// let report = runner.sensitivity(&SensitivityParameter::DEFAULTS, &DEFAULT_VARIATIONS)?;
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    base_params: SimulationParameters,
    config: MonteCarloConfig,
}

impl ScenarioRunner {
    /// Create runner for a base parameter set
    pub fn new(params: SimulationParameters) -> EngineResult<Self> {
        params.validate()?;
        Ok(Self {
            base_params: params,
            config: MonteCarloConfig::default(),
        })
    }

    pub fn with_config(mut self, config: MonteCarloConfig) -> Self {
        self.config = config;
        self
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.base_params
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    fn seed(&self) -> Option<u64> {
        self.config.seed.or(self.base_params.seed)
    }

    /// Seed shared by every run of a comparison; drawn once when none is configured
    pub fn common_seed(&self) -> u64 {
        self.seed().unwrap_or_else(rand::random)
    }

    /// One pass of the base case without parameter perturbation
    pub fn project(&self) -> EngineResult<PortfolioProjection> {
        let mut rng = SimRng::new(self.seed());
        let mut cache = IrrCache::new();
        let run = SimulationRun::execute(self.base_params.clone(), ProjectionConfig::default(), &mut rng, &mut cache)?;

        Ok(PortfolioProjection {
            book: BookSummary::from_loans(&run.loans),
            series: run.series,
            distribution: run.distribution,
            metrics: run.metrics,
            outcomes: run.outcomes,
        })
    }

    /// Monte Carlo study of a parameter set with this runner's config
    pub fn run(&self, params: &SimulationParameters) -> EngineResult<MonteCarloResult> {
        MonteCarloSession::new(params.clone(), self.config.clone())?.run_to_completion()
    }

    /// Varied parameter sets, in parameter-major order
    pub fn sensitivity_cases(&self, parameters: &[SensitivityParameter], variations: &[f64]) -> Vec<SensitivityCase> {
        parameters
            .iter()
            .flat_map(|&parameter| {
                variations.iter().map(move |&variation| SensitivityCase {
                    parameter,
                    variation,
                    params: parameter.apply(&self.base_params, variation),
                })
            })
            .collect()
    }

    /// Rerun Monte Carlo for each variation, sharing one IRR cache
    pub fn sensitivity(&self, parameters: &[SensitivityParameter], variations: &[f64]) -> EngineResult<SensitivityReport> {
        let mut session = MonteCarloSession::new(self.base_params.clone(), self.config.clone())?;
        let base_result = session.run_to_completion()?;
        let mut cache = session.into_cache();

        let cases = self.sensitivity_cases(parameters, variations);
        info!("sensitivity analysis: {} cases", cases.len());

        let mut points = Vec::with_capacity(cases.len());
        for case in cases {
            let value = case.value();
            let mut session = match MonteCarloSession::new(case.params, self.config.clone()) {
                Ok(session) => session.with_cache(cache),
                Err(e) => {
                    warn!("skipping {:?} {:+}: {}", case.parameter, case.variation, e);
                    points.push(SensitivityPoint::invalid(case.parameter, case.variation, value, e.to_string()));
                    continue;
                }
            };
            let result = session.run_to_completion()?;
            cache = session.into_cache();
            points.push(SensitivityPoint::from_result(Some(case.parameter), case.variation, Some(value), &result));
        }

        Ok(SensitivityReport {
            base: SensitivityPoint::from_result(None, 0.0, None, &base_result),
            points,
        })
    }

    /// Run several scenarios in parallel with common random numbers
    pub fn run_batch(&self, scenarios: &[NamedScenario]) -> EngineResult<Vec<ScenarioSummary>> {
        let config = MonteCarloConfig {
            seed: Some(self.common_seed()),
            ..self.config.clone()
        };

        scenarios
            .par_iter()
            .map(|scenario| -> EngineResult<ScenarioSummary> {
                let result = MonteCarloSession::new(scenario.params.clone(), config.clone())?.run_to_completion()?;
                Ok(ScenarioSummary::from_result(scenario.name.clone(), &result))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quick_params() -> SimulationParameters {
        SimulationParameters {
            num_simulations: 20,
            seed: Some(99),
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_variation() {
        let base = SimulationParameters::default();
        let varied = SensitivityParameter::InterestRate.apply(&base, -0.2);
        assert_relative_eq!(varied.interest_rate, 4.0, epsilon = 1e-12);
        assert_eq!(varied.default_rate, base.default_rate);
        assert_eq!(SensitivityParameter::TargetLtv.value(&base), 60.0);
    }

    #[test]
    fn test_project_is_deterministic_with_seed() {
        let runner = ScenarioRunner::new(quick_params()).unwrap();
        let a = runner.project().unwrap();
        let b = runner.project().unwrap();

        assert_eq!(a.series, b.series);
        assert_eq!(a.series.len(), 11);
        assert!(a.book.loan_count >= 50);
        assert_eq!(a.book.loan_count, a.outcomes.funded);
    }

    #[test]
    fn test_sensitivity_points() {
        let runner = ScenarioRunner::new(quick_params()).unwrap();
        let report = runner
            .sensitivity(&[SensitivityParameter::InterestRate], &DEFAULT_VARIATIONS)
            .unwrap();

        assert_eq!(report.points.len(), 4);
        assert!(report.base.parameter.is_none());
        let low = report.points[0].mean_final_value.unwrap();
        let high = report.points[3].mean_final_value.unwrap();
        assert!(high > low, "interest +20% should beat -20%: {} vs {}", high, low);
    }

    #[test]
    fn test_invalid_variation_reported_per_point() {
        let params = SimulationParameters {
            performance_fee: 45.0,
            ..quick_params()
        };
        let runner = ScenarioRunner::new(params).unwrap();
        let report = runner
            .sensitivity(&[SensitivityParameter::PerformanceFee], &[0.2])
            .unwrap();

        assert!(report.points[0].error.is_some());
        assert!(report.points[0].mean_irr.is_none());
    }

    #[test]
    fn test_batch_uses_common_seed() {
        let runner = ScenarioRunner::new(quick_params()).unwrap();
        let scenarios = vec![
            NamedScenario {
                name: "base".into(),
                params: quick_params(),
            },
            NamedScenario {
                name: "same".into(),
                params: SimulationParameters {
                    seed: Some(1),
                    ..quick_params()
                },
            },
        ];
        let summaries = runner.run_batch(&scenarios).unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "base");
        assert_eq!(summaries[0].statistics, summaries[1].statistics);
    }
}
