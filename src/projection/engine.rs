//! Core projection engine for monthly loan-book cash-flow simulation

use std::collections::VecDeque;

use log::debug;

use super::cashflows::{CashFlowSeries, LoanOutcomes, PeriodRow, ProjectionResult};
use super::state::FundState;
use crate::error::{EngineError, EngineResult};
use crate::params::SimulationParameters;
use crate::portfolio::returns::adjusted_default_rate;
use crate::portfolio::{Loan, LoanState, PortfolioGenerator};
use crate::rng::RandomSource;

/// Tolerance when checking whether a loan fits the deployment budget ($)
const FIT_TOLERANCE: f64 = 1e-6;

/// Configuration for a projection run
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// Keep the funded loans in the result
    pub detailed_output: bool,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self { detailed_output: true }
    }
}

/// Uniform draws for one loan-month
#[derive(Debug, Clone, Copy)]
struct MonthDraws {
    default: f64,
    early_exit: f64,
    scheduled_exit: f64,
}

/// Per-year accumulators, reset after each period row is written
#[derive(Debug, Default)]
struct PeriodTotals {
    distributed: f64,
    proceeds: f64,
    reinvested: f64,
    deployed: f64,
}

/// Main projection engine
pub struct ProjectionEngine {
    params: SimulationParameters,
    config: ProjectionConfig,
}

impl ProjectionEngine {
    /// Create a new projection engine for (already validated) parameters
    pub fn new(params: SimulationParameters, config: ProjectionConfig) -> Self {
        Self { params, config }
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    /// Generate a loan book and run it through the fund's life
    pub fn project<R: RandomSource>(&self, rng: &mut R) -> EngineResult<ProjectionResult> {
        let mut generator = PortfolioGenerator::new(&self.params);
        let book = generator.generate(rng);
        self.project_book(book, &mut generator, rng)
    }

    /// Run a given initial book; `generator` writes the reinvestment loans
    pub fn project_book<R: RandomSource>(
        &self,
        book: Vec<Loan>,
        generator: &mut PortfolioGenerator,
        rng: &mut R,
    ) -> EngineResult<ProjectionResult> {
        let params = &self.params;
        let horizon_months = params.horizon_months();
        let deployment_months = ((params.initial_deployment_period * 12.0).round() as u32).max(1);
        let reinvestment_end = (params.last_reinvestment_year * 12.0).round() as u32;

        let mut state = FundState::new(params.initial_investment);
        let mut pending: VecDeque<Loan> = book.into();
        let mut loans: Vec<Loan> = Vec::with_capacity(pending.len());
        let mut outcomes = LoanOutcomes::default();
        let mut totals = PeriodTotals::default();

        let mut series = CashFlowSeries::new();
        series.add_row(PeriodRow {
            period: 0,
            fund_cash_flow: -params.initial_investment,
            available_cash: state.cash,
            net_asset_value: state.cash,
            portfolio_value: state.cash,
            aum: params.initial_investment,
            ..Default::default()
        });

        for _ in 0..horizon_months {
            state.advance_month();
            let month = state.month;

            if month <= deployment_months {
                totals.deployed += self.deploy_initial(&mut state, &mut pending, &mut loans, deployment_months);
            }

            let proceeds = self.step_loans(&mut loans, month, rng, &mut outcomes);
            totals.proceeds += proceeds;

            let mut distribute = proceeds;
            if month <= reinvestment_end {
                let retained = proceeds * params.reinvestment();
                state.cash += retained;
                totals.reinvested += retained;
                distribute -= retained;

                if month >= deployment_months {
                    totals.deployed += self.reinvest(&mut state, &mut loans, generator, rng);
                }
            } else if month >= deployment_months {
                distribute += state.cash;
                state.cash = 0.0;
            }

            if month == horizon_months {
                for loan in loans.iter().filter(|l| l.is_active()) {
                    distribute += loan.mark_to_model(month);
                    outcomes.settled_at_horizon += 1;
                }
                distribute += state.cash;
                state.cash = 0.0;
            }

            state.distribute(distribute);
            totals.distributed += distribute;

            if state.is_year_end() {
                let row = self.close_period(&state, &loans, &totals, month == horizon_months);
                debug!(
                    "period {}: distributed {:.0}, nav {:.0}, active loans {}",
                    row.period,
                    row.fund_cash_flow,
                    row.net_asset_value,
                    loans.iter().filter(|l| l.is_active()).count()
                );
                state.prior_year_nav = row.net_asset_value;
                series.add_row(row);
                totals = PeriodTotals::default();
            }
        }

        outcomes.funded = state.loans_funded;
        let early_repayment_rate = if outcomes.funded > 0 {
            outcomes.early_exit as f64 / outcomes.funded as f64
        } else {
            0.0
        };

        check_finite(&series)?;

        Ok(ProjectionResult {
            series,
            loans: if self.config.detailed_output { loans } else { Vec::new() },
            outcomes,
            early_repayment_rate,
        })
    }

    /// Fund pending loans up to this month's cumulative deployment target
    fn deploy_initial(
        &self,
        state: &mut FundState,
        pending: &mut VecDeque<Loan>,
        loans: &mut Vec<Loan>,
        deployment_months: u32,
    ) -> f64 {
        let month = state.month;
        let target = state.fund_size * (month as f64 / deployment_months as f64).min(1.0);
        let final_month = month == deployment_months;
        let mut deployed = 0.0;

        while let Some(next) = pending.front() {
            let room = (target - state.initially_deployed).min(state.cash);
            if room <= FIT_TOLERANCE {
                break;
            }

            let fits = next.amount <= room + FIT_TOLERANCE;
            if !fits && !final_month {
                break;
            }

            let Some(mut loan) = pending.pop_front() else { break };
            if !fits {
                trim_loan(&mut loan, room);
            }
            loan.activate(month);
            state.fund(loan.amount);
            state.initially_deployed += loan.amount;
            deployed += loan.amount;
            loans.push(loan);

            if !fits {
                break;
            }
        }

        if final_month && !pending.is_empty() {
            debug!("{} loans left undeployed at end of deployment period", pending.len());
            pending.clear();
        }
        deployed
    }

    /// Write new loans from idle cash once it reaches one average loan size
    fn reinvest<R: RandomSource>(
        &self,
        state: &mut FundState,
        loans: &mut Vec<Loan>,
        generator: &mut PortfolioGenerator,
        rng: &mut R,
    ) -> f64 {
        let threshold = self.params.avg_loan_size();
        let mut deployed = 0.0;

        while state.cash >= threshold && state.cash > FIT_TOLERANCE {
            let mut loan = generator.originate(rng);
            if loan.amount > state.cash {
                trim_loan(&mut loan, state.cash);
            }
            loan.activate(state.month);
            state.fund(loan.amount);
            deployed += loan.amount;
            loans.push(loan);
        }
        deployed
    }

    /// Advance every active loan one month; returns exit proceeds received
    fn step_loans<R: RandomSource>(
        &self,
        loans: &mut [Loan],
        month: u32,
        rng: &mut R,
        outcomes: &mut LoanOutcomes,
    ) -> f64 {
        let mut proceeds = 0.0;

        for loan in loans.iter_mut().filter(|l| l.is_active()) {
            if loan.origination_month == month {
                continue;
            }

            let draws = MonthDraws {
                default: rng.uniform(),
                early_exit: rng.uniform(),
                scheduled_exit: rng.uniform(),
            };

            let Some(next_state) = self.transition(loan, month, draws) else {
                continue;
            };

            proceeds += self.exit_cash_flow(loan, next_state, month);
            loan.state = next_state;

            match next_state {
                LoanState::Defaulted => outcomes.defaulted += 1,
                LoanState::EarlyExit => outcomes.early_exit += 1,
                LoanState::ScheduledExit => outcomes.scheduled_exit += 1,
                LoanState::Matured => outcomes.matured += 1,
                LoanState::Pending | LoanState::Active => {}
            }
        }
        proceeds
    }

    /// Terminal state reached this month, if any, checked in priority order
    fn transition(&self, loan: &Loan, month: u32, draws: MonthDraws) -> Option<LoanState> {
        let age = loan.age_months(month);
        let term = loan.term_months();

        if draws.default < self.default_hazard(loan, age) {
            return Some(LoanState::Defaulted);
        }
        if age < term {
            if draws.early_exit < self.early_exit_hazard(age) {
                return Some(LoanState::EarlyExit);
            }
            if draws.scheduled_exit < scheduled_exit_hazard(age, term) {
                return Some(LoanState::ScheduledExit);
            }
            return None;
        }
        Some(LoanState::Matured)
    }

    /// Monthly default probability, rising with age up to twice the base
    fn default_hazard(&self, loan: &Loan, age: u32) -> f64 {
        let base = adjusted_default_rate(&self.params, loan.zone) / 12.0;
        let seasoning = 1.0 + age as f64 / (self.params.avg_term_length * 12.0);
        (base * seasoning).min(2.0 * base)
    }

    /// Monthly early repayment probability, halving every half average term
    fn early_exit_hazard(&self, age: u32) -> f64 {
        let monthly = 1.0 - (1.0 - self.params.early_repayment()).powf(1.0 / 12.0);
        let decay = 0.5_f64.powf(age as f64 / (self.params.avg_term_length * 6.0));
        monthly * decay
    }

    fn exit_cash_flow(&self, loan: &Loan, state: LoanState, month: u32) -> f64 {
        match state {
            LoanState::Defaulted => loan.amount * self.params.recovery(),
            LoanState::EarlyExit | LoanState::ScheduledExit => loan.mark_to_model(month),
            LoanState::Matured => loan.amount + loan.expected_return.total_return,
            LoanState::Pending | LoanState::Active => 0.0,
        }
    }

    fn close_period(&self, state: &FundState, loans: &[Loan], totals: &PeriodTotals, last: bool) -> PeriodRow {
        let month = state.month;
        let (outstanding, marked) = if last {
            (0.0, 0.0)
        } else {
            loans
                .iter()
                .filter(|l| l.is_active())
                .fold((0.0, 0.0), |(p, v), l| (p + l.amount, v + l.mark_to_model(month)))
        };
        let net_asset_value = state.cash + marked;

        PeriodRow {
            period: state.year(),
            fund_cash_flow: totals.distributed,
            proceeds: totals.proceeds,
            reinvested: totals.reinvested,
            deployed: totals.deployed,
            outstanding_principal: outstanding,
            available_cash: state.cash,
            cumulative_invested: state.cumulative_invested,
            net_asset_value,
            portfolio_value: net_asset_value + state.cumulative_distributed,
            aum: state.prior_year_nav,
        }
    }
}

/// Shrink a loan to `amount`, scaling its expected return with it
fn trim_loan(loan: &mut Loan, amount: f64) {
    if loan.amount > 0.0 {
        let scale = amount / loan.amount;
        loan.expected_return.total_return *= scale;
    }
    loan.amount = amount;
}

/// Scheduled exit probability: 1/12 per month in the final year of term
fn scheduled_exit_hazard(age: u32, term: u32) -> f64 {
    if term - age <= 12 {
        1.0 / 12.0
    } else {
        0.001
    }
}

fn check_finite(series: &CashFlowSeries) -> EngineResult<()> {
    for row in &series.rows {
        let values = [
            row.fund_cash_flow,
            row.portfolio_value,
            row.net_asset_value,
            row.aum,
            row.deployed,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::simulation(
                "projection",
                format!("non-finite value in period {}", row.period),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;
    use approx::assert_relative_eq;

    /// Replays fixed draws: uniforms cycle through `uniforms`, normals are zero
    struct FixedDraws {
        uniforms: Vec<f64>,
        idx: usize,
    }

    impl RandomSource for FixedDraws {
        fn uniform(&mut self) -> f64 {
            let u = self.uniforms[self.idx % self.uniforms.len()];
            self.idx += 1;
            u
        }

        fn standard_normal(&mut self) -> f64 {
            0.0
        }
    }

    fn no_events() -> FixedDraws {
        FixedDraws {
            uniforms: vec![0.999_999],
            idx: 0,
        }
    }

    fn quiet_params() -> SimulationParameters {
        SimulationParameters {
            volatility: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_series_shape() {
        let engine = ProjectionEngine::new(SimulationParameters::default(), ProjectionConfig::default());
        let mut rng = SimRng::seeded(11);
        let result = engine.project(&mut rng).unwrap();

        assert_eq!(result.series.len(), 11);
        assert_eq!(result.series.rows[0].fund_cash_flow, -50_000_000.0);
        assert_eq!(result.series.rows[0].portfolio_value, 50_000_000.0);
        for (t, row) in result.series.rows.iter().enumerate() {
            assert_eq!(row.period as usize, t);
        }
        // everything is returned by the horizon
        let last = result.series.rows.last().unwrap();
        assert_eq!(last.net_asset_value, 0.0);
        assert_relative_eq!(last.portfolio_value, result.series.total_distributions(), epsilon = 1e-3);
    }

    #[test]
    fn test_deployment_schedule_without_events() {
        let params = SimulationParameters {
            reinvestment_rate: 0.0,
            ..quiet_params()
        };
        let engine = ProjectionEngine::new(params, ProjectionConfig::default());
        let result = engine.project(&mut no_events()).unwrap();
        let rows = &result.series.rows;

        // 1M loans against a 50M / 36 month ramp
        assert_relative_eq!(rows[1].deployed, 16_000_000.0, epsilon = 1e-6);
        assert_relative_eq!(rows[2].deployed, 17_000_000.0, epsilon = 1e-6);
        assert_relative_eq!(rows[3].deployed, 17_000_000.0, epsilon = 1e-6);
        assert_relative_eq!(rows[3].cumulative_invested, 50_000_000.0, epsilon = 1e-6);
        assert_eq!(result.outcomes.funded, 50);
    }

    #[test]
    fn test_no_events_means_everything_matures() {
        let params = SimulationParameters {
            reinvestment_rate: 0.0,
            ..quiet_params()
        };
        let engine = ProjectionEngine::new(params.clone(), ProjectionConfig::default());
        let result = engine.project(&mut no_events()).unwrap();

        assert_eq!(result.outcomes.matured, 50);
        assert_eq!(result.outcomes.defaulted, 0);
        assert_eq!(result.early_repayment_rate, 0.0);

        let expected: f64 = result
            .loans
            .iter()
            .map(|l| l.amount + l.expected_return.total_return)
            .sum();
        assert_relative_eq!(result.series.total_distributions(), expected, epsilon = 1e-3);
        assert!(result.loans.iter().all(|l| l.state == LoanState::Matured));
    }

    #[test]
    fn test_all_default_recovers_fraction() {
        let params = SimulationParameters {
            reinvestment_rate: 0.0,
            ..quiet_params()
        };
        let engine = ProjectionEngine::new(params, ProjectionConfig::default());
        let mut rng = FixedDraws {
            uniforms: vec![0.0],
            idx: 0,
        };
        let result = engine.project(&mut rng).unwrap();

        assert_eq!(result.outcomes.defaulted, 50);
        assert_relative_eq!(result.series.total_distributions(), 30_000_000.0, epsilon = 1e-3);
    }

    #[test]
    fn test_priority_default_over_exit() {
        let engine = ProjectionEngine::new(quiet_params(), ProjectionConfig::default());
        let mut loan = PortfolioGenerator::new(engine.params()).originate(&mut no_events());
        loan.activate(1);

        let draws = MonthDraws {
            default: 0.0,
            early_exit: 0.0,
            scheduled_exit: 0.0,
        };
        assert_eq!(engine.transition(&loan, 5, draws), Some(LoanState::Defaulted));

        let draws = MonthDraws {
            default: 0.99,
            early_exit: 0.0,
            scheduled_exit: 0.0,
        };
        assert_eq!(engine.transition(&loan, 5, draws), Some(LoanState::EarlyExit));

        let draws = MonthDraws {
            default: 0.99,
            early_exit: 0.99,
            scheduled_exit: 0.99,
        };
        assert_eq!(engine.transition(&loan, 5, draws), None);
        assert_eq!(engine.transition(&loan, 25, draws), Some(LoanState::Matured));
    }

    #[test]
    fn test_hazards() {
        let engine = ProjectionEngine::new(quiet_params(), ProjectionConfig::default());
        let mut loan = PortfolioGenerator::new(engine.params()).originate(&mut no_events());
        loan.zone = crate::portfolio::Zone::Orange;

        let base = 0.01 / 12.0;
        assert_relative_eq!(engine.default_hazard(&loan, 0), base, epsilon = 1e-15);
        assert_relative_eq!(engine.default_hazard(&loan, 12), base * 1.5, epsilon = 1e-15);
        assert_relative_eq!(engine.default_hazard(&loan, 60), base * 2.0, epsilon = 1e-15);

        let monthly = 1.0 - 0.85_f64.powf(1.0 / 12.0);
        assert_relative_eq!(engine.early_exit_hazard(0), monthly, epsilon = 1e-15);
        assert_relative_eq!(engine.early_exit_hazard(12), monthly * 0.5, epsilon = 1e-15);

        assert_eq!(scheduled_exit_hazard(20, 24), 1.0 / 12.0);
        assert_eq!(scheduled_exit_hazard(5, 24), 0.001);
    }

    #[test]
    fn test_reinvestment_writes_new_loans() {
        let engine = ProjectionEngine::new(quiet_params(), ProjectionConfig::default());
        let result = engine.project(&mut no_events()).unwrap();

        assert!(result.outcomes.funded > 50);
        let reinvested: f64 = result.series.rows.iter().map(|r| r.reinvested).sum();
        assert!(reinvested > 0.0);
        // nothing retained after the reinvestment window
        assert!(result.series.rows[8..].iter().all(|r| r.reinvested == 0.0));
    }

    #[test]
    fn test_same_seed_same_projection() {
        let engine = ProjectionEngine::new(SimulationParameters::default(), ProjectionConfig::default());
        let a = engine.project(&mut SimRng::seeded(7)).unwrap();
        let b = engine.project(&mut SimRng::seeded(7)).unwrap();
        assert_eq!(a.series, b.series);
        assert_eq!(a.outcomes, b.outcomes);
    }

    #[test]
    fn test_non_finite_is_simulation_error() {
        let params = SimulationParameters {
            interest_rate: f64::NAN,
            ..quiet_params()
        };
        let engine = ProjectionEngine::new(params, ProjectionConfig { detailed_output: false });
        let result = engine.project(&mut no_events());
        assert!(matches!(result, Err(EngineError::Simulation { .. })));
    }
}
