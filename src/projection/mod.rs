//! Cash-flow simulation of a loan book over the fund's life

mod state;
mod engine;
mod cashflows;

pub use state::FundState;
pub use engine::{ProjectionEngine, ProjectionConfig};
pub use cashflows::{CapitalMetrics, CashFlowSeries, LoanOutcomes, PeriodRow, ProjectionResult, ProjectionSummary};
