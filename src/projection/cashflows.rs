//! Cash-flow output structures for projections

use serde::{Deserialize, Serialize};

use crate::portfolio::Loan;

/// A single row of projection output for one year
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodRow {
    /// Period index; 0 is fund close
    pub period: u32,

    // Cash movements during the period
    /// Net cash flow to the fund's investors before fees (period 0 = capital call)
    pub fund_cash_flow: f64,
    /// Exit proceeds received from loans
    pub proceeds: f64,
    /// Proceeds retained for new loans
    pub reinvested: f64,
    /// Principal funded during the period
    pub deployed: f64,

    // Capital position at period end
    /// Principal outstanding in active loans
    pub outstanding_principal: f64,
    /// Idle cash
    pub available_cash: f64,
    /// Principal funded since inception
    pub cumulative_invested: f64,
    /// Cash plus mark-to-model value of active loans
    pub net_asset_value: f64,
    /// Net asset value plus cumulative distributions
    pub portfolio_value: f64,

    /// Assets under management for the fee calculation (NAV at start of period)
    pub aum: f64,
}

/// Ordered yearly series for one simulation run (length = horizon + 1)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowSeries {
    pub rows: Vec<PeriodRow>,
}

impl CashFlowSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a period row
    pub fn add_row(&mut self, row: PeriodRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn fund_cash_flows(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.fund_cash_flow).collect()
    }

    pub fn portfolio_values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.portfolio_value).collect()
    }

    pub fn aum(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.aum).collect()
    }

    pub fn deployed(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.deployed).collect()
    }

    /// Capital position per period
    pub fn capital_metrics(&self) -> Vec<CapitalMetrics> {
        self.rows.iter().map(CapitalMetrics::from).collect()
    }

    pub fn final_portfolio_value(&self) -> f64 {
        self.rows.last().map(|r| r.portfolio_value).unwrap_or(0.0)
    }

    /// Sum of positive cash flows returned to investors
    pub fn total_distributions(&self) -> f64 {
        self.rows
            .iter()
            .map(|r| r.fund_cash_flow)
            .filter(|cf| *cf > 0.0)
            .sum()
    }
}

/// Capital position of the fund at a period end
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalMetrics {
    /// Principal outstanding in loans
    pub invested: f64,
    /// Idle cash
    pub available: f64,
    /// invested + available
    pub total: f64,
    pub cumulative_invested: f64,
}

impl From<&PeriodRow> for CapitalMetrics {
    fn from(row: &PeriodRow) -> Self {
        Self {
            invested: row.outstanding_principal,
            available: row.available_cash,
            total: row.outstanding_principal + row.available_cash,
            cumulative_invested: row.cumulative_invested,
        }
    }
}

/// How the loans of one run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanOutcomes {
    pub funded: u32,
    pub defaulted: u32,
    pub early_exit: u32,
    pub scheduled_exit: u32,
    pub matured: u32,
    /// Still active at the horizon and settled at mark-to-model value
    pub settled_at_horizon: u32,
}

/// Complete projection result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub series: CashFlowSeries,

    /// Every loan funded during the run, in funding order
    pub loans: Vec<Loan>,

    pub outcomes: LoanOutcomes,

    /// Early exits as a share of funded loans
    pub early_repayment_rate: f64,
}

impl ProjectionResult {
    /// Get summary statistics
    pub fn summary(&self) -> ProjectionSummary {
        let rows = &self.series.rows;
        ProjectionSummary {
            periods: rows.len() as u32,
            total_distributions: self.series.total_distributions(),
            total_deployed: rows.iter().map(|r| r.deployed).sum(),
            total_reinvested: rows.iter().map(|r| r.reinvested).sum(),
            final_portfolio_value: self.series.final_portfolio_value(),
            loans_funded: self.outcomes.funded,
            early_repayment_rate: self.early_repayment_rate,
        }
    }
}

/// Summary statistics for a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub periods: u32,
    pub total_distributions: f64,
    pub total_deployed: f64,
    pub total_reinvested: f64,
    pub final_portfolio_value: f64,
    pub loans_funded: u32,
    pub early_repayment_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(period: u32, cf: f64, value: f64) -> PeriodRow {
        PeriodRow {
            period,
            fund_cash_flow: cf,
            portfolio_value: value,
            outstanding_principal: 70.0,
            available_cash: 30.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_series_accessors() {
        let mut series = CashFlowSeries::new();
        series.add_row(row(0, -100.0, 100.0));
        series.add_row(row(1, 20.0, 104.0));
        series.add_row(row(2, 95.0, 115.0));

        assert_eq!(series.len(), 3);
        assert_eq!(series.fund_cash_flows(), vec![-100.0, 20.0, 95.0]);
        assert_eq!(series.total_distributions(), 115.0);
        assert_eq!(series.final_portfolio_value(), 115.0);
        assert_eq!(series.capital_metrics()[1].total, 100.0);
    }
}
