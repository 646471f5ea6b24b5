//! Loan records and the categorical risk factors attached to them

use serde::{Deserialize, Serialize};

/// Risk zone of the underlying property
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Green,
    Orange,
    Red,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Green, Zone::Orange, Zone::Red];

    /// Multiplier applied to the fund default rate
    pub fn default_multiplier(&self) -> f64 {
        match self {
            Zone::Green => 0.5,
            Zone::Orange => 1.0,
            Zone::Red => 1.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Green => "green",
            Zone::Orange => "orange",
            Zone::Red => "red",
        }
    }
}

/// Market the loan is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Geography {
    Sydney,
    Melbourne,
    Brisbane,
}

impl Geography {
    pub const ALL: [Geography; 3] = [Geography::Sydney, Geography::Melbourne, Geography::Brisbane];

    /// Multiplier applied to the fund interest rate
    pub fn interest_multiplier(&self) -> f64 {
        match self {
            Geography::Sydney => 1.0,
            Geography::Melbourne => 1.1,
            Geography::Brisbane => 1.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Geography::Sydney => "sydney",
            Geography::Melbourne => "melbourne",
            Geography::Brisbane => "brisbane",
        }
    }
}

/// Life-cycle state of a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum LoanState {
    /// Written but not yet funded
    #[default]
    Pending,
    Active,
    Defaulted,
    EarlyExit,
    ScheduledExit,
    Matured,
}

impl LoanState {
    /// Outcome states; a loan never leaves one of these
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanState::Defaulted | LoanState::EarlyExit | LoanState::ScheduledExit | LoanState::Matured
        )
    }
}

/// Expected return of a loan over its full term
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanReturn {
    /// Dollar return net of expected loss
    pub total_return: f64,

    /// Total return as an annual fraction of principal
    pub annual_return_rate: f64,
}

/// A single loan in the synthetic book
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: u32,

    /// Principal ($)
    pub amount: f64,

    /// Contractual term (years)
    pub term_years: f64,

    pub zone: Zone,

    pub geography: Geography,

    /// Simulation month in which the loan was funded (0 until deployed)
    pub origination_month: u32,

    pub state: LoanState,

    pub expected_return: LoanReturn,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.state == LoanState::Active
    }

    /// Term in whole months, at least one
    pub fn term_months(&self) -> u32 {
        ((self.term_years * 12.0).round() as u32).max(1)
    }

    /// Months the loan has been funded as of `month`
    pub fn age_months(&self, month: u32) -> u32 {
        month.saturating_sub(self.origination_month)
    }

    /// Share of the term elapsed, capped at 1
    pub fn accrued_fraction(&self, month: u32) -> f64 {
        (self.age_months(month) as f64 / self.term_months() as f64).min(1.0)
    }

    /// Principal plus the return accrued so far
    pub fn mark_to_model(&self, month: u32) -> f64 {
        self.amount + self.expected_return.total_return * self.accrued_fraction(month)
    }

    /// Mark the loan funded in `month`
    pub fn activate(&mut self, month: u32) {
        self.origination_month = month;
        self.state = LoanState::Active;
    }
}
