//! Simulation parameter set matching the request payload format

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::portfolio::{Geography, Zone};

/// Share of the loan book per zone, in percent
pub type ZoneAllocation = BTreeMap<Zone, f64>;

/// Share of the loan book per geography, in percent
pub type GeographyAllocation = BTreeMap<Geography, f64>;

/// Carried-interest waterfall structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaterfallType {
    /// Whole-of-fund: performance fee once, at the end of the horizon
    #[default]
    European,
    /// Deal-by-deal: performance fee each period on new excess
    American,
    /// European for the first half of the horizon, American afterwards
    Hybrid,
}

impl WaterfallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaterfallType::European => "european",
            WaterfallType::American => "american",
            WaterfallType::Hybrid => "hybrid",
        }
    }
}

/// Input parameter set for one fund simulation
///
/// All rate-like fields are expressed in percent (5.0 = 5%), as they arrive
/// from the dashboard. Missing fields take the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationParameters {
    /// Fund size ($)
    pub initial_investment: f64,

    /// Annual loan interest rate (%)
    pub interest_rate: f64,

    /// Annual property appreciation (%)
    pub property_appreciation: f64,

    /// Annual default rate (%)
    pub default_rate: f64,

    /// Share of exit proceeds retained for new loans during the reinvestment window (%)
    pub reinvestment_rate: f64,

    /// Target loan-to-value (%)
    pub target_ltv: f64,

    /// Average loan term (years)
    pub avg_term_length: f64,

    /// Period over which the initial capital is deployed (years)
    pub initial_deployment_period: f64,

    /// Last year in which proceeds can be reinvested
    pub last_reinvestment_year: f64,

    /// Annual management fee on assets under management (%)
    pub management_fee: f64,

    /// Performance fee on distributions above the hurdle (%)
    pub performance_fee: f64,

    /// Hurdle rate (%)
    pub hurdle_rate: f64,

    /// Upfront fee on loan origination (%)
    pub upfront_fee: f64,

    /// Fund lifetime (years)
    pub time_horizon: u32,

    /// Volatility of simulation inputs (%)
    pub volatility: f64,

    /// Number of Monte Carlo runs
    pub num_simulations: u32,

    /// Annual early repayment rate (%)
    pub early_repayment_rate: f64,

    pub waterfall_type: WaterfallType,

    pub zone_allocation: ZoneAllocation,

    pub geography_allocation: GeographyAllocation,

    /// Principal recovered when a loan defaults (%)
    pub recovery_rate: f64,

    /// Risk-free rate used in the Sharpe ratio (%)
    pub risk_free_rate: f64,

    /// Optional RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            initial_investment: 50_000_000.0,
            interest_rate: 5.0,
            property_appreciation: 3.0,
            default_rate: 1.0,
            reinvestment_rate: 70.0,
            target_ltv: 60.0,
            avg_term_length: 2.0,
            initial_deployment_period: 3.0,
            last_reinvestment_year: 7.0,
            management_fee: 2.0,
            performance_fee: 20.0,
            hurdle_rate: 8.0,
            upfront_fee: 3.0,
            time_horizon: 10,
            volatility: 2.0,
            num_simulations: 1000,
            early_repayment_rate: 15.0,
            waterfall_type: WaterfallType::European,
            zone_allocation: BTreeMap::from([
                (Zone::Green, 60.0),
                (Zone::Orange, 30.0),
                (Zone::Red, 10.0),
            ]),
            geography_allocation: BTreeMap::from([
                (Geography::Sydney, 70.0),
                (Geography::Melbourne, 20.0),
                (Geography::Brisbane, 10.0),
            ]),
            recovery_rate: 60.0,
            risk_free_rate: 2.0,
            seed: None,
        }
    }
}

/// Convert a percentage to a decimal fraction
#[inline]
pub fn pct(value: f64) -> f64 {
    value / 100.0
}

impl SimulationParameters {
    pub fn interest(&self) -> f64 {
        pct(self.interest_rate)
    }

    pub fn appreciation(&self) -> f64 {
        pct(self.property_appreciation)
    }

    pub fn default_probability(&self) -> f64 {
        pct(self.default_rate)
    }

    pub fn reinvestment(&self) -> f64 {
        pct(self.reinvestment_rate)
    }

    pub fn ltv(&self) -> f64 {
        pct(self.target_ltv)
    }

    pub fn management(&self) -> f64 {
        pct(self.management_fee)
    }

    pub fn performance(&self) -> f64 {
        pct(self.performance_fee)
    }

    pub fn hurdle(&self) -> f64 {
        pct(self.hurdle_rate)
    }

    pub fn upfront(&self) -> f64 {
        pct(self.upfront_fee)
    }

    pub fn vol(&self) -> f64 {
        pct(self.volatility)
    }

    pub fn early_repayment(&self) -> f64 {
        pct(self.early_repayment_rate)
    }

    pub fn recovery(&self) -> f64 {
        pct(self.recovery_rate)
    }

    pub fn risk_free(&self) -> f64 {
        pct(self.risk_free_rate)
    }

    /// Number of monthly steps in the fund lifetime
    pub fn horizon_months(&self) -> u32 {
        self.time_horizon.saturating_mul(12)
    }

    /// Loans in the initial book: one per $1M, at least 10
    pub fn loan_count(&self) -> usize {
        ((self.initial_investment / 1_000_000.0).floor() as usize).max(10)
    }

    pub fn avg_loan_size(&self) -> f64 {
        self.initial_investment / self.loan_count() as f64
    }
}
