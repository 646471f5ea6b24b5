//! Fund state tracking during a projection

/// Capital position of the fund at a point in time during projection
#[derive(Debug, Clone)]
pub struct FundState {
    /// Current projection month (1-indexed, 0 before the first step)
    pub month: u32,

    /// Committed fund size
    pub fund_size: f64,

    /// Idle cash held by the fund
    pub cash: f64,

    /// Principal funded from the initial commitment
    pub initially_deployed: f64,

    /// Principal funded since inception, including reinvestment
    pub cumulative_invested: f64,

    /// Cash returned to investors since inception
    pub cumulative_distributed: f64,

    /// Loans funded since inception
    pub loans_funded: u32,

    /// Net asset value at the end of the previous year (fee base)
    pub prior_year_nav: f64,
}

impl FundState {
    /// Initialize state at fund close: all capital called, nothing deployed
    pub fn new(fund_size: f64) -> Self {
        Self {
            month: 0,
            fund_size,
            cash: fund_size,
            initially_deployed: 0.0,
            cumulative_invested: 0.0,
            cumulative_distributed: 0.0,
            loans_funded: 0,
            prior_year_nav: fund_size,
        }
    }

    /// Advance to next month
    pub fn advance_month(&mut self) {
        self.month += 1;
    }

    /// Year the current month falls in (1-indexed)
    pub fn year(&self) -> u32 {
        (self.month + 11) / 12
    }

    pub fn is_year_end(&self) -> bool {
        self.month > 0 && self.month % 12 == 0
    }

    /// Move cash into a newly funded loan
    pub fn fund(&mut self, principal: f64) {
        self.cash -= principal;
        self.cumulative_invested += principal;
        self.loans_funded += 1;
    }

    /// Pay cash out to investors
    pub fn distribute(&mut self, amount: f64) {
        self.cumulative_distributed += amount;
    }
}
