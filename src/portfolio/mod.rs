//! Synthetic loan portfolio: loans, risk factors, return model and generator

mod loan;
mod generator;
pub mod returns;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use generator::{MixAssigner, PortfolioGenerator, MAX_TERM_YEARS, MIN_LOAN_SIZE, MIN_TERM_YEARS};
pub use loan::{Geography, Loan, LoanReturn, LoanState, Zone};
pub use returns::loan_return;

/// Count and principal for one category of the book
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exposure {
    pub loans: u32,
    pub principal: f64,
}

/// Composition of a loan book by zone and geography
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub loan_count: u32,
    pub total_principal: f64,
    pub average_term_years: f64,
    pub by_zone: BTreeMap<Zone, Exposure>,
    pub by_geography: BTreeMap<Geography, Exposure>,
}

impl BookSummary {
    pub fn from_loans(loans: &[Loan]) -> Self {
        let mut summary = BookSummary::default();
        let mut term_sum = 0.0;

        for loan in loans {
            summary.loan_count += 1;
            summary.total_principal += loan.amount;
            term_sum += loan.term_years;

            let zone = summary.by_zone.entry(loan.zone).or_default();
            zone.loans += 1;
            zone.principal += loan.amount;

            let geo = summary.by_geography.entry(loan.geography).or_default();
            geo.loans += 1;
            geo.principal += loan.amount;
        }

        if summary.loan_count > 0 {
            summary.average_term_years = term_sum / summary.loan_count as f64;
        }
        summary
    }

    /// Realized share of principal per zone (percent)
    pub fn zone_shares(&self) -> BTreeMap<Zone, f64> {
        shares(&self.by_zone, self.total_principal)
    }

    /// Realized share of principal per geography (percent)
    pub fn geography_shares(&self) -> BTreeMap<Geography, f64> {
        shares(&self.by_geography, self.total_principal)
    }
}

fn shares<K: Copy + Ord>(exposures: &BTreeMap<K, Exposure>, total: f64) -> BTreeMap<K, f64> {
    exposures
        .iter()
        .map(|(k, e)| {
            let share = if total > 0.0 { e.principal / total * 100.0 } else { 0.0 };
            (*k, share)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SimulationParameters;
    use crate::rng::SimRng;

    #[test]
    fn test_book_summary_matches_allocation() {
        let params = SimulationParameters {
            volatility: 0.0,
            ..Default::default()
        };
        let mut rng = SimRng::seeded(5);
        let loans = PortfolioGenerator::new(&params).generate(&mut rng);
        let summary = BookSummary::from_loans(&loans);

        assert_eq!(summary.loan_count, 50);
        assert!((summary.total_principal - 50_000_000.0).abs() < 1e-6);
        assert_eq!(summary.by_zone[&Zone::Orange].loans, 15);

        let shares = summary.geography_shares();
        assert!((shares[&Geography::Sydney] - 70.0).abs() < 1e-9);
        assert!((shares[&Geography::Brisbane] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_book() {
        let summary = BookSummary::from_loans(&[]);
        assert_eq!(summary.loan_count, 0);
        assert_eq!(summary.average_term_years, 0.0);
        assert!(summary.zone_shares().is_empty());
    }
}
