//! Synthetic loan book generation
//!
//! Amounts and terms are randomized around the configured averages. Zone and
//! geography are not sampled independently per loan: each new loan takes the
//! category furthest behind its target share, so the realized mix tracks the
//! allocation within one loan per category even for small books.

use std::collections::BTreeMap;

use super::returns::loan_return;
use super::{Geography, Loan, LoanState, Zone};
use crate::params::SimulationParameters;
use crate::rng::RandomSource;

/// Smallest loan the generator will write ($)
pub const MIN_LOAN_SIZE: f64 = 100_000.0;

/// Term bounds (years)
pub const MIN_TERM_YEARS: f64 = 0.5;
pub const MAX_TERM_YEARS: f64 = 10.0;

/// Deterministic proportional assignment of categories
#[derive(Debug, Clone)]
pub struct MixAssigner<K> {
    /// (category, target share as a fraction, loans assigned so far)
    slots: Vec<(K, f64, u64)>,
    assigned: u64,
}

impl<K: Copy + Ord> MixAssigner<K> {
    /// Build from a percentage allocation; categories are visited in key order
    pub fn new(allocation: &BTreeMap<K, f64>) -> Self {
        let total: f64 = allocation.values().sum();
        let slots = allocation
            .iter()
            .map(|(&k, &share)| {
                let weight = if total > 0.0 { share / total } else { 0.0 };
                (k, weight, 0)
            })
            .collect();
        Self { slots, assigned: 0 }
    }

    /// Category for the next loan: largest deficit against target, first wins ties
    pub fn next(&mut self) -> Option<K> {
        let step = (self.assigned + 1) as f64;
        let mut best: Option<(usize, f64)> = None;

        for (idx, (_, weight, count)) in self.slots.iter().enumerate() {
            let deficit = weight * step - *count as f64;
            match best {
                Some((_, d)) if deficit <= d => {}
                _ => best = Some((idx, deficit)),
            }
        }

        let (idx, _) = best?;
        self.slots[idx].2 += 1;
        self.assigned += 1;
        Some(self.slots[idx].0)
    }

    /// Loans assigned per category so far
    pub fn counts(&self) -> BTreeMap<K, u64> {
        self.slots.iter().map(|(k, _, c)| (*k, *c)).collect()
    }
}

/// Generates the initial loan book and later originations for one run
#[derive(Debug, Clone)]
pub struct PortfolioGenerator {
    params: SimulationParameters,
    zones: MixAssigner<Zone>,
    geographies: MixAssigner<Geography>,
    next_id: u32,
}

impl PortfolioGenerator {
    /// Create a generator for validated parameters
    pub fn new(params: &SimulationParameters) -> Self {
        Self {
            params: params.clone(),
            zones: MixAssigner::new(&params.zone_allocation),
            geographies: MixAssigner::new(&params.geography_allocation),
            next_id: 1,
        }
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    /// Build the initial book: `loan_count` loans around the average size
    pub fn generate<R: RandomSource>(&mut self, rng: &mut R) -> Vec<Loan> {
        let count = self.params.loan_count();
        (0..count).map(|_| self.originate(rng)).collect()
    }

    /// Write one more loan, continuing the category mix
    pub fn originate<R: RandomSource>(&mut self, rng: &mut R) -> Loan {
        let vol = self.params.vol();
        let avg_size = self.params.avg_loan_size();
        let min_size = MIN_LOAN_SIZE.min(avg_size);

        let amount = (avg_size * (1.0 + rng.normal(0.0, vol))).max(min_size);
        let term_years = (self.params.avg_term_length * (1.0 + rng.normal(0.0, vol / 2.0)))
            .clamp(MIN_TERM_YEARS, MAX_TERM_YEARS);

        // allocations are validated non-empty
        let zone = self.zones.next().unwrap_or(Zone::Orange);
        let geography = self.geographies.next().unwrap_or(Geography::Sydney);

        let id = self.next_id;
        self.next_id += 1;

        Loan {
            id,
            amount,
            term_years,
            zone,
            geography,
            origination_month: 0,
            state: LoanState::Pending,
            expected_return: loan_return(&self.params, amount, term_years, zone, geography),
        }
    }

    pub fn zone_counts(&self) -> BTreeMap<Zone, u64> {
        self.zones.counts()
    }

    pub fn geography_counts(&self) -> BTreeMap<Geography, u64> {
        self.geographies.counts()
    }
}
