//! Performance fee (carried interest) policies
//!
//! All policies work on the distributable series after management and upfront
//! fees. Contributed capital is the sum of negative distributable amounts up to
//! the period being charged, and the hurdle compounds it at the hurdle rate. The
//! fee charged in a period never exceeds that period's positive distribution, so
//! investors never pay carry out of pocket.

use crate::params::WaterfallType;

/// Hurdle and fee rate shared by the policies (decimals)
#[derive(Debug, Clone, Copy)]
pub struct CarryTerms {
    pub hurdle_rate: f64,
    pub fee_rate: f64,
}

impl CarryTerms {
    fn hurdle(&self, contributed: f64, periods: u32) -> f64 {
        contributed * (1.0 + self.hurdle_rate).powi(periods as i32)
    }
}

/// Running tracker of contributions, distributions and the fee already charged
#[derive(Debug, Default)]
struct CarryTracker {
    contributed: f64,
    distributed: f64,
    charged_fee: f64,
}

impl CarryTracker {
    fn record(&mut self, d: f64) {
        if d < 0.0 {
            self.contributed += d.abs();
        } else {
            self.distributed += d;
        }
    }

    /// Charge the fee owed on cumulative excess at period `t`, capped at `available`
    ///
    /// Fee owed but not payable out of this period stays owed for later periods.
    fn charge(&mut self, terms: CarryTerms, t: usize, available: f64) -> f64 {
        let excess = (self.distributed - terms.hurdle(self.contributed, t as u32)).max(0.0);
        let fee = (excess * terms.fee_rate - self.charged_fee)
            .max(0.0)
            .min(available.max(0.0));
        self.charged_fee += fee;
        fee
    }
}

/// Performance fee per period for the chosen waterfall
pub fn performance_fees(waterfall: WaterfallType, distributable: &[f64], terms: CarryTerms) -> Vec<f64> {
    match waterfall {
        WaterfallType::European => european(distributable, terms),
        WaterfallType::American => american(distributable, terms, CarryTracker::default(), 0),
        WaterfallType::Hybrid => hybrid(distributable, terms),
    }
}

/// Whole-fund excess over the horizon, charged once in the final period
fn european(distributable: &[f64], terms: CarryTerms) -> Vec<f64> {
    let mut fees = vec![0.0; distributable.len()];
    let Some(last) = distributable.len().checked_sub(1) else {
        return fees;
    };
    if last == 0 {
        return fees;
    }

    let mut tracker = CarryTracker::default();
    distributable.iter().for_each(|&d| tracker.record(d));
    fees[last] = tracker.charge(terms, last, distributable[last]);
    fees
}

/// Fee charged as excess arises, for periods after `settled`
///
/// `tracker` already holds every flow up to and including period `settled`.
fn american(distributable: &[f64], terms: CarryTerms, mut tracker: CarryTracker, settled: usize) -> Vec<f64> {
    let mut fees = vec![0.0; distributable.len()];
    if settled == 0 {
        if let Some(&d0) = distributable.first() {
            tracker.record(d0);
        }
    }

    for (t, &d) in distributable.iter().enumerate().skip(settled + 1) {
        tracker.record(d);
        if d > 0.0 {
            fees[t] = tracker.charge(terms, t, d);
        }
    }
    fees
}

/// European through the midpoint of the horizon, American afterwards
fn hybrid(distributable: &[f64], terms: CarryTerms) -> Vec<f64> {
    let horizon = distributable.len().saturating_sub(1);
    let mid = horizon / 2;
    if mid == 0 {
        return american(distributable, terms, CarryTracker::default(), 0);
    }

    let mut tracker = CarryTracker::default();
    distributable[..=mid].iter().for_each(|&d| tracker.record(d));
    let mid_fee = tracker.charge(terms, mid, distributable[mid]);

    let mut fees = american(distributable, terms, tracker, mid);
    fees[mid] = mid_fee;
    fees
}
