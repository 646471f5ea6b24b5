//! Internal Rate of Return (IRR) calculation
//!
//! Used for fund, investor and manager cash flows, and for the IRR-by-year
//! series on truncated cash flows.

/// Starting rate for Newton-Raphson
pub const INITIAL_GUESS: f64 = 0.1;

/// Convergence tolerance on successive rates
pub const TOLERANCE: f64 = 1e-7;

pub const MAX_ITERATIONS: usize = 1000;

/// Calculate the Internal Rate of Return (IRR) for a series of periodic cash
/// flows using the Newton-Raphson method.
///
/// # Arguments
/// * `cashflows` - Cash flows per period (positive = inflow, negative = outflow)
///
/// # Returns
/// * `Option<f64>` - Periodic IRR as a decimal, or None when the series has no
///   sign change, an iterate leaves the domain (≤ -100% or non-finite), the
///   derivative vanishes, or the iteration does not converge
pub fn calculate_irr(cashflows: &[f64]) -> Option<f64> {
    let has_positive = cashflows.iter().any(|&cf| cf > 0.0);
    let has_negative = cashflows.iter().any(|&cf| cf < 0.0);
    if !has_positive || !has_negative {
        return None;
    }

    let mut rate = INITIAL_GUESS;

    for _ in 0..MAX_ITERATIONS {
        let (npv, dnpv) = npv_and_derivative(cashflows, rate);

        if !dnpv.is_finite() || dnpv.abs() < 1e-20 {
            return None;
        }

        let new_rate = rate - npv / dnpv;
        if !new_rate.is_finite() || new_rate <= -1.0 {
            return None;
        }

        if (new_rate - rate).abs() < TOLERANCE {
            return Some(new_rate);
        }

        rate = new_rate;
    }

    None
}

/// Calculate NPV and its derivative with respect to rate
fn npv_and_derivative(cashflows: &[f64], rate: f64) -> (f64, f64) {
    let mut npv = 0.0;
    let mut dnpv = 0.0;

    for (t, &cf) in cashflows.iter().enumerate() {
        let discount = (1.0 + rate).powi(t as i32);
        npv += cf / discount;
        if t > 0 {
            dnpv -= (t as f64) * cf / ((1.0 + rate).powi(t as i32 + 1));
        }
    }

    (npv, dnpv)
}

/// Calculate NPV at a given periodic rate
pub fn npv_at_rate(cashflows: &[f64], rate: f64) -> f64 {
    cashflows
        .iter()
        .enumerate()
        .map(|(t, &cf)| cf / (1.0 + rate).powi(t as i32))
        .sum()
}

/// IRR of each prefix `cashflows[..=t]` for t = 1..len
///
/// Early prefixes usually have no sign change and come back as None.
pub fn irr_by_period(cashflows: &[f64]) -> Vec<Option<f64>> {
    (1..cashflows.len())
        .map(|t| calculate_irr(&cashflows[..=t]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_irr() {
        // Investment of $100, returns $110 after 1 period
        let irr = calculate_irr(&[-100.0, 110.0]).unwrap();
        assert_relative_eq!(irr, 0.10, epsilon = 1e-9);
    }

    #[test]
    fn test_npv_at_irr_is_zero() {
        let cashflows = [-50_000_000.0, 2_000_000.0, 5_500_000.0, 9_000_000.0, 12_000_000.0, 31_000_000.0];
        let irr = calculate_irr(&cashflows).unwrap();
        assert!(irr > 0.0 && irr < 0.1, "got {}", irr);
        assert!(npv_at_rate(&cashflows, irr).abs() < 1e-2);
    }

    #[test]
    fn test_negative_irr() {
        let irr = calculate_irr(&[-1000.0, 200.0, 300.0, 400.0]).unwrap();
        assert!(irr < 0.0);
        assert!(npv_at_rate(&[-1000.0, 200.0, 300.0, 400.0], irr).abs() < 1e-6);
    }

    #[test]
    fn test_no_sign_change() {
        assert_eq!(calculate_irr(&[]), None);
        assert_eq!(calculate_irr(&[0.0, 0.0]), None);
        assert_eq!(calculate_irr(&[-100.0, -10.0]), None);
        assert_eq!(calculate_irr(&[100.0, 10.0]), None);
    }

    #[test]
    fn test_total_loss_has_no_solution() {
        // every iterate is pushed below -100%
        assert_eq!(calculate_irr(&[-100.0, 0.0, 0.0, 1e-9]), None);
    }

    #[test]
    fn test_irr_by_period() {
        let by_period = irr_by_period(&[-100.0, 0.0, 121.0]);
        assert_eq!(by_period.len(), 2);
        assert_eq!(by_period[0], None);
        assert_relative_eq!(by_period[1].unwrap(), 0.10, epsilon = 1e-7);
    }
}
