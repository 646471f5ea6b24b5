//! Loan return model
//!
//! Expected return over the term of a loan, from fees, interest and the
//! lender's share of property appreciation, less expected default loss.

use super::{Geography, LoanReturn, Zone};
use crate::params::SimulationParameters;

/// Default rate after the zone multiplier (decimal, annual)
pub fn adjusted_default_rate(params: &SimulationParameters, zone: Zone) -> f64 {
    params.default_probability() * zone.default_multiplier()
}

/// Interest rate after the geography multiplier (decimal, annual)
pub fn adjusted_interest_rate(params: &SimulationParameters, geography: Geography) -> f64 {
    params.interest() * geography.interest_multiplier()
}

/// Expected return of a loan with the given amount, term and risk factors
pub fn loan_return(
    params: &SimulationParameters,
    amount: f64,
    term_years: f64,
    zone: Zone,
    geography: Geography,
) -> LoanReturn {
    let ltv = params.ltv();
    let default_rate = adjusted_default_rate(params, zone);
    let interest_rate = adjusted_interest_rate(params, geography);

    let property_value = amount / ltv;

    let upfront_revenue = amount * params.upfront();
    let interest_revenue = amount * interest_rate * term_years;

    let appreciated_value = property_value * (1.0 + params.appreciation()).powf(term_years);
    let appreciation_revenue = (appreciated_value - property_value) * ltv;

    let expected_loss = amount * default_rate * term_years;
    let total_return = upfront_revenue + interest_revenue + appreciation_revenue - expected_loss;

    let annual_return_rate = if term_years > 0.0 && amount > 0.0 {
        (total_return / amount) / term_years
    } else {
        0.0
    };

    LoanReturn {
        total_return,
        annual_return_rate,
    }
}
