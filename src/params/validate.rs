//! Parameter validation
//!
//! Runs before any loan is generated. Checks happen in field order and the
//! first violation is returned.

use std::collections::BTreeMap;

use super::SimulationParameters;
use crate::error::ValidationError;

/// Allowed deviation of an allocation map from 100%
pub const ALLOCATION_TOLERANCE: f64 = 0.01;

/// Longest fund life accepted, in years
pub const MAX_TIME_HORIZON: u32 = 100;

/// Largest fund accepted; keeps the initial book at or below 100,000 loans
pub const MAX_INITIAL_INVESTMENT: f64 = 100_000_000_000.0;

/// Validate a full parameter set
pub fn validate_parameters(params: &SimulationParameters) -> Result<(), ValidationError> {
    positive("initialInvestment", params.initial_investment)?;
    if params.initial_investment > MAX_INITIAL_INVESTMENT {
        return Err(ValidationError::new(
            "initialInvestment",
            format!("must not exceed {}", MAX_INITIAL_INVESTMENT),
        ));
    }
    percentage("interestRate", params.interest_rate, 100.0)?;
    percentage("propertyAppreciation", params.property_appreciation, 100.0)?;
    percentage("defaultRate", params.default_rate, 100.0)?;
    percentage("reinvestmentRate", params.reinvestment_rate, 100.0)?;

    percentage("targetLtv", params.target_ltv, 100.0)?;
    if params.target_ltv <= 0.0 {
        return Err(ValidationError::new("targetLtv", "must be greater than 0"));
    }

    positive("avgTermLength", params.avg_term_length)?;
    positive("initialDeploymentPeriod", params.initial_deployment_period)?;

    finite("lastReinvestmentYear", params.last_reinvestment_year)?;
    if params.last_reinvestment_year < 0.0 {
        return Err(ValidationError::new("lastReinvestmentYear", "must not be negative"));
    }

    percentage("managementFee", params.management_fee, 10.0)?;
    percentage("performanceFee", params.performance_fee, 50.0)?;
    percentage("hurdleRate", params.hurdle_rate, 20.0)?;
    percentage("upfrontFee", params.upfront_fee, 10.0)?;

    if params.time_horizon == 0 {
        return Err(ValidationError::new("timeHorizon", "must be positive"));
    }
    if params.time_horizon > MAX_TIME_HORIZON {
        return Err(ValidationError::new(
            "timeHorizon",
            format!("must not exceed {} years", MAX_TIME_HORIZON),
        ));
    }
    if params.last_reinvestment_year > params.time_horizon as f64 {
        return Err(ValidationError::new(
            "lastReinvestmentYear",
            format!(
                "cannot exceed time horizon ({} > {})",
                params.last_reinvestment_year, params.time_horizon
            ),
        ));
    }

    percentage("volatility", params.volatility, 100.0)?;
    if params.num_simulations == 0 {
        return Err(ValidationError::new("numSimulations", "must be positive"));
    }
    percentage("earlyRepaymentRate", params.early_repayment_rate, 100.0)?;

    allocation("zoneAllocation", &params.zone_allocation)?;
    allocation("geographyAllocation", &params.geography_allocation)?;

    percentage("recoveryRate", params.recovery_rate, 100.0)?;
    percentage("riskFreeRate", params.risk_free_rate, 100.0)?;

    Ok(())
}

impl SimulationParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_parameters(self)
    }
}

fn finite(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::new(field, "must be a finite number"))
    }
}

fn positive(field: &str, value: f64) -> Result<(), ValidationError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new(field, format!("must be positive (got {})", value)))
    }
}

fn percentage(field: &str, value: f64, max: f64) -> Result<(), ValidationError> {
    finite(field, value)?;
    if (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field,
            format!("must be between 0 and {}% (got {})", max, value),
        ))
    }
}

fn allocation<K: std::fmt::Debug>(
    field: &str,
    shares: &BTreeMap<K, f64>,
) -> Result<(), ValidationError> {
    if shares.is_empty() {
        return Err(ValidationError::new(field, "must contain at least one category"));
    }

    for (key, &share) in shares {
        if !share.is_finite() || !(0.0..=100.0).contains(&share) {
            return Err(ValidationError::new(
                field,
                format!("share for {:?} must be between 0 and 100 (got {})", key, share),
            ));
        }
    }

    let total: f64 = shares.values().sum();
    if (total - 100.0).abs() > ALLOCATION_TOLERANCE {
        return Err(ValidationError::new(
            field,
            format!("percentages must sum to 100 (got {})", total),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::Zone;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_parameters(&SimulationParameters::default()).is_ok());
    }

    #[test]
    fn test_zone_allocation_over_100_is_rejected() {
        let params = SimulationParameters {
            zone_allocation: BTreeMap::from([
                (Zone::Green, 60.0),
                (Zone::Orange, 39.0),
                (Zone::Red, 2.0),
            ]),
            ..Default::default()
        };

        let err = validate_parameters(&params).unwrap_err();
        assert_eq!(err.field, "zoneAllocation");
        assert!(err.constraint.contains("sum to 100"), "{}", err.constraint);
    }

    #[test]
    fn test_allocation_within_tolerance_passes() {
        let params = SimulationParameters {
            zone_allocation: BTreeMap::from([
                (Zone::Green, 60.005),
                (Zone::Orange, 30.0),
                (Zone::Red, 10.0),
            ]),
            ..Default::default()
        };
        assert!(validate_parameters(&params).is_ok());
    }

    #[test]
    fn test_time_horizon_upper_bound() {
        let params = SimulationParameters {
            time_horizon: 400_000_000,
            ..Default::default()
        };
        let err = validate_parameters(&params).unwrap_err();
        assert_eq!(err.field, "timeHorizon");
        assert_eq!(params.horizon_months(), u32::MAX);

        let params = SimulationParameters {
            time_horizon: MAX_TIME_HORIZON,
            ..Default::default()
        };
        assert!(validate_parameters(&params).is_ok());
    }

    #[test]
    fn test_initial_investment_upper_bound() {
        let params = SimulationParameters {
            initial_investment: 1e18,
            ..Default::default()
        };
        assert_eq!(validate_parameters(&params).unwrap_err().field, "initialInvestment");

        let params = SimulationParameters {
            initial_investment: MAX_INITIAL_INVESTMENT,
            ..Default::default()
        };
        assert!(validate_parameters(&params).is_ok());
        assert_eq!(params.loan_count(), 100_000);
    }

    #[test]
    fn test_fee_ranges() {
        let params = SimulationParameters {
            management_fee: 12.0,
            ..Default::default()
        };
        assert_eq!(validate_parameters(&params).unwrap_err().field, "managementFee");

        let params = SimulationParameters {
            performance_fee: 55.0,
            ..Default::default()
        };
        assert_eq!(validate_parameters(&params).unwrap_err().field, "performanceFee");

        let params = SimulationParameters {
            hurdle_rate: -1.0,
            ..Default::default()
        };
        assert_eq!(validate_parameters(&params).unwrap_err().field, "hurdleRate");
    }

    #[test]
    fn test_counts_and_amounts_must_be_positive() {
        let params = SimulationParameters {
            initial_investment: 0.0,
            ..Default::default()
        };
        assert_eq!(validate_parameters(&params).unwrap_err().field, "initialInvestment");

        let params = SimulationParameters {
            num_simulations: 0,
            ..Default::default()
        };
        assert_eq!(validate_parameters(&params).unwrap_err().field, "numSimulations");

        let params = SimulationParameters {
            time_horizon: 0,
            last_reinvestment_year: 0.0,
            ..Default::default()
        };
        assert_eq!(validate_parameters(&params).unwrap_err().field, "timeHorizon");
    }

    #[test]
    fn test_reinvestment_year_bounded_by_horizon() {
        let params = SimulationParameters {
            time_horizon: 5,
            last_reinvestment_year: 7.0,
            ..Default::default()
        };
        let err = validate_parameters(&params).unwrap_err();
        assert_eq!(err.field, "lastReinvestmentYear");
    }

    #[test]
    fn test_non_finite_rejected() {
        let params = SimulationParameters {
            interest_rate: f64::NAN,
            ..Default::default()
        };
        let err = validate_parameters(&params).unwrap_err();
        assert_eq!(err.field, "interestRate");
        assert!(err.constraint.contains("finite"));
    }

    #[test]
    fn test_zero_ltv_rejected() {
        let params = SimulationParameters {
            target_ltv: 0.0,
            ..Default::default()
        };
        assert_eq!(validate_parameters(&params).unwrap_err().field, "targetLtv");
    }
}
