//! Runway projection: how long the balance lasts at the current burn rate

use crate::error::AgentError;
use crate::models::{BurnRate, RunwayEstimate, TimeUnit, AMOUNT_SCALE};
use crate::Result;
use rust_decimal::{Decimal, RoundingStrategy};

/// Project the exhaustion horizon for `balance` at a signed net flow of
/// `rate` per `unit`.
///
/// A zero balance with no inflow is already exhausted (horizon 0), not
/// infinite. A negative balance is a distinct depleted state, reported
/// as `Domain`.
pub fn project(balance: Decimal, rate: Decimal, unit: TimeUnit) -> Result<RunwayEstimate> {
    if balance.is_sign_negative() && !balance.is_zero() {
        return Err(AgentError::Domain(format!(
            "balance {} is already depleted",
            balance
        )));
    }

    if balance.is_zero() && rate <= Decimal::ZERO {
        return Ok(RunwayEstimate::Horizon {
            units: Decimal::ZERO,
            unit,
        });
    }

    if rate >= Decimal::ZERO {
        return Ok(RunwayEstimate::NoDepletion);
    }

    let units = balance
        .checked_div(rate.abs())
        .ok_or_else(|| AgentError::Domain("runway overflow".to_string()))?
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointNearestEven)
        .normalize();

    Ok(RunwayEstimate::Horizon { units, unit })
}

/// Convenience over a computed burn rate.
pub fn project_burn(balance: Decimal, burn: &BurnRate) -> Result<RunwayEstimate> {
    project(balance, burn.net_flow_per_unit, burn.unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reference_projection() {
        let estimate = project(dec!(100), dec!(-10), TimeUnit::Month).unwrap();
        assert_eq!(
            estimate,
            RunwayEstimate::Horizon {
                units: dec!(10),
                unit: TimeUnit::Month
            }
        );
    }

    #[test]
    fn test_zero_balance_zero_burn_is_exhausted() {
        let estimate = project(dec!(0), dec!(0), TimeUnit::Day).unwrap();
        assert_eq!(
            estimate,
            RunwayEstimate::Horizon {
                units: dec!(0),
                unit: TimeUnit::Day
            }
        );
    }

    #[test]
    fn test_zero_balance_with_burn_is_exhausted() {
        let estimate = project(dec!(0), dec!(-5), TimeUnit::Week).unwrap();
        assert_eq!(
            estimate,
            RunwayEstimate::Horizon {
                units: dec!(0),
                unit: TimeUnit::Week
            }
        );
    }

    #[test]
    fn test_non_negative_rate_never_depletes() {
        for balance in [dec!(0.0001), dec!(1), dec!(365), dec!(9999999999.9999)] {
            for rate in [dec!(0), dec!(0.0001), dec!(250)] {
                assert_eq!(
                    project(balance, rate, TimeUnit::Month).unwrap(),
                    RunwayEstimate::NoDepletion,
                    "balance={} rate={}",
                    balance,
                    rate
                );
            }
        }
    }

    #[test]
    fn test_zero_balance_with_inflow_never_depletes() {
        assert_eq!(
            project(dec!(0), dec!(10), TimeUnit::Month).unwrap(),
            RunwayEstimate::NoDepletion
        );
    }

    #[test]
    fn test_negative_balance_is_domain_error() {
        let err = project(dec!(-0.01), dec!(-10), TimeUnit::Month).unwrap_err();
        assert!(matches!(err, AgentError::Domain(_)));
    }

    #[test]
    fn test_horizon_rounding() {
        let estimate = project(dec!(100), dec!(-3), TimeUnit::Month).unwrap();
        assert_eq!(
            estimate,
            RunwayEstimate::Horizon {
                units: dec!(33.3333),
                unit: TimeUnit::Month
            }
        );
    }
}
