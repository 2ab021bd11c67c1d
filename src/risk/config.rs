//! Risk parameter types and validation.

use std::fmt;
use std::fmt::Write;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Upper bound on the fraction of balance risked per trade.
pub const MAX_RISK_PER_TRADE: Decimal = dec!(0.05);

/// Fixed-fraction risk budget, immutable for the lifetime of a run.
///
/// All values are fractions (`0.02` means 2%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParameters {
    /// Fraction of balance lost if the stop-loss triggers exactly.
    pub risk_per_trade: Decimal,
    /// Distance from entry to the stop-loss.
    pub stop_loss_pct: Decimal,
    /// Distance from entry to the take-profit target.
    pub take_profit_pct: Decimal,
    /// Cap on position notional as a fraction of balance.
    pub max_position_fraction: Decimal,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            risk_per_trade: dec!(0.01),
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.04),
            max_position_fraction: dec!(0.1),
        }
    }
}

/// Reason a set of risk parameters was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskParameterError {
    RiskPerTradeOutOfRange { value: Decimal },
    StopLossOutOfRange { value: Decimal },
    NonPositiveTakeProfit { value: Decimal },
    MaxPositionOutOfRange { value: Decimal },
}

impl fmt::Display for RiskParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RiskPerTradeOutOfRange { value } => {
                write!(
                    f,
                    "risk_per_trade must be in (0, {MAX_RISK_PER_TRADE}], got {value}"
                )
            }
            Self::StopLossOutOfRange { value } => {
                write!(f, "stop_loss_pct must be in (0, 1), got {value}")
            }
            Self::NonPositiveTakeProfit { value } => {
                write!(f, "take_profit_pct must be positive, got {value}")
            }
            Self::MaxPositionOutOfRange { value } => {
                write!(f, "max_position_fraction must be in (0, 1], got {value}")
            }
        }
    }
}

impl std::error::Error for RiskParameterError {}

impl RiskParameters {
    /// Checks every parameter against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first [`RiskParameterError`] found.
    pub fn validate(&self) -> Result<(), RiskParameterError> {
        if self.risk_per_trade <= Decimal::ZERO || self.risk_per_trade > MAX_RISK_PER_TRADE {
            return Err(RiskParameterError::RiskPerTradeOutOfRange {
                value: self.risk_per_trade,
            });
        }
        if self.stop_loss_pct <= Decimal::ZERO || self.stop_loss_pct >= Decimal::ONE {
            return Err(RiskParameterError::StopLossOutOfRange {
                value: self.stop_loss_pct,
            });
        }
        if self.take_profit_pct <= Decimal::ZERO {
            return Err(RiskParameterError::NonPositiveTakeProfit {
                value: self.take_profit_pct,
            });
        }
        if self.max_position_fraction <= Decimal::ZERO || self.max_position_fraction > Decimal::ONE
        {
            return Err(RiskParameterError::MaxPositionOutOfRange {
                value: self.max_position_fraction,
            });
        }
        Ok(())
    }

    /// Returns a human-readable summary for the startup banner.
    pub fn describe(&self) -> String {
        let hundred = dec!(100);
        let mut out = String::from("Risk management:\n");
        let _ = writeln!(out, "  risk per trade: {}%", self.risk_per_trade * hundred);
        let _ = writeln!(
            out,
            "  max position size: {}%",
            self.max_position_fraction * hundred
        );
        let _ = writeln!(out, "  stop loss: {}%", self.stop_loss_pct * hundred);
        let _ = writeln!(out, "  take profit: {}%", self.take_profit_pct * hundred);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(RiskParameters::default().validate(), Ok(()));
    }

    #[test]
    fn parse_partial_json_inherits_defaults() {
        let params: RiskParameters =
            serde_json::from_str(r#"{ "risk_per_trade": "0.02" }"#).unwrap();
        assert_eq!(params.risk_per_trade, dec!(0.02));
        assert_eq!(params.stop_loss_pct, dec!(0.02));
        assert_eq!(params.take_profit_pct, dec!(0.04));
        assert_eq!(params.max_position_fraction, dec!(0.1));
    }

    #[test]
    fn reject_zero_risk() {
        let params = RiskParameters {
            risk_per_trade: Decimal::ZERO,
            ..RiskParameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(RiskParameterError::RiskPerTradeOutOfRange { .. })
        ));
    }

    #[test]
    fn accept_risk_at_upper_bound() {
        let params = RiskParameters {
            risk_per_trade: dec!(0.05),
            ..RiskParameters::default()
        };
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn reject_risk_above_upper_bound() {
        let params = RiskParameters {
            risk_per_trade: dec!(0.0501),
            ..RiskParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn reject_non_positive_stop_loss() {
        let params = RiskParameters {
            stop_loss_pct: dec!(-0.01),
            ..RiskParameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(RiskParameterError::StopLossOutOfRange { .. })
        ));
    }

    #[test]
    fn reject_stop_loss_at_or_beyond_entry() {
        for value in [dec!(1), dec!(1.5)] {
            let params = RiskParameters {
                stop_loss_pct: value,
                ..RiskParameters::default()
            };
            assert_eq!(
                params.validate(),
                Err(RiskParameterError::StopLossOutOfRange { value })
            );
        }
        let params = RiskParameters {
            stop_loss_pct: dec!(0.99),
            ..RiskParameters::default()
        };
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn reject_non_positive_take_profit() {
        let params = RiskParameters {
            take_profit_pct: Decimal::ZERO,
            ..RiskParameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(RiskParameterError::NonPositiveTakeProfit { .. })
        ));
    }

    #[test]
    fn reject_max_position_above_one() {
        let params = RiskParameters {
            max_position_fraction: dec!(1.5),
            ..RiskParameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(RiskParameterError::MaxPositionOutOfRange { .. })
        ));
    }

    #[test]
    fn display_errors() {
        let err = RiskParameterError::StopLossOutOfRange { value: dec!(0) };
        assert_eq!(err.to_string(), "stop_loss_pct must be in (0, 1), got 0");

        let err = RiskParameterError::RiskPerTradeOutOfRange { value: dec!(0.1) };
        assert_eq!(
            err.to_string(),
            "risk_per_trade must be in (0, 0.05], got 0.1"
        );
    }

    #[test]
    fn describe_lists_percentages() {
        let desc = RiskParameters::default().describe();
        assert!(desc.contains("risk per trade: 1.00%"));
        assert!(desc.contains("stop loss: 2.00%"));
        assert!(desc.contains("take profit: 4.00%"));
        assert!(desc.contains("max position size: 10.0%"));
    }
}
