//! Position sizing and protective price levels.
//!
//! Sizes each entry so that a stop-loss hit at exactly the configured
//! distance loses at most `risk_per_trade` of the balance, and caps the
//! notional at `max_position_fraction` of the balance.

pub mod config;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::PositionSide;
pub use config::{RiskParameterError, RiskParameters};

/// Decimal places quantities are rounded to before order placement.
pub const QUANTITY_DP: u32 = 6;

/// Breakdown of a sizing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionSize {
    /// Quote amount lost if the stop-loss triggers.
    pub risk_amount: Decimal,
    /// Notional after applying the max-position cap.
    pub position_value: Decimal,
    /// Unrounded base-currency quantity.
    pub quantity: Decimal,
}

/// Converts a balance and price into a position quantity.
///
/// `risk_amount = balance * risk_per_trade`,
/// `position_value = min(risk_amount / stop_loss_pct, balance * max_position_fraction)`,
/// `quantity = position_value / price`.
///
/// A non-positive balance or price, or a non-positive stop distance,
/// produces a zero quantity.
#[must_use]
pub fn position_size(balance: Decimal, params: &RiskParameters, price: Decimal) -> PositionSize {
    if balance <= Decimal::ZERO || price <= Decimal::ZERO || params.stop_loss_pct <= Decimal::ZERO
    {
        return PositionSize {
            risk_amount: Decimal::ZERO,
            position_value: Decimal::ZERO,
            quantity: Decimal::ZERO,
        };
    }

    let risk_amount = balance * params.risk_per_trade;
    let max_value = balance * params.max_position_fraction;
    let position_value = (risk_amount / params.stop_loss_pct).min(max_value);
    let quantity = position_value / price;

    PositionSize {
        risk_amount,
        position_value,
        quantity,
    }
}

/// Rounds a quantity to exchange precision ([`QUANTITY_DP`] places).
#[must_use]
pub fn round_quantity(quantity: Decimal) -> Decimal {
    quantity.round_dp(QUANTITY_DP)
}

/// Stop-loss and take-profit prices for a position opened at `entry_price`.
///
/// Returns `(stop_loss, take_profit)`.
#[must_use]
pub fn protective_levels(
    entry_price: Decimal,
    side: PositionSide,
    params: &RiskParameters,
) -> (Decimal, Decimal) {
    match side {
        PositionSide::Long => (
            entry_price * (Decimal::ONE - params.stop_loss_pct),
            entry_price * (Decimal::ONE + params.take_profit_pct),
        ),
        PositionSide::Short => (
            entry_price * (Decimal::ONE + params.stop_loss_pct),
            entry_price * (Decimal::ONE - params.take_profit_pct),
        ),
    }
}
