//! Open position record tracked per trading pair.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Direction of an open position. Only long positions are ever opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    /// Accepted by level calculations for completeness; no code path opens one.
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.write_str("long"),
            PositionSide::Short => f.write_str("short"),
        }
    }
}

/// An open position on one trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    pub entry_price: Decimal,
    /// Quantity in base currency.
    pub size: Decimal,
    pub entry_time: DateTime<Utc>,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    /// Identifier of the market order that opened the position.
    pub broker_order_id: String,
}

impl Position {
    /// Unrealized P&L in quote currency at `price`.
    #[must_use]
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.size
    }

    /// Unrealized P&L as a percentage of the entry price.
    ///
    /// Returns zero if the entry price is zero.
    #[must_use]
    pub fn unrealized_pnl_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (price / self.entry_price - Decimal::ONE) * dec!(100)
    }

    /// Returns `true` if `price` is at or below the stop-loss level.
    #[must_use]
    pub fn stop_loss_hit(&self, price: Decimal) -> bool {
        price <= self.stop_loss_price
    }

    /// Returns `true` if `price` is at or above the take-profit level.
    #[must_use]
    pub fn take_profit_hit(&self, price: Decimal) -> bool {
        price >= self.take_profit_price
    }
}
