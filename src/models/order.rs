//! Order types exchanged with the exchange collaborator.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the wire-format side name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an order is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
    /// Fills immediately at the best available price.
    Market,
    /// Market order armed at a trigger price below the entry (stop-loss).
    StopMarket,
    /// Market order armed at a trigger price above the entry (take-profit).
    TakeProfitMarket,
}

/// Acknowledgement returned by the exchange for an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    /// Exchange-assigned order identifier.
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub qty: Decimal,
    /// Trigger price for stop and take-profit orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<Decimal>,
    /// Average fill price, when the order filled immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<Decimal>,
}
