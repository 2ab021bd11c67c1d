//! Point-in-time status of every trading pair.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{Position, PositionSide};

/// Open position details as shown in status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSummary {
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub size: Decimal,
    /// Unrealized P&L in percent at the snapshot price.
    pub pnl_pct: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub entry_time: DateTime<Utc>,
}

impl PositionSummary {
    /// Summarizes `position` marked at `price`.
    #[must_use]
    pub fn new(position: &Position, price: Decimal) -> Self {
        Self {
            side: position.side,
            entry_price: position.entry_price,
            size: position.size,
            pnl_pct: position.unrealized_pnl_pct(price),
            stop_loss: position.stop_loss_price,
            take_profit: position.take_profit_price,
            entry_time: position.entry_time,
        }
    }
}

/// Status of one pair. `error` is set when its price could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairStatus {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot of balance and per-pair state, in configured pair order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Free quote balance; `None` when the balance request failed.
    pub balance: Option<Decimal>,
    pub total_pairs: usize,
    pub pairs: Vec<PairStatus>,
}

impl StatusSnapshot {
    /// Number of pairs holding a position.
    #[must_use]
    pub fn active_positions(&self) -> usize {
        self.pairs.iter().filter(|p| p.position.is_some()).count()
    }

    /// Number of pairs whose status could not be read.
    #[must_use]
    pub fn failed_pairs(&self) -> usize {
        self.pairs.iter().filter(|p| p.error.is_some()).count()
    }
}
