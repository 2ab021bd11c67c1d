//! OHLCV candlestick model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV bar for one sampling interval.
///
/// Candle sequences are ordered ascending by `timestamp` and never mutated
/// once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Start of the candle's time window.
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Creates a candle whose open, high, low, and close are all `price`.
    #[must_use]
    pub fn flat(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
        }
    }
}

/// Extracts the close price of every candle, preserving order.
#[must_use]
pub fn closes(candles: &[Candle]) -> Vec<Decimal> {
    candles.iter().map(|c| c.close).collect()
}
