//! Exchange abstraction used by the trading loop.
//!
//! The bot only needs market data, a quote balance, market orders, and
//! exchange-side trigger orders. [`SimulatedExchange`] implements the trait
//! for dry runs.

pub mod simulated;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::config::Timeframe;
use crate::models::{Candle, OrderHandle, OrderSide};

pub use simulated::{SimulatedExchange, SimulatedFill, SimulationConfig};

/// Result type for exchange operations.
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// Errors reported by an [`Exchange`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// Transport failure or malformed response.
    #[error("network error: {0}")]
    Network(String),

    /// The exchange refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Not enough free balance to fill an order.
    #[error("insufficient {currency}: required {required}, available {available}")]
    InsufficientFunds {
        currency: String,
        required: Decimal,
        available: Decimal,
    },

    /// The symbol is not listed.
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    /// The call did not complete within the request timeout.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },
}

/// Exchange operations needed by the trading loop.
///
/// Implementations must be safe to call concurrently for different symbols.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Exchange name for logs and status output.
    fn name(&self) -> &str;

    /// Returns up to `limit` most recent candles, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>>;

    /// Free balance of `currency`.
    async fn get_balance(&self, currency: &str) -> ExchangeResult<Decimal>;

    /// Last traded price of `symbol`.
    async fn get_current_price(&self, symbol: &str) -> ExchangeResult<Decimal>;

    /// Places a market order that fills immediately.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
    ) -> ExchangeResult<OrderHandle>;

    /// Places a stop-market order triggered at `stop_price`.
    async fn place_stop_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        stop_price: Decimal,
    ) -> ExchangeResult<OrderHandle>;

    /// Places a take-profit market order triggered at `target_price`.
    async fn place_take_profit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        target_price: Decimal,
    ) -> ExchangeResult<OrderHandle>;

    /// Cancels every open order on `symbol`, returning how many were removed.
    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<usize>;
}

/// Splits `BASE/QUOTE` into its two currencies.
#[must_use]
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (base, quote) = symbol.split_once('/')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}
