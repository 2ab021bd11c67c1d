//! Per-pair position state machine.
//!
//! A pair is either flat or long. Signals move it between the two states;
//! while long, a HOLD still closes the position once the price crosses the
//! stop-loss or take-profit level.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::with_timeout;
use crate::exchange::{Exchange, ExchangeResult};
use crate::models::{Candle, OrderSide, Position, PositionSide};
use crate::notify::NotificationHub;
use crate::risk::{self, RiskParameters};
use crate::strategy::{Signal, SignalGenerator, SignalInfo, SignalReason, StrategyParams};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    /// The generator issued SELL.
    Signal,
    StopLoss,
    TakeProfit,
}

impl fmt::Display for ExitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitTrigger::Signal => f.write_str("signal"),
            ExitTrigger::StopLoss => f.write_str("stop_loss"),
            ExitTrigger::TakeProfit => f.write_str("take_profit"),
        }
    }
}

/// Result of closing a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: Decimal,
    /// `(exit - entry) * size`, before fees.
    pub pnl: Decimal,
    /// `(exit - entry) / entry * 100`.
    pub pnl_pct: Decimal,
    pub trigger: ExitTrigger,
}

/// Why an entry or exit was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Free quote balance is zero or negative.
    NoBalance,
    /// The sized quantity rounds to zero.
    QuantityTooSmall,
    /// A stop was requested; no new orders are placed.
    ShuttingDown,
}

/// State change produced by one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Opened(Position),
    Closed(ClosedTrade),
    /// No state change.
    Held,
    Skipped(SkipReason),
}

/// Collaborators and settings shared by every pair during a cycle.
pub struct TradeContext<'a> {
    pub exchange: &'a dyn Exchange,
    pub notifier: &'a NotificationHub,
    pub risk: &'a RiskParameters,
    /// Currency whose balance funds entries.
    pub quote_currency: &'a str,
    /// Configured pair count; the balance is split evenly across it.
    pub total_pairs: usize,
    /// Dry runs skip cancelling exchange-side protective orders.
    pub dry_run: bool,
    pub request_timeout: Duration,
    pub shutdown: &'a CancellationToken,
}

impl TradeContext<'_> {
    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = ExchangeResult<T>>,
    ) -> ExchangeResult<T> {
        with_timeout(self.request_timeout, operation, fut).await
    }
}

/// Trading state of one pair.
#[derive(Debug, Clone)]
pub struct PairTrader {
    symbol: String,
    generator: SignalGenerator,
    position: Option<Position>,
    stop_loss_order: Option<String>,
    take_profit_order: Option<String>,
}

impl PairTrader {
    /// Creates a flat trader for `symbol`.
    #[must_use]
    pub fn new(symbol: impl Into<String>, params: StrategyParams) -> Self {
        Self {
            symbol: symbol.into(),
            generator: SignalGenerator::new(params),
            position: None,
            stop_loss_order: None,
            take_profit_order: None,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    #[must_use]
    pub fn stop_loss_order(&self) -> Option<&str> {
        self.stop_loss_order.as_deref()
    }

    #[must_use]
    pub fn take_profit_order(&self) -> Option<&str> {
        self.take_profit_order.as_deref()
    }

    /// Unrealized P&L percentage at `price`, if a position is open.
    #[must_use]
    pub fn unrealized_pnl_pct(&self, price: Decimal) -> Option<Decimal> {
        self.position.as_ref().map(|p| p.unrealized_pnl_pct(price))
    }

    /// Generates a signal for `candles` given the current position.
    #[must_use]
    pub fn evaluate(&self, candles: &[Candle]) -> (Signal, SignalInfo) {
        let side = self.position.as_ref().map(|p| p.side);
        self.generator.generate_signal(candles, side)
    }

    /// Applies `signal` to the pair.
    ///
    /// | state | BUY | SELL | HOLD |
    /// |---|---|---|---|
    /// | flat | open long | no-op | no-op |
    /// | long | no-op | close | close on SL/TP breach |
    ///
    /// A HOLD caused by insufficient data never trades, since its price
    /// is not a market quote.
    ///
    /// # Errors
    ///
    /// Returns an error when a market order or the balance request fails.
    /// The pair's state is unchanged in that case.
    pub async fn on_signal(
        &mut self,
        signal: Signal,
        info: &SignalInfo,
        ctx: &TradeContext<'_>,
    ) -> crate::Result<Transition> {
        let price = info.price;
        match signal {
            Signal::Buy if self.position.is_none() => self.open_long(price, ctx).await,
            Signal::Buy => {
                debug!(symbol = %self.symbol, "Already in position, ignoring BUY");
                Ok(Transition::Held)
            }
            Signal::Sell if self.position.is_some() => {
                self.close_long(price, ExitTrigger::Signal, ctx).await
            }
            Signal::Sell => Ok(Transition::Held),
            Signal::Hold => {
                let Some(position) = self.position.as_ref() else {
                    return Ok(Transition::Held);
                };
                if info.reason == SignalReason::InsufficientData {
                    debug!(symbol = %self.symbol, "No usable market data, skipping SL/TP check");
                    return Ok(Transition::Held);
                }
                if position.stop_loss_hit(price) {
                    warn!(symbol = %self.symbol, %price, "Stop loss triggered");
                    return self.close_long(price, ExitTrigger::StopLoss, ctx).await;
                }
                if position.take_profit_hit(price) {
                    info!(symbol = %self.symbol, %price, "Take profit triggered");
                    return self.close_long(price, ExitTrigger::TakeProfit, ctx).await;
                }
                debug!(
                    symbol = %self.symbol,
                    %price,
                    pnl_pct = %position.unrealized_pnl_pct(price).round_dp(2),
                    sl = %position.stop_loss_price,
                    tp = %position.take_profit_price,
                    "Position monitoring"
                );
                Ok(Transition::Held)
            }
        }
    }

    async fn open_long(
        &mut self,
        price: Decimal,
        ctx: &TradeContext<'_>,
    ) -> crate::Result<Transition> {
        if ctx.shutdown.is_cancelled() {
            return Ok(Transition::Skipped(SkipReason::ShuttingDown));
        }

        let balance = ctx
            .call("get_balance", ctx.exchange.get_balance(ctx.quote_currency))
            .await?;
        if balance <= Decimal::ZERO {
            warn!(symbol = %self.symbol, %balance, "Insufficient balance for trading");
            return Ok(Transition::Skipped(SkipReason::NoBalance));
        }

        let balance_per_pair = balance / Decimal::from(ctx.total_pairs.max(1));
        let sizing = risk::position_size(balance_per_pair, ctx.risk, price);
        let qty = risk::round_quantity(sizing.quantity);
        if qty <= Decimal::ZERO {
            warn!(symbol = %self.symbol, %balance_per_pair, %price, "Position size too small");
            return Ok(Transition::Skipped(SkipReason::QuantityTooSmall));
        }

        info!(symbol = %self.symbol, %qty, %price, "Executing BUY");
        let order = ctx
            .call(
                "place_market_order",
                ctx.exchange.place_market_order(&self.symbol, OrderSide::Buy, qty),
            )
            .await?;

        let (stop_loss, take_profit) =
            risk::protective_levels(price, PositionSide::Long, ctx.risk);

        let stop_order = ctx
            .call(
                "place_stop_order",
                ctx.exchange
                    .place_stop_order(&self.symbol, OrderSide::Sell, qty, stop_loss),
            )
            .await;
        let stop_loss_order = match stop_order {
            Ok(handle) => Some(handle.order_id),
            Err(e) => {
                warn!(symbol = %self.symbol, %stop_loss, "Failed to place stop loss: {e}");
                None
            }
        };

        let target_order = ctx
            .call(
                "place_take_profit_order",
                ctx.exchange
                    .place_take_profit_order(&self.symbol, OrderSide::Sell, qty, take_profit),
            )
            .await;
        let take_profit_order = match target_order {
            Ok(handle) => Some(handle.order_id),
            Err(e) => {
                warn!(symbol = %self.symbol, %take_profit, "Failed to place take profit: {e}");
                None
            }
        };

        let position = Position {
            side: PositionSide::Long,
            entry_price: price,
            size: qty,
            entry_time: Utc::now(),
            stop_loss_price: stop_loss,
            take_profit_price: take_profit,
            broker_order_id: order.order_id,
        };
        self.position = Some(position.clone());
        self.stop_loss_order = stop_loss_order;
        self.take_profit_order = take_profit_order;

        info!(
            symbol = %self.symbol,
            %qty,
            %price,
            sl = %stop_loss,
            tp = %take_profit,
            "Position opened"
        );
        ctx.notifier
            .notify_trade(&self.symbol, OrderSide::Buy, price, qty, stop_loss, take_profit)
            .await;

        Ok(Transition::Opened(position))
    }

    async fn close_long(
        &mut self,
        price: Decimal,
        trigger: ExitTrigger,
        ctx: &TradeContext<'_>,
    ) -> crate::Result<Transition> {
        if ctx.shutdown.is_cancelled() {
            return Ok(Transition::Skipped(SkipReason::ShuttingDown));
        }
        let Some(position) = self.position.as_ref() else {
            warn!(symbol = %self.symbol, "No position to close");
            return Ok(Transition::Held);
        };
        let entry_price = position.entry_price;
        let size = position.size;

        if !ctx.dry_run {
            let cancelled = ctx
                .call("cancel_all_orders", ctx.exchange.cancel_all_orders(&self.symbol))
                .await;
            if let Err(e) = cancelled {
                warn!(symbol = %self.symbol, "Failed to cancel protective orders: {e}");
            }
        }

        info!(symbol = %self.symbol, %size, %price, %trigger, "Executing SELL");
        ctx.call(
            "place_market_order",
            ctx.exchange
                .place_market_order(&self.symbol, OrderSide::Sell, size),
        )
        .await?;

        let trade = ClosedTrade {
            symbol: self.symbol.clone(),
            entry_price,
            exit_price: price,
            size,
            pnl: position.unrealized_pnl(price),
            pnl_pct: position.unrealized_pnl_pct(price),
            trigger,
        };

        self.position = None;
        self.stop_loss_order = None;
        self.take_profit_order = None;

        info!(
            symbol = %self.symbol,
            pnl = %trade.pnl.round_dp(2),
            pnl_pct = %trade.pnl_pct.round_dp(2),
            entry = %entry_price,
            exit = %price,
            "Position closed"
        );
        ctx.notifier.notify_position_closed(&trade).await;

        Ok(Transition::Closed(trade))
    }
}
