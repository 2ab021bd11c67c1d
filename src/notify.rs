//! Trade notifications.
//!
//! The trading loop reports signals, fills, closed positions, status, and
//! errors as [`Notification`] events. A [`Notifier`] delivers the rendered
//! message; [`NotificationHub`] wraps an optional notifier and never lets a
//! delivery failure reach the caller.

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::OrderSide;
use crate::strategy::{Signal, SignalInfo};
use crate::trader::{ClosedTrade, StatusSnapshot};

/// Errors raised while delivering a notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    ChannelClosed,
}

/// Event worth telling the operator about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Signal {
        symbol: String,
        signal: Signal,
        info: SignalInfo,
    },
    TradeOpened {
        symbol: String,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    },
    PositionClosed(ClosedTrade),
    Status(StatusSnapshot),
    Error {
        message: String,
    },
}

fn money(value: Decimal) -> String {
    format!("${:.2}", value.round_dp(2))
}

fn optional(value: Option<Decimal>, dp: u32) -> String {
    match value {
        Some(v) => format!("{:.*}", dp as usize, v.round_dp(dp)),
        None => "n/a".to_string(),
    }
}

fn pct(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

fn pct_from(level: Decimal, price: Decimal) -> String {
    if price.is_zero() {
        return pct(Decimal::ZERO);
    }
    pct((level / price - Decimal::ONE) * Decimal::ONE_HUNDRED)
}

impl Notification {
    /// Renders the event as an HTML-formatted chat message.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Notification::Signal {
                symbol,
                signal,
                info,
            } => {
                let (emoji, title) = match signal {
                    Signal::Buy => ("🟢", "BUY SIGNAL"),
                    Signal::Sell => ("🔴", "SELL SIGNAL"),
                    Signal::Hold => ("⏸️", "HOLD"),
                };
                format!(
                    "{emoji} <b>{title}</b> {symbol}\n\n\
                     💰 Price: {}\n\
                     📊 EMA Fast: {}\n\
                     📊 EMA Slow: {}\n\
                     📈 RSI: {}\n\
                     📐 EMA Diff: {}%\n\n\
                     💡 Reason: {}",
                    money(info.price),
                    optional(info.ema_fast, 2),
                    optional(info.ema_slow, 2),
                    optional(info.rsi, 1),
                    optional(info.ema_diff, 2),
                    info.reason,
                )
            }
            Notification::TradeOpened {
                symbol,
                side,
                price,
                size,
                stop_loss,
                take_profit,
            } => {
                let (emoji, title) = match side {
                    OrderSide::Buy => ("✅", "TRADE EXECUTED - BUY"),
                    OrderSide::Sell => ("❌", "TRADE EXECUTED - SELL"),
                };
                let mut msg = format!(
                    "{emoji} <b>{title}</b> {symbol}\n\n\
                     💰 Price: {}\n\
                     📦 Size: {size:.6}\n\
                     💵 Value: {}\n",
                    money(*price),
                    money(*price * *size),
                );
                let _ = write!(
                    msg,
                    "\n🛑 Stop Loss: {} ({}%)",
                    money(*stop_loss),
                    pct_from(*stop_loss, *price)
                );
                let _ = write!(
                    msg,
                    "\n🎯 Take Profit: {} ({}%)",
                    money(*take_profit),
                    pct_from(*take_profit, *price)
                );
                msg
            }
            Notification::PositionClosed(trade) => {
                let (emoji, status) = if trade.pnl >= Decimal::ZERO {
                    ("💰", "PROFIT")
                } else {
                    ("📉", "LOSS")
                };
                let sign = if trade.pnl_pct >= Decimal::ZERO { "+" } else { "" };
                format!(
                    "{emoji} <b>POSITION CLOSED - {status}</b> {}\n\n\
                     📥 Entry: {}\n\
                     📤 Exit: {}\n\
                     📦 Size: {:.6}\n\n\
                     💵 P&L: {} ({sign}{}%)\n\
                     🔔 Trigger: {}",
                    trade.symbol,
                    money(trade.entry_price),
                    money(trade.exit_price),
                    trade.size,
                    money(trade.pnl),
                    pct(trade.pnl_pct),
                    trade.trigger,
                )
            }
            Notification::Status(snapshot) => {
                let mut msg = String::from("📊 <b>STATUS UPDATE</b>\n\n");
                let balance = snapshot
                    .balance
                    .map_or_else(|| "n/a".to_string(), money);
                let _ = writeln!(msg, "💰 Balance: {balance}");
                let _ = writeln!(
                    msg,
                    "📂 Active positions: {}/{}",
                    snapshot.active_positions(),
                    snapshot.total_pairs
                );
                for pair in &snapshot.pairs {
                    let _ = write!(msg, "\n<b>{}</b>", pair.symbol);
                    if let Some(err) = &pair.error {
                        let _ = write!(msg, " ⚠️ {err}");
                        continue;
                    }
                    if let Some(price) = pair.price {
                        let _ = write!(msg, " {}", money(price));
                    }
                    match &pair.position {
                        Some(pos) => {
                            let emoji = if pos.pnl_pct >= Decimal::ZERO { "📈" } else { "📉" };
                            let _ = write!(
                                msg,
                                "\n{emoji} Entry {} | Size {:.6} | P&L {}% | SL {} | TP {}",
                                money(pos.entry_price),
                                pos.size,
                                pct(pos.pnl_pct),
                                money(pos.stop_loss),
                                money(pos.take_profit),
                            );
                        }
                        None => msg.push_str("\n⏳ Position: NONE"),
                    }
                }
                msg
            }
            Notification::Error { message } => format!("⚠️ <b>ERROR</b>\n\n{message}"),
        }
    }
}

/// Delivers rendered notifications somewhere.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one notification.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Notifier name for logs.
    fn name(&self) -> &str;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(target: "crossover::notify", "\n{}", notification.render());
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Forwards notifications to an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiver that observes it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| NotifyError::ChannelClosed)
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Front door for notifications. Delivery failures are logged and dropped.
#[derive(Clone, Default)]
pub struct NotificationHub {
    notifier: Option<Arc<dyn Notifier>>,
}

impl NotificationHub {
    /// Creates a hub delivering through `notifier`.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier: Some(notifier),
        }
    }

    /// Creates a hub that drops everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self { notifier: None }
    }

    /// Returns `true` if a notifier is attached.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    /// Sends `notification`, logging instead of returning any failure.
    pub async fn notify(&self, notification: Notification) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier.send(&notification).await {
            warn!(notifier = notifier.name(), "Failed to deliver notification: {e}");
        }
    }

    pub async fn notify_signal(&self, symbol: &str, signal: Signal, info: &SignalInfo) {
        self.notify(Notification::Signal {
            symbol: symbol.to_string(),
            signal,
            info: info.clone(),
        })
        .await;
    }

    pub async fn notify_trade(
        &self,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) {
        self.notify(Notification::TradeOpened {
            symbol: symbol.to_string(),
            side,
            price,
            size,
            stop_loss,
            take_profit,
        })
        .await;
    }

    pub async fn notify_position_closed(&self, trade: &ClosedTrade) {
        self.notify(Notification::PositionClosed(trade.clone())).await;
    }

    pub async fn notify_status(&self, snapshot: &StatusSnapshot) {
        self.notify(Notification::Status(snapshot.clone())).await;
    }

    pub async fn notify_error(&self, message: impl Into<String>) {
        self.notify(Notification::Error {
            message: message.into(),
        })
        .await;
    }
}
