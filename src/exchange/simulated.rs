//! Simulated exchange for dry-run trading.
//!
//! Market data is a seeded random walk per symbol: the first request builds
//! a history and every later candle fetch appends one new candle. Market
//! orders fill at the last close minus a flat fee and move a per-currency
//! balance book. Stop and take-profit orders are only recorded; the trading
//! loop watches its own protective levels in dry runs. A sell that flattens
//! a symbol voids its recorded protective orders.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Exchange, ExchangeError, ExchangeResult, split_symbol};
use crate::config::Timeframe;
use crate::models::{Candle, OrderHandle, OrderKind, OrderSide};

/// Price precision of generated candles.
const PRICE_DP: u32 = 2;

/// Upper bound on candles generated for one symbol up front.
const MAX_HISTORY_LEN: usize = 5_000;

/// Tuning for the simulated exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Starting free balance of each quote currency.
    pub initial_balance: Decimal,
    /// Taker fee charged on every market fill.
    pub fee_rate: Decimal,
    /// First close of every generated series.
    pub base_price: Decimal,
    /// Largest close-to-close move per candle, in basis points.
    pub volatility_bps: i64,
    /// Candles generated when a symbol is first requested.
    pub history_len: usize,
    /// Seed for the random walk.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
            fee_rate: dec!(0.001),
            base_price: dec!(95000),
            volatility_bps: 20,
            history_len: 100,
            seed: 42,
        }
    }
}

/// A completed simulated fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedFill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
    pub fill_price: Decimal,
    pub fee: Decimal,
    /// Realized P&L of this fill after its fee.
    pub realized_pnl: Decimal,
    pub timestamp: DateTime<Utc>,
}

struct Series {
    candles: Vec<Candle>,
    step: Duration,
    /// Generated series advance on every fetch; preloaded ones stay put.
    generated: bool,
    rng: StdRng,
}

#[derive(Default)]
struct Book {
    series: HashMap<String, Series>,
    balances: HashMap<String, Decimal>,
    open_orders: HashMap<String, Vec<OrderHandle>>,
    positions: HashMap<String, Decimal>,
    avg_entry_prices: HashMap<String, Decimal>,
    trade_history: Vec<SimulatedFill>,
    realized_pnl: Decimal,
    next_order_id: u64,
}

/// In-memory exchange used when `dry_run` is enabled.
pub struct SimulatedExchange {
    config: SimulationConfig,
    /// The only currency with a starting balance.
    quote_currency: String,
    state: Mutex<Book>,
}

impl SimulatedExchange {
    /// Creates a simulated exchange with empty market data and a funded
    /// `USDT` balance.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            quote_currency: "USDT".to_string(),
            state: Mutex::new(Book {
                next_order_id: 1,
                ..Book::default()
            }),
        }
    }

    /// Funds `currency` instead of `USDT`.
    #[must_use]
    pub fn with_quote_currency(mut self, currency: impl Into<String>) -> Self {
        self.quote_currency = currency.into();
        self
    }

    /// Replaces a symbol's history with fixed candles that do not advance.
    pub async fn preload_candles(&self, symbol: &str, candles: Vec<Candle>) {
        let step = match candles.as_slice() {
            [.., prev, last] => last.timestamp - prev.timestamp,
            _ => Duration::seconds(Timeframe::default().as_secs() as i64),
        };
        let mut book = self.state.lock().await;
        book.series.insert(
            symbol.to_string(),
            Series {
                candles,
                step,
                generated: false,
                rng: self.rng_for(symbol),
            },
        );
    }

    /// Appends a candle to a symbol's history.
    pub async fn push_candle(&self, symbol: &str, candle: Candle) {
        let mut book = self.state.lock().await;
        match book.series.get_mut(symbol) {
            Some(series) => series.candles.push(candle),
            None => {
                book.series.insert(
                    symbol.to_string(),
                    Series {
                        candles: vec![candle],
                        step: Duration::seconds(Timeframe::default().as_secs() as i64),
                        generated: false,
                        rng: self.rng_for(symbol),
                    },
                );
            }
        }
    }

    /// Cumulative realized P&L after fees.
    pub async fn realized_pnl(&self) -> Decimal {
        self.state.lock().await.realized_pnl
    }

    /// History of market fills, oldest first.
    pub async fn trade_history(&self) -> Vec<SimulatedFill> {
        self.state.lock().await.trade_history.clone()
    }

    /// Net base quantity held for `symbol`.
    pub async fn position(&self, symbol: &str) -> Decimal {
        let book = self.state.lock().await;
        book.positions.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    /// Trigger orders still open on `symbol`.
    pub async fn open_orders(&self, symbol: &str) -> Vec<OrderHandle> {
        let book = self.state.lock().await;
        book.open_orders.get(symbol).cloned().unwrap_or_default()
    }

    // -- Private helpers --

    fn rng_for(&self, symbol: &str) -> StdRng {
        let salt = symbol
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        StdRng::seed_from_u64(self.config.seed ^ salt)
    }

    fn generate_series(&self, symbol: &str, timeframe: Timeframe, len: usize) -> Series {
        let len = len.min(MAX_HISTORY_LEN);
        let step = Duration::seconds(timeframe.as_secs() as i64);
        let mut series = Series {
            candles: Vec::with_capacity(len),
            step,
            generated: true,
            rng: self.rng_for(symbol),
        };
        let start = Utc::now() - step * (len as i32);
        let mut prev_close = self.config.base_price;
        for i in 0..len {
            let ts = start + step * (i as i32);
            let candle = self.walk(&mut series.rng, ts, prev_close);
            prev_close = candle.close;
            series.candles.push(candle);
        }
        series
    }

    fn walk(&self, rng: &mut StdRng, timestamp: DateTime<Utc>, open: Decimal) -> Candle {
        let vol = self.config.volatility_bps.max(0);
        let change = Decimal::new(rng.gen_range(-vol..=vol), 4);
        let close = (open * (Decimal::ONE + change)).round_dp(PRICE_DP);
        let wick_up = Decimal::new(rng.gen_range(0..=10), 4);
        let wick_down = Decimal::new(rng.gen_range(0..=10), 4);
        let high = (open.max(close) * (Decimal::ONE + wick_up)).round_dp(PRICE_DP);
        let low = (open.min(close) * (Decimal::ONE - wick_down)).round_dp(PRICE_DP);
        let volume = Decimal::new(rng.gen_range(10_000..=100_000), 2);
        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns the series for `symbol`, generating it on first use.
    fn series_mut<'a>(
        &self,
        book: &'a mut Book,
        symbol: &str,
        timeframe: Timeframe,
        min_len: usize,
    ) -> ExchangeResult<&'a mut Series> {
        if split_symbol(symbol).is_none() {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        }
        Ok(book.series.entry(symbol.to_string()).or_insert_with(|| {
            let len = min_len.max(self.config.history_len).max(1);
            debug!(symbol, len, "Generating simulated candle history");
            self.generate_series(symbol, timeframe, len)
        }))
    }

    fn last_price(&self, book: &mut Book, symbol: &str) -> ExchangeResult<Decimal> {
        let series = self.series_mut(book, symbol, Timeframe::default(), 0)?;
        series
            .candles
            .last()
            .map(|c| c.close)
            .ok_or_else(|| ExchangeError::Rejected(format!("no market data for {symbol}")))
    }

    fn next_order_id(book: &mut Book) -> String {
        let id = format!("SIM-{:06}", book.next_order_id);
        book.next_order_id += 1;
        id
    }

    fn balance(&self, book: &mut Book, currency: &str) -> Decimal {
        *book
            .balances
            .entry(currency.to_string())
            .or_insert_with(|| self.initial_balance_for(currency))
    }

    fn initial_balance_for(&self, currency: &str) -> Decimal {
        if currency == self.quote_currency {
            self.config.initial_balance
        } else {
            Decimal::ZERO
        }
    }

    fn record_trigger(
        &self,
        book: &mut Book,
        symbol: &str,
        side: OrderSide,
        kind: OrderKind,
        qty: Decimal,
        trigger_price: Decimal,
    ) -> ExchangeResult<OrderHandle> {
        if split_symbol(symbol).is_none() {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        }
        if qty <= Decimal::ZERO {
            return Err(ExchangeError::Rejected(format!(
                "order quantity must be positive, got {qty}"
            )));
        }
        if trigger_price <= Decimal::ZERO {
            return Err(ExchangeError::Rejected(format!(
                "trigger price must be positive, got {trigger_price}"
            )));
        }

        let handle = OrderHandle {
            order_id: Self::next_order_id(book),
            symbol: symbol.to_string(),
            side,
            kind,
            qty,
            trigger_price: Some(trigger_price),
            fill_price: None,
        };
        book.open_orders
            .entry(symbol.to_string())
            .or_default()
            .push(handle.clone());
        info!(
            symbol,
            %side,
            %qty,
            trigger = %trigger_price,
            order_id = %handle.order_id,
            "Simulated {kind:?} order placed"
        );
        Ok(handle)
    }
}

/// Updates position tracking and returns realized P&L (before fees).
fn update_position(
    book: &mut Book,
    symbol: &str,
    side: OrderSide,
    qty: Decimal,
    fill_price: Decimal,
) -> Decimal {
    let current_pos = book.positions.get(symbol).copied().unwrap_or(Decimal::ZERO);
    let entry_price = book
        .avg_entry_prices
        .get(symbol)
        .copied()
        .unwrap_or(Decimal::ZERO);

    let signed_qty = match side {
        OrderSide::Buy => qty,
        OrderSide::Sell => -qty,
    };
    let new_pos = current_pos + signed_qty;
    let mut realized = Decimal::ZERO;

    if current_pos > Decimal::ZERO && signed_qty < Decimal::ZERO {
        let close_qty = qty.min(current_pos);
        realized = (fill_price - entry_price) * close_qty;
        if new_pos <= Decimal::ZERO {
            book.avg_entry_prices.remove(symbol);
        }
    } else if signed_qty > Decimal::ZERO {
        let total_cost = entry_price * current_pos + fill_price * qty;
        let total_qty = current_pos + qty;
        if !total_qty.is_zero() {
            book.avg_entry_prices
                .insert(symbol.to_string(), total_cost / total_qty);
        }
    }

    if new_pos <= Decimal::ZERO {
        book.positions.remove(symbol);
    } else {
        book.positions.insert(symbol.to_string(), new_pos);
    }

    realized
}

#[async_trait]
impl Exchange for SimulatedExchange {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        let mut book = self.state.lock().await;
        let fresh = !book.series.contains_key(symbol);
        let series = self.series_mut(&mut book, symbol, timeframe, limit)?;

        if series.generated && !fresh {
            if let Some(last) = series.candles.last() {
                let ts = last.timestamp + series.step;
                let open = last.close;
                let candle = self.walk(&mut series.rng, ts, open);
                series.candles.push(candle);
            }
        }

        let start = series.candles.len().saturating_sub(limit);
        Ok(series.candles[start..].to_vec())
    }

    async fn get_balance(&self, currency: &str) -> ExchangeResult<Decimal> {
        let mut book = self.state.lock().await;
        Ok(self.balance(&mut book, currency))
    }

    async fn get_current_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let mut book = self.state.lock().await;
        self.last_price(&mut book, symbol)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
    ) -> ExchangeResult<OrderHandle> {
        let (base, quote) =
            split_symbol(symbol).ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;
        if qty <= Decimal::ZERO {
            return Err(ExchangeError::Rejected(format!(
                "order quantity must be positive, got {qty}"
            )));
        }

        let mut book = self.state.lock().await;
        let fill_price = self.last_price(&mut book, symbol)?;
        let cost = qty * fill_price;
        let fee = cost * self.config.fee_rate;

        let quote_balance = self.balance(&mut book, quote);
        let base_balance = self.balance(&mut book, base);
        match side {
            OrderSide::Buy => {
                let required = cost + fee;
                if quote_balance < required {
                    return Err(ExchangeError::InsufficientFunds {
                        currency: quote.to_string(),
                        required,
                        available: quote_balance,
                    });
                }
                book.balances
                    .insert(quote.to_string(), quote_balance - required);
                book.balances.insert(base.to_string(), base_balance + qty);
            }
            OrderSide::Sell => {
                if base_balance < qty {
                    return Err(ExchangeError::InsufficientFunds {
                        currency: base.to_string(),
                        required: qty,
                        available: base_balance,
                    });
                }
                book.balances.insert(base.to_string(), base_balance - qty);
                book.balances
                    .insert(quote.to_string(), quote_balance + cost - fee);
            }
        }

        let order_id = Self::next_order_id(&mut book);
        let realized = update_position(&mut book, symbol, side, qty, fill_price);
        book.realized_pnl += realized - fee;

        // Protective orders are reduce-only: a flat position voids them.
        if side == OrderSide::Sell && !book.positions.contains_key(symbol) {
            if let Some(voided) = book.open_orders.remove(symbol) {
                info!(symbol, voided = voided.len(), "Protective orders voided on flat position");
            }
        }
        book.trade_history.push(SimulatedFill {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            qty,
            fill_price,
            fee,
            realized_pnl: realized - fee,
            timestamp: Utc::now(),
        });

        info!(symbol, %side, %qty, price = %fill_price, %fee, %order_id, "Simulated market fill");

        Ok(OrderHandle {
            order_id,
            symbol: symbol.to_string(),
            side,
            kind: OrderKind::Market,
            qty,
            trigger_price: None,
            fill_price: Some(fill_price),
        })
    }

    async fn place_stop_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        stop_price: Decimal,
    ) -> ExchangeResult<OrderHandle> {
        let mut book = self.state.lock().await;
        self.record_trigger(&mut book, symbol, side, OrderKind::StopMarket, qty, stop_price)
    }

    async fn place_take_profit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        target_price: Decimal,
    ) -> ExchangeResult<OrderHandle> {
        let mut book = self.state.lock().await;
        self.record_trigger(
            &mut book,
            symbol,
            side,
            OrderKind::TakeProfitMarket,
            qty,
            target_price,
        )
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<usize> {
        let mut book = self.state.lock().await;
        let removed = book.open_orders.remove(symbol).map_or(0, |o| o.len());
        info!(symbol, removed, "Simulated orders cancelled");
        Ok(removed)
    }
}
