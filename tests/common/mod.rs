//! Shared test utilities: a scripted exchange and candle fixtures.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crossover::config::{BotConfig, Timeframe};
use crossover::exchange::{Exchange, ExchangeError, ExchangeResult};
use crossover::models::{Candle, OrderHandle, OrderKind, OrderSide};

/// Path to the test fixtures directory.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Closes that end in a confirmed bullish crossover with the default
/// 9/21/14 parameters: last close 928, RSI about 59.8, EMA spread about 0.15%.
pub fn crossover_closes() -> Vec<Decimal> {
    let raw = std::fs::read_to_string(fixtures_dir().join("crossover_closes.json"))
        .expect("Failed to read crossover fixture");
    serde_json::from_str(&raw).expect("Failed to parse crossover fixture")
}

/// Builds flat candles (open = high = low = close) from closing prices.
pub fn candles_from_closes(closes: &[Decimal]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| Candle::flat(start + chrono::Duration::minutes(15 * i as i64), *close))
        .collect()
}

pub fn flat_candles(price: Decimal, n: usize) -> Vec<Candle> {
    candles_from_closes(&vec![price; n])
}

/// Config for `pairs` with fixture-friendly limits.
pub fn test_config(pairs: &[&str]) -> BotConfig {
    BotConfig {
        pairs: pairs.iter().map(|p| (*p).to_string()).collect(),
        candle_limit: 60,
        interval_secs: Some(60),
        request_timeout_secs: 30,
        ..BotConfig::default()
    }
}

/// How the scripted exchange reacts to a candle request for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Normal,
    FailData,
    Panic,
    Hang,
}

#[derive(Default)]
struct State {
    candles: HashMap<String, Vec<Candle>>,
    behaviors: HashMap<String, Behavior>,
    balance: Decimal,
    orders: Vec<OrderHandle>,
    cancels: Vec<String>,
    fetches: HashMap<String, usize>,
    failing_market: HashSet<String>,
    failing_triggers: bool,
    next_id: u64,
}

/// Exchange double with per-symbol scripted behavior that records every order.
pub struct ScriptedExchange {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExchange {
    pub fn new(balance: Decimal) -> Self {
        Self {
            state: Mutex::new(State {
                balance,
                next_id: 1,
                ..State::default()
            }),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.state().candles.insert(symbol.to_string(), candles);
    }

    pub fn set_closes(&self, symbol: &str, closes: &[Decimal]) {
        self.set_candles(symbol, candles_from_closes(closes));
    }

    pub fn set_behavior(&self, symbol: &str, behavior: Behavior) {
        self.state().behaviors.insert(symbol.to_string(), behavior);
    }

    pub fn set_balance(&self, balance: Decimal) {
        self.state().balance = balance;
    }

    pub fn fail_market_orders(&self, symbol: &str, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_market.insert(symbol.to_string());
        } else {
            state.failing_market.remove(symbol);
        }
    }

    pub fn fail_trigger_orders(&self, fail: bool) {
        self.state().failing_triggers = fail;
    }

    pub fn orders(&self) -> Vec<OrderHandle> {
        self.state().orders.clone()
    }

    pub fn market_orders(&self, symbol: &str) -> Vec<OrderHandle> {
        self.state()
            .orders
            .iter()
            .filter(|o| o.symbol == symbol && o.kind == OrderKind::Market)
            .cloned()
            .collect()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.state().cancels.clone()
    }

    pub fn fetch_count(&self, symbol: &str) -> usize {
        self.state().fetches.get(symbol).copied().unwrap_or(0)
    }

    /// Highest number of concurrent candle requests observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn last_close(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.state()
            .candles
            .get(symbol)
            .and_then(|c| c.last())
            .map(|c| c.close)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))
    }

    fn record(
        &self,
        symbol: &str,
        side: OrderSide,
        kind: OrderKind,
        qty: Decimal,
        trigger_price: Option<Decimal>,
        fill_price: Option<Decimal>,
    ) -> OrderHandle {
        let mut state = self.state();
        let handle = OrderHandle {
            order_id: format!("TEST-{}", state.next_id),
            symbol: symbol.to_string(),
            side,
            kind,
            qty,
            trigger_price,
            fill_price,
        };
        state.next_id += 1;
        state.orders.push(handle.clone());
        handle
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        let behavior = {
            let mut state = self.state();
            *state.fetches.entry(symbol.to_string()).or_default() += 1;
            state
                .behaviors
                .get(symbol)
                .copied()
                .unwrap_or(Behavior::Normal)
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match behavior {
            Behavior::Normal => {}
            Behavior::FailData => {
                return Err(ExchangeError::Network("connection reset".into()));
            }
            Behavior::Panic => panic!("scripted panic for {symbol}"),
            Behavior::Hang => tokio::time::sleep(Duration::from_secs(86_400)).await,
        }

        let state = self.state();
        let candles = state
            .candles
            .get(symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }

    async fn get_balance(&self, _currency: &str) -> ExchangeResult<Decimal> {
        Ok(self.state().balance)
    }

    async fn get_current_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.last_close(symbol)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
    ) -> ExchangeResult<OrderHandle> {
        if self.state().failing_market.contains(symbol) {
            return Err(ExchangeError::Rejected("market order rejected".into()));
        }
        let price = self.last_close(symbol)?;
        Ok(self.record(symbol, side, OrderKind::Market, qty, None, Some(price)))
    }

    async fn place_stop_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        stop_price: Decimal,
    ) -> ExchangeResult<OrderHandle> {
        if self.state().failing_triggers {
            return Err(ExchangeError::Rejected("stop orders unavailable".into()));
        }
        Ok(self.record(symbol, side, OrderKind::StopMarket, qty, Some(stop_price), None))
    }

    async fn place_take_profit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        target_price: Decimal,
    ) -> ExchangeResult<OrderHandle> {
        if self.state().failing_triggers {
            return Err(ExchangeError::Rejected("take-profit orders unavailable".into()));
        }
        Ok(self.record(
            symbol,
            side,
            OrderKind::TakeProfitMarket,
            qty,
            Some(target_price),
            None,
        ))
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<usize> {
        let mut state = self.state();
        state.cancels.push(symbol.to_string());
        let open = state
            .orders
            .iter()
            .filter(|o| o.symbol == symbol && o.kind != OrderKind::Market)
            .count();
        Ok(open)
    }
}

/// Default balance used by most tests.
pub const BALANCE: Decimal = dec!(10000);
