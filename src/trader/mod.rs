//! Multi-pair trading loop.
//!
//! Each cycle evaluates every configured pair concurrently (bounded by
//! `max_workers`), applies the resulting signal to the pair's state
//! machine, and reports one [`PairOutcome`] per pair. A failing or
//! panicking pair never affects the others.

pub mod pair;
pub mod status;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{FutureExt, StreamExt, stream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::BotConfig;
use crate::exchange::{Exchange, ExchangeError, ExchangeResult};
use crate::models::Position;
use crate::notify::NotificationHub;
use crate::strategy::Signal;

pub use pair::{ClosedTrade, ExitTrigger, PairTrader, SkipReason, TradeContext, Transition};
pub use status::{PairStatus, PositionSummary, StatusSnapshot};

/// Runs `fut`, failing with [`ExchangeError::Timeout`] after `limit`.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    operation: &'static str,
    fut: impl Future<Output = ExchangeResult<T>>,
) -> ExchangeResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ExchangeError::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

/// How one pair's cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Completed(Transition),
    /// Data, execution, or unexpected error; the pair's state is unchanged.
    Failed(String),
}

/// Outcome of one pair within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairReport {
    pub symbol: String,
    pub outcome: PairOutcome,
}

/// Everything that happened during one cycle, in configured pair order.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub pairs: Vec<PairReport>,
}

impl CycleReport {
    /// Outcome for `symbol`, if it was part of the cycle.
    #[must_use]
    pub fn outcome(&self, symbol: &str) -> Option<&PairOutcome> {
        self.pairs
            .iter()
            .find(|p| p.symbol == symbol)
            .map(|p| &p.outcome)
    }

    /// Number of pairs that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| matches!(p.outcome, PairOutcome::Failed(_)))
            .count()
    }
}

/// Drives every configured pair through repeated cycles.
pub struct Orchestrator {
    config: BotConfig,
    exchange: Arc<dyn Exchange>,
    notifier: NotificationHub,
    traders: Vec<Arc<Mutex<PairTrader>>>,
}

impl Orchestrator {
    /// Creates one flat [`PairTrader`] per configured pair.
    #[must_use]
    pub fn new(config: BotConfig, exchange: Arc<dyn Exchange>, notifier: NotificationHub) -> Self {
        let traders = config
            .pairs
            .iter()
            .map(|symbol| Arc::new(Mutex::new(PairTrader::new(symbol.clone(), config.strategy))))
            .collect();
        Self {
            config,
            exchange,
            notifier,
            traders,
        }
    }

    /// Pause between cycles.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.config.interval()
    }

    /// Current position of `symbol`, if it is configured and open.
    pub async fn position(&self, symbol: &str) -> Option<Position> {
        for trader in &self.traders {
            let trader = trader.lock().await;
            if trader.symbol() == symbol {
                return trader.position().cloned();
            }
        }
        None
    }

    /// Runs one evaluation cycle over every pair.
    ///
    /// Pairs already started when `shutdown` fires finish their work; pairs
    /// reached afterwards report [`SkipReason::ShuttingDown`].
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> CycleReport {
        let started_at = Utc::now();
        let workers = self.config.worker_count();
        info!(
            pairs = self.traders.len(),
            workers,
            "Checking all pairs"
        );

        let mut results: Vec<(usize, PairReport)> =
            stream::iter(self.traders.iter().cloned().enumerate())
                .map(|(idx, trader)| async move { (idx, self.process_pair(trader, shutdown).await) })
                .buffer_unordered(workers)
                .collect()
                .await;
        results.sort_by_key(|(idx, _)| *idx);

        let report = CycleReport {
            started_at,
            pairs: results.into_iter().map(|(_, r)| r).collect(),
        };
        info!(
            pairs = report.pairs.len(),
            failed = report.failed(),
            "Cycle complete"
        );
        report
    }

    async fn process_pair(
        &self,
        trader: Arc<Mutex<PairTrader>>,
        shutdown: &CancellationToken,
    ) -> PairReport {
        let mut guard = trader.lock().await;
        let symbol = guard.symbol().to_string();

        let result = AssertUnwindSafe(self.check_pair(&mut guard, shutdown))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(transition)) => PairOutcome::Completed(transition),
            Ok(Err(e)) => {
                error!(symbol = %symbol, "Error in signal check: {e}");
                PairOutcome::Failed(e.to_string())
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                error!(symbol = %symbol, "Unexpected failure processing pair: {msg}");
                self.notifier
                    .notify_error(format!("{symbol}: unexpected failure: {msg}"))
                    .await;
                PairOutcome::Failed(format!("panic: {msg}"))
            }
        };
        PairReport { symbol, outcome }
    }

    async fn check_pair(
        &self,
        trader: &mut PairTrader,
        shutdown: &CancellationToken,
    ) -> crate::Result<Transition> {
        if shutdown.is_cancelled() {
            return Ok(Transition::Skipped(SkipReason::ShuttingDown));
        }

        let candles = with_timeout(
            self.config.request_timeout(),
            "fetch_candles",
            self.exchange.fetch_candles(
                trader.symbol(),
                self.config.timeframe,
                self.config.candle_limit,
            ),
        )
        .await?;

        let (signal, info) = trader.evaluate(&candles);
        info!(
            symbol = trader.symbol(),
            %signal,
            price = %info.price,
            reason = %info.reason,
            "Signal"
        );
        if signal != Signal::Hold {
            self.notifier
                .notify_signal(trader.symbol(), signal, &info)
                .await;
        }

        let ctx = TradeContext {
            exchange: self.exchange.as_ref(),
            notifier: &self.notifier,
            risk: &self.config.risk,
            quote_currency: &self.config.quote_currency,
            total_pairs: self.config.pairs.len(),
            dry_run: self.config.dry_run,
            request_timeout: self.config.request_timeout(),
            shutdown,
        };
        trader.on_signal(signal, &info, &ctx).await
    }

    /// Reads the balance and every pair's price and position.
    ///
    /// Failures are recorded in the snapshot instead of being returned.
    pub async fn status(&self) -> StatusSnapshot {
        let timeout = self.config.request_timeout();
        let balance = match with_timeout(
            timeout,
            "get_balance",
            self.exchange.get_balance(&self.config.quote_currency),
        )
        .await
        {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!("Failed to get balance: {e}");
                None
            }
        };

        let mut pairs = Vec::with_capacity(self.traders.len());
        for trader in &self.traders {
            let trader = trader.lock().await;
            let symbol = trader.symbol().to_string();
            let price = with_timeout(
                timeout,
                "get_current_price",
                self.exchange.get_current_price(&symbol),
            )
            .await;
            let status = match price {
                Ok(price) => PairStatus {
                    price: Some(price),
                    position: trader
                        .position()
                        .map(|p| PositionSummary::new(p, price)),
                    error: None,
                    symbol,
                },
                Err(e) => {
                    warn!(symbol = %symbol, "Failed to get status: {e}");
                    PairStatus {
                        price: None,
                        position: None,
                        error: Some(e.to_string()),
                        symbol,
                    }
                }
            };
            pairs.push(status);
        }

        StatusSnapshot {
            timestamp: Utc::now(),
            balance,
            total_pairs: self.traders.len(),
            pairs,
        }
    }

    /// Runs cycles until `shutdown` is cancelled.
    ///
    /// Cancellation during the sleep returns immediately; during a cycle the
    /// cycle completes without placing new orders.
    pub async fn run(&self, shutdown: CancellationToken) {
        let interval = self.interval();
        info!(
            interval_secs = interval.as_secs(),
            pairs = %self.config.pairs.join(", "),
            exchange = self.exchange.name(),
            "Starting multi-pair trading loop"
        );

        let mut cycles: u64 = 0;
        while !shutdown.is_cancelled() {
            self.run_cycle(&shutdown).await;
            cycles += 1;

            let status = self.status().await;
            info!(
                balance = %status
                    .balance
                    .map_or_else(|| "n/a".to_string(), |b| b.round_dp(2).to_string()),
                active_positions = status.active_positions(),
                total_pairs = status.total_pairs,
                "Status"
            );
            if cycles == 1 {
                self.notifier.notify_status(&status).await;
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        info!(cycles, "Trading loop stopped");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
