use std::sync::Arc;

use crossover::CrossoverError;
use crossover::config::fetch_config;
use crossover::exchange::SimulatedExchange;
use crossover::notify::{LogNotifier, NotificationHub};
use crossover::trader::Orchestrator;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), CrossoverError> {
    let config = fetch_config()?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    if let Err(e) = config.validate() {
        error!("{e}");
        return Err(e);
    }

    info!(
        pairs = %config.pairs.join(", "),
        timeframe = %config.timeframe,
        dry_run = config.dry_run,
        "Starting crossover"
    );
    for line in config.risk.describe().lines() {
        info!("{line}");
    }

    let exchange = SimulatedExchange::new(config.simulation.clone())
        .with_quote_currency(config.quote_currency.clone());
    let notifier = if config.notifications_enabled {
        NotificationHub::new(Arc::new(LogNotifier))
    } else {
        NotificationHub::disabled()
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let orchestrator = Orchestrator::new(config, Arc::new(exchange), notifier);
    orchestrator.run(shutdown).await;

    Ok(())
}

/// Cancels `shutdown` on Ctrl+C.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
        return;
    }
    warn!("Received Ctrl+C, shutting down");
    shutdown.cancel();
}
