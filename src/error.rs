//! Crate-level error types.
//!
//! [`CrossoverError`] unifies every error source (configuration, exchange,
//! JSON) behind a single enum so callers can
//! match on the variant they care about while still using the `?` operator.

use crate::exchange::ExchangeError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CrossoverError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum CrossoverError {
    /// Configuration could not be read, parsed, or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// An exchange call (market data, balance, order placement) failed.
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
