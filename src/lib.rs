//! EMA crossover + RSI trading bot.
//!
//! Evaluates a set of trading pairs on a fixed interval, sizes entries with
//! fixed-fraction risk, and manages one long position per pair with
//! stop-loss and take-profit levels.

pub mod config;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod risk;
pub mod strategy;
pub mod trader;

pub use error::{CrossoverError, Result};
