//! Shared domain models.
//!
//! Contains market data (candles), order types exchanged with the
//! [`Exchange`](crate::exchange::Exchange) collaborator, and the per-pair
//! open position record.

pub mod candle;
pub mod order;
pub mod position;

pub use candle::Candle;
pub use order::{OrderHandle, OrderKind, OrderSide};
pub use position::{Position, PositionSide};
