//! EMA crossover + RSI signal generation.
//!
//! The generator is long-only. For a flat pair it looks for a confirmed
//! bullish crossover; for a long pair it looks for a bearish crossover or an
//! overbought RSI. Exit checks always run before entry checks.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::indicators::{self, IndicatorError, IndicatorFrame, IndicatorWindows};
use crate::models::{Candle, PositionSide};

/// Minimum absolute EMA spread (in percent) for an entry to count as a trend.
pub const MIN_TREND_STRENGTH_PCT: Decimal = dec!(0.1);

/// Trading signal emitted once per pair per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => f.write_str("BUY"),
            Signal::Sell => f.write_str("SELL"),
            Signal::Hold => f.write_str("HOLD"),
        }
    }
}

/// Why the generator produced its signal. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    InsufficientData,
    ExitLongSignal,
    BullishCrossoverConfirmed,
    NoSignal,
}

impl SignalReason {
    /// Returns the stable reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalReason::InsufficientData => "insufficient_data",
            SignalReason::ExitLongSignal => "exit_long_signal",
            SignalReason::BullishCrossoverConfirmed => "bullish_crossover_confirmed",
            SignalReason::NoSignal => "no_signal",
        }
    }
}

impl fmt::Display for SignalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic payload accompanying a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalInfo {
    /// Close of the latest candle (zero when no candles were supplied).
    pub price: Decimal,
    pub ema_fast: Option<Decimal>,
    pub ema_slow: Option<Decimal>,
    pub rsi: Option<Decimal>,
    /// EMA spread in percent.
    pub ema_diff: Option<Decimal>,
    pub reason: SignalReason,
}

impl SignalInfo {
    /// Info for a HOLD issued before the indicators are defined.
    #[must_use]
    pub fn insufficient(price: Decimal) -> Self {
        Self {
            price,
            ema_fast: None,
            ema_slow: None,
            rsi: None,
            ema_diff: None,
            reason: SignalReason::InsufficientData,
        }
    }
}

/// Strategy parameters. Thresholds are RSI levels on the 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub rsi_overbought: Decimal,
    pub rsi_oversold: Decimal,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_slow: 21,
            rsi_period: 14,
            rsi_overbought: dec!(70),
            rsi_oversold: dec!(30),
        }
    }
}

impl StrategyParams {
    /// Indicator windows implied by these parameters.
    #[must_use]
    pub fn windows(&self) -> IndicatorWindows {
        IndicatorWindows {
            fast: self.ema_fast,
            slow: self.ema_slow,
            rsi: self.rsi_period,
        }
    }

    /// Minimum candle count before a signal can be generated.
    #[must_use]
    pub fn required_candles(&self) -> usize {
        self.windows().required_len()
    }
}

/// Stateless signal generator for one parameter set.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    params: StrategyParams,
}

impl SignalGenerator {
    /// Creates a generator with the given parameters.
    #[must_use]
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }

    /// Computes the indicator frames for `candles`.
    ///
    /// # Errors
    ///
    /// Returns [`IndicatorError::InsufficientData`] below the warm-up length.
    pub fn calculate_indicators(
        &self,
        candles: &[Candle],
    ) -> Result<Vec<IndicatorFrame>, IndicatorError> {
        indicators::compute(candles, self.params.windows())
    }

    /// Produces a signal for the latest candle given the pair's position.
    ///
    /// `position` is `None` when the pair is flat.
    pub fn generate_signal(
        &self,
        candles: &[Candle],
        position: Option<PositionSide>,
    ) -> (Signal, SignalInfo) {
        let price = candles.last().map(|c| c.close).unwrap_or(Decimal::ZERO);

        let frames = match self.calculate_indicators(candles) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(candles = candles.len(), "Insufficient data for signal generation: {e}");
                return (Signal::Hold, SignalInfo::insufficient(price));
            }
        };
        let Some(frame) = frames.last() else {
            return (Signal::Hold, SignalInfo::insufficient(price));
        };

        let (signal, reason) = self.decide(frame, price, position);
        let info = SignalInfo {
            price,
            ema_fast: frame.ema_fast,
            ema_slow: frame.ema_slow,
            rsi: frame.rsi,
            ema_diff: frame.ema_diff_pct,
            reason,
        };

        match signal {
            Signal::Buy => info!(%price, rsi = ?info.rsi, ema_diff = ?info.ema_diff, "BUY signal"),
            Signal::Sell => info!(%price, rsi = ?info.rsi, "Exit LONG signal"),
            Signal::Hold => {}
        }

        (signal, info)
    }

    /// Evaluates the decision rules for a single frame.
    ///
    /// Rules, first match wins:
    /// 1. any indicator undefined → HOLD (`insufficient_data`)
    /// 2. long and (bearish crossover or RSI above overbought) → SELL
    /// 3. flat and confirmed bullish crossover → BUY
    /// 4. otherwise HOLD (`no_signal`)
    #[must_use]
    pub fn decide(
        &self,
        frame: &IndicatorFrame,
        close: Decimal,
        position: Option<PositionSide>,
    ) -> (Signal, SignalReason) {
        let (Some(ema_fast), Some(ema_slow), Some(rsi), Some(ema_diff)) =
            (frame.ema_fast, frame.ema_slow, frame.rsi, frame.ema_diff_pct)
        else {
            return (Signal::Hold, SignalReason::InsufficientData);
        };

        match position {
            Some(PositionSide::Long) => {
                if frame.cross_down || rsi > self.params.rsi_overbought {
                    return (Signal::Sell, SignalReason::ExitLongSignal);
                }
            }
            None => {
                let rsi_in_band =
                    rsi > self.params.rsi_oversold && rsi < self.params.rsi_overbought;
                let trending = ema_diff.abs() > MIN_TREND_STRENGTH_PCT;
                let confirmed = close > ema_fast && ema_fast > ema_slow;
                if frame.cross_up && rsi_in_band && trending && confirmed {
                    return (Signal::Buy, SignalReason::BullishCrossoverConfirmed);
                }
            }
            // Short positions are never opened; nothing to evaluate.
            Some(PositionSide::Short) => {}
        }

        (Signal::Hold, SignalReason::NoSignal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn generator() -> SignalGenerator {
        SignalGenerator::new(StrategyParams::default())
    }

    /// A frame satisfying every entry condition for a close of 101.
    fn entry_frame() -> IndicatorFrame {
        IndicatorFrame {
            ema_fast: Some(dec!(100.5)),
            ema_slow: Some(dec!(100)),
            rsi: Some(dec!(55)),
            ema_diff_pct: Some(dec!(0.5)),
            cross_up: true,
            cross_down: false,
        }
    }

    fn candles_from(closes: &[i64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Candle::flat(start + Duration::minutes(15 * i as i64), Decimal::from(*c))
            })
            .collect()
    }

    #[test]
    fn buy_when_all_entry_conditions_hold() {
        let (signal, reason) = generator().decide(&entry_frame(), dec!(101), None);
        assert_eq!(signal, Signal::Buy);
        assert_eq!(reason, SignalReason::BullishCrossoverConfirmed);
    }

    #[test]
    fn no_crossover_holds() {
        let frame = IndicatorFrame {
            cross_up: false,
            ..entry_frame()
        };
        assert_eq!(
            generator().decide(&frame, dec!(101), None),
            (Signal::Hold, SignalReason::NoSignal)
        );
    }

    #[test]
    fn overbought_rsi_blocks_entry() {
        let frame = IndicatorFrame {
            rsi: Some(dec!(70)),
            ..entry_frame()
        };
        assert_eq!(generator().decide(&frame, dec!(101), None).0, Signal::Hold);
    }

    #[test]
    fn oversold_rsi_blocks_entry() {
        let frame = IndicatorFrame {
            rsi: Some(dec!(30)),
            ..entry_frame()
        };
        assert_eq!(generator().decide(&frame, dec!(101), None).0, Signal::Hold);
    }

    #[test]
    fn weak_trend_blocks_entry() {
        let frame = IndicatorFrame {
            ema_diff_pct: Some(dec!(0.1)),
            ..entry_frame()
        };
        assert_eq!(generator().decide(&frame, dec!(101), None).0, Signal::Hold);
    }

    #[test]
    fn close_below_fast_ema_blocks_entry() {
        let (signal, _) = generator().decide(&entry_frame(), dec!(100.5), None);
        assert_eq!(signal, Signal::Hold);
    }

    #[test]
    fn inverted_emas_block_entry() {
        let frame = IndicatorFrame {
            ema_fast: Some(dec!(99)),
            ..entry_frame()
        };
        assert_eq!(generator().decide(&frame, dec!(101), None).0, Signal::Hold);
    }

    #[test]
    fn long_exits_on_bearish_crossover() {
        let frame = IndicatorFrame {
            cross_up: false,
            cross_down: true,
            rsi: Some(dec!(40)),
            ..entry_frame()
        };
        assert_eq!(
            generator().decide(&frame, dec!(99), Some(PositionSide::Long)),
            (Signal::Sell, SignalReason::ExitLongSignal)
        );
    }

    #[test]
    fn long_exits_on_overbought_rsi() {
        let frame = IndicatorFrame {
            rsi: Some(dec!(70.01)),
            ..entry_frame()
        };
        assert_eq!(
            generator().decide(&frame, dec!(101), Some(PositionSide::Long)).0,
            Signal::Sell
        );
    }

    #[test]
    fn long_never_reenters() {
        // Every entry condition holds, but a long position only evaluates exits.
        assert_eq!(
            generator().decide(&entry_frame(), dec!(101), Some(PositionSide::Long)),
            (Signal::Hold, SignalReason::NoSignal)
        );
    }

    #[test]
    fn short_position_is_inert() {
        let frame = IndicatorFrame {
            cross_down: true,
            rsi: Some(dec!(90)),
            ..entry_frame()
        };
        assert_eq!(
            generator().decide(&frame, dec!(101), Some(PositionSide::Short)),
            (Signal::Hold, SignalReason::NoSignal)
        );
    }

    #[test]
    fn undefined_indicator_is_insufficient() {
        let frame = IndicatorFrame {
            rsi: None,
            ..entry_frame()
        };
        assert_eq!(
            generator().decide(&frame, dec!(101), None),
            (Signal::Hold, SignalReason::InsufficientData)
        );
    }

    #[test]
    fn short_series_holds_with_insufficient_data() {
        let strategy = generator();
        for len in [0, 1, 10, 21] {
            let candles = candles_from(&vec![100; len]);
            let (signal, info) = strategy.generate_signal(&candles, None);
            assert_eq!(signal, Signal::Hold);
            assert_eq!(info.reason, SignalReason::InsufficientData);
            assert_eq!(info.rsi, None);
        }
    }

    #[test]
    fn rising_series_exits_long() {
        // No losses → RSI 100, above the overbought threshold.
        let closes: Vec<i64> = (100..130).collect();
        let (signal, info) =
            generator().generate_signal(&candles_from(&closes), Some(PositionSide::Long));
        assert_eq!(signal, Signal::Sell);
        assert_eq!(info.reason, SignalReason::ExitLongSignal);
        assert_eq!(info.price, dec!(129));
        assert_eq!(info.rsi, Some(dec!(100)));
    }

    #[test]
    fn flat_series_holds_when_flat() {
        let (signal, info) = generator().generate_signal(&candles_from(&[100; 30]), None);
        assert_eq!(signal, Signal::Hold);
        assert_eq!(info.reason, SignalReason::NoSignal);
        assert!(info.ema_diff.unwrap().abs() < dec!(0.0000001));
    }

    #[test]
    fn generation_is_reproducible() {
        let closes: Vec<i64> = (0..40).map(|i| 100 + (i * 7) % 11).collect();
        let candles = candles_from(&closes);
        let a = generator().generate_signal(&candles, None);
        let b = generator().generate_signal(&candles, None);
        assert_eq!(a, b);
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(SignalReason::InsufficientData.as_str(), "insufficient_data");
        assert_eq!(SignalReason::ExitLongSignal.as_str(), "exit_long_signal");
        assert_eq!(
            SignalReason::BullishCrossoverConfirmed.to_string(),
            "bullish_crossover_confirmed"
        );
        assert_eq!(
            serde_json::to_string(&SignalReason::NoSignal).unwrap(),
            "\"no_signal\""
        );
        assert_eq!(Signal::Buy.to_string(), "BUY");
    }
}
