//! Technical indicators computed over a candle close series.
//!
//! Provides the exponential moving average, Wilder's RSI, and the derived
//! per-candle [`IndicatorFrame`] (EMA spread and crossover flags) consumed
//! by the signal generator. Every function here is a pure computation over
//! an immutable input slice.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::models::Candle;
use crate::models::candle::closes;

const HUNDRED: Decimal = dec!(100);

/// Reason an indicator computation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndicatorError {
    /// Fewer input values than the windows require.
    #[error("insufficient data: need {required} values, got {provided}")]
    InsufficientData { required: usize, provided: usize },

    /// A window length is unusable (e.g. zero).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Window lengths for the indicator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorWindows {
    pub fast: usize,
    pub slow: usize,
    pub rsi: usize,
}

impl IndicatorWindows {
    /// Minimum number of candles before every indicator is defined at the
    /// latest index and a previous value exists for crossover detection.
    #[must_use]
    pub fn required_len(&self) -> usize {
        self.slow.max(self.rsi) + 1
    }

    fn validate(&self) -> Result<(), IndicatorError> {
        for (name, window) in [("fast", self.fast), ("slow", self.slow), ("rsi", self.rsi)] {
            if window == 0 {
                return Err(IndicatorError::InvalidParameter(format!(
                    "{name} window must be positive"
                )));
            }
        }
        Ok(())
    }
}

/// Indicator values at one candle index.
///
/// `None` marks a value that is still inside its warm-up period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndicatorFrame {
    pub ema_fast: Option<Decimal>,
    pub ema_slow: Option<Decimal>,
    pub rsi: Option<Decimal>,
    /// `(ema_fast - ema_slow) / ema_slow * 100`.
    pub ema_diff_pct: Option<Decimal>,
    /// Fast EMA moved from at-or-below to above the slow EMA on this candle.
    pub cross_up: bool,
    /// Fast EMA moved from at-or-above to below the slow EMA on this candle.
    pub cross_down: bool,
}

/// Exponential moving average.
///
/// Seeded with the simple average of the first `window` values at index
/// `window - 1`, then `ema[i] = v[i] * k + ema[i - 1] * (1 - k)` with
/// `k = 2 / (window + 1)`. Earlier indices are `None`.
///
/// # Errors
///
/// Returns [`IndicatorError::InvalidParameter`] for a zero window and
/// [`IndicatorError::InsufficientData`] if `values` is shorter than `window`.
pub fn ema(values: &[Decimal], window: usize) -> Result<Vec<Option<Decimal>>, IndicatorError> {
    if window == 0 {
        return Err(IndicatorError::InvalidParameter(
            "EMA window must be positive".to_string(),
        ));
    }
    if values.len() < window {
        return Err(IndicatorError::InsufficientData {
            required: window,
            provided: values.len(),
        });
    }

    let k = dec!(2) / Decimal::from(window + 1);
    let one_minus_k = Decimal::ONE - k;

    let mut out = vec![None; values.len()];
    let seed = values[..window].iter().sum::<Decimal>() / Decimal::from(window);
    out[window - 1] = Some(seed);

    let mut prev = seed;
    for (slot, value) in out.iter_mut().zip(values).skip(window) {
        prev = *value * k + prev * one_minus_k;
        *slot = Some(prev);
    }

    Ok(out)
}

/// Relative Strength Index with Wilder smoothing.
///
/// The first averages are the simple means of the gains and losses over
/// deltas `1..=window`, giving the first value at index `window`. After that
/// `avg = (avg * (window - 1) + current) / window`.
///
/// # Errors
///
/// Returns [`IndicatorError::InvalidParameter`] for a zero window and
/// [`IndicatorError::InsufficientData`] if fewer than `window + 1` values.
pub fn rsi(values: &[Decimal], window: usize) -> Result<Vec<Option<Decimal>>, IndicatorError> {
    if window == 0 {
        return Err(IndicatorError::InvalidParameter(
            "RSI window must be positive".to_string(),
        ));
    }
    if values.len() < window + 1 {
        return Err(IndicatorError::InsufficientData {
            required: window + 1,
            provided: values.len(),
        });
    }

    let w = Decimal::from(window);
    let w_minus_one = w - Decimal::ONE;
    let mut out = vec![None; values.len()];

    let mut avg_gain = Decimal::ZERO;
    let mut avg_loss = Decimal::ZERO;
    for pair in values[..=window].windows(2) {
        let (gain, loss) = split_delta(pair[1] - pair[0]);
        avg_gain += gain;
        avg_loss += loss;
    }
    avg_gain /= w;
    avg_loss /= w;
    out[window] = Some(rsi_value(avg_gain, avg_loss));

    for i in window + 1..values.len() {
        let (gain, loss) = split_delta(values[i] - values[i - 1]);
        avg_gain = (avg_gain * w_minus_one + gain) / w;
        avg_loss = (avg_loss * w_minus_one + loss) / w;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }

    Ok(out)
}

/// Computes the full indicator frame for every candle.
///
/// # Errors
///
/// Returns [`IndicatorError::InsufficientData`] when there are fewer than
/// [`IndicatorWindows::required_len`] candles.
pub fn compute(
    candles: &[Candle],
    windows: IndicatorWindows,
) -> Result<Vec<IndicatorFrame>, IndicatorError> {
    windows.validate()?;
    let required = windows.required_len();
    if candles.len() < required {
        return Err(IndicatorError::InsufficientData {
            required,
            provided: candles.len(),
        });
    }

    let closes = closes(candles);
    let fast = ema(&closes, windows.fast)?;
    let slow = ema(&closes, windows.slow)?;
    let rsi = rsi(&closes, windows.rsi)?;

    let mut frames = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        let ema_diff_pct = match (fast[i], slow[i]) {
            (Some(f), Some(s)) => diff_pct(f, s),
            _ => None,
        };

        let (cross_up, cross_down) = if i == 0 {
            (false, false)
        } else {
            match (fast[i - 1], slow[i - 1], fast[i], slow[i]) {
                (Some(pf), Some(ps), Some(f), Some(s)) => {
                    (f > s && pf <= ps, f < s && pf >= ps)
                }
                _ => (false, false),
            }
        };

        frames.push(IndicatorFrame {
            ema_fast: fast[i],
            ema_slow: slow[i],
            rsi: rsi[i],
            ema_diff_pct,
            cross_up,
            cross_down,
        });
    }

    Ok(frames)
}

fn split_delta(delta: Decimal) -> (Decimal, Decimal) {
    if delta > Decimal::ZERO {
        (delta, Decimal::ZERO)
    } else {
        (Decimal::ZERO, -delta)
    }
}

fn rsi_value(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    if avg_loss.is_zero() {
        return HUNDRED;
    }
    // A vanishing loss average can overflow RS; that limit is RSI = 100.
    match avg_gain
        .checked_div(avg_loss)
        .and_then(|rs| rs.checked_add(Decimal::ONE))
    {
        Some(denom) => HUNDRED - HUNDRED / denom,
        None => HUNDRED,
    }
}

fn diff_pct(fast: Decimal, slow: Decimal) -> Option<Decimal> {
    (fast - slow)
        .checked_div(slow)
        .and_then(|ratio| ratio.checked_mul(HUNDRED))
}
