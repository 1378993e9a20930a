//! MACD (Moving Average Convergence Divergence) indicator.

use super::ema::ema_span;
use crate::types::{Candle, MacdSeries};

/// MACD indicator.
///
/// Shows the relationship between two EMAs of the close:
/// - MACD Line = EMA(fast) - EMA(slow)
/// - Signal Line = EMA(signal) of MACD Line
/// - Histogram = MACD Line - Signal Line
///
/// Every EMA is seeded with the first value, so the output has one entry per
/// candle and entry `i` only depends on candles `0..=i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
        }
    }
}

impl Macd {
    /// Candles needed before the values settle.
    pub fn min_periods(&self) -> usize {
        self.slow_period + self.signal_period
    }

    pub fn compute(&self, candles: &[Candle]) -> MacdSeries {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        self.compute_closes(&closes)
    }

    pub fn compute_closes(&self, closes: &[f64]) -> MacdSeries {
        let fast = ema_span(closes, self.fast_period);
        let slow = ema_span(closes, self.slow_period);

        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_span(&macd, self.signal_period);
        let histogram = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();

        MacdSeries {
            macd,
            signal,
            histogram,
        }
    }
}
