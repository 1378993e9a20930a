//! Composite buy/sell classification over a short and a long timeframe.

use super::crossover::{detect_cross, find_previous_cross, ZeroAxis};
use super::indicators::{Kdj, Macd};
use crate::config::SignalConfig;
use crate::types::{
    CandleSeries, CrossEvent, CrossKind, GateVariant, HoldingSignal, HoldingSignalKind,
    MacdSeries, Position, PositionType, SignalKind, SignalRecord, SkipReason, Trend,
};
use tracing::debug;

/// Magnitude bound of the ratio gate.
const RATIO_FACTOR: f64 = 3.0;

/// Stateless evaluator: every call recomputes from the series it is given.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    macd: Macd,
    kdj: Kdj,
    variant: GateVariant,
    trend_gated: bool,
    kdj_confirmation: bool,
    min_short_candles: usize,
    min_long_candles: usize,
}

impl Default for SignalEvaluator {
    fn default() -> Self {
        Self::new(GateVariant::PriceRelative)
    }
}

impl SignalEvaluator {
    pub fn new(variant: GateVariant) -> Self {
        Self {
            macd: Macd::default(),
            kdj: Kdj::default(),
            variant,
            trend_gated: false,
            kdj_confirmation: false,
            min_short_candles: 3,
            min_long_candles: 1,
        }
    }

    pub fn from_config(config: &SignalConfig) -> Self {
        Self::new(config.gate_variant)
            .with_trend_gate(config.trend_gated)
            .with_kdj_confirmation(config.kdj_confirmation)
            .with_min_candles(config.min_short_candles, config.min_long_candles)
    }

    /// Require the long-timeframe trend to agree with the signal direction.
    pub fn with_trend_gate(mut self, enabled: bool) -> Self {
        self.trend_gated = enabled;
        self
    }

    /// Require a same-kind KDJ K/D cross on the short timeframe.
    pub fn with_kdj_confirmation(mut self, enabled: bool) -> Self {
        self.kdj_confirmation = enabled;
        self
    }

    pub fn with_min_candles(mut self, short: usize, long: usize) -> Self {
        // Cross detection needs three points no matter what is configured.
        self.min_short_candles = short.max(3);
        self.min_long_candles = long.max(1);
        self
    }

    /// Length check used by batch callers to report why a symbol was skipped.
    pub fn check_lengths(
        &self,
        short: &CandleSeries,
        long: &CandleSeries,
    ) -> Result<(), SkipReason> {
        if short.len() < self.min_short_candles {
            return Err(SkipReason::DataInsufficient {
                timeframe: short.timeframe,
                needed: self.min_short_candles,
                got: short.len(),
            });
        }
        if long.len() < self.min_long_candles {
            return Err(SkipReason::DataInsufficient {
                timeframe: long.timeframe,
                needed: self.min_long_candles,
                got: long.len(),
            });
        }
        Ok(())
    }

    /// [`evaluate`](Self::evaluate) behind the length check.
    pub fn try_evaluate(
        &self,
        symbol: &str,
        short: &CandleSeries,
        long: &CandleSeries,
        price: f64,
    ) -> Result<SignalRecord, SkipReason> {
        self.check_lengths(short, long)?;
        Ok(self.evaluate(symbol, short, long, price))
    }

    /// Classify one symbol. Too little data yields a `SignalKind::None`
    /// record rather than an error.
    pub fn evaluate(
        &self,
        symbol: &str,
        short: &CandleSeries,
        long: &CandleSeries,
        price: f64,
    ) -> SignalRecord {
        let mut record = SignalRecord {
            symbol: symbol.to_string(),
            timeframe: short.timeframe,
            kind: SignalKind::None,
            trigger_reason: String::new(),
            price,
            timestamp: chrono::Utc::now().timestamp_millis(),
            cross: None,
            long_trend: None,
            long_macd: None,
            long_signal: None,
        };

        let long_macd = self.macd.compute(long.candles());
        record.long_trend = long_macd.trend();
        record.long_macd = long_macd.macd.last().copied();
        record.long_signal = long_macd.signal.last().copied();

        if short.len() < 3 || long.is_empty() {
            record.trigger_reason = "insufficient data".to_string();
            return record;
        }

        let short_macd = self.macd.compute(short.candles());
        let closes = short.closes();
        record.cross = detect_cross(&short_macd.macd, &short_macd.signal);

        let Some(cross) = record.cross else {
            record.trigger_reason = "no cross".to_string();
            return record;
        };

        let gate = match self.variant {
            GateVariant::Ratio => ratio_gate(&short_macd, &cross),
            GateVariant::PriceRelative => price_relative_gate(&short_macd, &closes, &cross),
        };
        let detail = match gate {
            Ok(detail) => detail,
            Err(rejected) => {
                record.trigger_reason = rejected;
                return record;
            }
        };

        if self.trend_gated {
            let agrees = matches!(
                (cross.kind, record.long_trend),
                (CrossKind::Golden, Some(Trend::Bullish)) | (CrossKind::Death, Some(Trend::Bearish))
            );
            if !agrees {
                record.trigger_reason = format!(
                    "{} rejected: {} trend is not {}",
                    detail,
                    long.timeframe,
                    match cross.kind {
                        CrossKind::Golden => "bullish",
                        CrossKind::Death => "bearish",
                    }
                );
                return record;
            }
        }

        if self.kdj_confirmation {
            let kdj = self.kdj.compute(short.candles());
            let confirmed = detect_cross(&kdj.k, &kdj.d).is_some_and(|c| c.kind == cross.kind);
            if !confirmed {
                record.trigger_reason =
                    format!("{} rejected: no KDJ {}", detail, cross.kind.as_str());
                return record;
            }
        }

        record.kind = match cross.kind {
            CrossKind::Golden => SignalKind::Buy,
            CrossKind::Death => SignalKind::Sell,
        };
        record.trigger_reason = detail;

        debug!(
            symbol = %symbol,
            kind = ?record.kind,
            reason = %record.trigger_reason,
            "Signal fired"
        );
        record
    }
}

/// Compare the current cross value with the nearest earlier same-kind cross.
fn ratio_gate(macd: &MacdSeries, cross: &CrossEvent) -> Result<String, String> {
    let a = cross.value_at_cross;
    match cross.kind {
        CrossKind::Golden => {
            if a >= 0.0 {
                return Err(format!("ratio: golden cross above zero ({:.6})", a));
            }
            let b = find_previous_cross(&macd.macd, &macd.signal, CrossKind::Golden, ZeroAxis::Any)
                .ok_or_else(|| "ratio: no previous golden cross".to_string())?;
            if a.abs() < RATIO_FACTOR * b.value_at_cross.abs() {
                Ok(format!(
                    "ratio buy: golden cross {:.6} below zero, previous golden {:.6}",
                    a, b.value_at_cross
                ))
            } else {
                Err(format!(
                    "ratio: golden cross {:.6} too deep against previous {:.6}",
                    a, b.value_at_cross
                ))
            }
        }
        CrossKind::Death => {
            if a <= 0.0 {
                return Err(format!("ratio: death cross below zero ({:.6})", a));
            }
            let b = find_previous_cross(&macd.macd, &macd.signal, CrossKind::Death, ZeroAxis::Any)
                .ok_or_else(|| "ratio: no previous death cross".to_string())?;
            if RATIO_FACTOR * a.abs() < b.value_at_cross.abs() {
                Ok(format!(
                    "ratio sell: death cross {:.6} above zero, previous death {:.6}",
                    a, b.value_at_cross
                ))
            } else {
                Err(format!(
                    "ratio: death cross {:.6} too high against previous {:.6}",
                    a, b.value_at_cross
                ))
            }
        }
    }
}

/// Compare closes at the current cross and at the nearest earlier same-kind
/// cross on the far side of zero.
fn price_relative_gate(
    macd: &MacdSeries,
    closes: &[f64],
    cross: &CrossEvent,
) -> Result<String, String> {
    let (axis, label) = match cross.kind {
        CrossKind::Golden => (ZeroAxis::Below, "golden"),
        CrossKind::Death => (ZeroAxis::Above, "death"),
    };
    let b = find_previous_cross(&macd.macd, &macd.signal, cross.kind, axis).ok_or_else(|| {
        format!(
            "price-relative: no previous {} cross {} zero",
            label,
            if axis == ZeroAxis::Below { "below" } else { "above" }
        )
    })?;

    let (Some(&a_close), Some(&b_close)) = (closes.get(cross.index), closes.get(b.index)) else {
        return Err("price-relative: cross index outside price data".to_string());
    };
    let value = cross.value_at_cross;

    let passed = match cross.kind {
        CrossKind::Golden if value > 0.0 => a_close > b_close,
        CrossKind::Golden => a_close < b_close,
        CrossKind::Death if value < 0.0 => a_close < b_close,
        CrossKind::Death => a_close > b_close,
    };
    let side = if value > 0.0 { "above" } else { "below" };

    if passed {
        let action = match cross.kind {
            CrossKind::Golden => "buy",
            CrossKind::Death => "sell",
        };
        Ok(format!(
            "price-relative {}: {} cross {} zero, close {:.6} vs previous {:.6}",
            action, label, side, a_close, b_close
        ))
    } else {
        Err(format!(
            "price-relative: {} cross {} zero, close {:.6} vs previous {:.6} not confirmed",
            label, side, a_close, b_close
        ))
    }
}

/// Stop or trend-flip classification for an open position.
pub fn evaluate_position(position: &Position, record: &SignalRecord) -> Option<HoldingSignal> {
    let cross_kind = record.cross.map(|c| c.kind);
    let long_line = match (record.long_macd, record.long_signal) {
        (Some(dif), Some(dea)) => format!(" (DIF={:.4}, DEA={:.4})", dif, dea),
        _ => String::new(),
    };

    let (kind, trigger) = match position.position_type {
        PositionType::Long => {
            if cross_kind == Some(CrossKind::Death) {
                (
                    HoldingSignalKind::Stop,
                    format!("{} MACD death cross", record.timeframe),
                )
            } else if record.long_trend == Some(Trend::Bearish) {
                (
                    HoldingSignalKind::TrendFlip,
                    format!("long timeframe MACD bearish{}", long_line),
                )
            } else {
                return None;
            }
        }
        PositionType::Short => {
            if cross_kind == Some(CrossKind::Golden) {
                (
                    HoldingSignalKind::Stop,
                    format!("{} MACD golden cross", record.timeframe),
                )
            } else if record.long_trend == Some(Trend::Bullish) {
                (
                    HoldingSignalKind::TrendFlip,
                    format!("long timeframe MACD bullish{}", long_line),
                )
            } else {
                return None;
            }
        }
    };

    Some(HoldingSignal {
        symbol: position.symbol.clone(),
        position_type: position.position_type,
        kind,
        trigger,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candle, Timeframe};

    fn series(tf: Timeframe, closes: &[f64]) -> CandleSeries {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: i as i64 * tf.millis(),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 100.0,
            })
            .collect();
        CandleSeries::new("BTCUSDT", tf, candles)
    }

    fn macd(line: &[f64], signal: &[f64]) -> MacdSeries {
        MacdSeries {
            macd: line.to_vec(),
            signal: signal.to_vec(),
            histogram: line.iter().zip(signal).map(|(l, s)| l - s).collect(),
        }
    }

    fn record(cross: Option<CrossKind>, trend: Option<Trend>) -> SignalRecord {
        SignalRecord {
            symbol: "ETHUSDT".into(),
            timeframe: Timeframe::OneHour,
            kind: SignalKind::None,
            trigger_reason: String::new(),
            price: 100.0,
            timestamp: 0,
            cross: cross.map(|kind| CrossEvent {
                index: 10,
                kind,
                value_at_cross: 0.1,
            }),
            long_trend: trend,
            long_macd: Some(1.0),
            long_signal: Some(0.5),
        }
    }

    // =========================================================================
    // Gates
    // =========================================================================

    #[test]
    fn test_ratio_buy_gate() {
        //           0     1    2     3    4    5     6     7
        let line = [-1.0, 1.0, 1.0, 1.0, 1.0, -2.0, -1.0, -1.0];
        let sig = [0.0, 0.0, 0.0, 0.0, 0.0, -1.5, -1.5, -1.5];
        let m = macd(&line, &sig);
        let cross = detect_cross(&m.macd, &m.signal).unwrap();
        assert_eq!(cross.kind, CrossKind::Golden);
        // |-1| < 3 * |1|
        assert!(ratio_gate(&m, &cross).is_ok());
    }

    #[test]
    fn test_ratio_buy_rejected_above_zero() {
        let line = [-1.0, 1.0, 1.0, 1.0, 0.0, 0.5, 2.0, 2.0];
        let sig = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let m = macd(&line, &sig);
        let cross = detect_cross(&m.macd, &m.signal).unwrap();
        assert!(ratio_gate(&m, &cross).is_err());
    }

    #[test]
    fn test_ratio_sell_needs_previous_cross() {
        let line = [1.0, 1.0, 1.0, 1.0, 1.0, 3.0, 1.0, 1.0];
        let sig = [0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0];
        let m = macd(&line, &sig);
        let cross = detect_cross(&m.macd, &m.signal).unwrap();
        assert_eq!(cross.kind, CrossKind::Death);
        let err = ratio_gate(&m, &cross).unwrap_err();
        assert!(err.contains("no previous death cross"));
    }

    #[test]
    fn test_price_relative_buy_below_zero_needs_lower_close() {
        //           0     1     2     3     4     5     6     7
        let line = [-2.0, -1.0, -1.0, -1.0, -1.0, -3.0, -2.0, -2.0];
        let sig = [-1.5, -1.5, -1.5, -1.5, -1.5, -2.5, -2.5, -2.5];
        let m = macd(&line, &sig);
        let cross = detect_cross(&m.macd, &m.signal).unwrap();
        assert_eq!(cross.index, 6);

        let lower = [10.0, 10.0, 10.0, 10.0, 10.0, 9.0, 9.0, 9.0];
        assert!(price_relative_gate(&m, &lower, &cross).is_ok());

        let higher = [10.0, 10.0, 10.0, 10.0, 10.0, 11.0, 11.0, 11.0];
        assert!(price_relative_gate(&m, &higher, &cross).is_err());
    }

    #[test]
    fn test_price_relative_ignores_previous_cross_above_zero() {
        let line = [-1.0, 1.0, 1.0, 1.0, 1.0, -3.0, -2.0, -2.0];
        let sig = [0.0, 0.0, 0.0, 0.0, 0.0, -2.5, -2.5, -2.5];
        let m = macd(&line, &sig);
        let cross = detect_cross(&m.macd, &m.signal).unwrap();
        let closes = [10.0; 8];
        let err = price_relative_gate(&m, &closes, &cross).unwrap_err();
        assert!(err.contains("no previous golden cross below zero"));
    }

    #[test]
    fn test_price_relative_sell_above_zero_needs_higher_close() {
        let line = [2.0, 1.0, 1.0, 1.0, 1.0, 3.0, 2.0, 2.0];
        let sig = [1.5, 1.5, 1.5, 1.5, 1.5, 2.5, 2.5, 2.5];
        let m = macd(&line, &sig);
        let cross = detect_cross(&m.macd, &m.signal).unwrap();
        assert_eq!(cross.kind, CrossKind::Death);

        let higher = [10.0, 10.0, 10.0, 10.0, 10.0, 11.0, 11.0, 11.0];
        assert!(price_relative_gate(&m, &higher, &cross).is_ok());
    }

    // =========================================================================
    // evaluate
    // =========================================================================

    #[test]
    fn test_flat_series_has_no_signal() {
        let short = series(Timeframe::OneHour, &[100.0; 60]);
        let long = series(Timeframe::FourHours, &[100.0; 30]);
        let record = SignalEvaluator::default().evaluate("BTCUSDT", &short, &long, 100.0);

        assert_eq!(record.kind, SignalKind::None);
        assert!(record.cross.is_none());
        assert_eq!(record.trigger_reason, "no cross");
        assert_eq!(record.long_trend, Some(Trend::Bearish));
    }

    #[test]
    fn test_short_series_is_not_an_error() {
        let short = series(Timeframe::OneHour, &[100.0, 101.0]);
        let long = series(Timeframe::FourHours, &[100.0; 30]);
        let record = SignalEvaluator::default().evaluate("BTCUSDT", &short, &long, 101.0);
        assert_eq!(record.kind, SignalKind::None);
        assert_eq!(record.trigger_reason, "insufficient data");
    }

    #[test]
    fn test_try_evaluate_reports_insufficient_timeframe() {
        let evaluator = SignalEvaluator::default().with_min_candles(50, 10);
        let short = series(Timeframe::OneHour, &[100.0; 60]);
        let long = series(Timeframe::FourHours, &[100.0; 5]);

        let err = evaluator
            .try_evaluate("BTCUSDT", &short, &long, 100.0)
            .unwrap_err();
        assert_eq!(
            err,
            SkipReason::DataInsufficient {
                timeframe: Timeframe::FourHours,
                needed: 10,
                got: 5
            }
        );
    }

    // =========================================================================
    // Holdings
    // =========================================================================

    #[test]
    fn test_long_position_stop_on_death_cross() {
        let position = Position {
            symbol: "ETHUSDT".into(),
            position_type: PositionType::Long,
            entry_price: 2000.0,
        };
        let signal =
            evaluate_position(&position, &record(Some(CrossKind::Death), Some(Trend::Bullish)))
                .unwrap();
        assert_eq!(signal.kind, HoldingSignalKind::Stop);
        assert_eq!(signal.trigger, "1h MACD death cross");
    }

    #[test]
    fn test_long_position_trend_flip() {
        let position = Position {
            symbol: "ETHUSDT".into(),
            position_type: PositionType::Long,
            entry_price: 2000.0,
        };
        let signal = evaluate_position(&position, &record(None, Some(Trend::Bearish))).unwrap();
        assert_eq!(signal.kind, HoldingSignalKind::TrendFlip);
        assert!(signal.trigger.contains("DIF=1.0000"));

        assert!(evaluate_position(&position, &record(None, Some(Trend::Bullish))).is_none());
    }

    #[test]
    fn test_short_position_mirrors_long() {
        let position = Position {
            symbol: "ETHUSDT".into(),
            position_type: PositionType::Short,
            entry_price: 2000.0,
        };
        let stop =
            evaluate_position(&position, &record(Some(CrossKind::Golden), Some(Trend::Bearish)))
                .unwrap();
        assert_eq!(stop.kind, HoldingSignalKind::Stop);

        let flip = evaluate_position(&position, &record(None, Some(Trend::Bullish))).unwrap();
        assert_eq!(flip.kind, HoldingSignalKind::TrendFlip);

        assert!(evaluate_position(&position, &record(None, Some(Trend::Bearish))).is_none());
    }
}
