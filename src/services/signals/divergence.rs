//! Price/indicator divergence detection.

use super::indicators::{ema_span, Macd};
use crate::types::{
    CandleSeries, DivergenceKind, DivergenceResult, ExtremumKind, ExtremumPoint, MacdSeries, Trend,
};

/// Candles needed before the EMA50/EMA200 trend is used instead of MACD.
pub const LONG_TREND_MIN_CANDLES: usize = 200;

/// Strict one-neighbour local extrema of `values`, window edges excluded.
///
/// `offset` is added to every reported index; `timestamps` is indexed with the
/// reported (absolute) index and may be empty.
pub fn find_local_extrema(
    values: &[f64],
    kind: ExtremumKind,
    offset: usize,
    timestamps: &[i64],
) -> Vec<ExtremumPoint> {
    if values.len() < 3 {
        return Vec::new();
    }

    (1..values.len() - 1)
        .filter(|&i| {
            let (prev, cur, next) = (values[i - 1], values[i], values[i + 1]);
            match kind {
                ExtremumKind::High => cur > prev && cur > next,
                ExtremumKind::Low => cur < prev && cur < next,
            }
        })
        .map(|i| ExtremumPoint {
            index: offset + i,
            price: values[i],
            kind,
            timestamp: timestamps.get(offset + i).copied().unwrap_or_default(),
        })
        .collect()
}

fn pct_change(recent: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (recent - previous) / previous.abs() * 100.0
    }
}

/// Compare the last two same-kind extrema of `price` in the trailing
/// `lookback` window against `indicator` at the same positions.
///
/// `trend_confirmed` is left false; see [`confirm_with_trend`].
pub fn detect_divergence(
    price: &[f64],
    indicator: &[f64],
    timestamps: &[i64],
    lookback: usize,
    kind: DivergenceKind,
) -> Option<DivergenceResult> {
    if lookback == 0 || price.len() < lookback || indicator.len() < lookback {
        return None;
    }

    let offset = price.len() - lookback;
    let price_window = &price[offset..];
    let indicator_window = &indicator[indicator.len() - lookback..];

    let extrema = find_local_extrema(price_window, kind.extremum(), offset, timestamps);
    let [.., previous, recent] = extrema.as_slice() else {
        return None;
    };

    let recent_indicator = indicator_window[recent.index - offset];
    let previous_indicator = indicator_window[previous.index - offset];

    let diverges = match kind {
        DivergenceKind::Top => {
            recent.price > previous.price && recent_indicator < previous_indicator
        }
        DivergenceKind::Bottom => {
            recent.price < previous.price && recent_indicator > previous_indicator
        }
    };
    if !diverges {
        return None;
    }

    let price_change_pct = pct_change(recent.price, previous.price);
    let indicator_change_pct = pct_change(recent_indicator, previous_indicator);
    let divergence_strength = if indicator_change_pct == 0.0 {
        f64::INFINITY
    } else {
        (price_change_pct / indicator_change_pct).abs()
    };

    Some(DivergenceResult {
        kind,
        recent_extremum: *recent,
        previous_extremum: *previous,
        recent_indicator_value: recent_indicator,
        previous_indicator_value: previous_indicator,
        price_change_pct,
        indicator_change_pct,
        divergence_strength,
        trend_confirmed: false,
    })
}

/// Long-term direction: EMA50 against EMA200 with enough history, otherwise
/// the latest MACD line against its signal line.
pub fn long_term_trend(closes: &[f64], macd: &MacdSeries) -> Option<Trend> {
    if closes.len() >= LONG_TREND_MIN_CANDLES {
        let fast = *ema_span(closes, 50).last()?;
        let slow = *ema_span(closes, 200).last()?;
        return Some(if fast > slow {
            Trend::Bullish
        } else {
            Trend::Bearish
        });
    }
    macd.trend()
}

/// Top divergence against a bearish trend, or bottom against a bullish one.
pub fn confirm_with_trend(mut result: DivergenceResult, trend: Option<Trend>) -> DivergenceResult {
    result.trend_confirmed = matches!(
        (result.kind, trend),
        (DivergenceKind::Top, Some(Trend::Bearish)) | (DivergenceKind::Bottom, Some(Trend::Bullish))
    );
    result
}

/// MACD divergence on one series: highs for top, lows for bottom.
pub fn analyze_divergence(
    series: &CandleSeries,
    macd: &Macd,
    lookback: usize,
    kind: DivergenceKind,
) -> Option<DivergenceResult> {
    let closes = series.closes();
    let macd_series = macd.compute_closes(&closes);
    let price = match kind {
        DivergenceKind::Top => series.highs(),
        DivergenceKind::Bottom => series.lows(),
    };

    let result = detect_divergence(
        &price,
        &macd_series.macd,
        &series.open_times(),
        lookback,
        kind,
    )?;
    Some(confirm_with_trend(
        result,
        long_term_trend(&closes, &macd_series),
    ))
}
