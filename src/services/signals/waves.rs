//! Wave point extraction and the five-wave low breakout pattern.

use crate::types::{
    BreakoutResult, BreakoutStatus, Candle, CandleSeries, ExtremumKind, ExtremumPoint,
};

pub const DEFAULT_MIN_DISTANCE: usize = 3;

/// Length of the low-high-low-high-low-high window.
const PATTERN_LEN: usize = 6;

fn is_high_point(candles: &[Candle], i: usize, min_distance: usize) -> bool {
    let high = candles[i].high;
    (1..=min_distance).all(|d| candles[i - d].high < high && candles[i + d].high < high)
}

fn is_low_point(candles: &[Candle], i: usize, min_distance: usize) -> bool {
    let low = candles[i].low;
    (1..=min_distance).all(|d| candles[i - d].low > low && candles[i + d].low > low)
}

fn more_extreme(candidate: &ExtremumPoint, kept: &ExtremumPoint) -> bool {
    match kept.kind {
        ExtremumKind::High => candidate.price > kept.price,
        ExtremumKind::Low => candidate.price < kept.price,
    }
}

/// Swing highs and lows that dominate `min_distance` candles on each side,
/// then thinned so kinds alternate and points are not crowded together.
pub fn identify_wave_points(candles: &[Candle], min_distance: usize) -> Vec<ExtremumPoint> {
    let min_distance = min_distance.max(1);
    if candles.len() <= 2 * min_distance {
        return Vec::new();
    }

    let raw = (min_distance..candles.len() - min_distance).filter_map(|i| {
        let candle = &candles[i];
        let (kind, price) = if is_high_point(candles, i, min_distance) {
            (ExtremumKind::High, candle.high)
        } else if is_low_point(candles, i, min_distance) {
            (ExtremumKind::Low, candle.low)
        } else {
            return None;
        };
        Some(ExtremumPoint {
            index: i,
            price,
            kind,
            timestamp: candle.open_time,
        })
    });

    // A run of same-kind points keeps only its most extreme member.
    let mut alternating: Vec<ExtremumPoint> = Vec::new();
    for point in raw {
        match alternating.last_mut() {
            Some(last) if last.kind == point.kind => {
                if more_extreme(&point, last) {
                    *last = point;
                }
            }
            _ => alternating.push(point),
        }
    }

    let min_gap = (min_distance / 2).max(2);
    let mut spaced: Vec<ExtremumPoint> = Vec::with_capacity(alternating.len());
    for point in alternating {
        match spaced.last() {
            Some(last) if point.index - last.index < min_gap => {}
            _ => spaced.push(point),
        }
    }
    spaced
}

/// Whether six points form a rising low-high-low-high-low-high structure.
pub fn matches_five_wave_low_pattern(points: &[ExtremumPoint]) -> bool {
    use ExtremumKind::{High, Low};

    let [l1, h1, l2, h2, l3, h3] = points else {
        return false;
    };
    let kinds_match = [l1, l2, l3].iter().all(|p| p.kind == Low)
        && [h1, h2, h3].iter().all(|p| p.kind == High);

    kinds_match
        && l1.price < l2.price
        && l2.price < l3.price
        && h1.price < h2.price
        && h2.price < h3.price
        && l3.price > l1.price
}

/// First window of six consecutive points matching the five-wave low pattern.
pub fn find_five_wave_pattern(points: &[ExtremumPoint]) -> Option<&[ExtremumPoint]> {
    points
        .windows(PATTERN_LEN)
        .find(|window| matches_five_wave_low_pattern(window))
}

/// Classify the closes from the pattern's final high onward.
///
/// `None` when the pattern is malformed, the closes touch the structure high
/// without clearing it, or the pattern ends outside `candles`.
pub fn classify_breakout(
    candles: &[Candle],
    pattern: &[ExtremumPoint],
    symbol: &str,
) -> Option<BreakoutStatus> {
    if pattern.len() != PATTERN_LEN {
        return None;
    }
    let first_low = pattern[0].price;
    let final_high = &pattern[PATTERN_LEN - 1];
    let structure_high = final_high.price;

    let after = candles.get(final_high.index..)?;
    if let Some(broken) = after.iter().find(|c| c.close > structure_high) {
        return Some(BreakoutStatus::Broken {
            structure_high,
            breakout_close: broken.close,
        });
    }
    if !after.iter().all(|c| c.close < structure_high) {
        return None;
    }

    let current_price = candles.last().map(|c| c.close).unwrap_or_default();
    let breakout_distance_pct = if current_price > 0.0 {
        (structure_high - current_price) / current_price * 100.0
    } else {
        0.0
    };
    let price_range_pct = if first_low > 0.0 {
        (structure_high - first_low) / first_low * 100.0
    } else {
        0.0
    };

    Some(BreakoutStatus::Pending(BreakoutResult {
        symbol: symbol.to_string(),
        structure_high,
        current_price,
        breakout_distance_pct,
        strength: price_range_pct.clamp(0.0, 100.0),
        pattern: pattern.to_vec(),
    }))
}

/// A five-wave structure that has not yet closed above its final high.
pub fn find_breakout_candidate(series: &CandleSeries, symbol: &str) -> Option<BreakoutResult> {
    let candles = series.candles();
    let points = identify_wave_points(candles, DEFAULT_MIN_DISTANCE);
    let pattern = find_five_wave_pattern(&points)?;

    match classify_breakout(candles, pattern, symbol)? {
        BreakoutStatus::Pending(result) => Some(result),
        BreakoutStatus::Broken { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;

    fn point(index: usize, price: f64, kind: ExtremumKind) -> ExtremumPoint {
        ExtremumPoint {
            index,
            price,
            kind,
            timestamp: index as i64,
        }
    }

    fn candle(i: usize, price: f64) -> Candle {
        Candle {
            open_time: i as i64 * 3_600_000,
            open: price,
            high: price + 0.5,
            low: price - 0.5,
            close: price,
            volume: 1.0,
        }
    }

    /// Linear interpolation through `(index, price)` anchors.
    fn zigzag(anchors: &[(usize, f64)]) -> Vec<Candle> {
        let mut out = Vec::new();
        for pair in anchors.windows(2) {
            let ((i0, p0), (i1, p1)) = (pair[0], pair[1]);
            for i in i0..i1 {
                let t = (i - i0) as f64 / (i1 - i0) as f64;
                out.push(candle(i, p0 + (p1 - p0) * t));
            }
        }
        let (last_i, last_p) = anchors[anchors.len() - 1];
        out.push(candle(last_i, last_p));
        out
    }

    fn rising_pattern() -> Vec<ExtremumPoint> {
        use ExtremumKind::{High, Low};
        vec![
            point(5, 10.0, Low),
            point(10, 14.0, High),
            point(15, 11.0, Low),
            point(20, 15.0, High),
            point(25, 12.0, Low),
            point(30, 16.0, High),
        ]
    }

    // =========================================================================
    // Wave points
    // =========================================================================

    #[test]
    fn test_identify_wave_points_on_zigzag() {
        let candles = zigzag(&[(0, 12.0), (5, 10.0), (10, 14.0), (15, 11.0), (20, 15.0)]);
        let points = identify_wave_points(&candles, 3);

        let summary: Vec<(usize, ExtremumKind)> =
            points.iter().map(|p| (p.index, p.kind)).collect();
        assert_eq!(
            summary,
            vec![
                (5, ExtremumKind::Low),
                (10, ExtremumKind::High),
                (15, ExtremumKind::Low)
            ]
        );
        assert_eq!(points[1].price, 14.5);
        assert_eq!(points[0].price, 9.5);
    }

    #[test]
    fn test_edges_are_never_points() {
        let candles = zigzag(&[(0, 20.0), (2, 10.0), (8, 10.0 + 6.0)]);
        let points = identify_wave_points(&candles, 3);
        assert!(points.iter().all(|p| p.index >= 3 && p.index < candles.len() - 3));
    }

    #[test]
    fn test_short_series_has_no_points() {
        let candles: Vec<Candle> = (0..6).map(|i| candle(i, 1.0 + i as f64)).collect();
        assert!(identify_wave_points(&candles, 3).is_empty());
    }

    // =========================================================================
    // Pattern matching
    // =========================================================================

    #[test]
    fn test_rising_pattern_matches() {
        assert!(matches_five_wave_low_pattern(&rising_pattern()));
    }

    #[test]
    fn test_lower_third_low_is_rejected() {
        let mut pattern = rising_pattern();
        pattern[4].price = 9.0;
        assert!(!matches_five_wave_low_pattern(&pattern));
    }

    #[test]
    fn test_flat_highs_are_rejected() {
        let mut pattern = rising_pattern();
        pattern[3].price = 14.0;
        assert!(!matches_five_wave_low_pattern(&pattern));
    }

    #[test]
    fn test_wrong_kind_order_is_rejected() {
        let mut pattern = rising_pattern();
        pattern.rotate_left(1);
        assert!(!matches_five_wave_low_pattern(&pattern));
        assert!(!matches_five_wave_low_pattern(&pattern[..5]));
    }

    #[test]
    fn test_find_pattern_skips_leading_points() {
        let mut points = vec![point(1, 20.0, ExtremumKind::High)];
        points.extend(rising_pattern());
        let found = find_five_wave_pattern(&points).unwrap();
        assert_eq!(found[0].index, 5);
    }

    // =========================================================================
    // Breakout classification
    // =========================================================================

    #[test]
    fn test_pending_breakout() {
        let candles: Vec<Candle> = (0..40).map(|i| candle(i, 15.0)).collect();
        let status = classify_breakout(&candles, &rising_pattern(), "SOLUSDT").unwrap();

        match status {
            BreakoutStatus::Pending(result) => {
                assert_eq!(result.symbol, "SOLUSDT");
                assert_eq!(result.structure_high, 16.0);
                assert!((result.breakout_distance_pct - 100.0 / 15.0).abs() < 1e-9);
                assert!((result.strength - 60.0).abs() < 1e-9);
            }
            other => panic!("expected pending, got {:?}", other),
        }
    }

    #[test]
    fn test_broken_breakout() {
        let mut candles: Vec<Candle> = (0..40).map(|i| candle(i, 15.0)).collect();
        candles[35] = candle(35, 17.0);
        let status = classify_breakout(&candles, &rising_pattern(), "SOLUSDT").unwrap();
        assert_eq!(
            status,
            BreakoutStatus::Broken {
                structure_high: 16.0,
                breakout_close: 17.0
            }
        );
    }

    #[test]
    fn test_close_at_structure_high_is_neither() {
        let mut candles: Vec<Candle> = (0..40).map(|i| candle(i, 15.0)).collect();
        candles[33] = candle(33, 16.0);
        assert!(classify_breakout(&candles, &rising_pattern(), "SOLUSDT").is_none());
    }

    #[test]
    fn test_find_breakout_candidate_end_to_end() {
        let candles = zigzag(&[
            (0, 13.0),
            (5, 10.0),
            (10, 14.0),
            (15, 11.0),
            (20, 15.0),
            (25, 12.0),
            (30, 16.0),
            (40, 14.0),
        ]);
        let series = CandleSeries::new("ETHUSDT", Timeframe::OneHour, candles);
        let result = find_breakout_candidate(&series, "ETHUSDT").unwrap();

        assert_eq!(result.pattern.len(), 6);
        assert_eq!(result.structure_high, 16.5);
        assert_eq!(result.current_price, 14.0);
    }
}
