//! KDJ (stochastic K, D and J lines) indicator.

use super::ema::{ema, Smoothing};
use crate::types::{Candle, KdjSeries};

/// KDJ indicator.
///
/// RSV compares the close with the trailing `n`-candle range:
/// RSV = (Close - Lowest Low) / (Highest High - Lowest Low) * 100
///
/// K and D are centre-of-mass EMAs of RSV and K (com = m1 - 1 and m2 - 1),
/// and J = 3K - 2D. J is deliberately left unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kdj {
    pub n: usize,
    pub m1: usize,
    pub m2: usize,
}

impl Default for Kdj {
    fn default() -> Self {
        Self { n: 9, m1: 3, m2: 3 }
    }
}

impl Kdj {
    pub fn compute(&self, candles: &[Candle]) -> KdjSeries {
        let rsv = self.rsv(candles);
        let k = ema(&rsv, Smoothing::CenterOfMass(self.m1.saturating_sub(1) as f64));
        let d = ema(&k, Smoothing::CenterOfMass(self.m2.saturating_sub(1) as f64));
        let j = k.iter().zip(&d).map(|(k, d)| 3.0 * k - 2.0 * d).collect();

        KdjSeries { rsv, k, d, j }
    }

    /// Raw stochastic value per candle. The window shrinks near the start of
    /// the series instead of leaving gaps; a flat window yields 0.
    fn rsv(&self, candles: &[Candle]) -> Vec<f64> {
        let n = self.n.max(1);

        candles
            .iter()
            .enumerate()
            .map(|(i, candle)| {
                let window = &candles[(i + 1).saturating_sub(n)..=i];
                let lowest_low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
                let highest_high = window
                    .iter()
                    .map(|c| c.high)
                    .fold(f64::NEG_INFINITY, f64::max);

                let range = highest_high - lowest_low;
                if range > 0.0 {
                    ((candle.close - lowest_low) / range * 100.0).clamp(0.0, 100.0)
                } else {
                    0.0
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: usize, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: i as i64 * 60_000,
            open: close,
            high,
            low,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn test_kdj_empty_series() {
        let out = Kdj::default().compute(&[]);
        assert!(out.is_empty());
        assert!(out.rsv.is_empty());
        assert!(out.j.is_empty());
    }

    #[test]
    fn test_flat_window_gives_zero_rsv() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, 5.0, 5.0, 5.0)).collect();
        let out = Kdj::default().compute(&candles);

        assert_eq!(out.len(), 10);
        for i in 0..10 {
            assert_eq!(out.rsv[i], 0.0);
            assert!(!out.k[i].is_nan());
            assert!(!out.d[i].is_nan());
            assert!(!out.j[i].is_nan());
        }
    }

    #[test]
    fn test_partial_window_at_start() {
        let candles = vec![
            candle(0, 10.0, 8.0, 9.0),
            candle(1, 12.0, 9.0, 12.0),
            candle(2, 11.0, 10.0, 10.0),
        ];
        let out = Kdj::default().compute(&candles);

        // First window is the single candle itself.
        assert!((out.rsv[0] - 50.0).abs() < 1e-9);
        // Second window spans [8, 12].
        assert!((out.rsv[1] - 100.0).abs() < 1e-9);
        assert!((out.rsv[2] - 50.0).abs() < 1e-9);
        assert_eq!(out.k[0], out.rsv[0]);
    }

    #[test]
    fn test_k_and_d_stay_in_bounds_j_does_not() {
        // Sharp rally then collapse pushes J outside [0, 100].
        let mut candles = Vec::new();
        for i in 0..30 {
            let p = 100.0 + i as f64 * 3.0;
            candles.push(candle(i, p + 0.5, p - 0.5, p + 0.5));
        }
        for i in 30..45 {
            let p = 190.0 - (i - 30) as f64 * 6.0;
            candles.push(candle(i, p + 0.5, p - 0.5, p - 0.5));
        }

        let out = Kdj::default().compute(&candles);
        for i in 0..out.len() {
            assert!((0.0..=100.0).contains(&out.k[i]), "k[{}] = {}", i, out.k[i]);
            assert!((0.0..=100.0).contains(&out.d[i]), "d[{}] = {}", i, out.d[i]);
        }
        assert!(out.j.iter().any(|j| *j < 0.0 || *j > 100.0));
    }
}
