//! Candle and timeframe types.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Candle aggregation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    /// Exchange interval string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::FifteenMinutes => "15m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "1d",
        }
    }

    /// Parse an exchange interval string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "15m" => Some(Timeframe::FifteenMinutes),
            "1h" => Some(Timeframe::OneHour),
            "4h" => Some(Timeframe::FourHours),
            "1d" => Some(Timeframe::OneDay),
            _ => None,
        }
    }

    /// Length of one candle in milliseconds.
    pub fn millis(&self) -> i64 {
        match self {
            Timeframe::FifteenMinutes => 15 * 60_000,
            Timeframe::OneHour => 60 * 60_000,
            Timeframe::FourHours => 4 * 60 * 60_000,
            Timeframe::OneDay => 24 * 60 * 60_000,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OHLCV candle. `open_time` is in milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered candles for one (symbol, timeframe) pair.
///
/// Construction sorts by `open_time` and drops duplicate timestamps, so the
/// series is always strictly increasing in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, mut candles: Vec<Candle>) -> Self {
        let symbol = symbol.into();
        let original_len = candles.len();

        candles.sort_by_key(|c| c.open_time);
        // Keep the last candle seen for a timestamp (the most recently updated bar).
        candles.reverse();
        candles.dedup_by_key(|c| c.open_time);
        candles.reverse();

        if candles.len() != original_len {
            debug!(
                symbol = %symbol,
                timeframe = %timeframe,
                dropped = original_len - candles.len(),
                "Dropped duplicate candles"
            );
        }

        Self {
            symbol,
            timeframe,
            candles,
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn open_times(&self) -> Vec<i64> {
        self.candles.iter().map(|c| c.open_time).collect()
    }
}
