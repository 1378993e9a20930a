//! Indicator outputs, detected events and signal records.

use super::Timeframe;
use serde::{Deserialize, Serialize};

/// MACD line, signal line and histogram, aligned index-for-index with the
/// source candles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl MacdSeries {
    pub fn len(&self) -> usize {
        self.macd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macd.is_empty()
    }

    /// Direction of the latest bar: MACD line above its signal line.
    pub fn trend(&self) -> Option<Trend> {
        let macd = self.macd.last()?;
        let signal = self.signal.last()?;
        Some(if macd > signal {
            Trend::Bullish
        } else {
            Trend::Bearish
        })
    }
}

/// K, D and J lines plus the raw stochastic value they smooth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KdjSeries {
    pub rsv: Vec<f64>,
    pub k: Vec<f64>,
    pub d: Vec<f64>,
    pub j: Vec<f64>,
}

impl KdjSeries {
    pub fn len(&self) -> usize {
        self.k.len()
    }

    pub fn is_empty(&self) -> bool {
        self.k.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossKind {
    /// Line crossed above its signal line.
    Golden,
    /// Line crossed below its signal line.
    Death,
}

impl CrossKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossKind::Golden => "golden cross",
            CrossKind::Death => "death cross",
        }
    }
}

/// A completed crossover. `index` is the bar on which the line finished on
/// the new side of its signal line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossEvent {
    pub index: usize,
    pub kind: CrossKind,
    pub value_at_cross: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremumKind {
    High,
    Low,
}

/// A local price high or low.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtremumPoint {
    pub index: usize,
    pub price: f64,
    pub kind: ExtremumKind,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceKind {
    /// Price makes a higher high while the indicator makes a lower high.
    Top,
    /// Price makes a lower low while the indicator makes a higher low.
    Bottom,
}

impl DivergenceKind {
    pub fn extremum(&self) -> ExtremumKind {
        match self {
            DivergenceKind::Top => ExtremumKind::High,
            DivergenceKind::Bottom => ExtremumKind::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DivergenceResult {
    pub kind: DivergenceKind,
    pub recent_extremum: ExtremumPoint,
    pub previous_extremum: ExtremumPoint,
    pub recent_indicator_value: f64,
    pub previous_indicator_value: f64,
    pub price_change_pct: f64,
    pub indicator_change_pct: f64,
    /// `|price_change_pct / indicator_change_pct|`, infinite when the
    /// indicator change is zero.
    pub divergence_strength: f64,
    pub trend_confirmed: bool,
}

/// A five-wave low structure that has not yet closed above its final high.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakoutResult {
    pub symbol: String,
    pub structure_high: f64,
    pub current_price: f64,
    pub breakout_distance_pct: f64,
    pub strength: f64,
    pub pattern: Vec<ExtremumPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum BreakoutStatus {
    Pending(BreakoutResult),
    Broken {
        structure_high: f64,
        breakout_close: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Buy,
    Sell,
    None,
}

/// Which buy/sell gate the evaluator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVariant {
    /// Compare the current cross value with the previous same-kind cross.
    Ratio,
    /// Compare closing prices at the current and previous same-kind cross.
    PriceRelative,
}

impl GateVariant {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ratio" => Some(GateVariant::Ratio),
            "price_relative" | "price-relative" => Some(GateVariant::PriceRelative),
            _ => None,
        }
    }
}

/// Outcome of one evaluation of one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub kind: SignalKind,
    pub trigger_reason: String,
    pub price: f64,
    pub timestamp: i64,
    /// Cross detected on the short timeframe, if any.
    pub cross: Option<CrossEvent>,
    pub long_trend: Option<Trend>,
    /// Latest long-timeframe MACD line value (DIF).
    pub long_macd: Option<f64>,
    /// Latest long-timeframe signal line value (DEA).
    pub long_signal: Option<f64>,
}

impl SignalRecord {
    pub fn is_signal(&self) -> bool {
        self.kind != SignalKind::None
    }
}

/// Why a symbol produced no record this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum SkipReason {
    #[error("data unavailable: {detail}")]
    DataUnavailable { detail: String },
    #[error("insufficient data: {timeframe} has {got} candles, needs {needed}")]
    DataInsufficient {
        timeframe: Timeframe,
        needed: usize,
        got: usize,
    },
}
