//! Holdings types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    #[default]
    Long,
    Short,
}

impl PositionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionType::Long => "long",
            PositionType::Short => "short",
        }
    }
}

/// An open position read from the holdings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub position_type: PositionType,
    pub entry_price: f64,
}

impl Position {
    /// Profit or loss at `price`, in percent of the entry price.
    pub fn pnl_pct(&self, price: f64) -> f64 {
        match self.position_type {
            PositionType::Long => (price - self.entry_price) / self.entry_price * 100.0,
            PositionType::Short => (self.entry_price - price) / self.entry_price * 100.0,
        }
    }

    /// Whether a price move of `move_pct` works in this position's favour.
    pub fn is_favourable(&self, move_pct: f64) -> bool {
        match self.position_type {
            PositionType::Long => move_pct > 0.0,
            PositionType::Short => move_pct < 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingSignalKind {
    /// Opposing cross on the monitored short timeframe.
    Stop,
    /// Long-timeframe trend turned against the position.
    TrendFlip,
}

/// Stop-loss / take-profit style alert for an existing position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingSignal {
    pub symbol: String,
    pub position_type: PositionType,
    pub kind: HoldingSignalKind,
    pub trigger: String,
}
