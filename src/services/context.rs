//! State carried from one holdings check to the next.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Created at startup, updated by each holdings check and persisted
/// explicitly. Nothing else keeps state between cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    /// Price seen for each symbol at the previous check.
    #[serde(default)]
    pub last_check_prices: HashMap<String, f64>,
    /// Equal-weight total PnL (percent) at the previous check.
    #[serde(default)]
    pub previous_total_pnl: f64,
}

impl EvaluationContext {
    /// Load from `path`. A missing or unreadable file starts fresh.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(ctx) => {
                    debug!(path = %path.display(), "Loaded evaluation context");
                    ctx
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Corrupt evaluation context, starting fresh"
                    );
                    Self::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Cannot read evaluation context, starting fresh"
                );
                Self::default()
            }
        }
    }

    /// Write to a sibling temporary file, then rename it over `path`.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Persisted evaluation context");
        Ok(())
    }

    /// Percent move since the previous check, if there was one.
    pub fn move_since_last(&self, symbol: &str, price: f64) -> Option<f64> {
        self.last_check_prices
            .get(symbol)
            .filter(|last| **last > 0.0)
            .map(|last| (price - last) / last * 100.0)
    }

    pub fn record_price(&mut self, symbol: &str, price: f64) {
        self.last_check_prices.insert(symbol.to_string(), price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_since_last() {
        let mut ctx = EvaluationContext::default();
        assert_eq!(ctx.move_since_last("BTCUSDT", 100.0), None);

        ctx.record_price("BTCUSDT", 100.0);
        let pct = ctx.move_since_last("BTCUSDT", 103.0).unwrap();
        assert!((pct - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("context.json");

        let mut ctx = EvaluationContext::default();
        ctx.record_price("ETHUSDT", 2500.0);
        ctx.previous_total_pnl = 7.5;
        ctx.persist(&path).unwrap();

        assert_eq!(EvaluationContext::load_or_default(&path), ctx);
    }

    #[test]
    fn test_missing_or_corrupt_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("none.json");
        assert_eq!(
            EvaluationContext::load_or_default(&missing),
            EvaluationContext::default()
        );

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "[[[").unwrap();
        assert_eq!(
            EvaluationContext::load_or_default(&corrupt),
            EvaluationContext::default()
        );
    }
}
