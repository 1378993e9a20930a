//! JSON-file holdings and focus-list store.

use crate::error::Result;
use crate::types::{Position, PositionType};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Always part of the scan universe.
pub const DEFAULT_FOCUS_SYMBOLS: &[&str] = &["BTCUSDT", "ETHUSDT", "SOLUSDT"];

/// On-disk shape of one holdings entry.
#[derive(Debug, Deserialize)]
struct HoldingEntry {
    entry_price: f64,
    #[serde(default)]
    position_type: PositionType,
}

/// Read-only view of the holdings and focus-list files.
#[derive(Debug, Clone)]
pub struct HoldingsStore {
    holdings_file: PathBuf,
    focus_file: PathBuf,
}

impl HoldingsStore {
    pub fn new(holdings_file: impl Into<PathBuf>, focus_file: impl Into<PathBuf>) -> Self {
        Self {
            holdings_file: holdings_file.into(),
            focus_file: focus_file.into(),
        }
    }

    /// Open positions keyed by upper-case symbol.
    ///
    /// A missing file is an empty mapping; malformed entries are skipped.
    pub fn load_positions(&self) -> Result<BTreeMap<String, Position>> {
        let Some(root) = read_json(&self.holdings_file)? else {
            return Ok(BTreeMap::new());
        };

        let Value::Object(entries) = root else {
            warn!(
                path = %self.holdings_file.display(),
                "Holdings file is not a JSON object, ignoring"
            );
            return Ok(BTreeMap::new());
        };

        let mut positions = BTreeMap::new();
        for (symbol, raw) in entries {
            let symbol = symbol.trim().to_uppercase();
            if symbol.is_empty() {
                warn!("Skipping holdings entry with empty symbol");
                continue;
            }
            match serde_json::from_value::<HoldingEntry>(raw) {
                Ok(entry) if entry.entry_price.is_finite() && entry.entry_price > 0.0 => {
                    positions.insert(
                        symbol.clone(),
                        Position {
                            symbol,
                            position_type: entry.position_type,
                            entry_price: entry.entry_price,
                        },
                    );
                }
                Ok(entry) => {
                    warn!(
                        symbol = %symbol,
                        entry_price = entry.entry_price,
                        "Skipping holding with invalid entry price"
                    );
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Skipping malformed holding");
                }
            }
        }

        debug!(count = positions.len(), "Loaded holdings");
        Ok(positions)
    }

    /// Focus-list symbols, upper-cased. Non-string entries are skipped.
    pub fn load_focus_symbols(&self) -> Result<BTreeSet<String>> {
        let Some(root) = read_json(&self.focus_file)? else {
            return Ok(BTreeSet::new());
        };

        let Value::Array(items) = root else {
            warn!(
                path = %self.focus_file.display(),
                "Focus list is not a JSON array, ignoring"
            );
            return Ok(BTreeSet::new());
        };

        let symbols = items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_uppercase()),
                other => {
                    warn!(entry = %other, "Skipping malformed focus-list entry");
                    None
                }
            })
            .collect();
        Ok(symbols)
    }
}

/// `None` when the file does not exist.
fn read_json(path: &Path) -> Result<Option<Value>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "File not found, treating as empty");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
