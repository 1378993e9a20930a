//! Repeated-push escalation for sharp moves in held symbols.

use super::notifier::Notifier;
use super::report;
use crate::config::EscalationConfig;
use crate::sources::CandleSource;
use crate::types::Position;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What triggered an escalation.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationAlert {
    pub symbol: String,
    /// Price at the check that detected the move.
    pub trigger_price: f64,
    /// Move since the previous check (percent).
    pub move_pct: f64,
    pub position: Option<Position>,
}

impl EscalationAlert {
    /// Price at the previous check, reconstructed from the trigger.
    pub fn reference_price(&self) -> f64 {
        self.trigger_price / (1.0 + self.move_pct / 100.0)
    }
}

/// Removes the registry entry when the push task ends, however it ends.
struct ActiveGuard {
    active: Arc<DashMap<String, i64>>,
    symbol: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.remove(&self.symbol);
        debug!(symbol = %self.symbol, "Escalation finished");
    }
}

/// At most one push task per symbol.
pub struct EscalationRegistry {
    /// Symbol -> start time (ms).
    active: Arc<DashMap<String, i64>>,
    source: Arc<dyn CandleSource>,
    notifier: Arc<dyn Notifier>,
    duration: Duration,
    interval: Duration,
}

impl EscalationRegistry {
    pub fn new(
        source: Arc<dyn CandleSource>,
        notifier: Arc<dyn Notifier>,
        config: &EscalationConfig,
    ) -> Self {
        Self::with_timing(
            source,
            notifier,
            Duration::from_secs(config.duration_secs),
            Duration::from_secs(config.interval_secs),
        )
    }

    pub fn with_timing(
        source: Arc<dyn CandleSource>,
        notifier: Arc<dyn Notifier>,
        duration: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            active: Arc::new(DashMap::new()),
            source,
            notifier,
            duration,
            interval,
        }
    }

    /// Start pushing for `alert.symbol`. Returns `false` without doing
    /// anything if that symbol is already escalating.
    pub fn start(&self, alert: EscalationAlert) -> bool {
        match self.active.entry(alert.symbol.clone()) {
            Entry::Occupied(_) => {
                debug!(symbol = %alert.symbol, "Escalation already active");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(chrono::Utc::now().timestamp_millis());
            }
        }

        info!(
            symbol = %alert.symbol,
            move_pct = alert.move_pct,
            duration_secs = self.duration.as_secs(),
            "Starting escalation"
        );

        let guard = ActiveGuard {
            active: Arc::clone(&self.active),
            symbol: alert.symbol.clone(),
        };
        let source = Arc::clone(&self.source);
        let notifier = Arc::clone(&self.notifier);
        let (duration, interval) = (self.duration, self.interval);

        tokio::spawn(async move {
            let _guard = guard;
            let deadline = Instant::now() + duration;
            let mut pushes = 0u32;

            while Instant::now() < deadline {
                let price = match source.fetch_price(&alert.symbol).await {
                    Ok(price) => price,
                    Err(e) => {
                        warn!(
                            symbol = %alert.symbol,
                            error = %e,
                            "Price refresh failed, using trigger price"
                        );
                        alert.trigger_price
                    }
                };

                pushes += 1;
                let notification = report::escalation_notification(&alert, price, pushes);
                if !notifier.notify(&notification).await {
                    warn!(symbol = %alert.symbol, push = pushes, "Escalation push not delivered");
                }

                tokio::time::sleep(interval).await;
            }

            info!(symbol = %alert.symbol, pushes, "Escalation complete");
        });

        true
    }

    pub fn is_active(&self, symbol: &str) -> bool {
        self.active.contains_key(symbol)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
