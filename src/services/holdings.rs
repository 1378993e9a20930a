//! Periodic PnL check over open positions.

use super::context::EvaluationContext;
use super::escalation::{EscalationAlert, EscalationRegistry};
use super::notifier::Notifier;
use super::report;
use crate::config::HoldingsConfig;
use crate::sources::CandleSource;
use crate::types::{Position, PositionType};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One position priced at check time.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionCheck {
    pub symbol: String,
    pub position_type: PositionType,
    pub entry_price: f64,
    pub price: f64,
    pub pnl_pct: f64,
    /// Move since the previous check; `None` on the first sighting.
    pub move_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PnlAlert {
    SharpMove {
        symbol: String,
        price: f64,
        move_pct: f64,
        /// Whether this check started a new escalation.
        escalated: bool,
    },
    TotalPnlCrossed {
        total_pnl_pct: f64,
        threshold_pct: f64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct PnlCheckReport {
    pub checks: Vec<PositionCheck>,
    /// Equal-weight average PnL of the priced positions.
    pub total_pnl_pct: Option<f64>,
    pub alerts: Vec<PnlAlert>,
    /// Positions whose price could not be fetched.
    pub unpriced: Vec<String>,
    pub notified: bool,
}

pub struct HoldingsMonitor {
    source: Arc<dyn CandleSource>,
    notifier: Arc<dyn Notifier>,
    escalations: Arc<EscalationRegistry>,
    move_alert_pct: f64,
    total_pnl_alert_pct: f64,
}

impl HoldingsMonitor {
    pub fn new(
        source: Arc<dyn CandleSource>,
        notifier: Arc<dyn Notifier>,
        escalations: Arc<EscalationRegistry>,
        config: &HoldingsConfig,
    ) -> Self {
        Self {
            source,
            notifier,
            escalations,
            move_alert_pct: config.move_alert_pct,
            total_pnl_alert_pct: config.total_pnl_alert_pct,
        }
    }

    /// Price every position, update `ctx`, start escalations for sharp moves
    /// and send one bundled alert if anything fired.
    pub async fn check(
        &self,
        ctx: &mut EvaluationContext,
        positions: &BTreeMap<String, Position>,
    ) -> PnlCheckReport {
        let mut report = PnlCheckReport::default();
        if positions.is_empty() {
            debug!("No holdings, skipping PnL check");
            return report;
        }

        let prices = join_all(
            positions
                .keys()
                .map(|symbol| self.source.fetch_price(symbol.as_str())),
        )
        .await;

        for ((symbol, position), price) in positions.iter().zip(prices) {
            let price = match price {
                Ok(price) => price,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Cannot price holding");
                    report.unpriced.push(symbol.clone());
                    continue;
                }
            };

            let pnl_pct = position.pnl_pct(price);
            let move_pct = ctx.move_since_last(symbol, price);
            ctx.record_price(symbol, price);

            if let Some(move_pct) = move_pct.filter(|m| m.abs() >= self.move_alert_pct) {
                let escalated = self.escalations.start(EscalationAlert {
                    symbol: symbol.clone(),
                    trigger_price: price,
                    move_pct,
                    position: Some(position.clone()),
                });
                info!(symbol = %symbol, move_pct, escalated, "Sharp move on holding");
                report.alerts.push(PnlAlert::SharpMove {
                    symbol: symbol.clone(),
                    price,
                    move_pct,
                    escalated,
                });
            }

            report.checks.push(PositionCheck {
                symbol: symbol.clone(),
                position_type: position.position_type,
                entry_price: position.entry_price,
                price,
                pnl_pct,
                move_pct,
            });
        }

        if !report.checks.is_empty() {
            let total =
                report.checks.iter().map(|c| c.pnl_pct).sum::<f64>() / report.checks.len() as f64;
            let threshold = self.total_pnl_alert_pct;
            if ctx.previous_total_pnl < threshold && total >= threshold {
                report.alerts.push(PnlAlert::TotalPnlCrossed {
                    total_pnl_pct: total,
                    threshold_pct: threshold,
                });
            }
            ctx.previous_total_pnl = total;
            report.total_pnl_pct = Some(total);
        }

        if !report.alerts.is_empty() {
            let notification = report::pnl_alert_notification(&report);
            report.notified = self.notifier.notify(&notification).await;
        }

        debug!(
            priced = report.checks.len(),
            unpriced = report.unpriced.len(),
            alerts = report.alerts.len(),
            "PnL check complete"
        );
        report
    }
}
