//! Markdown bodies for outbound notifications.

use super::escalation::EscalationAlert;
use super::holdings::{PnlAlert, PnlCheckReport};
use super::ratio::RatioReading;
use super::scanner::{CycleReport, DivergenceHit};
use crate::types::{
    BreakoutResult, DivergenceKind, HoldingSignalKind, Notification, NotificationType, Position,
    SignalRecord, Timeframe,
};
use std::collections::BTreeMap;
use std::fmt::Write;

fn now_utc() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Small prices keep more decimals.
fn price(value: f64) -> String {
    if value.abs() >= 1.0 {
        format!("{:.2}", value)
    } else {
        format!("{:.6}", value)
    }
}

fn signed_pct(value: f64) -> String {
    format!("{:+.2}%", value)
}

fn macd_pair(record: &SignalRecord) -> String {
    match (record.long_macd, record.long_signal) {
        (Some(dif), Some(dea)) => format!("DIF={:.4}, DEA={:.4}", dif, dea),
        _ => "DIF/DEA n/a".to_string(),
    }
}

// =============================================================================
// Scan cycle
// =============================================================================

/// Buy and sell lists, holding alerts and a position overview.
pub fn cycle_report(report: &CycleReport, positions: &BTreeMap<String, Position>) -> Notification {
    let mut text = format!("## Signal scan\n\n{}\n\n", now_utc());
    let _ = writeln!(
        text,
        "Evaluated {} · skipped {} · signals {}{}\n",
        report.evaluated,
        report.skipped,
        report.signaled,
        if report.partial { " · **partial**" } else { "" }
    );

    let buys = report.buys();
    if !buys.is_empty() {
        let _ = writeln!(text, "### Buy ({})", buys.len());
        for record in buys {
            let _ = writeln!(
                text,
                "- **{}** @ {} ({})",
                record.symbol,
                price(record.price),
                macd_pair(record)
            );
        }
        text.push('\n');
    }

    let sells = report.sells();
    if !sells.is_empty() {
        let _ = writeln!(text, "### Sell ({})", sells.len());
        for record in sells {
            let _ = writeln!(
                text,
                "- **{}** @ {} ({})",
                record.symbol,
                price(record.price),
                macd_pair(record)
            );
        }
        text.push('\n');
    }

    if !report.holding_signals.is_empty() {
        let _ = writeln!(text, "### Holdings");
        for signal in &report.holding_signals {
            let label = match signal.kind {
                HoldingSignalKind::Stop => "stop",
                HoldingSignalKind::TrendFlip => "trend flip",
            };
            let _ = writeln!(
                text,
                "- **{}** ({}) {}: {}",
                signal.symbol,
                signal.position_type.as_str(),
                label,
                signal.trigger
            );
        }
        text.push('\n');
    }

    let overview: Vec<String> = positions
        .iter()
        .filter_map(|(symbol, position)| match report.outcomes.get(symbol) {
            Some(Ok(record)) => Some(format!(
                "- {} {}: entry {} now {} ({})",
                symbol,
                position.position_type.as_str(),
                price(position.entry_price),
                price(record.price),
                signed_pct(position.pnl_pct(record.price))
            )),
            _ => None,
        })
        .collect();
    if !overview.is_empty() {
        let _ = writeln!(text, "### Positions");
        for line in overview {
            let _ = writeln!(text, "{}", line);
        }
    }

    Notification::new(
        NotificationType::Signal,
        format!("Signal scan: {} signals", report.signaled),
        text.trim_end(),
    )
}

// =============================================================================
// Breakouts and divergence
// =============================================================================

pub fn breakout_report(results: &[BreakoutResult], timeframe: Timeframe) -> Notification {
    let mut text = format!("## Five-wave breakout watch ({})\n\n{}\n\n", timeframe, now_utc());
    if results.is_empty() {
        text.push_str("No symbol is close to breaking out.");
    } else {
        text.push_str("| Symbol | Price | Structure high | Distance | Strength |\n");
        text.push_str("|---|---|---|---|---|\n");
        for result in results {
            let _ = writeln!(
                text,
                "| {} | {} | {} | {:.2}% | {:.1} |",
                result.symbol,
                price(result.current_price),
                price(result.structure_high),
                result.breakout_distance_pct,
                result.strength
            );
        }
    }

    Notification::new(
        NotificationType::Info,
        format!("Breakout watch: {} candidates", results.len()),
        text.trim_end(),
    )
}

pub fn divergence_report(hit: &DivergenceHit) -> Notification {
    let result = &hit.result;
    let label = match result.kind {
        DivergenceKind::Top => "Top divergence",
        DivergenceKind::Bottom => "Bottom divergence",
    };

    let mut text = format!("## {} on {} ({})\n\n", label, hit.symbol, hit.timeframe);
    let _ = writeln!(
        text,
        "- Price: {} → {} ({})",
        price(result.previous_extremum.price),
        price(result.recent_extremum.price),
        signed_pct(result.price_change_pct)
    );
    let _ = writeln!(
        text,
        "- MACD: {:.4} → {:.4} ({})",
        result.previous_indicator_value,
        result.recent_indicator_value,
        signed_pct(result.indicator_change_pct)
    );
    if result.divergence_strength.is_finite() {
        let _ = writeln!(text, "- Strength: {:.2}", result.divergence_strength);
    } else {
        let _ = writeln!(text, "- Strength: indicator flat");
    }
    let _ = writeln!(
        text,
        "- Trend confirmed: {}",
        if result.trend_confirmed { "yes" } else { "no" }
    );

    Notification::new(
        NotificationType::Alert,
        format!("{} {} {}", hit.symbol, hit.timeframe, label.to_lowercase()),
        text.trim_end(),
    )
}

// =============================================================================
// Holdings
// =============================================================================

/// One push of an escalation; `push` counts from 1.
pub fn escalation_notification(
    alert: &EscalationAlert,
    latest_price: f64,
    push: u32,
) -> Notification {
    let reference = alert.reference_price();
    let latest_move = if reference > 0.0 {
        (latest_price - reference) / reference * 100.0
    } else {
        alert.move_pct
    };
    let direction = if latest_move >= 0.0 { "up" } else { "down" };

    let mut text = format!(
        "## 🚨 {} moved {} {}\n\n",
        alert.symbol,
        direction,
        signed_pct(latest_move)
    );
    let _ = writeln!(
        text,
        "- Price: {} (trigger {})",
        price(latest_price),
        price(alert.trigger_price)
    );
    if let Some(position) = &alert.position {
        let outcome = if position.is_favourable(latest_move) {
            "in profit direction"
        } else {
            "in loss direction"
        };
        let _ = writeln!(
            text,
            "- Position: {} from {}, {}",
            position.position_type.as_str(),
            price(position.entry_price),
            outcome
        );
        let _ = writeln!(text, "- PnL: {}", signed_pct(position.pnl_pct(latest_price)));
    }
    let _ = writeln!(text, "- Push #{} · {}", push, now_utc());

    Notification::new(
        NotificationType::Urgent,
        format!("🚨 {} {}", alert.symbol, signed_pct(latest_move)),
        text.trim_end(),
    )
}

/// All alerts from one PnL check in a single message.
pub fn pnl_alert_notification(report: &PnlCheckReport) -> Notification {
    let mut text = format!("## Holdings alert\n\n{}\n\n", now_utc());

    for alert in &report.alerts {
        match alert {
            PnlAlert::SharpMove {
                symbol,
                price: at,
                move_pct,
                escalated,
            } => {
                let _ = writeln!(
                    text,
                    "- **{}** moved {} since last check, now {}{}",
                    symbol,
                    signed_pct(*move_pct),
                    price(*at),
                    if *escalated { " (escalating)" } else { "" }
                );
            }
            PnlAlert::TotalPnlCrossed {
                total_pnl_pct,
                threshold_pct,
            } => {
                let _ = writeln!(
                    text,
                    "- Total PnL {} crossed {}",
                    signed_pct(*total_pnl_pct),
                    signed_pct(*threshold_pct)
                );
            }
        }
    }

    if !report.checks.is_empty() {
        let _ = writeln!(text, "\n### Positions");
        for check in &report.checks {
            let _ = writeln!(
                text,
                "- {} {}: {} ({})",
                check.symbol,
                check.position_type.as_str(),
                price(check.price),
                signed_pct(check.pnl_pct)
            );
        }
    }
    if let Some(total) = report.total_pnl_pct {
        let _ = writeln!(text, "\nTotal: {}", signed_pct(total));
    }

    Notification::new(
        NotificationType::Alert,
        format!("Holdings alert ({})", report.alerts.len()),
        text.trim_end(),
    )
}

// =============================================================================
// Price ratio
// =============================================================================

pub fn ratio_alert_notification(reading: &RatioReading, alert_below: f64) -> Notification {
    let mut text = format!("## Price ratio alert\n\n{}\n\n", now_utc());
    let _ = writeln!(text, "- **{}**: {}", reading.base, price(reading.base_price));
    let _ = writeln!(text, "- **{}**: {}", reading.quote, price(reading.quote_price));
    let _ = writeln!(
        text,
        "- **{}/{}**: {:.2} (alert below {:.2})",
        reading.base, reading.quote, reading.ratio, alert_below
    );

    Notification::new(
        NotificationType::Alert,
        format!(
            "⚠️ {}/{} {:.2} < {:.2}",
            reading.base, reading.quote, reading.ratio, alert_below
        ),
        text.trim_end(),
    )
}

pub fn ratio_unavailable_notification(pair: &str, detail: &str) -> Notification {
    Notification::new(
        NotificationType::Info,
        format!("{} ratio unavailable", pair),
        format!(
            "## Price ratio\n\n{}\n\nCould not price {}: {}",
            now_utc(),
            pair,
            detail
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PositionType;

    #[test]
    fn test_price_precision() {
        assert_eq!(price(42000.123), "42000.12");
        assert_eq!(price(0.0001234), "0.000123");
    }

    #[test]
    fn test_escalation_notification_reports_pnl() {
        let alert = EscalationAlert {
            symbol: "SOLUSDT".into(),
            trigger_price: 103.0,
            move_pct: 3.0,
            position: Some(Position {
                symbol: "SOLUSDT".into(),
                position_type: PositionType::Short,
                entry_price: 100.0,
            }),
        };
        let notification = escalation_notification(&alert, 104.0, 2);

        assert_eq!(notification.notification_type, NotificationType::Urgent);
        assert!(notification.title.contains("+4.00%"));
        assert!(notification.message.contains("in loss direction"));
        assert!(notification.message.contains("PnL: -4.00%"));
        assert!(notification.message.contains("Push #2"));
    }

    #[test]
    fn test_pnl_alert_bundle() {
        let report = PnlCheckReport {
            alerts: vec![
                PnlAlert::SharpMove {
                    symbol: "BTCUSDT".into(),
                    price: 51500.0,
                    move_pct: 3.0,
                    escalated: true,
                },
                PnlAlert::TotalPnlCrossed {
                    total_pnl_pct: 11.0,
                    threshold_pct: 10.0,
                },
            ],
            total_pnl_pct: Some(11.0),
            ..Default::default()
        };
        let notification = pnl_alert_notification(&report);

        assert_eq!(notification.title, "Holdings alert (2)");
        assert!(notification.message.contains("**BTCUSDT** moved +3.00%"));
        assert!(notification.message.contains("(escalating)"));
        assert!(notification.message.contains("Total PnL +11.00% crossed +10.00%"));
    }

    #[test]
    fn test_ratio_alert_notification() {
        let reading = RatioReading {
            base: "BTCUSDT".into(),
            quote: "PAXGUSDT".into(),
            base_price: 64_000.0,
            quote_price: 2_560.0,
            ratio: 25.0,
        };
        let notification = ratio_alert_notification(&reading, 26.0);

        assert_eq!(notification.notification_type, NotificationType::Alert);
        assert_eq!(notification.title, "⚠️ BTCUSDT/PAXGUSDT 25.00 < 26.00");
        assert!(notification.message.contains("- **PAXGUSDT**: 2560.00"));
        assert!(notification.message.contains("(alert below 26.00)"));
    }

    #[test]
    fn test_empty_breakout_report() {
        let notification = breakout_report(&[], Timeframe::OneHour);
        assert!(notification.message.contains("No symbol is close to breaking out."));
    }
}
