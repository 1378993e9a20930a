use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil::config::{Config, ScanConfig};
use vigil::services::{
    report, EscalationRegistry, EvaluationContext, FanoutNotifier, HoldingsMonitor,
    HoldingsStore, Notifier, RatioMonitor, Scanner, SignalEvaluator, DIVERGENCE_TIMEFRAMES,
};
use vigil::sources::{BinanceFuturesClient, CandleSource};
use vigil::types::{DivergenceKind, Position, PositionType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    config.validate()?;
    info!(
        short = %config.signal.short_timeframe,
        long = %config.signal.long_timeframe,
        gate = ?config.signal.gate_variant,
        "Starting Vigil"
    );

    let source: Arc<dyn CandleSource> = Arc::new(BinanceFuturesClient::new(&config.fetch));
    let fanout = FanoutNotifier::from_config(&config.notify);
    info!(channels = ?fanout.channel_names(), "Notification channels ready");
    let notifier: Arc<dyn Notifier> = Arc::new(fanout);

    let store = HoldingsStore::new(
        config.holdings.holdings_file.clone(),
        config.holdings.focus_file.clone(),
    );
    let scanner = Scanner::new(
        source.clone(),
        SignalEvaluator::from_config(&config.signal),
        config.signal.clone(),
        config.scan.clone(),
    );
    let escalations = Arc::new(EscalationRegistry::new(
        source.clone(),
        notifier.clone(),
        &config.escalation,
    ));
    let monitor = HoldingsMonitor::new(
        source.clone(),
        notifier.clone(),
        escalations,
        &config.holdings,
    );
    let ratio = config
        .ratio
        .enabled
        .then(|| RatioMonitor::new(source, notifier.clone(), &config.ratio));
    if let Some(ratio) = &ratio {
        info!(
            pair = %ratio.pair(),
            alert_below = config.ratio.alert_below,
            interval_secs = config.ratio.interval_secs,
            "Price ratio watch enabled"
        );
    }

    // Scan cycles run on their own task so holdings checks keep their cadence.
    let scan_task = tokio::spawn(scan_loop(
        scanner,
        store.clone(),
        notifier,
        config.scan.clone(),
    ));

    let context_file = config.holdings.context_file.clone();
    let mut context = EvaluationContext::load_or_default(&context_file);
    let mut holdings_tick =
        tokio::time::interval(Duration::from_secs(config.holdings.check_interval_secs));
    holdings_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ratio_tick = tokio::time::interval(Duration::from_secs(config.ratio.interval_secs));
    ratio_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = holdings_tick.tick() => {
                let positions = load_positions(&store);
                monitor.check(&mut context, &positions).await;
                if let Err(e) = context.persist(&context_file) {
                    warn!("Failed to persist evaluation context: {}", e);
                }
            }
            _ = ratio_tick.tick(), if ratio.is_some() => {
                if let Some(ratio) = &ratio {
                    ratio.check().await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    scan_task.abort();
    context.persist(&context_file)?;
    Ok(())
}

fn load_positions(store: &HoldingsStore) -> BTreeMap<String, Position> {
    store.load_positions().unwrap_or_else(|e| {
        error!("Failed to load holdings: {}", e);
        BTreeMap::new()
    })
}

async fn scan_loop(
    scanner: Scanner,
    store: HoldingsStore,
    notifier: Arc<dyn Notifier>,
    scan: ScanConfig,
) {
    let mut tick = tokio::time::interval(Duration::from_secs(scan.scan_interval_secs));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tick.tick().await;

        let focus = store.load_focus_symbols().unwrap_or_else(|e| {
            error!("Failed to load focus list: {}", e);
            Default::default()
        });
        let positions = load_positions(&store);
        let universe = scanner.scan_universe(&focus).await;

        let cycle = scanner.run_cycle(&universe, &positions).await;
        if cycle.signaled > 0 || !cycle.holding_signals.is_empty() {
            notifier
                .notify(&report::cycle_report(&cycle, &positions))
                .await;
        }

        let breakouts = scanner
            .scan_breakouts(&universe, scan.breakout_timeframe, scan.breakout_limit)
            .await;
        if !breakouts.is_empty() {
            notifier
                .notify(&report::breakout_report(&breakouts, scan.breakout_timeframe))
                .await;
        }

        // Divergence against the direction of each open position.
        for (symbol, position) in &positions {
            let kind = match position.position_type {
                PositionType::Long => DivergenceKind::Top,
                PositionType::Short => DivergenceKind::Bottom,
            };
            if let Some(hit) = scanner
                .find_divergence(symbol, DIVERGENCE_TIMEFRAMES, kind)
                .await
            {
                notifier.notify(&report::divergence_report(&hit)).await;
            }
        }
    }
}
