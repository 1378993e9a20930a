//! Batch scans over a symbol universe.
//!
//! Every per-symbol failure is turned into a [`SkipReason`] inside its worker,
//! so a cycle always finishes with counts even when the exchange misbehaves.

use super::signals::{
    analyze_divergence, evaluate_position, find_breakout_candidate, Macd, SignalEvaluator,
};
use super::store::DEFAULT_FOCUS_SYMBOLS;
use crate::config::{ScanConfig, SignalConfig};
use crate::error::FetchError;
use crate::sources::CandleSource;
use crate::types::{
    BreakoutResult, CandleSeries, DivergenceKind, DivergenceResult, HoldingSignal, Position,
    SignalKind, SignalRecord, SkipReason, Timeframe,
};
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Series shorter than this are not searched for wave structures.
pub const BREAKOUT_MIN_CANDLES: usize = 20;
/// Candles fetched per timeframe for a divergence check.
pub const DIVERGENCE_FETCH_LIMIT: usize = 300;
/// Fewer candles than this skips the timeframe.
pub const DIVERGENCE_MIN_CANDLES: usize = 100;
pub const DIVERGENCE_MAX_LOOKBACK: usize = 100;
/// Checked fine to coarse.
pub const DIVERGENCE_TIMEFRAMES: &[Timeframe] =
    &[Timeframe::OneHour, Timeframe::FourHours, Timeframe::OneDay];

/// Result of one batch cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub outcomes: BTreeMap<String, Result<SignalRecord, SkipReason>>,
    pub evaluated: usize,
    pub skipped: usize,
    pub signaled: usize,
    pub holding_signals: Vec<HoldingSignal>,
    /// The cycle deadline passed before every symbol finished.
    pub partial: bool,
}

impl CycleReport {
    fn from_outcomes(
        outcomes: BTreeMap<String, Result<SignalRecord, SkipReason>>,
        partial: bool,
    ) -> Self {
        let evaluated = outcomes.values().filter(|o| o.is_ok()).count();
        let signaled = outcomes
            .values()
            .filter(|o| matches!(o, Ok(record) if record.is_signal()))
            .count();
        Self {
            evaluated,
            skipped: outcomes.len() - evaluated,
            signaled,
            outcomes,
            holding_signals: Vec::new(),
            partial,
        }
    }

    fn records_of(&self, kind: SignalKind) -> Vec<&SignalRecord> {
        self.outcomes
            .values()
            .filter_map(|o| o.as_ref().ok())
            .filter(|record| record.kind == kind)
            .collect()
    }

    /// Buy records, lowest long-timeframe MACD first.
    pub fn buys(&self) -> Vec<&SignalRecord> {
        let mut buys = self.records_of(SignalKind::Buy);
        buys.sort_by(|a, b| long_macd(a).total_cmp(&long_macd(b)));
        buys
    }

    /// Sell records, highest long-timeframe MACD first.
    pub fn sells(&self) -> Vec<&SignalRecord> {
        let mut sells = self.records_of(SignalKind::Sell);
        sells.sort_by(|a, b| long_macd(b).total_cmp(&long_macd(a)));
        sells
    }

    pub fn skipped_symbols(&self) -> impl Iterator<Item = (&String, &SkipReason)> {
        self.outcomes
            .iter()
            .filter_map(|(symbol, o)| o.as_ref().err().map(|reason| (symbol, reason)))
    }
}

fn long_macd(record: &SignalRecord) -> f64 {
    record.long_macd.unwrap_or(0.0)
}

/// A divergence found on one timeframe.
#[derive(Debug, Clone, PartialEq)]
pub struct DivergenceHit {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub result: DivergenceResult,
}

pub struct Scanner {
    source: Arc<dyn CandleSource>,
    evaluator: Arc<SignalEvaluator>,
    macd: Macd,
    signal: SignalConfig,
    scan: ScanConfig,
}

impl Scanner {
    pub fn new(
        source: Arc<dyn CandleSource>,
        evaluator: SignalEvaluator,
        signal: SignalConfig,
        scan: ScanConfig,
    ) -> Self {
        Self {
            source,
            evaluator: Arc::new(evaluator),
            macd: Macd::default(),
            signal,
            scan,
        }
    }

    fn workers_for(&self, jobs: usize) -> usize {
        self.scan.max_workers.min(jobs).max(1)
    }

    /// Top symbols by volume, then the focus list, then the default focus coins.
    /// A failed volume ranking only narrows the universe.
    pub async fn scan_universe(&self, focus: &BTreeSet<String>) -> Vec<String> {
        let ranked = match self.source.top_symbols(self.scan.top_n).await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(error = %e, "Volume ranking unavailable, scanning focus symbols only");
                Vec::new()
            }
        };

        let candidates: Vec<String> = ranked
            .into_iter()
            .chain(focus.iter().cloned())
            .chain(DEFAULT_FOCUS_SYMBOLS.iter().map(|s| s.to_string()))
            .collect();
        dedup_preserving_order(&candidates)
    }

    /// Evaluate every symbol with at most `max_workers` in flight, then run
    /// the holdings stop rules against the fresh records.
    pub async fn run_cycle(
        &self,
        symbols: &[String],
        positions: &BTreeMap<String, Position>,
    ) -> CycleReport {
        let universe = dedup_preserving_order(symbols);
        let semaphore = Arc::new(Semaphore::new(self.workers_for(universe.len())));
        let mut tasks = JoinSet::new();

        for symbol in universe.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let source = Arc::clone(&self.source);
            let evaluator = Arc::clone(&self.evaluator);
            let config = self.signal.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = evaluate_symbol(source.as_ref(), &evaluator, &config, &symbol).await;
                (symbol, outcome)
            });
        }

        let mut outcomes = BTreeMap::new();
        let deadline = Duration::from_secs(self.scan.cycle_timeout_secs);
        let finished = tokio::time::timeout(deadline, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((symbol, outcome)) => {
                        outcomes.insert(symbol, outcome);
                    }
                    Err(e) => error!("Symbol worker failed: {}", e),
                }
            }
        })
        .await;

        let partial = finished.is_err();
        if partial {
            tasks.abort_all();
            warn!(
                completed = outcomes.len(),
                total = universe.len(),
                timeout_secs = self.scan.cycle_timeout_secs,
                "Scan cycle timed out, reporting partial results"
            );
        }
        // Panicked or abandoned workers still count as skipped.
        for symbol in &universe {
            outcomes.entry(symbol.clone()).or_insert_with(|| {
                Err(SkipReason::DataUnavailable {
                    detail: if partial {
                        "cycle timed out".to_string()
                    } else {
                        "worker failed".to_string()
                    },
                })
            });
        }

        let mut report = CycleReport::from_outcomes(outcomes, partial);
        report.holding_signals = positions
            .iter()
            .filter_map(|(symbol, position)| match report.outcomes.get(symbol) {
                Some(Ok(record)) => evaluate_position(position, record),
                _ => None,
            })
            .collect();

        info!(
            symbols = universe.len(),
            evaluated = report.evaluated,
            skipped = report.skipped,
            signaled = report.signaled,
            holding_signals = report.holding_signals.len(),
            partial = report.partial,
            "Scan cycle complete"
        );
        report
    }

    /// Symbols whose latest five-wave structure has not broken out yet,
    /// strongest first.
    pub async fn scan_breakouts(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        limit: usize,
    ) -> Vec<BreakoutResult> {
        let universe = dedup_preserving_order(symbols);
        let workers = self.workers_for(universe.len());

        let mut results: Vec<BreakoutResult> = stream::iter(universe)
            .map(|symbol| async move {
                match self.source.fetch_candles(&symbol, timeframe, limit).await {
                    Ok(candles) if candles.len() >= BREAKOUT_MIN_CANDLES => {
                        let series = CandleSeries::new(symbol.as_str(), timeframe, candles);
                        find_breakout_candidate(&series, &symbol)
                    }
                    Ok(candles) => {
                        debug!(
                            symbol = %symbol,
                            candles = candles.len(),
                            "Too few candles for breakout scan"
                        );
                        None
                    }
                    Err(e) => {
                        debug!(symbol = %symbol, error = %e, "Breakout fetch failed");
                        None
                    }
                }
            })
            .buffer_unordered(workers)
            .filter_map(|result| async move { result })
            .collect()
            .await;

        results.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        info!(found = results.len(), timeframe = %timeframe, "Breakout scan complete");
        results
    }

    /// First divergence of `kind` over `timeframes`, checked in order.
    pub async fn find_divergence(
        &self,
        symbol: &str,
        timeframes: &[Timeframe],
        kind: DivergenceKind,
    ) -> Option<DivergenceHit> {
        let lookback = self.scan.divergence_lookback.min(DIVERGENCE_MAX_LOOKBACK);

        for &timeframe in timeframes {
            let candles = match self
                .source
                .fetch_candles(symbol, timeframe, DIVERGENCE_FETCH_LIMIT)
                .await
            {
                Ok(candles) => candles,
                Err(e) => {
                    debug!(symbol, timeframe = %timeframe, error = %e, "Divergence fetch failed");
                    continue;
                }
            };
            if candles.len() < DIVERGENCE_MIN_CANDLES {
                debug!(
                    symbol,
                    timeframe = %timeframe,
                    candles = candles.len(),
                    "Too few candles for divergence"
                );
                continue;
            }

            let series = CandleSeries::new(symbol, timeframe, candles);
            if let Some(result) = analyze_divergence(&series, &self.macd, lookback, kind) {
                info!(symbol, timeframe = %timeframe, kind = ?kind, "Divergence found");
                return Some(DivergenceHit {
                    symbol: symbol.to_string(),
                    timeframe,
                    result,
                });
            }
        }
        None
    }
}

async fn evaluate_symbol(
    source: &dyn CandleSource,
    evaluator: &SignalEvaluator,
    config: &SignalConfig,
    symbol: &str,
) -> Result<SignalRecord, SkipReason> {
    let (short, long) = tokio::join!(
        fetch_series(source, symbol, config.short_timeframe, config.short_limit),
        fetch_series(source, symbol, config.long_timeframe, config.long_limit),
    );
    let (short, long) = (short?, long?);
    let price = short.last().map(|c| c.close).unwrap_or_default();

    let outcome = evaluator.try_evaluate(symbol, &short, &long, price);
    match &outcome {
        Ok(record) if record.is_signal() => {
            info!(symbol, kind = ?record.kind, reason = %record.trigger_reason, "Signal")
        }
        Ok(record) => debug!(symbol, reason = %record.trigger_reason, "No signal"),
        Err(reason) => debug!(symbol, reason = %reason, "Skipped"),
    }
    outcome
}

/// An empty response becomes an empty series so the length check reports it
/// as insufficient data rather than a failed call.
async fn fetch_series(
    source: &dyn CandleSource,
    symbol: &str,
    timeframe: Timeframe,
    limit: usize,
) -> Result<CandleSeries, SkipReason> {
    match source.fetch_candles(symbol, timeframe, limit).await {
        Ok(candles) => Ok(CandleSeries::new(symbol, timeframe, candles)),
        Err(FetchError::Empty) => Ok(CandleSeries::new(symbol, timeframe, Vec::new())),
        Err(e) => {
            warn!(symbol, timeframe = %timeframe, error = %e, "Candle fetch failed");
            Err(SkipReason::DataUnavailable {
                detail: format!("{} candles: {}", timeframe, e),
            })
        }
    }
}

fn dedup_preserving_order(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}
