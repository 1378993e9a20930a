use crate::error::{AppError, Result};
use crate::sources::binance::BINANCE_FUTURES_URL;
use crate::types::{GateVariant, Timeframe};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Exchange request configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// REST base URL of the futures API.
    pub base_url: String,
    /// Per-request timeout (ms).
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay, doubled on every retry (ms).
    pub backoff_base_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: BINANCE_FUTURES_URL.to_string(),
            timeout_ms: 10_000,
            max_retries: 2,
            backoff_base_ms: 300,
        }
    }
}

/// Signal evaluation configuration.
#[derive(Debug, Clone)]
pub struct SignalConfig {
    /// Timeframe crosses are detected on.
    pub short_timeframe: Timeframe,
    /// Timeframe the trend is read from.
    pub long_timeframe: Timeframe,
    pub short_limit: usize,
    pub long_limit: usize,
    /// Fewer short candles than this skips the symbol.
    pub min_short_candles: usize,
    /// Fewer long candles than this skips the symbol.
    pub min_long_candles: usize,
    pub gate_variant: GateVariant,
    /// Require the long trend to agree with the signal.
    pub trend_gated: bool,
    /// Require a same-kind KDJ cross.
    pub kdj_confirmation: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            short_timeframe: Timeframe::OneHour,
            long_timeframe: Timeframe::FourHours,
            short_limit: 100,
            long_limit: 50,
            min_short_candles: 50,
            min_long_candles: 10,
            gate_variant: GateVariant::PriceRelative,
            trend_gated: false,
            kdj_confirmation: false,
        }
    }
}

/// Batch scan configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Symbols taken from the 24h volume ranking.
    pub top_n: usize,
    /// Concurrent symbol evaluations.
    pub max_workers: usize,
    /// Whole-cycle deadline (seconds).
    pub cycle_timeout_secs: u64,
    /// Time between scan cycles (seconds).
    pub scan_interval_secs: u64,
    pub breakout_timeframe: Timeframe,
    pub breakout_limit: usize,
    pub divergence_lookback: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            top_n: 100,
            max_workers: 10,
            cycle_timeout_secs: 600,
            scan_interval_secs: 3600,
            breakout_timeframe: Timeframe::OneHour,
            breakout_limit: 168,
            divergence_lookback: 100,
        }
    }
}

/// Holdings monitoring configuration.
#[derive(Debug, Clone)]
pub struct HoldingsConfig {
    pub holdings_file: PathBuf,
    pub focus_file: PathBuf,
    /// Where the evaluation context is persisted between runs.
    pub context_file: PathBuf,
    /// Time between PnL checks (seconds).
    pub check_interval_secs: u64,
    /// Move since the last check that triggers an alert (percent).
    pub move_alert_pct: f64,
    /// Total PnL level whose upward crossing triggers an alert (percent).
    pub total_pnl_alert_pct: f64,
}

impl Default for HoldingsConfig {
    fn default() -> Self {
        Self {
            holdings_file: PathBuf::from("crypto_holdings.json"),
            focus_file: PathBuf::from("focus_list.json"),
            context_file: PathBuf::from("vigil_context.json"),
            check_interval_secs: 300,
            move_alert_pct: 3.0,
            total_pnl_alert_pct: 10.0,
        }
    }
}

/// Repeated-push escalation configuration.
#[derive(Debug, Clone)]
pub struct EscalationConfig {
    pub duration_secs: u64,
    pub interval_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            duration_secs: 120,
            interval_secs: 3,
        }
    }
}

/// Price ratio watch between two symbols.
#[derive(Debug, Clone)]
pub struct RatioConfig {
    pub enabled: bool,
    /// Numerator symbol.
    pub base: String,
    /// Denominator symbol.
    pub quote: String,
    /// Ratio under which an alert is sent.
    pub alert_below: f64,
    /// Time between checks (seconds).
    pub interval_secs: u64,
}

impl Default for RatioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base: "BTCUSDT".to_string(),
            quote: "PAXGUSDT".to_string(),
            alert_below: 26.0,
            interval_secs: 300,
        }
    }
}

/// Notification channels. A channel without credentials is disabled.
#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub dingtalk_webhook: Option<String>,
    /// Signing secret for the DingTalk robot.
    pub dingtalk_secret: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub signal: SignalConfig,
    pub scan: ScanConfig,
    pub holdings: HoldingsConfig,
    pub escalation: EscalationConfig,
    pub ratio: RatioConfig,
    pub notify: NotifyConfig,
}

fn parse_var<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

fn parse_flag(value: Option<String>) -> Option<bool> {
    value.and_then(|v| match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`. Missing or malformed values fall
    /// back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeframe = |key: &str| lookup(key).and_then(|v| Timeframe::parse(&v));
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let fetch_defaults = FetchConfig::default();
        let fetch = FetchConfig {
            base_url: non_empty("BINANCE_FUTURES_URL").unwrap_or(fetch_defaults.base_url),
            timeout_ms: parse_var(lookup("FETCH_TIMEOUT_MS")).unwrap_or(fetch_defaults.timeout_ms),
            max_retries: parse_var(lookup("FETCH_MAX_RETRIES"))
                .unwrap_or(fetch_defaults.max_retries),
            backoff_base_ms: parse_var(lookup("FETCH_BACKOFF_MS"))
                .unwrap_or(fetch_defaults.backoff_base_ms),
        };

        let signal_defaults = SignalConfig::default();
        let signal = SignalConfig {
            short_timeframe: timeframe("SHORT_TIMEFRAME")
                .unwrap_or(signal_defaults.short_timeframe),
            long_timeframe: timeframe("LONG_TIMEFRAME").unwrap_or(signal_defaults.long_timeframe),
            short_limit: parse_var(lookup("SHORT_LIMIT")).unwrap_or(signal_defaults.short_limit),
            long_limit: parse_var(lookup("LONG_LIMIT")).unwrap_or(signal_defaults.long_limit),
            min_short_candles: parse_var(lookup("MIN_SHORT_CANDLES"))
                .unwrap_or(signal_defaults.min_short_candles),
            min_long_candles: parse_var(lookup("MIN_LONG_CANDLES"))
                .unwrap_or(signal_defaults.min_long_candles),
            gate_variant: lookup("GATE_VARIANT")
                .and_then(|v| GateVariant::parse(&v))
                .unwrap_or(signal_defaults.gate_variant),
            trend_gated: parse_flag(lookup("TREND_GATED")).unwrap_or(signal_defaults.trend_gated),
            kdj_confirmation: parse_flag(lookup("KDJ_CONFIRMATION"))
                .unwrap_or(signal_defaults.kdj_confirmation),
        };

        let scan_defaults = ScanConfig::default();
        let scan = ScanConfig {
            top_n: parse_var(lookup("SCAN_TOP_N")).unwrap_or(scan_defaults.top_n),
            max_workers: parse_var::<usize>(lookup("SCAN_MAX_WORKERS"))
                .filter(|n| *n > 0)
                .unwrap_or(scan_defaults.max_workers),
            cycle_timeout_secs: parse_var(lookup("CYCLE_TIMEOUT_SECS"))
                .unwrap_or(scan_defaults.cycle_timeout_secs),
            scan_interval_secs: parse_var::<u64>(lookup("SCAN_INTERVAL_SECS"))
                .filter(|n| *n > 0)
                .unwrap_or(scan_defaults.scan_interval_secs),
            breakout_timeframe: timeframe("BREAKOUT_TIMEFRAME")
                .unwrap_or(scan_defaults.breakout_timeframe),
            breakout_limit: parse_var(lookup("BREAKOUT_LIMIT"))
                .unwrap_or(scan_defaults.breakout_limit),
            divergence_lookback: parse_var(lookup("DIVERGENCE_LOOKBACK"))
                .unwrap_or(scan_defaults.divergence_lookback),
        };

        let holdings_defaults = HoldingsConfig::default();
        let holdings = HoldingsConfig {
            holdings_file: non_empty("HOLDINGS_FILE")
                .map(PathBuf::from)
                .unwrap_or(holdings_defaults.holdings_file),
            focus_file: non_empty("FOCUS_FILE")
                .map(PathBuf::from)
                .unwrap_or(holdings_defaults.focus_file),
            context_file: non_empty("CONTEXT_FILE")
                .map(PathBuf::from)
                .unwrap_or(holdings_defaults.context_file),
            check_interval_secs: parse_var::<u64>(lookup("HOLDINGS_CHECK_INTERVAL_SECS"))
                .filter(|n| *n > 0)
                .unwrap_or(holdings_defaults.check_interval_secs),
            move_alert_pct: parse_var(lookup("MOVE_ALERT_PCT"))
                .unwrap_or(holdings_defaults.move_alert_pct),
            total_pnl_alert_pct: parse_var(lookup("TOTAL_PNL_ALERT_PCT"))
                .unwrap_or(holdings_defaults.total_pnl_alert_pct),
        };

        let escalation_defaults = EscalationConfig::default();
        let escalation = EscalationConfig {
            duration_secs: parse_var(lookup("ESCALATION_DURATION_SECS"))
                .unwrap_or(escalation_defaults.duration_secs),
            interval_secs: parse_var::<u64>(lookup("ESCALATION_INTERVAL_SECS"))
                .filter(|n| *n > 0)
                .unwrap_or(escalation_defaults.interval_secs),
        };

        let ratio_defaults = RatioConfig::default();
        let ratio = RatioConfig {
            enabled: parse_flag(lookup("RATIO_MONITOR")).unwrap_or(ratio_defaults.enabled),
            base: non_empty("RATIO_BASE")
                .map(|v| v.trim().to_uppercase())
                .unwrap_or(ratio_defaults.base),
            quote: non_empty("RATIO_QUOTE")
                .map(|v| v.trim().to_uppercase())
                .unwrap_or(ratio_defaults.quote),
            alert_below: parse_var(lookup("RATIO_ALERT_BELOW"))
                .unwrap_or(ratio_defaults.alert_below),
            interval_secs: parse_var::<u64>(lookup("RATIO_INTERVAL_SECS"))
                .filter(|n| *n > 0)
                .unwrap_or(ratio_defaults.interval_secs),
        };

        let notify = NotifyConfig {
            dingtalk_webhook: non_empty("DINGTALK_WEBHOOK"),
            dingtalk_secret: non_empty("DINGTALK_SECRET"),
            telegram_bot_token: non_empty("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: non_empty("TELEGRAM_CHAT_ID"),
        };

        Self {
            fetch,
            signal,
            scan,
            holdings,
            escalation,
            ratio,
            notify,
        }
    }

    /// Reject combinations the scanner cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.signal.long_timeframe.millis() <= self.signal.short_timeframe.millis() {
            return Err(AppError::Config(format!(
                "long timeframe {} must be coarser than short timeframe {}",
                self.signal.long_timeframe, self.signal.short_timeframe
            )));
        }
        if self.signal.short_limit < self.signal.min_short_candles {
            return Err(AppError::Config(format!(
                "SHORT_LIMIT {} is below MIN_SHORT_CANDLES {}",
                self.signal.short_limit, self.signal.min_short_candles
            )));
        }
        if self.signal.long_limit < self.signal.min_long_candles {
            return Err(AppError::Config(format!(
                "LONG_LIMIT {} is below MIN_LONG_CANDLES {}",
                self.signal.long_limit, self.signal.min_long_candles
            )));
        }
        Ok(())
    }
}
