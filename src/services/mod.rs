pub mod context;
pub mod escalation;
pub mod holdings;
pub mod notifier;
pub mod ratio;
pub mod report;
pub mod scanner;
pub mod signals;
pub mod store;

pub use context::EvaluationContext;
pub use escalation::{EscalationAlert, EscalationRegistry};
pub use holdings::{HoldingsMonitor, PnlAlert, PnlCheckReport, PositionCheck};
pub use notifier::{DingTalkNotifier, FanoutNotifier, Notifier, TelegramNotifier};
pub use ratio::{RatioMonitor, RatioOutcome, RatioReading};
pub use scanner::{CycleReport, DivergenceHit, Scanner, DIVERGENCE_TIMEFRAMES};
pub use signals::SignalEvaluator;
pub use store::{HoldingsStore, DEFAULT_FOCUS_SYMBOLS};
