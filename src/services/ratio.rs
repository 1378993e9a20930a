//! Price ratio watch between two symbols, e.g. BTC priced in tokenized gold.

use super::notifier::Notifier;
use super::report;
use crate::config::RatioConfig;
use crate::sources::CandleSource;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RatioReading {
    pub base: String,
    pub quote: String,
    pub base_price: f64,
    pub quote_price: f64,
    /// `base_price / quote_price`
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RatioOutcome {
    Normal(RatioReading),
    /// Ratio under the alert line; an alert was sent.
    Below(RatioReading),
    /// One of the prices could not be fetched or was not positive.
    Unavailable { detail: String },
}

pub struct RatioMonitor {
    source: Arc<dyn CandleSource>,
    notifier: Arc<dyn Notifier>,
    base: String,
    quote: String,
    alert_below: f64,
}

impl RatioMonitor {
    pub fn new(
        source: Arc<dyn CandleSource>,
        notifier: Arc<dyn Notifier>,
        config: &RatioConfig,
    ) -> Self {
        Self {
            source,
            notifier,
            base: config.base.clone(),
            quote: config.quote.clone(),
            alert_below: config.alert_below,
        }
    }

    pub fn pair(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// Price both legs, alert when the ratio is under the line and report
    /// fetch failures to the same channels.
    pub async fn check(&self) -> RatioOutcome {
        let (base_price, quote_price) = tokio::join!(
            self.source.fetch_price(&self.base),
            self.source.fetch_price(&self.quote),
        );

        let (base_price, quote_price) = match (base_price, quote_price) {
            (Ok(base), Ok(quote)) if quote > 0.0 => (base, quote),
            (base_price, quote_price) => {
                let mut failures = Vec::new();
                if let Err(e) = base_price {
                    failures.push(format!("{}: {}", self.base, e));
                }
                match quote_price {
                    Err(e) => failures.push(format!("{}: {}", self.quote, e)),
                    Ok(price) if price <= 0.0 => {
                        failures.push(format!("{}: non-positive price {}", self.quote, price))
                    }
                    Ok(_) => {}
                }
                return self.unavailable(failures.join("; ")).await;
            }
        };

        let reading = RatioReading {
            base: self.base.clone(),
            quote: self.quote.clone(),
            base_price,
            quote_price,
            ratio: base_price / quote_price,
        };

        if reading.ratio < self.alert_below {
            warn!(
                pair = %self.pair(),
                ratio = reading.ratio,
                alert_below = self.alert_below,
                "Price ratio below alert line"
            );
            let notification = report::ratio_alert_notification(&reading, self.alert_below);
            self.notifier.notify(&notification).await;
            RatioOutcome::Below(reading)
        } else {
            info!(pair = %self.pair(), ratio = reading.ratio, "Price ratio checked");
            RatioOutcome::Normal(reading)
        }
    }

    async fn unavailable(&self, detail: String) -> RatioOutcome {
        warn!(pair = %self.pair(), detail = %detail, "Price ratio unavailable");
        let notification = report::ratio_unavailable_notification(&self.pair(), &detail);
        self.notifier.notify(&notification).await;
        RatioOutcome::Unavailable { detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::sources::SourceFuture;
    use crate::types::{Candle, Notification, NotificationType, Timeframe};
    use futures_util::future::BoxFuture;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedPrices(HashMap<String, f64>);

    impl CandleSource for FixedPrices {
        fn fetch_candles<'a>(
            &'a self,
            _symbol: &'a str,
            _timeframe: Timeframe,
            _limit: usize,
        ) -> SourceFuture<'a, Vec<Candle>> {
            Box::pin(async { Err(FetchError::Empty) })
        }

        fn fetch_price<'a>(&'a self, symbol: &'a str) -> SourceFuture<'a, f64> {
            let price = self.0.get(symbol).copied();
            Box::pin(async move {
                price.ok_or_else(|| FetchError::InvalidSymbol(symbol.to_string()))
            })
        }

        fn top_symbols(&self, _n: usize) -> SourceFuture<'_, Vec<String>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[derive(Default)]
    struct Inbox(Mutex<Vec<Notification>>);

    impl Notifier for Inbox {
        fn name(&self) -> &str {
            "inbox"
        }

        fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, bool> {
            self.0.lock().unwrap().push(notification.clone());
            Box::pin(async { true })
        }
    }

    fn monitor(prices: &[(&str, f64)]) -> (RatioMonitor, Arc<Inbox>) {
        let source = FixedPrices(prices.iter().map(|(s, p)| (s.to_string(), *p)).collect());
        let inbox = Arc::new(Inbox::default());
        let monitor = RatioMonitor::new(Arc::new(source), inbox.clone(), &RatioConfig::default());
        (monitor, inbox)
    }

    #[tokio::test]
    async fn test_ratio_above_line_is_quiet() {
        let (monitor, inbox) = monitor(&[("BTCUSDT", 90_000.0), ("PAXGUSDT", 2_500.0)]);

        match monitor.check().await {
            RatioOutcome::Normal(reading) => assert!((reading.ratio - 36.0).abs() < 1e-9),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(inbox.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ratio_below_line_alerts() {
        let (monitor, inbox) = monitor(&[("BTCUSDT", 62_500.0), ("PAXGUSDT", 2_500.0)]);

        let outcome = monitor.check().await;
        assert!(matches!(outcome, RatioOutcome::Below(ref r) if (r.ratio - 25.0).abs() < 1e-9));

        let sent = inbox.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].notification_type, NotificationType::Alert);
        assert!(sent[0].title.contains("BTCUSDT/PAXGUSDT"));
        assert!(sent[0].message.contains("25.00"));
    }

    #[tokio::test]
    async fn test_missing_leg_is_reported() {
        let (monitor, inbox) = monitor(&[("BTCUSDT", 62_500.0)]);

        match monitor.check().await {
            RatioOutcome::Unavailable { detail } => assert!(detail.starts_with("PAXGUSDT")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        let sent = inbox.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].notification_type, NotificationType::Info);
    }

    #[tokio::test]
    async fn test_zero_quote_price_is_unavailable() {
        let (monitor, _inbox) = monitor(&[("BTCUSDT", 62_500.0), ("PAXGUSDT", 0.0)]);
        assert!(matches!(
            monitor.check().await,
            RatioOutcome::Unavailable { .. }
        ));
    }
}
