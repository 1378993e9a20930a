//! Market data sources.

pub mod binance;

pub use binance::BinanceFuturesClient;

use crate::error::FetchError;
use crate::types::{Candle, Timeframe};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Future returned by [`CandleSource`] calls.
pub type SourceFuture<'a, T> = BoxFuture<'a, Result<T, FetchError>>;

/// Where candles and prices come from.
///
/// `fetch_candles` returns candles oldest first and reports a response with no
/// rows as [`FetchError::Empty`] rather than an empty success.
pub trait CandleSource: Send + Sync {
    fn fetch_candles<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> SourceFuture<'a, Vec<Candle>>;

    /// Latest traded price.
    fn fetch_price<'a>(&'a self, symbol: &'a str) -> SourceFuture<'a, f64>;

    /// USDT pairs by 24h quote volume, largest first.
    fn top_symbols(&self, n: usize) -> SourceFuture<'_, Vec<String>>;
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                warn!(
                    request = %what,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base: Duration::from_millis(300),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(300));
        assert_eq!(policy.delay(1), Duration::from_millis(600));
        assert_eq!(policy.delay(2), Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(fast_policy(2), "klines", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FetchError::RateLimited)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(fast_policy(2), "klines", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Timeout) }
        })
        .await;

        assert_eq!(result, Err(FetchError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_symbol_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(fast_policy(5), "klines", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::InvalidSymbol("FOO".into())) }
        })
        .await;

        assert!(matches!(result, Err(FetchError::InvalidSymbol(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
