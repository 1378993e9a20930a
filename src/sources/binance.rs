use super::{retry_with_backoff, CandleSource, RetryPolicy, SourceFuture};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::types::{Candle, Timeframe};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const BINANCE_FUTURES_URL: &str = "https://fapi.binance.com/fapi/v1";

/// Binance error code for an unknown symbol.
const INVALID_SYMBOL_CODE: i64 = -1121;

/// Binance 24hr ticker response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker {
    symbol: String,
    quote_volume: String,
}

#[derive(Debug, Deserialize)]
struct BinancePrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct BinanceErrorBody {
    code: i64,
    msg: String,
}

/// Binance USDT-M futures REST client.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl BinanceFuturesClient {
    pub fn new(config: &FetchConfig) -> Self {
        let client = Client::builder()
            .user_agent("Vigil/1.0")
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_base: Duration::from_millis(config.backoff_base_ms),
            },
        }
    }

    /// One GET with status mapping, no retries.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(
                "Binance API returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            );
            return Err(classify_error(status, &text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Unknown(format!("decode {}: {}", path, e)))
    }

    async fn klines_once(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        let rows: Vec<Vec<Value>> = self
            .get_json(
                "/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.as_str().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let candles = parse_klines(&rows);
        if candles.is_empty() {
            return Err(FetchError::Empty);
        }
        debug!(
            symbol = %symbol,
            timeframe = %timeframe,
            count = candles.len(),
            "Fetched klines"
        );
        Ok(candles)
    }

    async fn price_once(&self, symbol: &str) -> Result<f64, FetchError> {
        let ticker: BinancePrice = self
            .get_json("/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        ticker
            .price
            .parse::<f64>()
            .ok()
            .filter(|p| *p > 0.0)
            .ok_or(FetchError::Empty)
    }

    async fn top_symbols_once(&self, n: usize) -> Result<Vec<String>, FetchError> {
        let tickers: Vec<BinanceTicker> = self.get_json("/ticker/24hr", &[]).await?;
        let symbols = rank_by_quote_volume(tickers, n);
        if symbols.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(symbols)
    }
}

impl CandleSource for BinanceFuturesClient {
    fn fetch_candles<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> SourceFuture<'a, Vec<Candle>> {
        Box::pin(async move {
            let what = format!("klines {} {}", symbol, timeframe);
            retry_with_backoff(self.retry, &what, || {
                self.klines_once(symbol, timeframe, limit)
            })
            .await
        })
    }

    fn fetch_price<'a>(&'a self, symbol: &'a str) -> SourceFuture<'a, f64> {
        Box::pin(async move {
            let what = format!("price {}", symbol);
            retry_with_backoff(self.retry, &what, || self.price_once(symbol)).await
        })
    }

    fn top_symbols(&self, n: usize) -> SourceFuture<'_, Vec<String>> {
        Box::pin(async move {
            retry_with_backoff(self.retry, "ticker/24hr", || self.top_symbols_once(n)).await
        })
    }
}

/// Map a non-success response to a fetch error.
fn classify_error(status: StatusCode, body: &str) -> FetchError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return FetchError::RateLimited;
    }

    let parsed = serde_json::from_str::<BinanceErrorBody>(body).ok();
    match parsed {
        Some(err) if status == StatusCode::BAD_REQUEST && err.code == INVALID_SYMBOL_CODE => {
            FetchError::InvalidSymbol(err.msg)
        }
        Some(err) => FetchError::Unknown(format!("{} ({}): {}", status, err.code, err.msg)),
        None => FetchError::Unknown(format!("HTTP {}", status)),
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Kline rows are `[openTime, open, high, low, close, volume, ...]` with the
/// prices as strings. Malformed rows are dropped.
fn parse_klines(rows: &[Vec<Value>]) -> Vec<Candle> {
    rows.iter()
        .filter_map(|row| {
            Some(Candle {
                open_time: row.first()?.as_i64()?,
                open: value_f64(row.get(1)?)?,
                high: value_f64(row.get(2)?)?,
                low: value_f64(row.get(3)?)?,
                close: value_f64(row.get(4)?)?,
                volume: value_f64(row.get(5)?)?,
            })
        })
        .collect()
}

fn rank_by_quote_volume(tickers: Vec<BinanceTicker>, n: usize) -> Vec<String> {
    let mut ranked: Vec<(String, f64)> = tickers
        .into_iter()
        .filter(|t| t.symbol.ends_with("USDT"))
        .filter_map(|t| {
            let volume = t.quote_volume.parse::<f64>().ok()?;
            Some((t.symbol, volume))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.into_iter().take(n).map(|(symbol, _)| symbol).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Kline parsing
    // =========================================================================

    #[test]
    fn test_parse_klines() {
        let json = r#"[
            [1700000000000, "37000.10", "37100.00", "36900.50", "37050.00", "1234.5",
             1700003599999, "0", 10, "0", "0", "0"],
            [1700003600000, "37050.00", "37200.00", "37000.00", "37150.25", "987.0",
             1700007199999, "0", 8, "0", "0", "0"]
        ]"#;
        let rows: Vec<Vec<Value>> = serde_json::from_str(json).unwrap();
        let candles = parse_klines(&rows);

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time, 1_700_000_000_000);
        assert_eq!(candles[0].high, 37100.0);
        assert_eq!(candles[1].close, 37150.25);
        assert_eq!(candles[1].volume, 987.0);
    }

    #[test]
    fn test_parse_klines_drops_malformed_rows() {
        let json = r#"[
            [1700000000000, "1.0", "2.0", "0.5", "1.5", "10"],
            [1700003600000, "bad", "2.0", "0.5", "1.5", "10"],
            [1700007200000, "1.0"]
        ]"#;
        let rows: Vec<Vec<Value>> = serde_json::from_str(json).unwrap();
        assert_eq!(parse_klines(&rows).len(), 1);
    }

    // =========================================================================
    // Error mapping
    // =========================================================================

    #[test]
    fn test_rate_limit_statuses() {
        assert_eq!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, ""),
            FetchError::RateLimited
        );
        assert_eq!(
            classify_error(StatusCode::from_u16(418).unwrap(), ""),
            FetchError::RateLimited
        );
    }

    #[test]
    fn test_invalid_symbol_code() {
        let body = r#"{"code":-1121,"msg":"Invalid symbol."}"#;
        assert_eq!(
            classify_error(StatusCode::BAD_REQUEST, body),
            FetchError::InvalidSymbol("Invalid symbol.".into())
        );
    }

    #[test]
    fn test_other_errors_are_unknown() {
        let body = r#"{"code":-1003,"msg":"Too much request weight used"}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, body),
            FetchError::Unknown(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::BAD_GATEWAY, "<html>"),
            FetchError::Unknown(_)
        ));
    }

    // =========================================================================
    // Tickers
    // =========================================================================

    #[test]
    fn test_binance_ticker_deserialization() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "lastPrice": "43500.50",
            "priceChangePercent": "2.5",
            "volume": "50000",
            "quoteVolume": "2175000000"
        }"#;

        let ticker: BinanceTicker = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.symbol, "BTCUSDT");
        assert_eq!(ticker.quote_volume, "2175000000");
    }

    #[test]
    fn test_rank_by_quote_volume() {
        let tickers = vec![
            BinanceTicker {
                symbol: "ETHUSDT".into(),
                quote_volume: "500".into(),
            },
            BinanceTicker {
                symbol: "BTCUSDT".into(),
                quote_volume: "900".into(),
            },
            BinanceTicker {
                symbol: "ETHBTC".into(),
                quote_volume: "10000".into(),
            },
            BinanceTicker {
                symbol: "SOLUSDT".into(),
                quote_volume: "700".into(),
            },
        ];
        assert_eq!(
            rank_by_quote_volume(tickers, 2),
            vec!["BTCUSDT".to_string(), "SOLUSDT".to_string()]
        );
    }

    #[test]
    fn test_price_deserialization() {
        let price: BinancePrice =
            serde_json::from_str(r#"{"symbol":"BTCUSDT","price":"43500.10","time":1}"#).unwrap();
        assert_eq!(price.price, "43500.10");
    }
}
