//! Binance spot klines over the public REST API.
//!
//! Requests are paged 1000 klines at a time and retried with bounded
//! exponential backoff on transport errors, 429 and 5xx responses.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::error::AlphalabError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::MarketDataPort;

const BASE_URL: &str = "https://api.binance.com";
const PAGE_LIMIT: usize = 1000;

/// Retry settings for network operations with exponential backoff.
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first try.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Retry `action` while `should_retry` accepts the error and attempts remain.
pub fn retry_with_backoff<T, E, F, R>(
    config: RetryConfig,
    mut action: F,
    mut should_retry: R,
) -> Result<T, E>
where
    F: FnMut(usize) -> Result<T, E>,
    R: FnMut(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match action(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts || !should_retry(&err) {
                    return Err(err);
                }
                thread::sleep(backoff_delay(config.base_delay, config.max_delay, attempt));
                attempt += 1;
            }
        }
    }
}

fn backoff_delay(base: Duration, max: Duration, attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

fn source_error(reason: impl Into<String>) -> AlphalabError {
    AlphalabError::DataSource {
        reason: reason.into(),
    }
}

fn is_retryable(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}

fn millis_to_datetime(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

fn number_field(row: &[Value], index: usize, name: &str) -> Result<f64, AlphalabError> {
    let value = row
        .get(index)
        .ok_or_else(|| source_error(format!("kline missing {}", name)))?;
    match value {
        Value::String(s) => s
            .parse()
            .map_err(|_| source_error(format!("kline {} is not a number: {:?}", name, s))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| source_error(format!("kline {} out of range", name))),
        other => Err(source_error(format!("kline {} has unexpected type: {}", name, other))),
    }
}

/// Parse one page of the `/api/v3/klines` response. Each kline is an array
/// whose first six entries are open time (ms), open, high, low, close and
/// volume.
pub fn parse_klines(symbol: &str, body: &Value) -> Result<Vec<OhlcvBar>, AlphalabError> {
    let rows = body
        .as_array()
        .ok_or_else(|| source_error(format!("expected kline array, got {}", body)))?;
    rows.iter()
        .map(|row| {
            let row = row
                .as_array()
                .ok_or_else(|| source_error("kline is not an array"))?;
            let open_ms = row
                .first()
                .and_then(Value::as_i64)
                .ok_or_else(|| source_error("kline missing open time"))?;
            let timestamp = millis_to_datetime(open_ms)
                .ok_or_else(|| source_error(format!("invalid open time {}", open_ms)))?;
            Ok(OhlcvBar {
                symbol: symbol.to_string(),
                timestamp,
                open: number_field(row, 1, "open")?,
                high: number_field(row, 2, "high")?,
                low: number_field(row, 3, "low")?,
                close: number_field(row, 4, "close")?,
                volume: number_field(row, 5, "volume")?,
            })
        })
        .collect()
}

pub struct BinanceAdapter {
    agent: ureq::Agent,
    base_url: String,
    retry: RetryConfig,
}

impl BinanceAdapter {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn fetch_page(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Value, AlphalabError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let response = retry_with_backoff(
            self.retry,
            |attempt| {
                if attempt > 1 {
                    warn!(symbol, attempt, "retrying kline request");
                }
                self.agent
                    .get(&url)
                    .query("symbol", symbol)
                    .query("interval", interval)
                    .query("startTime", &start_ms.to_string())
                    .query("endTime", &end_ms.to_string())
                    .query("limit", &PAGE_LIMIT.to_string())
                    .call()
            },
            is_retryable,
        )
        .map_err(|e| source_error(format!("{} {}: {}", symbol, interval, e)))?;
        response
            .into_json::<Value>()
            .map_err(|e| source_error(format!("invalid kline response: {}", e)))
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataPort for BinanceAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, AlphalabError> {
        let mut start_ms = start.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        let end_ms = end
            .succ_opt()
            .unwrap_or(end)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp_millis()
            - 1;

        let mut bars: Vec<OhlcvBar> = Vec::new();
        while start_ms <= end_ms {
            let page = parse_klines(symbol, &self.fetch_page(symbol, interval, start_ms, end_ms)?)?;
            debug!(symbol, rows = page.len(), start_ms, "kline page");
            let Some(last) = page.last() else {
                break;
            };
            let next_ms = last.timestamp.and_utc().timestamp_millis() + 1;
            let full = page.len() == PAGE_LIMIT;
            bars.extend(page);
            if !full || next_ms <= start_ms {
                break;
            }
            start_ms = next_ms;
        }

        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        if bars.is_empty() {
            return Err(AlphalabError::NoData {
                symbol: symbol.to_string(),
            });
        }
        info!(symbol, interval, rows = bars.len(), "downloaded klines");
        Ok(bars)
    }
}
