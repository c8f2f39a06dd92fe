use analysis_core::{AnalysisError, Bar, BarRequest, BarSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

/// Default 500 req/min for the Starter plan. Free tier users should use 5.
pub const DEFAULT_RATE_LIMIT: usize = 500;

const MAX_ATTEMPTS: u32 = 3;
const RATE_LIMIT_BACKOFF_SECS: u64 = 15;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let oldest = ts.front().copied().unwrap_or(now);
            let sleep_dur =
                (oldest + self.window).saturating_duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for Polygon API slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Connection settings for [`PolygonClient`]. Built by the caller; the client
/// never reads the environment itself.
#[derive(Debug, Clone)]
pub struct PolygonConfig {
    pub api_key: String,
    pub base_url: String,
    pub rate_limit_per_minute: usize,
    pub timeout: Duration,
}

impl PolygonConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limit_per_minute: DEFAULT_RATE_LIMIT,
            timeout: Duration::from_secs(90),
        }
    }

    pub fn with_rate_limit(mut self, per_minute: usize) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Clone)]
pub struct PolygonClient {
    config: PolygonConfig,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    pub fn new(config: PolygonConfig) -> Result<Self, AnalysisError> {
        if config.api_key.trim().is_empty() {
            return Err(AnalysisError::ApiError("Polygon API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;
        let rate_limiter = RateLimiter::new(config.rate_limit_per_minute, Duration::from_secs(60));

        Ok(Self {
            config,
            client,
            rate_limiter,
        })
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, AnalysisError> {
        let request = builder.build().map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        for attempt in 0..MAX_ATTEMPTS {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| AnalysisError::ApiError("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }
            let backoff = match backoff_after(attempt) {
                Some(d) => d,
                None => break,
            };

            tracing::warn!(
                "Polygon 429 rate limited, waiting {}s before retry {}/{}",
                backoff.as_secs(),
                attempt + 1,
                MAX_ATTEMPTS - 1
            );
            tokio::time::sleep(backoff).await;
        }

        Err(AnalysisError::ApiError(format!(
            "Rate limited by Polygon after {} attempts",
            MAX_ATTEMPTS
        )))
    }

    fn aggregates_url(&self, request: &BarRequest) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            request.symbol,
            request.multiplier,
            request.timespan.as_str(),
            request.from.format("%Y-%m-%d"),
            request.to.format("%Y-%m-%d")
        )
    }

    /// Get aggregates (bars) for a symbol, oldest first
    pub async fn get_aggregates(&self, request: &BarRequest) -> Result<Vec<Bar>, AnalysisError> {
        if request.from > request.to {
            return Err(AnalysisError::InvalidData(format!(
                "bar range starts ({}) after it ends ({})",
                request.from, request.to
            )));
        }

        let url = self.aggregates_url(request);
        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.config.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;
        let bars = parse_aggregates(&body)?;
        tracing::debug!("{}: {} bars from Polygon", request.symbol, bars.len());
        Ok(bars)
    }
}

/// Wait before retrying a 429 on zero-based `attempt`; `None` once attempts are spent.
fn backoff_after(attempt: u32) -> Option<Duration> {
    if attempt + 1 < MAX_ATTEMPTS {
        Some(Duration::from_secs(RATE_LIMIT_BACKOFF_SECS))
    } else {
        None
    }
}

#[async_trait]
impl BarSource for PolygonClient {
    async fn fetch_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, AnalysisError> {
        self.get_aggregates(request).await
    }
}

/// Decode an aggregates payload into bars, dropping entries with a bad timestamp.
fn parse_aggregates(body: &str) -> Result<Vec<Bar>, AnalysisError> {
    let agg_response: AggregateResponse =
        serde_json::from_str(body).map_err(|e| AnalysisError::ApiError(e.to_string()))?;

    if agg_response.status.as_deref() == Some("ERROR") {
        return Err(AnalysisError::ApiError(
            agg_response.error.unwrap_or_else(|| "Polygon returned ERROR status".to_string()),
        ));
    }

    let mut bars: Vec<Bar> = agg_response
        .results
        .into_iter()
        .filter_map(|r| {
            let timestamp: DateTime<Utc> = match DateTime::from_timestamp_millis(r.t) {
                Some(ts) => ts,
                None => {
                    tracing::warn!("Skipping aggregate with invalid timestamp {}", r.t);
                    return None;
                }
            };
            Some(Bar {
                timestamp,
                open: r.o,
                high: r.h,
                low: r.l,
                close: r.c,
                volume: r.v,
                vwap: r.vw,
            })
        })
        .collect();

    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    Ok(bars)
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp (ms)
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    v: f64, // volume
    #[serde(default)]
    vw: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_aggregates() {
        let body = r#"{
            "ticker": "AAPL",
            "status": "OK",
            "resultsCount": 2,
            "results": [
                {"t": 1704258000000, "o": 187.15, "h": 188.44, "l": 183.89, "c": 185.64,
                 "v": 82488674, "vw": 185.9},
                {"t": 1704171600000, "o": 187.15, "h": 188.44, "l": 183.89, "c": 184.25,
                 "v": 58414460}
            ]
        }"#;

        let bars = parse_aggregates(body).unwrap();

        assert_eq!(bars.len(), 2);
        // sorted oldest first
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[0].close, 184.25);
        assert_eq!(bars[0].vwap, None);
        assert_eq!(bars[1].vwap, Some(185.9));
    }

    #[test]
    fn test_parse_empty_results() {
        let bars = parse_aggregates(r#"{"status": "OK", "resultsCount": 0}"#).unwrap();
        assert!(bars.is_empty());
    }

    #[test]
    fn test_parse_error_status() {
        let result = parse_aggregates(r#"{"status": "ERROR", "error": "Unknown API Key"}"#);
        assert!(matches!(result, Err(AnalysisError::ApiError(msg)) if msg == "Unknown API Key"));
    }

    #[test]
    fn test_aggregates_url() {
        let config = PolygonConfig::new("key").with_base_url("http://localhost:9000/");
        let client = PolygonClient::new(config).unwrap();
        let request = BarRequest::daily(
            "SPY",
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        );

        assert_eq!(
            client.aggregates_url(&request),
            "http://localhost:9000/v2/aggs/ticker/SPY/range/1/day/2023-01-01/2025-01-01"
        );
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(PolygonClient::new(PolygonConfig::new("  ")).is_err());
    }

    #[test]
    fn test_no_backoff_after_final_attempt() {
        assert_eq!(backoff_after(0), Some(Duration::from_secs(RATE_LIMIT_BACKOFF_SECS)));
        assert_eq!(backoff_after(MAX_ATTEMPTS - 2), Some(Duration::from_secs(15)));
        assert_eq!(backoff_after(MAX_ATTEMPTS - 1), None);
    }

    #[tokio::test]
    async fn test_rate_limiter_admits_within_budget() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(limiter.timestamps.lock().await.len(), 3);
    }
}
