//! Yahoo Finance chart API data source.

use crate::adapters::rate_limiter::RateLimiter;
use crate::domain::error::ScanError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::{BarMap, DataPort, FetchRequest};
use chrono::{TimeZone, Utc};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const BROWSER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    description: String,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug, Default)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Provider spelling of a ticker: share-class dots become dashes.
pub fn normalize_ticker(symbol: &str) -> String {
    symbol.trim().to_uppercase().replace('.', "-")
}

/// Decodes a chart response body. Null quote fields become NaN.
fn parse_chart(body: &str) -> Result<Vec<Bar>, String> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| format!("invalid chart response: {}", e))?;
    if let Some(err) = response.chart.error {
        return Err(err.description);
    }
    let result = response
        .chart
        .result
        .and_then(|mut r| r.pop())
        .ok_or_else(|| "no chart result".to_string())?;
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .unwrap_or_default();

    let field = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten().unwrap_or(f64::NAN);
    let bars = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let timestamp = Utc.timestamp_opt(ts, 0).single()?;
            Some(Bar {
                timestamp,
                open: field(&quote.open, i),
                high: field(&quote.high, i),
                low: field(&quote.low, i),
                close: field(&quote.close, i),
                volume: field(&quote.volume, i),
            })
        })
        .collect();
    Ok(bars)
}

pub struct YahooAdapter {
    client: Client,
    limiter: Arc<RateLimiter>,
    base_url: String,
}

impl YahooAdapter {
    pub fn new(limiter: Arc<RateLimiter>) -> Result<Self, ScanError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .default_headers(headers)
            .build()
            .map_err(std::io::Error::other)?;
        Ok(Self {
            client,
            limiter,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn fetch_symbol(&self, symbol: &str, request: &FetchRequest) -> Result<Vec<Bar>, String> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url.trim_end_matches('/'),
            normalize_ticker(symbol)
        );
        self.limiter.acquire();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("range", format!("{}d", request.period_days)),
                ("interval", request.interval.to_string()),
            ])
            .send()
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body = response.text().map_err(|e| e.to_string())?;
        parse_chart(&body)
    }
}

impl DataPort for YahooAdapter {
    fn fetch_bars(&self, request: &FetchRequest) -> Result<BarMap, ScanError> {
        let mut map = BarMap::new();
        for symbol in &request.symbols {
            match self.fetch_symbol(symbol, request) {
                Ok(bars) if bars.is_empty() => debug!(symbol = %symbol, "no bars returned"),
                Ok(bars) => {
                    map.insert(symbol.clone(), bars);
                }
                Err(reason) => warn!(symbol = %symbol, reason = %reason, "fetch failed"),
            }
        }
        Ok(map)
    }
}
