//! Daily OHLCV bars from the Yahoo Finance chart API

use crate::quote::QuoteRecord;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

pub const YAHOO_CHART_BASE: &str = "https://query1.finance.yahoo.com";

/// The chart endpoint rejects requests without a browser-like user agent
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error for {ticker}: {message}")]
    Api { ticker: String, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// One trading day, dated in the exchange's local calendar
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<i64>,
}

impl DailyBar {
    /// Record for the repository, stamped at 00:00 UTC of the trading date
    pub fn to_record(&self, ticker: &str, source: &str) -> QuoteRecord {
        let timestamp = self.date.and_time(NaiveTime::MIN).and_utc();
        let value = json!({
            "symbol": ticker,
            "timestamp": timestamp.to_rfc3339(),
            "open": self.open,
            "high": self.high,
            "low": self.low,
            "close": self.close,
            "volume": self.volume,
            "source": source,
        });

        match value {
            serde_json::Value::Object(map) => map,
            _ => QuoteRecord::new(),
        }
    }
}

#[async_trait]
pub trait DailyBarFeed: Send + Sync {
    /// Bars with `start <= date < end`, oldest first
    async fn daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, FeedError>;
}

pub struct YahooChartFeed {
    client: Client,
    base_url: String,
}

impl YahooChartFeed {
    pub fn new() -> Result<Self, FeedError> {
        Self::with_base_url(YAHOO_CHART_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DailyBarFeed for YahooChartFeed {
    async fn daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, FeedError> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            urlencoding::encode(ticker)
        );
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp().to_string();
        let period2 = end.and_time(NaiveTime::MIN).and_utc().timestamp().to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", "1d"),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited);
        }

        // Unknown tickers come back as 404 with the reason in the chart envelope
        let status = response.status();
        let text = response.text().await?;
        let chart: ChartResponse = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                FeedError::InvalidResponse(format!("Failed to parse response: {}", e))
            } else {
                FeedError::Api {
                    ticker: ticker.to_string(),
                    message: format!("{}: {}", status, text),
                }
            }
        })?;

        bars_from_chart(ticker, chart, start, end)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

fn bars_from_chart(
    ticker: &str,
    response: ChartResponse,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<DailyBar>, FeedError> {
    if let Some(err) = response.chart.error {
        return Err(FeedError::Api {
            ticker: ticker.to_string(),
            message: format!("{}: {}", err.code, err.description),
        });
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let series = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        // Halted or not-yet-settled days carry a null close
        let Some(close) = at(&series.close, i) else {
            continue;
        };
        let Some(local) = DateTime::<Utc>::from_timestamp(ts + result.meta.gmtoffset, 0) else {
            continue;
        };

        let date = local.date_naive();
        if date < start || date >= end {
            continue;
        }

        bars.push(DailyBar {
            date,
            open: at(&series.open, i),
            high: at(&series.high, i),
            low: at(&series.low, i),
            close,
            volume: series.volume.get(i).copied().flatten(),
        });
    }

    Ok(bars)
}
