use super::checkpoint::BackfillCheckpoint;
use super::feed::DailyBarFeed;
use crate::error::Result;
use crate::quote::QuoteRecord;
use crate::repository::{intraday_bounds, QuoteRepository};
use crate::store::QuoteStore;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_SOURCE: &str = "yahoo";
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Tickers between progress log lines
const PROGRESS_INTERVAL: usize = 50;

/// Roughly five trading days
pub const MAX_GAP_DAYS: i64 = 7;

/// Half-open range of trading dates, `start <= date < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    pub total_tickers: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_records: usize,
}

impl BackfillStats {
    pub fn completion_rate(&self) -> f64 {
        if self.total_tickers == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total_tickers as f64 * 100.0
    }
}

pub struct BackfillRunner<F, S> {
    feed: F,
    repo: QuoteRepository<S>,
    checkpoint: BackfillCheckpoint,
    delay: Duration,
    source: String,
}

impl<F: DailyBarFeed, S: QuoteStore> BackfillRunner<F, S> {
    pub fn new(feed: F, repo: QuoteRepository<S>, checkpoint: BackfillCheckpoint) -> Self {
        Self {
            feed,
            repo,
            checkpoint,
            delay: DEFAULT_DELAY,
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    /// Pause between tickers to stay under the feed's rate limit
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn repository(&self) -> &QuoteRepository<S> {
        &self.repo
    }

    /// Fetch and store daily bars for every ticker, one at a time.
    ///
    /// With `resume`, tickers already in the checkpoint's completed list are
    /// skipped; otherwise the checkpoint starts over. A ticker that fails is
    /// recorded and the run moves on.
    pub async fn run(
        &self,
        tickers: &[String],
        range: DateRange,
        resume: bool,
    ) -> Result<BackfillStats> {
        let state = if resume {
            self.checkpoint.load()?
        } else {
            self.checkpoint.reset()?
        };

        let pending: Vec<&String> = tickers.iter().filter(|t| !state.is_completed(t)).collect();

        let mut stats = BackfillStats {
            total_tickers: tickers.len(),
            completed: tickers.len() - pending.len(),
            ..Default::default()
        };

        info!(
            "Starting backfill {} to {}: {} tickers pending",
            range.start,
            range.end,
            pending.len()
        );

        for (i, ticker) in pending.iter().enumerate() {
            info!(
                "Processing {} ({}/{} pending, {}/{} total)",
                ticker,
                i + 1,
                pending.len(),
                stats.completed,
                stats.total_tickers
            );

            match self.backfill_ticker(ticker, range).await {
                Ok(inserted) => {
                    self.checkpoint.mark_completed(ticker)?;
                    stats.completed += 1;
                    stats.total_records += inserted;
                    info!("{}: {} records inserted", ticker, inserted);
                }
                Err(error) => {
                    warn!("{}: {}", ticker, error);
                    self.checkpoint.mark_failed(ticker, &error)?;
                    stats.failed += 1;
                }
            }

            if (i + 1) % PROGRESS_INTERVAL == 0 {
                info!(
                    "Checkpoint: {}/{} completed",
                    stats.completed, stats.total_tickers
                );
            }

            if i + 1 < pending.len() && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        Ok(stats)
    }

    /// Records written, or the reason the ticker failed
    async fn backfill_ticker(
        &self,
        ticker: &str,
        range: DateRange,
    ) -> std::result::Result<usize, String> {
        let bars = self
            .feed
            .daily_bars(ticker, range.start, range.end)
            .await
            .map_err(|e| e.to_string())?;

        if bars.is_empty() {
            return Err("No data returned".to_string());
        }

        let records: Vec<QuoteRecord> = bars
            .iter()
            .map(|bar| bar.to_record(ticker, &self.source))
            .collect();

        self.repo
            .bulk_insert(&records)
            .await
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub ticker: String,
    pub record_count: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub gaps: Vec<Gap>,
}

/// How completely `ticker` is covered between the two dates, inclusive
pub async fn coverage_report<S: QuoteStore>(
    repo: &QuoteRepository<S>,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<CoverageReport> {
    let (start, _) = intraday_bounds(start);
    let (_, end) = intraday_bounds(end);

    let quotes = repo.get_quotes(ticker, start, end, None).await?;
    let timestamps: Vec<DateTime<Utc>> = quotes.iter().map(|q| q.timestamp()).collect();

    Ok(CoverageReport {
        ticker: ticker.to_string(),
        record_count: timestamps.len(),
        first: timestamps.first().copied(),
        last: timestamps.last().copied(),
        gaps: find_gaps(&timestamps, MAX_GAP_DAYS),
    })
}

/// Consecutive pairs further apart than `max_days` calendar days.
/// `timestamps` must be ascending.
pub fn find_gaps(timestamps: &[DateTime<Utc>], max_days: i64) -> Vec<Gap> {
    timestamps
        .windows(2)
        .filter(|pair| (pair[1].date_naive() - pair[0].date_naive()).num_days() > max_days)
        .map(|pair| Gap {
            from: pair[0],
            to: pair[1],
        })
        .collect()
}
