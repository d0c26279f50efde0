//! Quote repository
//!
//! Validated bulk writes and time-range reads over a [`QuoteStore`].
//!
//! Writes run as a two-phase pipeline: the whole input is validated into an
//! immutable list of normalized quotes first, and only then split into
//! storage batches. A single invalid record therefore fails the call before
//! anything reaches the store.

use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::Result;
use crate::quote::{normalize_symbol, Quote, QuoteRecord};
use crate::store::{QuoteFilter, QuoteStore};
use crate::validation::validate_quotes;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::debug;

pub struct QuoteRepository<S> {
    store: S,
    batch_size: usize,
}

impl<S: QuoteStore> QuoteRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the batch size used by [`bulk_insert`](Self::bulk_insert).
    /// Zero means "everything in one batch".
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Validate and upsert `records` using the repository's batch size
    pub async fn bulk_insert(&self, records: &[QuoteRecord]) -> Result<usize> {
        self.bulk_insert_batched(records, Some(self.batch_size)).await
    }

    /// Validate and upsert `records` in batches of `batch_size`.
    ///
    /// `None` or `Some(0)` sends everything in a single batch. Returns the
    /// number of records written, which equals the number validated since an
    /// upsert always writes. Empty input returns 0 without touching storage.
    pub async fn bulk_insert_batched(
        &self,
        records: &[QuoteRecord],
        batch_size: Option<usize>,
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let validated = validate_quotes(records)?;

        let batch_size = match batch_size {
            Some(size) if size > 0 => size,
            _ => validated.len(),
        };
        let batches: Vec<&[Quote]> = validated.chunks(batch_size).collect();

        debug!(
            "Writing {} quotes in {} batches of up to {}",
            validated.len(),
            batches.len(),
            batch_size
        );

        self.store.upsert(&batches).await?;

        Ok(validated.len())
    }

    /// Quotes for `symbol` with `start <= timestamp <= end`, oldest first.
    ///
    /// `limit` of `None` or `Some(0)` returns every match.
    pub async fn get_quotes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Quote>> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() || start > end {
            return Ok(Vec::new());
        }

        self.store
            .range(&symbol, start, end, limit.filter(|&n| n > 0))
            .await
    }

    /// Most recent quote for `symbol`, `None` when there is none
    pub async fn get_latest_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Ok(None);
        }

        self.store.latest(&symbol).await
    }

    /// All quotes for `symbol` on the UTC calendar day `date`
    pub async fn get_intraday_quotes(&self, symbol: &str, date: NaiveDate) -> Result<Vec<Quote>> {
        let (start, end) = intraday_bounds(date);
        self.get_quotes(symbol, start, end, None).await
    }

    /// Distinct stored symbols in alphabetical order
    pub async fn get_symbols(&self, limit: Option<usize>) -> Result<Vec<String>> {
        self.store.symbols(limit.filter(|&n| n > 0)).await
    }

    /// Count quotes matching every filter that is set; no filters counts all rows
    pub async fn count_quotes(&self, filter: QuoteFilter) -> Result<u64> {
        let symbol = filter
            .symbol
            .as_deref()
            .map(normalize_symbol)
            .filter(|s| !s.is_empty());

        let filter = QuoteFilter { symbol, ..filter };
        self.store.count(&filter).await
    }
}

/// Closed interval covering a UTC calendar day, to the microsecond
pub fn intraday_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    let end = date
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .map(|dt| dt.and_utc())
        .unwrap_or(start);
    (start, end)
}
