//! Storage seam for the quote repository
//!
//! The repository validates and normalizes; a [`QuoteStore`] only moves
//! already-normalized quotes in and out of the time-series table.

mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::PgQuoteStore;

use crate::error::Result;
use crate::quote::Quote;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Optional conjunction of filters for counting rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteFilter {
    pub symbol: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl QuoteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    #[cfg(test)]
    pub(crate) fn matches(&self, quote: &Quote) -> bool {
        self.symbol.as_deref().map_or(true, |s| quote.symbol() == s)
            && self.start.map_or(true, |start| quote.timestamp() >= start)
            && self.end.map_or(true, |end| quote.timestamp() <= end)
    }
}

/// Persistence operations the repository needs from the schema store.
///
/// Symbols passed in are already normalized; `limit` is never `Some(0)`.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Upsert every batch keyed by `(symbol, timestamp)`, overwriting all
    /// value columns on conflict. Returns the number of quotes written.
    async fn upsert(&self, batches: &[&[Quote]]) -> Result<usize>;

    /// Quotes for `symbol` with `start <= timestamp <= end`, ascending
    async fn range(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Quote>>;

    /// Quote with the greatest timestamp for `symbol`
    async fn latest(&self, symbol: &str) -> Result<Option<Quote>>;

    /// Distinct symbols in ascending order
    async fn symbols(&self, limit: Option<usize>) -> Result<Vec<String>>;

    async fn count(&self, filter: &QuoteFilter) -> Result<u64>;
}

#[async_trait]
impl<S: QuoteStore + ?Sized> QuoteStore for std::sync::Arc<S> {
    async fn upsert(&self, batches: &[&[Quote]]) -> Result<usize> {
        (**self).upsert(batches).await
    }

    async fn range(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Quote>> {
        (**self).range(symbol, start, end, limit).await
    }

    async fn latest(&self, symbol: &str) -> Result<Option<Quote>> {
        (**self).latest(symbol).await
    }

    async fn symbols(&self, limit: Option<usize>) -> Result<Vec<String>> {
        (**self).symbols(limit).await
    }

    async fn count(&self, filter: &QuoteFilter) -> Result<u64> {
        (**self).count(filter).await
    }
}
