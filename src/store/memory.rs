//! In-memory quote store for repository tests

use crate::error::{Result, StorageError};
use crate::quote::Quote;
use crate::store::{QuoteFilter, QuoteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Rows keyed by (symbol, timestamp), which also gives ascending scan order
#[derive(Default)]
pub(crate) struct MemoryQuoteStore {
    rows: Mutex<BTreeMap<(String, DateTime<Utc>), Quote>>,
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    fail_writes: AtomicBool,
}

impl MemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store operations performed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuoteStore for MemoryQuoteStore {
    async fn upsert(&self, batches: &[&[Quote]]) -> Result<usize> {
        self.touch();
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::query("upsert", "connection reset by peer"));
        }

        let mut rows = self.rows.lock().unwrap();
        let mut written = 0;
        for batch in batches {
            self.batch_sizes.lock().unwrap().push(batch.len());
            for quote in batch.iter() {
                rows.insert(
                    (quote.symbol().to_string(), quote.timestamp()),
                    quote.clone(),
                );
                written += 1;
            }
        }
        Ok(written)
    }

    async fn range(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Quote>> {
        self.touch();
        let filter = QuoteFilter::new().symbol(symbol).start(start).end(end);
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|q| filter.matches(q))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn latest(&self, symbol: &str) -> Result<Option<Quote>> {
        self.touch();
        let rows = self.rows.lock().unwrap();
        Ok(rows.values().rev().find(|q| q.symbol() == symbol).cloned())
    }

    async fn symbols(&self, limit: Option<usize>) -> Result<Vec<String>> {
        self.touch();
        let rows = self.rows.lock().unwrap();
        let symbols: BTreeSet<&str> = rows.keys().map(|(s, _)| s.as_str()).collect();
        Ok(symbols
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(str::to_string)
            .collect())
    }

    async fn count(&self, filter: &QuoteFilter) -> Result<u64> {
        self.touch();
        let rows = self.rows.lock().unwrap();
        Ok(rows.values().filter(|q| filter.matches(q)).count() as u64)
    }
}
