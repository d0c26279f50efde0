//! Quote model
//!
//! One observation of a traded instrument at an instant, keyed by
//! `(symbol, timestamp)`. A `Quote` can only be produced by validation or
//! read back from storage, so every instance satisfies the field constraints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};

/// Loosely-typed input record: field name to raw JSON value
pub type QuoteRecord = Map<String, Value>;

pub const MAX_SYMBOL_LEN: usize = 10;
pub const MAX_SOURCE_LEN: usize = 50;

/// Fractional digits kept for prices (`NUMERIC(10,2)`)
pub const PRICE_SCALE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    symbol: String,
    timestamp: DateTime<Utc>,
    open: Option<Decimal>,
    high: Option<Decimal>,
    low: Option<Decimal>,
    close: Option<Decimal>,
    volume: Option<i64>,
    bid: Option<Decimal>,
    ask: Option<Decimal>,
    source: Option<String>,
}

/// Price fields in column order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Prices {
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

impl Quote {
    pub(crate) fn from_parts(
        symbol: String,
        timestamp: DateTime<Utc>,
        prices: Prices,
        volume: Option<i64>,
        source: Option<String>,
    ) -> Self {
        Self {
            symbol,
            timestamp,
            open: prices.open,
            high: prices.high,
            low: prices.low,
            close: prices.close,
            volume,
            bid: prices.bid,
            ask: prices.ask,
            source,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn open(&self) -> Option<Decimal> {
        self.open
    }

    pub fn high(&self) -> Option<Decimal> {
        self.high
    }

    pub fn low(&self) -> Option<Decimal> {
        self.low
    }

    pub fn close(&self) -> Option<Decimal> {
        self.close
    }

    pub fn volume(&self) -> Option<i64> {
        self.volume
    }

    pub fn bid(&self) -> Option<Decimal> {
        self.bid
    }

    pub fn ask(&self) -> Option<Decimal> {
        self.ask
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Identity of the row this quote occupies
    pub fn key(&self) -> (&str, DateTime<Utc>) {
        (&self.symbol, self.timestamp)
    }
}

/// Canonical form of a ticker: trimmed and uppercased
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
