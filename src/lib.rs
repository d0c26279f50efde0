//! Quotes Storage Library
//!
//! Data-access layer for market quotes kept in a TimescaleDB hypertable:
//! record validation, batched idempotent upserts, time-range reads, a
//! pooled connection provider, health probing and historical backfill.

pub mod api;
pub mod backfill;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod pool;
pub mod quote;
pub mod repository;
pub mod schema;
pub mod store;
pub mod validation;

pub use config::Config;
pub use error::{Result, StorageError};
pub use quote::{Quote, QuoteRecord};
pub use repository::QuoteRepository;
pub use store::{PgQuoteStore, QuoteFilter, QuoteStore};
