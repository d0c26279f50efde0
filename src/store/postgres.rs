//! PostgreSQL / TimescaleDB implementation of [`QuoteStore`]

use crate::error::{Result, StorageError};
use crate::quote::{Prices, Quote};
use crate::schema::TableRef;
use crate::store::{QuoteFilter, QuoteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Object, Pool};
use postgres_types::ToSql;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tokio_postgres::Row;
use tracing::{debug, info};

const COLUMNS: &str =
    r#"symbol, "timestamp", open, high, low, close, volume, bid, ask, source"#;

/// Quote store backed by a pooled PostgreSQL connection
#[derive(Clone)]
pub struct PgQuoteStore {
    pool: Pool,
    table: TableRef,
}

impl PgQuoteStore {
    pub fn new(pool: Pool, table: TableRef) -> Self {
        Self { pool, table }
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                cause: e.to_string(),
            })
    }
}

#[async_trait]
impl QuoteStore for PgQuoteStore {
    async fn upsert(&self, batches: &[&[Quote]]) -> Result<usize> {
        let mut client = self.client().await?;

        // All batches share one transaction: either every batch is durable or none is
        let tx = client
            .transaction()
            .await
            .map_err(|e| StorageError::query("upsert", e))?;

        let statement = tx
            .prepare_cached(&upsert_sql(&self.table))
            .await
            .map_err(|e| StorageError::query("upsert", e))?;

        let mut written = 0;
        for (i, batch) in batches.iter().enumerate() {
            let rows = dedup_last_wins(batch);
            let columns = UpsertColumns::from_quotes(&rows);

            tx.execute(&statement, &columns.params())
                .await
                .map_err(|e| StorageError::query("upsert", e))?;

            written += batch.len();
            debug!(
                "Upserted batch {}/{} into {} ({} rows)",
                i + 1,
                batches.len(),
                self.table,
                rows.len()
            );
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::query("upsert", e))?;

        info!("Committed {} quotes into {}", written, self.table);
        Ok(written)
    }

    async fn range(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Quote>> {
        let client = self.client().await?;
        let sql = range_sql(&self.table, limit.is_some());

        let rows = match limit {
            Some(limit) => {
                let limit = limit_param(limit);
                client.query(&sql, &[&symbol, &start, &end, &limit]).await
            }
            None => client.query(&sql, &[&symbol, &start, &end]).await,
        }
        .map_err(|e| StorageError::query("range", e))?;

        rows.iter().map(quote_from_row).collect()
    }

    async fn latest(&self, symbol: &str) -> Result<Option<Quote>> {
        let client = self.client().await?;

        let row = client
            .query_opt(&latest_sql(&self.table), &[&symbol])
            .await
            .map_err(|e| StorageError::query("latest", e))?;

        row.as_ref().map(quote_from_row).transpose()
    }

    async fn symbols(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let client = self.client().await?;
        let sql = symbols_sql(&self.table, limit.is_some());

        let rows = match limit {
            Some(limit) => client.query(&sql, &[&limit_param(limit)]).await,
            None => client.query(&sql, &[]).await,
        }
        .map_err(|e| StorageError::query("symbols", e))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn count(&self, filter: &QuoteFilter) -> Result<u64> {
        let client = self.client().await?;

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(symbol) = &filter.symbol {
            params.push(symbol);
        }
        if let Some(start) = &filter.start {
            params.push(start);
        }
        if let Some(end) = &filter.end {
            params.push(end);
        }

        let row = client
            .query_one(&count_sql(&self.table, filter), &params)
            .await
            .map_err(|e| StorageError::query("count", e))?;

        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }
}

/// Column-oriented view of a batch, bound as arrays and expanded with UNNEST
struct UpsertColumns {
    symbols: Vec<String>,
    timestamps: Vec<DateTime<Utc>>,
    opens: Vec<Option<Decimal>>,
    highs: Vec<Option<Decimal>>,
    lows: Vec<Option<Decimal>>,
    closes: Vec<Option<Decimal>>,
    volumes: Vec<Option<i64>>,
    bids: Vec<Option<Decimal>>,
    asks: Vec<Option<Decimal>>,
    sources: Vec<Option<String>>,
}

impl UpsertColumns {
    fn from_quotes(quotes: &[&Quote]) -> Self {
        let n = quotes.len();
        let mut columns = UpsertColumns {
            symbols: Vec::with_capacity(n),
            timestamps: Vec::with_capacity(n),
            opens: Vec::with_capacity(n),
            highs: Vec::with_capacity(n),
            lows: Vec::with_capacity(n),
            closes: Vec::with_capacity(n),
            volumes: Vec::with_capacity(n),
            bids: Vec::with_capacity(n),
            asks: Vec::with_capacity(n),
            sources: Vec::with_capacity(n),
        };

        for quote in quotes {
            columns.symbols.push(quote.symbol().to_string());
            columns.timestamps.push(quote.timestamp());
            columns.opens.push(quote.open());
            columns.highs.push(quote.high());
            columns.lows.push(quote.low());
            columns.closes.push(quote.close());
            columns.volumes.push(quote.volume());
            columns.bids.push(quote.bid());
            columns.asks.push(quote.ask());
            columns.sources.push(quote.source().map(str::to_string));
        }

        columns
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        vec![
            &self.symbols,
            &self.timestamps,
            &self.opens,
            &self.highs,
            &self.lows,
            &self.closes,
            &self.volumes,
            &self.bids,
            &self.asks,
            &self.sources,
        ]
    }
}

/// A single `ON CONFLICT DO UPDATE` statement may not touch the same row
/// twice, so repeated keys inside a batch collapse to their last occurrence.
fn dedup_last_wins(batch: &[Quote]) -> Vec<&Quote> {
    let mut seen = HashSet::with_capacity(batch.len());
    let mut rows: Vec<&Quote> = batch
        .iter()
        .rev()
        .filter(|quote| seen.insert(quote.key()))
        .collect();
    rows.reverse();
    rows
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn upsert_sql(table: &TableRef) -> String {
    format!(
        r#"
        INSERT INTO {table} ({COLUMNS})
        SELECT * FROM UNNEST(
            $1::text[], $2::timestamptz[], $3::numeric[], $4::numeric[], $5::numeric[],
            $6::numeric[], $7::int8[], $8::numeric[], $9::numeric[], $10::text[]
        )
        ON CONFLICT (symbol, "timestamp") DO UPDATE SET
            open = EXCLUDED.open,
            high = EXCLUDED.high,
            low = EXCLUDED.low,
            close = EXCLUDED.close,
            volume = EXCLUDED.volume,
            bid = EXCLUDED.bid,
            ask = EXCLUDED.ask,
            source = EXCLUDED.source
        "#,
        table = table.qualified()
    )
}

fn range_sql(table: &TableRef, limited: bool) -> String {
    let mut sql = format!(
        r#"SELECT {COLUMNS} FROM {} WHERE symbol = $1 AND "timestamp" >= $2 AND "timestamp" <= $3 ORDER BY "timestamp" ASC"#,
        table.qualified()
    );
    if limited {
        sql.push_str(" LIMIT $4");
    }
    sql
}

fn latest_sql(table: &TableRef) -> String {
    format!(
        r#"SELECT {COLUMNS} FROM {} WHERE symbol = $1 ORDER BY "timestamp" DESC LIMIT 1"#,
        table.qualified()
    )
}

fn symbols_sql(table: &TableRef, limited: bool) -> String {
    let mut sql = format!(
        "SELECT DISTINCT symbol FROM {} ORDER BY symbol ASC",
        table.qualified()
    );
    if limited {
        sql.push_str(" LIMIT $1");
    }
    sql
}

/// Placeholders are numbered in the order symbol, start, end for whichever are set
fn count_sql(table: &TableRef, filter: &QuoteFilter) -> String {
    let mut conditions = Vec::new();
    if filter.symbol.is_some() {
        conditions.push(format!("symbol = ${}", conditions.len() + 1));
    }
    if filter.start.is_some() {
        conditions.push(format!("\"timestamp\" >= ${}", conditions.len() + 1));
    }
    if filter.end.is_some() {
        conditions.push(format!("\"timestamp\" <= ${}", conditions.len() + 1));
    }

    let mut sql = format!("SELECT count(*) FROM {}", table.qualified());
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql
}

fn quote_from_row(row: &Row) -> Result<Quote> {
    let decode = |e: tokio_postgres::Error| StorageError::query("decode", e);

    let prices = Prices {
        open: row.try_get("open").map_err(decode)?,
        high: row.try_get("high").map_err(decode)?,
        low: row.try_get("low").map_err(decode)?,
        close: row.try_get("close").map_err(decode)?,
        bid: row.try_get("bid").map_err(decode)?,
        ask: row.try_get("ask").map_err(decode)?,
    };

    Ok(Quote::from_parts(
        row.try_get("symbol").map_err(decode)?,
        row.try_get("timestamp").map_err(decode)?,
        prices,
        row.try_get("volume").map_err(decode)?,
        row.try_get("source").map_err(decode)?,
    ))
}
