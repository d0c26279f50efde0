//! Idempotent DDL for the quote hypertable
//!
//! Creates the schema, the table, the TimescaleDB hypertable and its
//! compression/retention policies, plus a `quotes` view over the table for
//! readers that still query that name. Every statement is guarded with
//! `IF NOT EXISTS` / `if_not_exists => TRUE` so it can run on every start.
//! There is no revision ledger: this only brings a fresh database up to the
//! shape the repository expects.

use crate::error::{Result, StorageError};
use crate::schema::TableRef;
use deadpool_postgres::Pool;
use tracing::{debug, info};

/// Name of the read-only alias view created next to the hypertable
const QUOTES_VIEW: &str = "quotes";

/// Chunk lifecycle settings applied to the hypertable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub compress_after_days: u32,
    pub retention_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            compress_after_days: 30,
            retention_days: 730,
        }
    }
}

/// Run the bootstrap statements in order
pub async fn ensure_schema(pool: &Pool, table: &TableRef, policy: RetentionPolicy) -> Result<()> {
    let client = pool.get().await.map_err(|e| StorageError::ConnectionFailed {
        cause: e.to_string(),
    })?;

    for (step, sql) in bootstrap_statements(table, policy) {
        // Compression settings cannot be re-applied once chunks are compressed
        if step == "enable_compression" && compression_enabled(&client, table).await? {
            debug!("Compression already enabled on {}, skipping", table);
            continue;
        }

        debug!("Schema bootstrap step '{}' on {}", step, table);
        client
            .batch_execute(&sql)
            .await
            .map_err(|e| StorageError::query(step, e))?;
    }

    info!(
        "Schema ready for {} (compress after {}d, retain {}d)",
        table, policy.compress_after_days, policy.retention_days
    );
    Ok(())
}

async fn compression_enabled(client: &deadpool_postgres::Object, table: &TableRef) -> Result<bool> {
    let row = client
        .query_opt(
            r#"
            SELECT compression_enabled
            FROM timescaledb_information.hypertables
            WHERE hypertable_schema = $1 AND hypertable_name = $2
            "#,
            &[&table.schema(), &table.table()],
        )
        .await
        .map_err(|e| StorageError::query("compression_enabled", e))?;

    Ok(row.map(|r| r.get::<_, bool>(0)).unwrap_or(false))
}

fn bootstrap_statements(table: &TableRef, policy: RetentionPolicy) -> Vec<(&'static str, String)> {
    let qualified = table.qualified();
    // Literal form for functions taking a regclass argument
    let regclass = format!("'{}'", qualified.replace('\'', "''"));

    let mut statements = vec![
        (
            "create_schema",
            format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", table.schema()),
        ),
        (
            "create_table",
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {qualified} (
                    symbol TEXT NOT NULL,
                    "timestamp" TIMESTAMPTZ NOT NULL,
                    open NUMERIC(10, 2),
                    high NUMERIC(10, 2),
                    low NUMERIC(10, 2),
                    close NUMERIC(10, 2),
                    volume BIGINT,
                    bid NUMERIC(10, 2),
                    ask NUMERIC(10, 2),
                    source TEXT,
                    PRIMARY KEY (symbol, "timestamp")
                )
                "#
            ),
        ),
        (
            "create_extension",
            "CREATE EXTENSION IF NOT EXISTS timescaledb".to_string(),
        ),
        (
            "create_hypertable",
            format!("SELECT create_hypertable({regclass}, 'timestamp', if_not_exists => TRUE)"),
        ),
        (
            "create_timestamp_index",
            format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{}_timestamp_desc\" ON {qualified} (\"timestamp\" DESC)",
                table.table()
            ),
        ),
        (
            "enable_compression",
            format!(
                r#"
                ALTER TABLE {qualified} SET (
                    timescaledb.compress,
                    timescaledb.compress_segmentby = 'symbol',
                    timescaledb.compress_orderby = '"timestamp" DESC'
                )
                "#
            ),
        ),
        (
            "add_compression_policy",
            format!(
                "SELECT add_compression_policy({regclass}, INTERVAL '{} days', if_not_exists => TRUE)",
                policy.compress_after_days
            ),
        ),
        (
            "add_retention_policy",
            format!(
                "SELECT add_retention_policy({regclass}, INTERVAL '{} days', if_not_exists => TRUE)",
                policy.retention_days
            ),
        ),
    ];

    if table.table() != QUOTES_VIEW {
        let view = format!("\"{}\".\"{}\"", table.schema(), QUOTES_VIEW);
        statements.push((
            "create_quotes_view",
            format!(
                r#"
                CREATE OR REPLACE VIEW {view} AS
                SELECT symbol, "timestamp", open, high, low, close, volume, bid, ask, source
                FROM {qualified};
                COMMENT ON VIEW {view} IS 'Compatibility alias for the {} hypertable'
                "#,
                table.table().replace('\'', "''")
            ),
        ));
    }

    statements
}
